//! # Wisdom Sync Protocol
//!
//! Change-log event types and sync messages shared by the Wisdom server
//! and its mirror clients.
//!
//! This crate provides:
//! - `SyncEvent`, one committed mutation from the server change log
//! - Typed payload snapshots for documents, deletions and backlinks
//! - Protocol messages (Handshake, Pull, Ack)
//! - CBOR encoding/decoding of messages
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{
    BacklinkSnapshot, DocumentDeletion, DocumentSnapshot, EntityType, Operation, Origin, Role,
    SyncEvent,
};
pub use messages::{
    AckRequest, AckResponse, HandshakeRequest, HandshakeResponse, PullRequest, PullResponse,
    SyncMessage,
};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;
