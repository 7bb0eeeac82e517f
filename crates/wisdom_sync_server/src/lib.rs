//! # Wisdom Sync Server
//!
//! Sync protocol handler for the Wisdom change log.
//!
//! This crate provides:
//! - Handshake with protocol version check and cursor-ahead detection
//! - `pull`: ordered, bounded, replayable batches of change-log events
//! - Cursor acknowledgement recorded per client
//! - CBOR message dispatch
//!
//! # Protocol
//!
//! 1. Client handshakes with its id and last applied cursor
//! 2. Client pulls events after its cursor until `has_more` is false
//! 3. Client acknowledges the highest seq it durably applied
//!
//! Cursor advancement is owned by the client. A pull never mutates server
//! state, so an abandoned or repeated pull is harmless.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{ClientSession, HandlerContext, RequestHandler};
pub use server::SyncServer;
