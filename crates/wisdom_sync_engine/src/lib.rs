//! # Wisdom Sync Engine
//!
//! Client side of Wisdom sync: a lagging mirror of the server's documents
//! and the engine that brings it up to date.
//!
//! This crate provides:
//! - Client mirror projections, in memory or in SQLite
//! - Idempotent, delete-wins application of change-log events
//! - Sync state machine (idle → connecting → pulling → acknowledging → synced)
//! - Retry with exponential backoff
//! - Transport abstraction with a CBOR message-channel transport
//!
//! ## Architecture
//!
//! Sync is pull-only:
//! 1. Handshake with the last applied cursor
//! 2. Pull batches after the cursor and apply each one atomically
//! 3. Acknowledge the cursor once the server has nothing more
//!
//! ## Key Invariants
//!
//! - The cursor never passes the highest seq actually applied
//! - A batch and its cursor advance commit together or not at all
//! - Replaying any batch leaves the mirror unchanged
//! - A deleted document id is never brought back by a later-delivered write
//! - Resetting to cursor 0 and re-pulling is always a valid recovery

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod channel;
mod config;
mod error;
mod mirror;
mod sqlite_mirror;
mod state;
mod transport;

pub use apply::{apply_events, MirrorStore};
pub use channel::{ChannelTransport, MessageChannel};
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use mirror::{ApplyOutcome, MemoryMirror, Mirror, MirrorDocument};
pub use sqlite_mirror::SqliteMirror;
pub use state::{CancelHandle, SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transport::{MockTransport, SyncTransport};
