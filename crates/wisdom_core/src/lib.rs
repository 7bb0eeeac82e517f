//! # Wisdom Core
//!
//! Canonical store for a Wisdom knowledge base.
//!
//! This crate provides:
//! - Entity store for documents and their backlinks
//! - Tombstone ledger for deleted entities
//! - Append-only change log with a monotonic cursor (`seq`)
//! - Mutation pipeline that writes all three atomically
//! - Schema migrations, readiness diagnostics and a change-log audit
//!
//! ## Key Invariants
//!
//! - Every mutation is one SQLite transaction: row, events and tombstones
//!   commit together or not at all
//! - Rewriting identical content is a no-op and logs nothing
//! - `seq` strictly increases and is never reused
//! - Tombstones are never removed
//! - Backlinks are replaced wholesale per source document
//!
//! ```rust,ignore
//! use wisdom_core::{DocumentWrite, Library};
//!
//! let library = Library::open_in_memory()?;
//! let doc = library.write_document(DocumentWrite::new("notes/a.md", "markdown", "# A"))?;
//! let (events, has_more) = library.events_page(0, 100)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
mod config;
mod error;
mod health;
mod library;
pub mod migration;
mod pipeline;
mod schema;
mod store;
mod types;
mod validate;

pub use audit::{AuditReport, Violation};
pub use config::{StoreConfig, DEFAULT_ADAPTER};
pub use error::{CoreError, CoreResult};
pub use health::{Check, Diagnostics, HealthStatus};
pub use library::{Library, LibraryStats};
pub use migration::{
    AppliedMigration, Migration, MigrationInfo, MigrationManager, MigrationRunResult,
    MigrationState, MigrationVersion, SqlMigration,
};
pub use schema::REQUIRED_TABLES;
pub use types::{
    now_millis, AdapterOutput, Backlink, DocId, Document, DocumentWrite, ExtractedBacklink,
    IngestOutcome, NewBacklink, Tombstone,
};
pub use validate::content_hash;

pub use wisdom_sync_protocol::{EntityType, Operation, Origin, Role, SyncEvent};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
