//! Library facade.

use crate::audit::{self, AuditReport};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::health::{Check, Diagnostics};
use crate::migration::{MigrationManager, MigrationState};
use crate::pipeline::{self, PreparedWrite};
use crate::schema::{server_migrations, REQUIRED_TABLES};
use crate::store::{backlinks, change_log, documents, table_exists, tombstones};
use crate::types::{
    AdapterOutput, Backlink, DocId, Document, DocumentWrite, IngestOutcome, NewBacklink, Tombstone,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wisdom_sync_protocol::{EntityType, SyncEvent};

/// Handle to a knowledge-base library.
///
/// `Library` owns the server tables: documents, backlinks, the change log
/// and the tombstone ledger. All writes go through the mutation methods,
/// each of which is one SQLite transaction; readers never observe half of
/// a mutation.
///
/// # Opening a Library
///
/// ```rust,ignore
/// use wisdom_core::{DocumentWrite, Library};
/// use std::path::Path;
///
/// let library = Library::open(Path::new("data/wisdom.db"))?;
/// let doc = library.write_document(DocumentWrite::new("notes/a.md", "markdown", "# A"))?;
/// library.delete_document(&doc.doc_id)?;
/// ```
///
/// # In-Memory Libraries
///
/// For testing, use `Library::open_in_memory()`.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    config: StoreConfig,
    /// Database file. None for in-memory libraries.
    path: Option<PathBuf>,
    /// Connection used for every mutation.
    writer: Mutex<Connection>,
    /// Separate read-only connection; file databases only.
    reader: Option<Mutex<Connection>>,
    migrations: MigrationManager,
}

/// Row counts and log head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LibraryStats {
    /// Live documents.
    pub documents: u64,
    /// Live backlinks.
    pub backlinks: u64,
    /// Tombstones of either kind.
    pub tombstones: u64,
    /// Events in the change log.
    pub events: u64,
    /// Highest seq in the change log.
    pub head: i64,
}

impl Library {
    /// Opens a library file with default configuration.
    ///
    /// Pending migrations are applied before the handle is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing and `create_if_missing` is false (`NotReady`)
    /// - Recorded migration state is inconsistent (`Migration`)
    /// - Any required table is missing afterwards (`NotReady`)
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens a library file with custom configuration.
    pub fn open_with_config(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        if !config.create_if_missing && !path.exists() {
            return Err(CoreError::not_ready(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let mut writer = Connection::open(path)?;
        configure(&writer, &config)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;

        let migrations = server_migrations()?;
        migrations.run_pending(&mut writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(config.busy_timeout)?;

        let library = Self::from_parts(
            config,
            Some(path.to_path_buf()),
            writer,
            Some(reader),
            migrations,
        );
        library.check_ready()?;
        tracing::info!(path = %path.display(), head = library.head()?, "opened library");
        Ok(library)
    }

    /// Opens a private in-memory library.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(StoreConfig::default())
    }

    /// Opens a private in-memory library with custom configuration.
    pub fn open_in_memory_with_config(config: StoreConfig) -> CoreResult<Self> {
        let mut writer = Connection::open_in_memory()?;
        configure(&writer, &config)?;
        let migrations = server_migrations()?;
        migrations.run_pending(&mut writer)?;

        let library = Self::from_parts(config, None, writer, None, migrations);
        library.check_ready()?;
        Ok(library)
    }

    fn from_parts(
        config: StoreConfig,
        path: Option<PathBuf>,
        writer: Connection,
        reader: Option<Connection>,
        migrations: MigrationManager,
    ) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                config,
                path,
                writer: Mutex::new(writer),
                reader: reader.map(Mutex::new),
                migrations,
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the database file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Runs `f` inside an immediate write transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back otherwise.
    fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        let mut conn = self.inner.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` against the read connection.
    fn read<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        match &self.inner.reader {
            Some(reader) => f(&reader.lock()),
            None => f(&self.inner.writer.lock()),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates or updates the document at `write.relative_path`.
    ///
    /// Rewriting identical content, metadata, role and origin returns the
    /// stored document unchanged and logs nothing.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed path, unknown adapter or non-object metadata
    /// - `Conflict` when an import targets a manual document, or the adapter differs
    /// - `Storage` when the transaction fails; nothing is written
    pub fn write_document(&self, write: DocumentWrite) -> CoreResult<Document> {
        let prepared = PreparedWrite::new(write, &self.inner.config)?;
        self.transaction(|tx| pipeline::write_document(tx, &prepared))
    }

    /// Deletes a document and retracts the backlinks it owns.
    ///
    /// Returns the document's tombstone. Deleting an already-deleted
    /// document returns the existing tombstone without logging anything.
    pub fn delete_document(&self, doc_id: &DocId) -> CoreResult<Tombstone> {
        self.transaction(|tx| pipeline::delete_document(tx, doc_id))
    }

    /// Replaces every backlink owned by `source`.
    pub fn set_backlinks(&self, source: &DocId, links: &[NewBacklink]) -> CoreResult<Vec<Backlink>> {
        self.transaction(|tx| pipeline::set_backlinks(tx, source, links))
    }

    /// Writes an adapter's document and its backlinks in one transaction.
    pub fn ingest(&self, output: AdapterOutput) -> CoreResult<IngestOutcome> {
        let prepared = PreparedWrite::new(output.document, &self.inner.config)?;
        self.transaction(|tx| pipeline::ingest(tx, &prepared, &output.backlinks))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Looks up a live document.
    pub fn document(&self, doc_id: &DocId) -> CoreResult<Option<Document>> {
        self.read(|conn| documents::get(conn, doc_id))
    }

    /// Looks up the live document at a path.
    pub fn document_by_path(&self, relative_path: &str) -> CoreResult<Option<Document>> {
        self.read(|conn| documents::get_by_path(conn, relative_path))
    }

    /// Lists live documents ordered by `updated_at`, then path.
    pub fn documents(&self) -> CoreResult<Vec<Document>> {
        self.read(documents::list)
    }

    /// Backlinks owned by `source`.
    pub fn backlinks_from(&self, source: &DocId) -> CoreResult<Vec<Backlink>> {
        self.read(|conn| backlinks::from_source(conn, source))
    }

    /// Backlinks pointing at `target`.
    pub fn backlinks_to(&self, target: &DocId) -> CoreResult<Vec<Backlink>> {
        self.read(|conn| backlinks::to_target(conn, target))
    }

    /// Looks up a tombstone.
    pub fn tombstone(&self, entity_type: EntityType, entity_id: &str) -> CoreResult<Option<Tombstone>> {
        self.read(|conn| tombstones::get(conn, entity_type, entity_id))
    }

    /// Lists all tombstones.
    pub fn tombstones(&self) -> CoreResult<Vec<Tombstone>> {
        self.read(tombstones::list)
    }

    /// Highest seq in the change log; 0 when empty.
    pub fn head(&self) -> CoreResult<i64> {
        self.read(change_log::head)
    }

    /// Events with `seq > cursor`, at most `limit` of them.
    pub fn events_since(&self, cursor: i64, limit: u32) -> CoreResult<Vec<SyncEvent>> {
        Ok(self.events_page(cursor, limit)?.0)
    }

    /// Like [`events_since`](Self::events_since), also reporting whether
    /// more events follow the page.
    pub fn events_page(&self, cursor: i64, limit: u32) -> CoreResult<(Vec<SyncEvent>, bool)> {
        self.read(|conn| change_log::page(conn, cursor, limit))
    }

    /// Events for one entity in seq order.
    pub fn entity_history(&self, entity_type: EntityType, entity_id: &str) -> CoreResult<Vec<SyncEvent>> {
        self.read(|conn| change_log::for_entity(conn, entity_type, entity_id))
    }

    /// Number of events in the change log.
    pub fn event_count(&self) -> CoreResult<u64> {
        self.read(change_log::count)
    }

    /// Row counts and log head.
    pub fn stats(&self) -> CoreResult<LibraryStats> {
        self.read(|conn| {
            let count = |table: &str| -> CoreResult<u64> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(n as u64)
            };
            Ok(LibraryStats {
                documents: documents::count(conn)?,
                backlinks: count("backlinks")?,
                tombstones: count("tombstones")?,
                events: change_log::count(conn)?,
                head: change_log::head(conn)?,
            })
        })
    }

    /// Checks the change log against the live tables.
    pub fn audit(&self) -> CoreResult<AuditReport> {
        self.read(audit::run)
    }

    // ========================================================================
    // Readiness
    // ========================================================================

    /// Returns the recorded migration state.
    pub fn migration_state(&self) -> CoreResult<MigrationState> {
        self.read(MigrationState::load)
    }

    /// Fails with `NotReady` unless all required tables exist and no
    /// migration is pending.
    pub fn check_ready(&self) -> CoreResult<()> {
        self.read(|conn| {
            let state = self.inner.migrations.check(conn)?;
            let pending = self.inner.migrations.pending(&state);
            if let Some(first) = pending.first() {
                return Err(CoreError::not_ready(format!(
                    "{} migration(s) pending, starting with {}",
                    pending.len(),
                    first.name
                )));
            }
            for table in REQUIRED_TABLES {
                if !table_exists(conn, table)? {
                    return Err(CoreError::not_ready(format!("table {table} is missing")));
                }
            }
            Ok(())
        })
    }

    /// Runs the `database`, `migrations` and `tables` checks.
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diag = Diagnostics::default();

        let reachable = self.read(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        });
        match reachable {
            Ok(()) => diag.push(Check::ok("database", self.describe_location())),
            Err(e) => diag.push(Check::error("database", e.to_string())),
        }

        let migrations = self.read(|conn| {
            let state = self.inner.migrations.check(conn)?;
            Ok((state.current_version(), self.inner.migrations.pending(&state).len()))
        });
        match migrations {
            Ok((version, 0)) => diag.push(Check::ok("migrations", format!("schema version {version}"))),
            Ok((version, pending)) => diag.push(Check::error(
                "migrations",
                format!("schema version {version}, {pending} pending"),
            )),
            Err(e) => diag.push(Check::error("migrations", e.to_string())),
        }

        let missing = self.read(|conn| {
            let mut missing = Vec::new();
            for table in REQUIRED_TABLES {
                if !table_exists(conn, table)? {
                    missing.push(table);
                }
            }
            Ok(missing)
        });
        match missing {
            Ok(missing) if missing.is_empty() => {
                diag.push(Check::ok("tables", REQUIRED_TABLES.join(", ")))
            }
            Ok(missing) => diag.push(Check::error("tables", format!("missing: {}", missing.join(", ")))),
            Err(e) => diag.push(Check::error("tables", e.to_string())),
        }

        diag
    }

    fn describe_location(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }
}

fn configure(conn: &Connection, config: &StoreConfig) -> CoreResult<()> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("path", &self.inner.path)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;

    fn create_library() -> Library {
        Library::open_in_memory().unwrap()
    }

    #[test]
    fn open_in_memory() {
        let library = create_library();
        assert_eq!(library.head().unwrap(), 0);
        assert!(library.path().is_none());
        library.check_ready().unwrap();
    }

    #[test]
    fn diagnostics_all_ok() {
        let diag = create_library().diagnostics();
        assert_eq!(diag.status(), HealthStatus::Ok);
        let names: Vec<_> = diag.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["database", "migrations", "tables"]);
    }

    #[test]
    fn failed_write_leaves_nothing() {
        let library = create_library();
        let doc = library
            .write_document(DocumentWrite::new("a.md", "markdown", "a"))
            .unwrap();

        // Second link target never existed, so the whole set is rejected.
        let links = [NewBacklink::to(doc.doc_id, "self"), NewBacklink::to(DocId::new(), "ghost")];
        assert!(library.set_backlinks(&doc.doc_id, &links).is_err());
        assert!(library.backlinks_from(&doc.doc_id).unwrap().is_empty());
        assert_eq!(library.head().unwrap(), 1);
    }

    #[test]
    fn validation_happens_before_transaction() {
        let library = create_library();
        let err = library
            .write_document(DocumentWrite::new("", "markdown", "a"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(library.event_count().unwrap(), 0);
    }

    #[test]
    fn stats_count_rows() {
        let library = create_library();
        let a = library
            .write_document(DocumentWrite::new("a.md", "markdown", "a"))
            .unwrap();
        let b = library
            .write_document(DocumentWrite::new("b.md", "markdown", "b"))
            .unwrap();
        library
            .set_backlinks(&a.doc_id, &[NewBacklink::to(b.doc_id, "b")])
            .unwrap();
        library.delete_document(&b.doc_id).unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.backlinks, 1);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.events, 4);
        assert_eq!(stats.head, 4);
    }
}
