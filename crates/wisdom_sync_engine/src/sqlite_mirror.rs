//! SQLite-backed client mirror.
//!
//! Layout:
//! - `local_documents`: one row per mirrored document
//! - `local_deleted`: ids the mirror has seen deleted, with the delete seq
//! - `local_sync_state`: a single row holding `last_cursor`
//!
//! A batch's row changes and the cursor update share one transaction, so a
//! crash leaves either the old cursor with the old rows or both new.

use crate::apply::{apply_events, MirrorStore};
use crate::error::SyncResult;
use crate::mirror::{ApplyOutcome, Mirror, MirrorDocument};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use wisdom_core::{MigrationManager, SqlMigration};
use wisdom_sync_protocol::SyncEvent;

const MIRROR_SCHEMA: &str = r#"
CREATE TABLE local_documents (
    doc_id TEXT PRIMARY KEY,
    relative_path TEXT NOT NULL,
    adapter TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    last_seq INTEGER NOT NULL CHECK (last_seq > 0)
);
CREATE INDEX idx_local_documents_path ON local_documents(relative_path);

CREATE TABLE local_deleted (
    doc_id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL CHECK (seq > 0)
);

CREATE TABLE local_sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_cursor INTEGER NOT NULL CHECK (last_cursor >= 0)
);
INSERT INTO local_sync_state (id, last_cursor) VALUES (1, 0);
"#;

fn mirror_migrations() -> SyncResult<MigrationManager> {
    let mut manager = MigrationManager::new();
    manager.register(Box::new(
        SqlMigration::new(1, "0001_local_mirror", MIRROR_SCHEMA)
            .with_description("local documents, deleted ids and cursor"),
    ))?;
    Ok(manager)
}

/// A client mirror persisted in SQLite.
pub struct SqliteMirror {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteMirror {
    /// Opens (creating if needed) a mirror database at `path`.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let result = mirror_migrations()?.run_pending(&mut conn)?;
        tracing::debug!(
            path = %path.display(),
            applied = result.applied.len(),
            "opened mirror"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory mirror.
    pub fn open_in_memory() -> SyncResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        mirror_migrations()?.run_pending(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database path, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up a mirrored document by path.
    pub fn document_by_path(&self, relative_path: &str) -> SyncResult<Option<MirrorDocument>> {
        let conn = self.conn.lock();
        let doc = conn
            .query_row(
                "SELECT doc_id, relative_path, adapter, updated_at, last_seq
                 FROM local_documents WHERE relative_path = ?1",
                [relative_path],
                map_document,
            )
            .optional()?;
        Ok(doc)
    }
}

fn read_cursor(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT last_cursor FROM local_sync_state WHERE id = 1",
        [],
        |row| row.get(0),
    )
}

fn map_document(row: &Row<'_>) -> rusqlite::Result<MirrorDocument> {
    Ok(MirrorDocument {
        doc_id: row.get(0)?,
        relative_path: row.get(1)?,
        adapter: row.get(2)?,
        updated_at: row.get(3)?,
        last_seq: row.get(4)?,
    })
}

fn find_document(conn: &Connection, doc_id: &str) -> rusqlite::Result<Option<MirrorDocument>> {
    conn.query_row(
        "SELECT doc_id, relative_path, adapter, updated_at, last_seq
         FROM local_documents WHERE doc_id = ?1",
        [doc_id],
        map_document,
    )
    .optional()
}

fn find_deleted(conn: &Connection, doc_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT seq FROM local_deleted WHERE doc_id = ?1",
        [doc_id],
        |row| row.get(0),
    )
    .optional()
}

/// Store view over an open transaction.
struct TxStore<'a> {
    tx: &'a Transaction<'a>,
}

impl MirrorStore for TxStore<'_> {
    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>> {
        Ok(find_document(self.tx, doc_id)?)
    }

    fn deleted_seq(&self, doc_id: &str) -> SyncResult<Option<i64>> {
        Ok(find_deleted(self.tx, doc_id)?)
    }

    fn upsert(&mut self, document: MirrorDocument) -> SyncResult<()> {
        self.tx.execute(
            "INSERT INTO local_documents (doc_id, relative_path, adapter, updated_at, last_seq)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(doc_id) DO UPDATE SET
                relative_path = excluded.relative_path,
                adapter = excluded.adapter,
                updated_at = excluded.updated_at,
                last_seq = excluded.last_seq",
            params![
                document.doc_id,
                document.relative_path,
                document.adapter,
                document.updated_at,
                document.last_seq
            ],
        )?;
        Ok(())
    }

    fn remove(&mut self, doc_id: &str, seq: i64) -> SyncResult<()> {
        self.tx
            .execute("DELETE FROM local_documents WHERE doc_id = ?1", [doc_id])?;
        self.tx.execute(
            "INSERT INTO local_deleted (doc_id, seq) VALUES (?1, ?2)
             ON CONFLICT(doc_id) DO UPDATE SET seq = MAX(seq, excluded.seq)",
            params![doc_id, seq],
        )?;
        Ok(())
    }
}

impl Mirror for SqliteMirror {
    fn cursor(&self) -> SyncResult<i64> {
        Ok(read_cursor(&self.conn.lock())?)
    }

    fn apply(&self, events: &[SyncEvent]) -> SyncResult<ApplyOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let cursor = read_cursor(&tx)?;

        let outcome = {
            let mut store = TxStore { tx: &tx };
            apply_events(&mut store, cursor, events)?
        };
        if outcome.cursor != cursor {
            tx.execute(
                "UPDATE local_sync_state SET last_cursor = ?1 WHERE id = 1",
                [outcome.cursor],
            )?;
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn reset(&self) -> SyncResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM local_documents;
             DELETE FROM local_deleted;
             UPDATE local_sync_state SET last_cursor = 0 WHERE id = 1;",
        )?;
        tx.commit()?;
        tracing::info!("mirror reset to cursor 0");
        Ok(())
    }

    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>> {
        Ok(find_document(&self.conn.lock(), doc_id)?)
    }

    fn documents(&self) -> SyncResult<Vec<MirrorDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT doc_id, relative_path, adapter, updated_at, last_seq
             FROM local_documents ORDER BY relative_path, doc_id",
        )?;
        let docs = stmt
            .query_map([], map_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn is_deleted(&self, doc_id: &str) -> SyncResult<bool> {
        Ok(find_deleted(&self.conn.lock(), doc_id)?.is_some())
    }
}

impl std::fmt::Debug for SqliteMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMirror")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wisdom_sync_protocol::{EntityType, Operation};

    fn event(seq: i64, operation: Operation, doc_id: &str, path: &str) -> SyncEvent {
        let payload = match operation {
            Operation::Delete => {
                json!({ "doc_id": doc_id, "relative_path": path, "deleted_at": seq })
            }
            _ => json!({
                "doc_id": doc_id,
                "relative_path": path,
                "role": "primary",
                "origin": "import",
                "adapter": "pdf",
                "metadata": { "pages": 2 },
                "content_hash": "abc",
                "created_at": 1,
                "updated_at": seq,
            }),
        };
        SyncEvent {
            seq,
            entity_type: EntityType::Document,
            entity_id: doc_id.into(),
            operation,
            payload,
            created_at: seq,
        }
    }

    #[test]
    fn fresh_mirror_starts_at_zero() {
        let mirror = SqliteMirror::open_in_memory().unwrap();
        assert_eq!(mirror.cursor().unwrap(), 0);
        assert!(mirror.documents().unwrap().is_empty());
    }

    #[test]
    fn apply_commits_rows_and_cursor() {
        let mirror = SqliteMirror::open_in_memory().unwrap();
        let outcome = mirror
            .apply(&[
                event(1, Operation::Create, "d1", "a.pdf"),
                event(2, Operation::Create, "d2", "b.pdf"),
                event(3, Operation::Delete, "d1", "a.pdf"),
            ])
            .unwrap();

        assert_eq!(outcome.applied, 3);
        assert_eq!(mirror.cursor().unwrap(), 3);
        assert!(mirror.document("d1").unwrap().is_none());
        assert!(mirror.is_deleted("d1").unwrap());
        let b = mirror.document_by_path("b.pdf").unwrap().unwrap();
        assert_eq!(b.adapter, "pdf");
        assert_eq!(b.last_seq, 2);
    }

    #[test]
    fn failed_apply_rolls_back() {
        let mirror = SqliteMirror::open_in_memory().unwrap();
        let mut bad = event(2, Operation::Update, "d1", "a.pdf");
        bad.payload = json!({ "doc_id": 5 });

        let result = mirror.apply(&[event(1, Operation::Create, "d1", "a.pdf"), bad]);
        assert!(result.is_err());
        assert_eq!(mirror.cursor().unwrap(), 0);
        assert!(mirror.document("d1").unwrap().is_none());
    }

    #[test]
    fn reset_clears_state() {
        let mirror = SqliteMirror::open_in_memory().unwrap();
        mirror
            .apply(&[
                event(1, Operation::Create, "d1", "a.pdf"),
                event(2, Operation::Delete, "d1", "a.pdf"),
            ])
            .unwrap();

        mirror.reset().unwrap();
        assert_eq!(mirror.cursor().unwrap(), 0);
        assert!(!mirror.is_deleted("d1").unwrap());
    }
}
