//! Embedded server schema.

use crate::error::CoreResult;
use crate::migration::{MigrationManager, SqlMigration};

/// Tables that must exist before the library serves traffic.
pub const REQUIRED_TABLES: [&str; 4] = ["documents", "backlinks", "sync_events", "tombstones"];

const INITIAL_SCHEMA: &str = "
CREATE TABLE documents (
    doc_id TEXT PRIMARY KEY,
    relative_path TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL CHECK (role IN ('primary', 'shadow')),
    origin TEXT NOT NULL CHECK (origin IN ('manual', 'import')),
    adapter TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(metadata)),
    content_hash TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (updated_at >= created_at)
);

CREATE INDEX idx_documents_updated_at ON documents(updated_at);

-- target_doc_id may name a deleted document, so it is checked against
-- documents and document tombstones by the mutation pipeline instead.
CREATE TABLE backlinks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_doc_id TEXT NOT NULL REFERENCES documents(doc_id),
    source_segment TEXT,
    target_doc_id TEXT NOT NULL,
    target_segment TEXT,
    content TEXT NOT NULL
);

CREATE INDEX idx_backlinks_source ON backlinks(source_doc_id);
CREATE INDEX idx_backlinks_target ON backlinks(target_doc_id);

CREATE TABLE sync_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL CHECK (entity_type IN ('document', 'backlink')),
    entity_id TEXT NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
    payload TEXT NOT NULL CHECK (json_valid(payload)),
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_sync_events_entity ON sync_events(entity_type, entity_id);

CREATE TRIGGER sync_events_no_update BEFORE UPDATE ON sync_events
BEGIN
    SELECT RAISE(ABORT, 'sync_events is append-only');
END;

CREATE TRIGGER sync_events_no_delete BEFORE DELETE ON sync_events
BEGIN
    SELECT RAISE(ABORT, 'sync_events is append-only');
END;

CREATE TABLE tombstones (
    entity_type TEXT NOT NULL CHECK (entity_type IN ('document', 'backlink')),
    entity_id TEXT NOT NULL,
    deleted_at INTEGER NOT NULL,
    PRIMARY KEY (entity_type, entity_id)
);

CREATE TRIGGER tombstones_no_delete BEFORE DELETE ON tombstones
BEGIN
    SELECT RAISE(ABORT, 'tombstones are permanent');
END;
";

// Paths of deleted documents, so ingest can resolve a link to a path whose
// document is gone without scanning the change log.
const TOMBSTONE_PATHS: &str = "
ALTER TABLE tombstones ADD COLUMN relative_path TEXT;

UPDATE tombstones
SET relative_path = (
    SELECT json_extract(e.payload, '$.relative_path')
    FROM sync_events e
    WHERE e.entity_type = 'document'
      AND e.operation = 'delete'
      AND e.entity_id = tombstones.entity_id
    ORDER BY e.seq DESC
    LIMIT 1
)
WHERE entity_type = 'document';

CREATE INDEX idx_tombstones_path ON tombstones(relative_path);
";

/// Returns a manager holding the server migrations.
pub fn server_migrations() -> CoreResult<MigrationManager> {
    let mut manager = MigrationManager::new();
    manager.register(Box::new(
        SqlMigration::new(1, "0001_initial", INITIAL_SCHEMA)
            .with_description("documents, backlinks, change log and tombstones"),
    ))?;
    manager.register(Box::new(
        SqlMigration::new(2, "0002_tombstone_paths", TOMBSTONE_PATHS)
            .with_description("path of each deleted document"),
    ))?;
    Ok(manager)
}
