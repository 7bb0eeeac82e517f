//! The `documents` table.

use super::{json_column, named_column};
use crate::error::CoreResult;
use crate::types::{DocId, Document};
use rusqlite::{params, Connection, OptionalExtension, Row};
use wisdom_sync_protocol::{Origin, Role};

const COLUMNS: &str = "doc_id, relative_path, role, origin, adapter, metadata, content_hash, \
                       created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        doc_id: row.get(0)?,
        relative_path: row.get(1)?,
        role: named_column(row, 2, Role::from_name)?,
        origin: named_column(row, 3, Origin::from_name)?,
        adapter: row.get(4)?,
        metadata: json_column(row, 5)?,
        content_hash: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Looks up a live document by id.
pub fn get(conn: &Connection, doc_id: &DocId) -> CoreResult<Option<Document>> {
    let sql = format!("SELECT {COLUMNS} FROM documents WHERE doc_id = ?1");
    Ok(conn.query_row(&sql, [doc_id], from_row).optional()?)
}

/// Looks up a live document by path.
pub fn get_by_path(conn: &Connection, relative_path: &str) -> CoreResult<Option<Document>> {
    let sql = format!("SELECT {COLUMNS} FROM documents WHERE relative_path = ?1");
    Ok(conn.query_row(&sql, [relative_path], from_row).optional()?)
}

/// Lists live documents ordered by update time, then path.
pub fn list(conn: &Connection) -> CoreResult<Vec<Document>> {
    let sql = format!("SELECT {COLUMNS} FROM documents ORDER BY updated_at, relative_path");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Counts live documents.
pub fn count(conn: &Connection) -> CoreResult<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Inserts a new row.
pub fn insert(conn: &Connection, doc: &Document) -> CoreResult<()> {
    conn.execute(
        &format!("INSERT INTO documents ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            doc.doc_id,
            doc.relative_path,
            doc.role.as_str(),
            doc.origin.as_str(),
            doc.adapter,
            serde_json::to_string(&doc.metadata)?,
            doc.content_hash,
            doc.created_at,
            doc.updated_at,
        ],
    )?;
    Ok(())
}

/// Rewrites the mutable columns of an existing row.
pub fn update(conn: &Connection, doc: &Document) -> CoreResult<()> {
    conn.execute(
        "UPDATE documents
         SET role = ?2, origin = ?3, metadata = ?4, content_hash = ?5, updated_at = ?6
         WHERE doc_id = ?1",
        params![
            doc.doc_id,
            doc.role.as_str(),
            doc.origin.as_str(),
            serde_json::to_string(&doc.metadata)?,
            doc.content_hash,
            doc.updated_at,
        ],
    )?;
    Ok(())
}

/// Removes a row. Returns false if it was not there.
pub fn delete(conn: &Connection, doc_id: &DocId) -> CoreResult<bool> {
    let n = conn.execute("DELETE FROM documents WHERE doc_id = ?1", [doc_id])?;
    Ok(n > 0)
}
