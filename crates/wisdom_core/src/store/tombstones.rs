//! The tombstone ledger.

use super::named_column;
use crate::error::CoreResult;
use crate::types::Tombstone;
use rusqlite::{params, Connection, OptionalExtension, Row};
use wisdom_sync_protocol::EntityType;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Tombstone> {
    Ok(Tombstone {
        entity_type: named_column(row, 0, EntityType::from_name)?,
        entity_id: row.get(1)?,
        deleted_at: row.get(2)?,
        relative_path: row.get(3)?,
    })
}

/// Looks up the tombstone for an entity.
pub fn get(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> CoreResult<Option<Tombstone>> {
    Ok(conn
        .query_row(
            "SELECT entity_type, entity_id, deleted_at, relative_path FROM tombstones
             WHERE entity_type = ?1 AND entity_id = ?2",
            params![entity_type.as_str(), entity_id],
            from_row,
        )
        .optional()?)
}

/// Lists all tombstones, oldest first.
pub fn list(conn: &Connection) -> CoreResult<Vec<Tombstone>> {
    let mut stmt = conn.prepare(
        "SELECT entity_type, entity_id, deleted_at, relative_path FROM tombstones
         ORDER BY deleted_at, entity_type, entity_id",
    )?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Most recently deleted document that occupied `relative_path`.
pub fn latest_at_path(conn: &Connection, relative_path: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT entity_id FROM tombstones
             WHERE relative_path = ?1 ORDER BY rowid DESC LIMIT 1",
            [relative_path],
            |row| row.get(0),
        )
        .optional()?)
}

/// Records a deletion.
pub fn insert(conn: &Connection, tombstone: &Tombstone) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO tombstones (entity_type, entity_id, deleted_at, relative_path)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            tombstone.entity_type.as_str(),
            tombstone.entity_id,
            tombstone.deleted_at,
            tombstone.relative_path
        ],
    )?;
    Ok(())
}
