//! The append-only change log (`sync_events`).
//!
//! `seq` comes from `INTEGER PRIMARY KEY AUTOINCREMENT`, so it starts at 1,
//! strictly increases in commit order and is never reused, even if the
//! newest row could somehow be removed.

use super::{json_column, named_column};
use crate::error::CoreResult;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use wisdom_sync_protocol::{EntityType, Operation, SyncEvent};

const COLUMNS: &str = "seq, entity_type, entity_id, operation, payload, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SyncEvent> {
    Ok(SyncEvent {
        seq: row.get(0)?,
        entity_type: named_column(row, 1, EntityType::from_name)?,
        entity_id: row.get(2)?,
        operation: named_column(row, 3, Operation::from_name)?,
        payload: json_column(row, 4)?,
        created_at: row.get(5)?,
    })
}

/// Appends one event and returns it with its assigned seq.
pub fn append<P: Serialize>(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
    operation: Operation,
    payload: &P,
    created_at: i64,
) -> CoreResult<SyncEvent> {
    let payload = serde_json::to_value(payload)?;
    conn.execute(
        "INSERT INTO sync_events (entity_type, entity_id, operation, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entity_type.as_str(),
            entity_id,
            operation.as_str(),
            serde_json::to_string(&payload)?,
            created_at,
        ],
    )?;
    let event = SyncEvent {
        seq: conn.last_insert_rowid(),
        entity_type,
        entity_id: entity_id.to_string(),
        operation,
        payload,
        created_at,
    };
    tracing::debug!(
        seq = event.seq,
        entity_type = entity_type.as_str(),
        entity_id,
        operation = operation.as_str(),
        "appended change"
    );
    Ok(event)
}

/// Returns up to `limit` events with `seq > cursor`, in seq order, and
/// whether more remain after them.
pub fn page(conn: &Connection, cursor: i64, limit: u32) -> CoreResult<(Vec<SyncEvent>, bool)> {
    let sql = format!("SELECT {COLUMNS} FROM sync_events WHERE seq > ?1 ORDER BY seq LIMIT ?2");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![cursor, i64::from(limit) + 1], from_row)?;
    let mut events = rows.collect::<Result<Vec<_>, _>>()?;
    let has_more = events.len() > limit as usize;
    events.truncate(limit as usize);
    Ok((events, has_more))
}

/// All events for one entity, in seq order.
pub fn for_entity(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> CoreResult<Vec<SyncEvent>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM sync_events WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![entity_type.as_str(), entity_id], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Highest seq in the log, 0 when empty.
pub fn head(conn: &Connection) -> CoreResult<i64> {
    Ok(conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM sync_events", [], |row| {
        row.get(0)
    })?)
}

/// Number of events in the log.
pub fn count(conn: &Connection) -> CoreResult<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM sync_events", [], |row| row.get(0))?;
    Ok(n as u64)
}
