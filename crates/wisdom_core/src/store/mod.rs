//! Row-level access to the server tables.
//!
//! Functions here take a `&Connection` so they run equally on a plain
//! connection or inside a [`rusqlite::Transaction`]. None of them open a
//! transaction themselves; the mutation pipeline owns that boundary.

pub mod backlinks;
pub mod change_log;
pub mod documents;
pub mod tombstones;

use crate::types::DocId;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;

impl ToSql for DocId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for DocId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        uuid::Uuid::parse_str(text)
            .map(DocId::from)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Reads a text column holding one of a fixed set of names.
pub(crate) fn named_column<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value {raw:?}").into(),
        )
    })
}

/// Reads a text column holding JSON.
pub(crate) fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Checks whether a table exists in the main schema.
pub(crate) fn table_exists(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
pub(crate) fn test_connection() -> rusqlite::Connection {
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    crate::schema::server_migrations()
        .unwrap()
        .run_pending(&mut conn)
        .unwrap();
    conn
}
