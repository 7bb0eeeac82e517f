//! The `backlinks` table.

use crate::error::CoreResult;
use crate::types::{Backlink, DocId, NewBacklink};
use rusqlite::{params, Connection, Row};

const COLUMNS: &str = "id, source_doc_id, source_segment, target_doc_id, target_segment, content";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Backlink> {
    Ok(Backlink {
        id: row.get(0)?,
        source_doc_id: row.get(1)?,
        source_segment: row.get(2)?,
        target_doc_id: row.get(3)?,
        target_segment: row.get(4)?,
        content: row.get(5)?,
    })
}

/// Backlinks owned by a source document, in insertion order.
pub fn from_source(conn: &Connection, source: &DocId) -> CoreResult<Vec<Backlink>> {
    let sql = format!("SELECT {COLUMNS} FROM backlinks WHERE source_doc_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([source], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Backlinks pointing at a target document, in insertion order.
pub fn to_target(conn: &Connection, target: &DocId) -> CoreResult<Vec<Backlink>> {
    let sql = format!("SELECT {COLUMNS} FROM backlinks WHERE target_doc_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([target], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Ids of every stored backlink.
pub fn ids(conn: &Connection) -> CoreResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM backlinks ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Inserts one backlink and returns the stored row.
pub fn insert(conn: &Connection, source: &DocId, link: &NewBacklink) -> CoreResult<Backlink> {
    conn.execute(
        "INSERT INTO backlinks (source_doc_id, source_segment, target_doc_id, target_segment, content)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            source,
            link.source_segment,
            link.target_doc_id,
            link.target_segment,
            link.content,
        ],
    )?;
    Ok(Backlink {
        id: conn.last_insert_rowid(),
        source_doc_id: *source,
        source_segment: link.source_segment.clone(),
        target_doc_id: link.target_doc_id,
        target_segment: link.target_segment.clone(),
        content: link.content.clone(),
    })
}

/// Removes one backlink row.
pub fn delete(conn: &Connection, id: i64) -> CoreResult<()> {
    conn.execute("DELETE FROM backlinks WHERE id = ?1", [id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{documents, test_connection};
    use crate::types::Document;
    use wisdom_sync_protocol::{Origin, Role};

    fn seed(conn: &Connection, path: &str) -> DocId {
        let doc = Document {
            doc_id: DocId::new(),
            relative_path: path.into(),
            role: Role::Primary,
            origin: Origin::Manual,
            adapter: "markdown".into(),
            metadata: serde_json::json!({}),
            content_hash: None,
            created_at: 1,
            updated_at: 1,
        };
        documents::insert(conn, &doc).unwrap();
        doc.doc_id
    }

    #[test]
    fn insert_and_query_both_directions() {
        let conn = test_connection();
        let a = seed(&conn, "a.md");
        let b = seed(&conn, "b.md");

        let first = insert(&conn, &a, &NewBacklink::to(b, "see b").at_segment("intro")).unwrap();
        let second = insert(&conn, &a, &NewBacklink::to(a, "self")).unwrap();
        assert!(second.id > first.id);

        assert_eq!(from_source(&conn, &a).unwrap(), vec![first.clone(), second]);
        assert_eq!(to_target(&conn, &b).unwrap(), vec![first.clone()]);

        delete(&conn, first.id).unwrap();
        assert!(to_target(&conn, &b).unwrap().is_empty());
    }

    #[test]
    fn source_must_exist() {
        let conn = test_connection();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let ghost = DocId::new();
        assert!(insert(&conn, &ghost, &NewBacklink::to(ghost, "x")).is_err());
    }
}
