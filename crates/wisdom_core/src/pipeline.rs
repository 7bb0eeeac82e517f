//! The mutation pipeline.
//!
//! Every write to documents, backlinks, the change log and the tombstone
//! ledger goes through these functions. Each one expects to run inside a
//! single open transaction and leaves committing to the caller, so a
//! failure anywhere rolls back the row, its events and its tombstones
//! together.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::{backlinks, change_log, documents, tombstones};
use crate::types::{
    now_millis, Backlink, DocId, Document, DocumentWrite, ExtractedBacklink, IngestOutcome,
    NewBacklink, Tombstone,
};
use crate::validate::{content_hash, validate_write};
use rusqlite::Connection;
use wisdom_sync_protocol::{EntityType, Operation, Origin};

/// A validated write ready to enter a transaction.
///
/// Validation and hashing happen before the transaction opens.
#[derive(Debug, Clone)]
pub(crate) struct PreparedWrite {
    write: DocumentWrite,
    hash: String,
}

impl PreparedWrite {
    pub(crate) fn new(write: DocumentWrite, config: &StoreConfig) -> CoreResult<Self> {
        let write = validate_write(write, config)?;
        let hash = content_hash(&write.content);
        Ok(Self { write, hash })
    }
}

/// Creates or updates the document at the write's path.
///
/// Identical content, metadata, role and origin make the write a no-op:
/// the stored row comes back untouched and no event is logged.
pub(crate) fn write_document(conn: &Connection, prepared: &PreparedWrite) -> CoreResult<Document> {
    let write = &prepared.write;
    let now = now_millis();

    let Some(existing) = documents::get_by_path(conn, &write.relative_path)? else {
        let doc = Document {
            doc_id: DocId::new(),
            relative_path: write.relative_path.clone(),
            role: write.role,
            origin: write.origin,
            adapter: write.adapter.clone(),
            metadata: write.metadata.clone(),
            content_hash: Some(prepared.hash.clone()),
            created_at: now,
            updated_at: now,
        };
        documents::insert(conn, &doc)?;
        change_log::append(
            conn,
            EntityType::Document,
            &doc.doc_id.to_string(),
            Operation::Create,
            &doc.snapshot(),
            now,
        )?;
        tracing::debug!(doc_id = %doc.doc_id, path = %doc.relative_path, "created document");
        return Ok(doc);
    };

    if existing.adapter != write.adapter {
        return Err(CoreError::conflict(format!(
            "{} is owned by adapter {:?}, not {:?}",
            existing.relative_path, existing.adapter, write.adapter
        )));
    }
    if existing.origin == Origin::Manual && write.origin == Origin::Import {
        return Err(CoreError::conflict(format!(
            "{} was authored manually and cannot be overwritten by an import",
            existing.relative_path
        )));
    }

    let unchanged = existing.content_hash.as_deref() == Some(prepared.hash.as_str())
        && existing.metadata == write.metadata
        && existing.role == write.role
        && existing.origin == write.origin;
    if unchanged {
        tracing::trace!(doc_id = %existing.doc_id, "write is a no-op");
        return Ok(existing);
    }

    let doc = Document {
        role: write.role,
        origin: write.origin,
        metadata: write.metadata.clone(),
        content_hash: Some(prepared.hash.clone()),
        updated_at: now.max(existing.updated_at + 1),
        ..existing
    };
    documents::update(conn, &doc)?;
    change_log::append(
        conn,
        EntityType::Document,
        &doc.doc_id.to_string(),
        Operation::Update,
        &doc.snapshot(),
        now,
    )?;
    tracing::debug!(doc_id = %doc.doc_id, path = %doc.relative_path, "updated document");
    Ok(doc)
}

/// Deletes a document, retracting every backlink it owns first.
///
/// Deleting an already-deleted document returns its existing tombstone.
pub(crate) fn delete_document(conn: &Connection, doc_id: &DocId) -> CoreResult<Tombstone> {
    let id = doc_id.to_string();
    let Some(doc) = documents::get(conn, doc_id)? else {
        return tombstones::get(conn, EntityType::Document, &id)?
            .ok_or_else(|| CoreError::document_not_found(id));
    };

    let now = now_millis();
    retract_backlinks(conn, doc_id, now)?;

    let deleted_at = now.max(doc.updated_at);
    documents::delete(conn, doc_id)?;
    let tombstone = Tombstone {
        entity_type: EntityType::Document,
        entity_id: id.clone(),
        deleted_at,
        relative_path: Some(doc.relative_path.clone()),
    };
    tombstones::insert(conn, &tombstone)?;
    change_log::append(
        conn,
        EntityType::Document,
        &id,
        Operation::Delete,
        &doc.deletion(deleted_at),
        now,
    )?;
    tracing::debug!(doc_id = %doc_id, path = %doc.relative_path, "deleted document");
    Ok(tombstone)
}

/// Replaces every backlink owned by `source` with `links`.
///
/// The old set is retracted and the new one inserted, each row logged.
/// Supplying the current set again changes nothing.
pub(crate) fn set_backlinks(
    conn: &Connection,
    source: &DocId,
    links: &[NewBacklink],
) -> CoreResult<Vec<Backlink>> {
    if documents::get(conn, source)?.is_none() {
        return Err(CoreError::document_not_found(source.to_string()));
    }
    for link in links {
        if !document_known(conn, &link.target_doc_id)? {
            return Err(CoreError::validation(format!(
                "backlink target {} has never existed",
                link.target_doc_id
            )));
        }
    }

    let current = backlinks::from_source(conn, source)?;
    if current.len() == links.len() && current.iter().zip(links).all(|(c, l)| c.as_new() == *l) {
        return Ok(current);
    }

    let now = now_millis();
    retract_backlinks(conn, source, now)?;

    let mut inserted = Vec::with_capacity(links.len());
    for link in links {
        let row = backlinks::insert(conn, source, link)?;
        change_log::append(
            conn,
            EntityType::Backlink,
            &row.id.to_string(),
            Operation::Create,
            &row.snapshot(),
            now,
        )?;
        inserted.push(row);
    }
    tracing::debug!(
        source = %source,
        retracted = current.len(),
        inserted = inserted.len(),
        "replaced backlinks"
    );
    Ok(inserted)
}

/// Writes an adapter's document and replaces its backlinks in one go.
///
/// Target paths that match neither a live document nor a deleted one are
/// skipped and reported back.
pub(crate) fn ingest(
    conn: &Connection,
    prepared: &PreparedWrite,
    extracted: &[ExtractedBacklink],
) -> CoreResult<IngestOutcome> {
    let document = write_document(conn, prepared)?;

    let mut links = Vec::with_capacity(extracted.len());
    let mut unresolved = Vec::new();
    for link in extracted {
        match resolve_path(conn, &link.target_path)? {
            Some(target_doc_id) => links.push(NewBacklink {
                source_segment: link.source_segment.clone(),
                target_doc_id,
                target_segment: link.target_segment.clone(),
                content: link.content.clone(),
            }),
            None => {
                tracing::warn!(
                    source = %document.relative_path,
                    target = %link.target_path,
                    "skipping backlink to unknown path"
                );
                unresolved.push(link.target_path.clone());
            }
        }
    }

    let backlinks = set_backlinks(conn, &document.doc_id, &links)?;
    Ok(IngestOutcome {
        document,
        backlinks,
        unresolved,
    })
}

fn retract_backlinks(conn: &Connection, source: &DocId, now: i64) -> CoreResult<()> {
    for link in backlinks::from_source(conn, source)? {
        backlinks::delete(conn, link.id)?;
        let id = link.id.to_string();
        tombstones::insert(
            conn,
            &Tombstone {
                entity_type: EntityType::Backlink,
                entity_id: id.clone(),
                deleted_at: now,
                relative_path: None,
            },
        )?;
        change_log::append(
            conn,
            EntityType::Backlink,
            &id,
            Operation::Delete,
            &link.snapshot(),
            now,
        )?;
    }
    Ok(())
}

/// True if the id names a live document or a deleted one.
fn document_known(conn: &Connection, doc_id: &DocId) -> CoreResult<bool> {
    if documents::get(conn, doc_id)?.is_some() {
        return Ok(true);
    }
    Ok(tombstones::get(conn, EntityType::Document, &doc_id.to_string())?.is_some())
}

/// Maps a target path to the live document there, or else to the most
/// recently deleted document that occupied it.
fn resolve_path(conn: &Connection, path: &str) -> CoreResult<Option<DocId>> {
    if let Some(doc) = documents::get_by_path(conn, path)? {
        return Ok(Some(doc.doc_id));
    }
    let deleted = tombstones::latest_at_path(conn, path)?;
    deleted.map(|id| DocId::parse(&id)).transpose()
}
