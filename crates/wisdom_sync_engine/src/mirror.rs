//! Client mirror: the minimal projection a disconnected client keeps.
//!
//! The mirror holds document identity, path, adapter and timestamp, the ids
//! it has seen deleted, and exactly one cursor. It never holds metadata,
//! content hashes or backlinks.

use crate::apply::{apply_events, MirrorStore};
use crate::error::SyncResult;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use wisdom_sync_protocol::SyncEvent;

/// Client-side projection of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorDocument {
    /// Server document id.
    pub doc_id: String,
    /// Library-relative path.
    pub relative_path: String,
    /// Adapter that produced the document.
    pub adapter: String,
    /// Server `updated_at`, Unix milliseconds.
    pub updated_at: i64,
    /// Seq of the event this projection was built from.
    pub last_seq: i64,
}

/// Result of applying one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Events that changed the mirror.
    pub applied: u64,
    /// Events at or below the cursor, already applied earlier.
    pub skipped: u64,
    /// Events past the cursor that had no effect (delete-wins, stale, or
    /// not mirrored).
    pub ignored: u64,
    /// Cursor after the batch.
    pub cursor: i64,
}

/// A client mirror the sync engine applies pulled events to.
pub trait Mirror: Send + Sync {
    /// Highest seq fully applied.
    fn cursor(&self) -> SyncResult<i64>;

    /// Applies a batch and advances the cursor atomically.
    ///
    /// On error neither the projection nor the cursor changes.
    fn apply(&self, events: &[SyncEvent]) -> SyncResult<ApplyOutcome>;

    /// Drops all state and rewinds the cursor to 0.
    fn reset(&self) -> SyncResult<()>;

    /// Looks up one document.
    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>>;

    /// All mirrored documents ordered by path.
    fn documents(&self) -> SyncResult<Vec<MirrorDocument>>;

    /// True if the mirror has applied a delete for `doc_id`.
    fn is_deleted(&self, doc_id: &str) -> SyncResult<bool>;
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    cursor: i64,
    documents: HashMap<String, MirrorDocument>,
    deleted: HashMap<String, i64>,
}

impl MirrorStore for MemoryState {
    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>> {
        Ok(self.documents.get(doc_id).cloned())
    }

    fn deleted_seq(&self, doc_id: &str) -> SyncResult<Option<i64>> {
        Ok(self.deleted.get(doc_id).copied())
    }

    fn upsert(&mut self, document: MirrorDocument) -> SyncResult<()> {
        self.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    fn remove(&mut self, doc_id: &str, seq: i64) -> SyncResult<()> {
        self.documents.remove(doc_id);
        let entry = self.deleted.entry(doc_id.to_string()).or_insert(seq);
        *entry = (*entry).max(seq);
        Ok(())
    }
}

/// In-memory mirror, for tests and short-lived clients.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    state: RwLock<MemoryState>,
}

impl MemoryMirror {
    /// Creates an empty mirror at cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mirrored documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Returns true if no documents are mirrored.
    pub fn is_empty(&self) -> bool {
        self.state.read().documents.is_empty()
    }
}

impl Mirror for MemoryMirror {
    fn cursor(&self) -> SyncResult<i64> {
        Ok(self.state.read().cursor)
    }

    fn apply(&self, events: &[SyncEvent]) -> SyncResult<ApplyOutcome> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let cursor = next.cursor;
        let outcome = apply_events(&mut next, cursor, events)?;
        next.cursor = outcome.cursor;
        *state = next;
        Ok(outcome)
    }

    fn reset(&self) -> SyncResult<()> {
        *self.state.write() = MemoryState::default();
        Ok(())
    }

    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>> {
        Ok(self.state.read().documents.get(doc_id).cloned())
    }

    fn documents(&self) -> SyncResult<Vec<MirrorDocument>> {
        let state = self.state.read();
        let by_path: BTreeMap<_, _> = state
            .documents
            .values()
            .map(|d| ((d.relative_path.clone(), d.doc_id.clone()), d.clone()))
            .collect();
        Ok(by_path.into_values().collect())
    }

    fn is_deleted(&self, doc_id: &str) -> SyncResult<bool> {
        Ok(self.state.read().deleted.contains_key(doc_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wisdom_sync_protocol::{EntityType, Operation};

    fn create(seq: i64, doc_id: &str, path: &str) -> SyncEvent {
        SyncEvent {
            seq,
            entity_type: EntityType::Document,
            entity_id: doc_id.into(),
            operation: Operation::Create,
            payload: json!({
                "doc_id": doc_id,
                "relative_path": path,
                "role": "primary",
                "origin": "manual",
                "adapter": "markdown",
                "metadata": {},
                "content_hash": null,
                "created_at": seq,
                "updated_at": seq,
            }),
            created_at: seq,
        }
    }

    #[test]
    fn failed_batch_leaves_mirror_untouched() {
        let mirror = MemoryMirror::new();
        mirror.apply(&[create(1, "d1", "a.md")]).unwrap();

        let mut broken = create(3, "d3", "c.md");
        broken.payload = json!(null);
        let result = mirror.apply(&[create(2, "d2", "b.md"), broken]);

        assert!(result.is_err());
        assert_eq!(mirror.cursor().unwrap(), 1);
        assert!(mirror.document("d2").unwrap().is_none());
    }

    #[test]
    fn documents_are_ordered_by_path() {
        let mirror = MemoryMirror::new();
        mirror
            .apply(&[create(1, "d1", "z.md"), create(2, "d2", "a.md")])
            .unwrap();

        let paths: Vec<_> = mirror
            .documents()
            .unwrap()
            .into_iter()
            .map(|d| d.relative_path)
            .collect();
        assert_eq!(paths, vec!["a.md", "z.md"]);
        assert_eq!(mirror.len(), 2);
    }

    #[test]
    fn reset_rewinds_everything() {
        let mirror = MemoryMirror::new();
        mirror.apply(&[create(1, "d1", "a.md")]).unwrap();

        mirror.reset().unwrap();
        assert_eq!(mirror.cursor().unwrap(), 0);
        assert!(mirror.is_empty());
    }
}
