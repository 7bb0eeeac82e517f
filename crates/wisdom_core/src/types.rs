//! Core type definitions for Wisdom.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;
use wisdom_sync_protocol::{
    BacklinkSnapshot, DocumentDeletion, DocumentSnapshot, EntityType, Origin, Role,
};

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Stable identifier of a document.
///
/// Document IDs are random UUIDs that are:
/// - Immutable for the document's lifetime
/// - Never reused, even after the document is deleted
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DocId(Uuid);

impl DocId {
    /// Creates a new random document ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a document ID from its string form.
    pub fn parse(value: &str) -> CoreResult<Self> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| CoreError::validation(format!("malformed document id: {value:?}")))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for DocId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A document row from the Entity Store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Stable identifier.
    pub doc_id: DocId,
    /// Unique library-relative path.
    pub relative_path: String,
    /// Primary or shadow.
    pub role: Role,
    /// Manual or import.
    pub origin: Origin,
    /// Owning content adapter; immutable once set.
    pub adapter: String,
    /// Adapter-specific metadata, always a JSON object.
    pub metadata: serde_json::Value,
    /// Content fingerprint; `None` only before the first content write.
    pub content_hash: Option<String>,
    /// Creation time in Unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in Unix milliseconds.
    pub updated_at: i64,
}

impl Document {
    /// Snapshot carried by `create`/`update` events.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            doc_id: self.doc_id.to_string(),
            relative_path: self.relative_path.clone(),
            role: self.role,
            origin: self.origin,
            adapter: self.adapter.clone(),
            metadata: self.metadata.clone(),
            content_hash: self.content_hash.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Payload carried by the `delete` event for this document.
    pub fn deletion(&self, deleted_at: i64) -> DocumentDeletion {
        DocumentDeletion {
            doc_id: self.doc_id.to_string(),
            relative_path: self.relative_path.clone(),
            deleted_at,
        }
    }
}

/// A backlink row owned by its source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backlink {
    /// Auto-assigned row id.
    pub id: i64,
    /// Owning document.
    pub source_doc_id: DocId,
    /// Segment inside the source.
    pub source_segment: Option<String>,
    /// Referenced document (live or formerly live).
    pub target_doc_id: DocId,
    /// Segment inside the target.
    pub target_segment: Option<String>,
    /// Display content.
    pub content: String,
}

impl Backlink {
    /// Snapshot carried by backlink events.
    pub fn snapshot(&self) -> BacklinkSnapshot {
        BacklinkSnapshot {
            id: self.id,
            source_doc_id: self.source_doc_id.to_string(),
            source_segment: self.source_segment.clone(),
            target_doc_id: self.target_doc_id.to_string(),
            target_segment: self.target_segment.clone(),
            content: self.content.clone(),
        }
    }

    /// Returns the caller-supplied part of this row.
    pub fn as_new(&self) -> NewBacklink {
        NewBacklink {
            source_segment: self.source_segment.clone(),
            target_doc_id: self.target_doc_id,
            target_segment: self.target_segment.clone(),
            content: self.content.clone(),
        }
    }
}

/// A backlink to insert for some source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBacklink {
    /// Segment inside the source.
    pub source_segment: Option<String>,
    /// Referenced document.
    pub target_doc_id: DocId,
    /// Segment inside the target.
    pub target_segment: Option<String>,
    /// Display content.
    pub content: String,
}

impl NewBacklink {
    /// Creates a whole-document link with the given display content.
    pub fn to(target_doc_id: DocId, content: impl Into<String>) -> Self {
        Self {
            source_segment: None,
            target_doc_id,
            target_segment: None,
            content: content.into(),
        }
    }

    /// Sets the source segment.
    #[must_use]
    pub fn from_segment(mut self, segment: impl Into<String>) -> Self {
        self.source_segment = Some(segment.into());
        self
    }

    /// Sets the target segment.
    #[must_use]
    pub fn at_segment(mut self, segment: impl Into<String>) -> Self {
        self.target_segment = Some(segment.into());
        self
    }
}

/// Marker that an entity was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tombstone {
    /// Kind of deleted entity.
    pub entity_type: EntityType,
    /// Identifier of the deleted entity.
    pub entity_id: String,
    /// Deletion time in Unix milliseconds.
    pub deleted_at: i64,
    /// Path a deleted document occupied; `None` for backlinks.
    pub relative_path: Option<String>,
}

/// A document write as supplied by an adapter or a manual edit.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    /// Library-relative path.
    pub relative_path: String,
    /// Owning adapter.
    pub adapter: String,
    /// Manual or import.
    pub origin: Origin,
    /// Primary or shadow.
    pub role: Role,
    /// Rendered content; only its fingerprint is stored.
    pub content: String,
    /// Adapter metadata; `Null` means an empty object.
    pub metadata: serde_json::Value,
}

impl DocumentWrite {
    /// Creates a manual primary write with empty metadata.
    pub fn new(
        relative_path: impl Into<String>,
        adapter: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            adapter: adapter.into(),
            origin: Origin::Manual,
            role: Role::Primary,
            content: content.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the origin.
    #[must_use]
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the role.
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A backlink as extracted by an adapter, addressed by target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBacklink {
    /// Path of the referenced document.
    pub target_path: String,
    /// Segment inside the source.
    pub source_segment: Option<String>,
    /// Segment inside the target.
    pub target_segment: Option<String>,
    /// Display content.
    pub content: String,
}

/// Everything an adapter hands to the core for one parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    /// The document write.
    pub document: DocumentWrite,
    /// Backlinks extracted from the rendered content.
    pub backlinks: Vec<ExtractedBacklink>,
}

/// Result of ingesting one adapter output.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// The document after the write.
    pub document: Document,
    /// Backlinks now owned by the document.
    pub backlinks: Vec<Backlink>,
    /// Target paths that matched no live or deleted document.
    pub unresolved: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_parse_roundtrip() {
        let id = DocId::new();
        assert_eq!(DocId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(id.to_string().parse::<DocId>().unwrap(), id);
    }

    #[test]
    fn doc_id_rejects_garbage() {
        let err = DocId::parse("not-a-uuid").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn doc_ids_are_unique() {
        assert_ne!(DocId::new(), DocId::new());
    }

    #[test]
    fn write_builder() {
        let write = DocumentWrite::new("notes/a.md", "markdown", "# A")
            .origin(Origin::Import)
            .role(Role::Shadow);
        assert_eq!(write.origin, Origin::Import);
        assert_eq!(write.role, Role::Shadow);
        assert!(write.metadata.as_object().unwrap().is_empty());
    }
}
