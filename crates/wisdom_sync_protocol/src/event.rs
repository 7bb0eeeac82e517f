//! Change-log events and their payload snapshots.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Kind of entity a change-log event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A document row.
    Document,
    /// A backlink row.
    Backlink,
}

impl EntityType {
    /// Returns the stored name of this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Document => "document",
            EntityType::Backlink => "backlink",
        }
    }

    /// Parses a stored entity type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "document" => Some(EntityType::Document),
            "backlink" => Some(EntityType::Backlink),
            _ => None,
        }
    }
}

/// Mutation recorded by a change-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Entity came into existence.
    Create,
    /// Entity changed in place.
    Update,
    /// Entity was removed.
    Delete,
}

impl Operation {
    /// Returns the stored name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Parses a stored operation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// Whether a document is authoritative content or a derived representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The authoritative document.
    Primary,
    /// A derived representation of some primary document.
    Shadow,
}

impl Role {
    /// Returns the stored name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Shadow => "shadow",
        }
    }

    /// Parses a stored role name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "primary" => Some(Role::Primary),
            "shadow" => Some(Role::Shadow),
            _ => None,
        }
    }
}

/// How a document entered the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Authored in place by a user.
    Manual,
    /// Ingested from an external source.
    Import,
}

impl Origin {
    /// Returns the stored name of this origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Manual => "manual",
            Origin::Import => "import",
        }
    }

    /// Parses a stored origin name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "manual" => Some(Origin::Manual),
            "import" => Some(Origin::Import),
            _ => None,
        }
    }
}

/// One committed mutation from the server change log.
///
/// Events are immutable once written. `seq` is the cursor value: it is
/// strictly increasing across the whole log and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Log sequence number.
    pub seq: i64,
    /// Kind of entity mutated.
    pub entity_type: EntityType,
    /// Identifier of the entity (document id, or backlink row id).
    pub entity_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Snapshot sufficient to replay the mutation.
    pub payload: serde_json::Value,
    /// Commit time in Unix milliseconds.
    pub created_at: i64,
}

impl SyncEvent {
    /// Returns true if this event targets a document.
    pub fn is_document(&self) -> bool {
        self.entity_type == EntityType::Document
    }

    /// Decodes the payload of a document create/update event.
    pub fn document_snapshot(&self) -> ProtocolResult<DocumentSnapshot> {
        self.expect_shape(EntityType::Document, &[Operation::Create, Operation::Update])?;
        self.decode_payload()
    }

    /// Decodes the payload of a document delete event.
    pub fn document_deletion(&self) -> ProtocolResult<DocumentDeletion> {
        self.expect_shape(EntityType::Document, &[Operation::Delete])?;
        self.decode_payload()
    }

    /// Decodes the payload of a backlink event.
    pub fn backlink_snapshot(&self) -> ProtocolResult<BacklinkSnapshot> {
        self.expect_shape(EntityType::Backlink, &[Operation::Create, Operation::Delete])?;
        self.decode_payload()
    }

    fn expect_shape(&self, entity_type: EntityType, operations: &[Operation]) -> ProtocolResult<()> {
        if self.entity_type != entity_type || !operations.contains(&self.operation) {
            return Err(ProtocolError::MalformedPayload {
                seq: self.seq,
                message: format!(
                    "{} {} has no {} payload",
                    self.entity_type.as_str(),
                    self.operation.as_str(),
                    entity_type.as_str()
                ),
            });
        }
        Ok(())
    }

    fn decode_payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ProtocolError::MalformedPayload {
            seq: self.seq,
            message: e.to_string(),
        })
    }
}

/// Full document state carried by `create` and `update` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Stable document identifier.
    pub doc_id: String,
    /// Library-relative path.
    pub relative_path: String,
    /// Primary or shadow.
    pub role: Role,
    /// Manual or import.
    pub origin: Origin,
    /// Owning content adapter.
    pub adapter: String,
    /// Adapter metadata (always a JSON object).
    pub metadata: serde_json::Value,
    /// Content fingerprint at this write.
    pub content_hash: Option<String>,
    /// Creation time in Unix milliseconds.
    pub created_at: i64,
    /// Last mutation time in Unix milliseconds.
    pub updated_at: i64,
}

/// Identity carried by a document `delete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDeletion {
    /// Identifier of the deleted document.
    pub doc_id: String,
    /// Path the document occupied when deleted.
    pub relative_path: String,
    /// Deletion time in Unix milliseconds.
    pub deleted_at: i64,
}

/// Backlink row carried by backlink `create` and `delete` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklinkSnapshot {
    /// Auto-assigned row id.
    pub id: i64,
    /// Owning document.
    pub source_doc_id: String,
    /// Segment (heading, anchor) inside the source, if any.
    pub source_segment: Option<String>,
    /// Referenced document.
    pub target_doc_id: String,
    /// Segment inside the target, if any.
    pub target_segment: Option<String>,
    /// Display content, e.g. anchor text.
    pub content: String,
}
