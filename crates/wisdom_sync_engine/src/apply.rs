//! Idempotent application of change-log events to a client mirror.
//!
//! [`apply_events`] is pure with respect to persistence: it reads and writes
//! through a [`MirrorStore`] and returns the new cursor, leaving the caller
//! to commit the store changes and the cursor together. The cursor is passed
//! in rather than read from the store, so the same batch can be replayed
//! against any starting point.
//!
//! Rules, in event order:
//! - `seq <= cursor`: already applied, skipped.
//! - document `create`/`update`: upsert the projection, unless the id has
//!   been deleted locally or the local row already reflects a later seq.
//! - document `delete`: drop the projection and remember the id.
//! - backlink events: not mirrored.

use crate::error::{SyncError, SyncResult};
use crate::mirror::{ApplyOutcome, MirrorDocument};
use wisdom_sync_protocol::{EntityType, Operation, SyncEvent};

/// Storage seen by [`apply_events`].
pub trait MirrorStore {
    /// Looks up the projection of a document.
    fn document(&self, doc_id: &str) -> SyncResult<Option<MirrorDocument>>;

    /// Seq of the delete event recorded for `doc_id`, if any.
    fn deleted_seq(&self, doc_id: &str) -> SyncResult<Option<i64>>;

    /// Inserts or replaces a projection.
    fn upsert(&mut self, document: MirrorDocument) -> SyncResult<()>;

    /// Drops the projection of `doc_id` and records its deletion at `seq`.
    fn remove(&mut self, doc_id: &str, seq: i64) -> SyncResult<()>;
}

/// Applies `events` on top of `cursor`.
///
/// The batch must be in strictly increasing seq order; otherwise nothing is
/// applied and a protocol error is returned. A malformed payload also fails
/// the whole batch, so the caller must discard any partial store changes.
pub fn apply_events<S: MirrorStore + ?Sized>(
    store: &mut S,
    cursor: i64,
    events: &[SyncEvent],
) -> SyncResult<ApplyOutcome> {
    check_order(events)?;

    let mut outcome = ApplyOutcome {
        cursor,
        ..ApplyOutcome::default()
    };

    for event in events {
        if event.seq <= cursor {
            outcome.skipped += 1;
            continue;
        }

        let applied = match (event.entity_type, event.operation) {
            (EntityType::Document, Operation::Create | Operation::Update) => {
                apply_snapshot(store, event)?
            }
            (EntityType::Document, Operation::Delete) => {
                let deletion = event.document_deletion()?;
                store.remove(&deletion.doc_id, event.seq)?;
                true
            }
            (EntityType::Backlink, _) => false,
        };

        if applied {
            outcome.applied += 1;
        } else {
            outcome.ignored += 1;
        }
        outcome.cursor = event.seq;
    }

    Ok(outcome)
}

fn apply_snapshot<S: MirrorStore + ?Sized>(store: &mut S, event: &SyncEvent) -> SyncResult<bool> {
    let snapshot = event.document_snapshot()?;

    if let Some(deleted_seq) = store.deleted_seq(&snapshot.doc_id)? {
        tracing::warn!(
            seq = event.seq,
            doc_id = %snapshot.doc_id,
            deleted_seq,
            "ignoring write for a deleted document"
        );
        return Ok(false);
    }

    if let Some(local) = store.document(&snapshot.doc_id)? {
        if local.last_seq >= event.seq {
            tracing::debug!(seq = event.seq, doc_id = %snapshot.doc_id, "stale write ignored");
            return Ok(false);
        }
    }

    store.upsert(MirrorDocument {
        doc_id: snapshot.doc_id,
        relative_path: snapshot.relative_path,
        adapter: snapshot.adapter,
        updated_at: snapshot.updated_at,
        last_seq: event.seq,
    })?;
    Ok(true)
}

fn check_order(events: &[SyncEvent]) -> SyncResult<()> {
    for pair in events.windows(2) {
        if pair[1].seq <= pair[0].seq {
            return Err(SyncError::Protocol(format!(
                "batch out of order: seq {} follows {}",
                pair[1].seq, pair[0].seq
            )));
        }
    }
    Ok(())
}
