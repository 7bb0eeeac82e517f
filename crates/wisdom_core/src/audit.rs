//! Change-log audit.
//!
//! Replays the whole log and checks it against the live tables:
//! - seqs strictly increase
//! - each entity follows `create`, any `update`s, at most one `delete`
//! - backlinks are never updated
//! - every document `delete` has a tombstone
//! - every live row has a live lifecycle and vice versa

use crate::error::CoreResult;
use crate::store::{backlinks, change_log, documents, tombstones};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use wisdom_sync_protocol::{EntityType, Operation};

const PAGE_SIZE: u32 = 500;

/// One inconsistency found by the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Event that exposed the problem, if any.
    pub seq: Option<i64>,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity id.
    pub entity_id: String,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seq {
            Some(seq) => write!(f, "seq {}: ", seq)?,
            None => write!(f, "state: ")?,
        }
        write!(
            f,
            "{} {}: {}",
            self.entity_type.as_str(),
            self.entity_id,
            self.message
        )
    }
}

/// Result of an audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Events replayed.
    pub events_checked: u64,
    /// Problems found, in discovery order.
    pub violations: Vec<Violation>,
}

impl AuditReport {
    /// True if no violation was found.
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    Deleted,
}

/// Audits the log reachable through `conn`.
pub fn run(conn: &Connection) -> CoreResult<AuditReport> {
    let mut report = AuditReport::default();
    let mut states: HashMap<(EntityType, String), Lifecycle> = HashMap::new();
    let mut last_seq = 0i64;
    let mut cursor = 0i64;

    loop {
        let (events, has_more) = change_log::page(conn, cursor, PAGE_SIZE)?;
        for event in &events {
            report.events_checked += 1;
            let mut flag = |message: String| {
                report.violations.push(Violation {
                    seq: Some(event.seq),
                    entity_type: event.entity_type,
                    entity_id: event.entity_id.clone(),
                    message,
                })
            };

            if event.seq <= last_seq {
                flag(format!("seq does not increase past {last_seq}"));
            }
            last_seq = event.seq;

            let key = (event.entity_type, event.entity_id.clone());
            let state = states.get(&key).copied();
            let next = match (event.operation, state) {
                (Operation::Create, Some(Lifecycle::Live)) => {
                    flag("create while already live".into());
                    Lifecycle::Live
                }
                (Operation::Create, _) => Lifecycle::Live,
                (Operation::Update, _) if event.entity_type == EntityType::Backlink => {
                    flag("backlinks are never updated".into());
                    state.unwrap_or(Lifecycle::Live)
                }
                (Operation::Update, Some(Lifecycle::Live)) => Lifecycle::Live,
                (Operation::Update, _) => {
                    flag("update outside a live lifecycle".into());
                    state.unwrap_or(Lifecycle::Deleted)
                }
                (Operation::Delete, Some(Lifecycle::Live)) => Lifecycle::Deleted,
                (Operation::Delete, _) => {
                    flag("delete outside a live lifecycle".into());
                    Lifecycle::Deleted
                }
            };

            if event.operation == Operation::Delete
                && event.entity_type == EntityType::Document
                && tombstones::get(conn, EntityType::Document, &event.entity_id)?.is_none()
            {
                flag("deleted without a tombstone".into());
            }
            states.insert(key, next);
        }

        if let Some(last) = events.last() {
            cursor = last.seq;
        }
        if !has_more {
            break;
        }
    }

    let live_documents: Vec<String> = documents::list(conn)?
        .into_iter()
        .map(|d| d.doc_id.to_string())
        .collect();
    let live_backlinks: Vec<String> = backlinks::ids(conn)?
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    check_live_rows(&mut report, &states, EntityType::Document, &live_documents);
    check_live_rows(&mut report, &states, EntityType::Backlink, &live_backlinks);

    if report.is_consistent() {
        tracing::debug!(events = report.events_checked, "audit passed");
    } else {
        tracing::warn!(
            events = report.events_checked,
            violations = report.violations.len(),
            "audit found violations"
        );
    }
    Ok(report)
}

fn check_live_rows(
    report: &mut AuditReport,
    states: &HashMap<(EntityType, String), Lifecycle>,
    entity_type: EntityType,
    live_ids: &[String],
) {
    let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
    for id in live_ids {
        if states.get(&(entity_type, id.clone())) != Some(&Lifecycle::Live) {
            report.violations.push(Violation {
                seq: None,
                entity_type,
                entity_id: id.clone(),
                message: "row exists but its lifecycle is not live".into(),
            });
        }
    }

    let mut dangling: Vec<&String> = states
        .iter()
        .filter(|((t, id), state)| {
            *t == entity_type && **state == Lifecycle::Live && !live.contains(id.as_str())
        })
        .map(|((_, id), _)| id)
        .collect();
    dangling.sort();
    for id in dangling {
        report.violations.push(Violation {
            seq: None,
            entity_type,
            entity_id: id.clone(),
            message: "lifecycle is live but the row is gone".into(),
        });
    }
}
