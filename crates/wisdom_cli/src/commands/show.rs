//! Show command implementation.

use super::{format_millis, open_library, resolve_document, CommandResult};
use crate::config::WisdomConfig;
use serde::Serialize;
use wisdom_core::{Backlink, Document, EntityType, SyncEvent};

/// One document with its links and history.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    /// The document row.
    pub document: Document,
    /// Links it owns.
    pub outgoing: Vec<Backlink>,
    /// Links pointing at it.
    pub incoming: Vec<Backlink>,
    /// Its change-log events.
    pub history: Vec<SyncEvent>,
}

/// Prints a document by path or id.
pub fn run(config: &WisdomConfig, key: &str, format: &str) -> CommandResult {
    let library = open_library(config)?;
    let document = resolve_document(&library, key)?;
    let view = DocumentView {
        outgoing: library.backlinks_from(&document.doc_id)?,
        incoming: library.backlinks_to(&document.doc_id)?,
        history: library.entity_history(EntityType::Document, &document.doc_id.to_string())?,
        document,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        _ => print_text(&view),
    }
    Ok(())
}

fn print_text(view: &DocumentView) {
    let doc = &view.document;
    println!("{}", doc.relative_path);
    println!("  id:       {}", doc.doc_id);
    println!("  adapter:  {}", doc.adapter);
    println!("  role:     {}", doc.role.as_str());
    println!("  origin:   {}", doc.origin.as_str());
    println!("  hash:     {}", doc.content_hash.as_deref().unwrap_or("-"));
    println!("  created:  {}", format_millis(doc.created_at));
    println!("  updated:  {}", format_millis(doc.updated_at));
    println!("  metadata: {}", doc.metadata);

    println!("  links out ({}):", view.outgoing.len());
    for link in &view.outgoing {
        println!("    #{} -> {} {}", link.id, link.target_doc_id, link.content);
    }
    println!("  links in ({}):", view.incoming.len());
    for link in &view.incoming {
        println!("    #{} <- {} {}", link.id, link.source_doc_id, link.content);
    }
    println!("  history:");
    for event in &view.history {
        println!("    seq={} {}", event.seq, event.operation.as_str());
    }
}
