//! Link command implementation.

use super::{open_library, resolve_document, CommandResult};
use crate::config::WisdomConfig;
use wisdom_core::NewBacklink;

/// Replaces the backlinks of `source` with links to `targets`.
///
/// An empty target list clears the set.
pub fn run(config: &WisdomConfig, source: &str, targets: &[String]) -> CommandResult {
    let library = open_library(config)?;
    let source = resolve_document(&library, source)?;

    let mut links = Vec::with_capacity(targets.len());
    for key in targets {
        let target = resolve_document(&library, key)?;
        links.push(NewBacklink::to(target.doc_id, target.relative_path));
    }

    let stored = library.set_backlinks(&source.doc_id, &links)?;
    println!(
        "{} now links to {} document(s)",
        source.relative_path,
        stored.len()
    );
    for link in &stored {
        println!("  #{} -> {} ({})", link.id, link.content, link.target_doc_id);
    }
    Ok(())
}
