//! Delete command implementation.

use super::{open_library, resolve_document, CommandResult};
use crate::config::WisdomConfig;

/// Deletes a document by path or id, leaving a tombstone.
pub fn run(config: &WisdomConfig, key: &str) -> CommandResult {
    let library = open_library(config)?;
    let doc = resolve_document(&library, key)?;
    let tombstone = library.delete_document(&doc.doc_id)?;

    println!(
        "deleted {} ({}) seq={} deleted_at={}",
        doc.relative_path,
        tombstone.entity_id,
        library.head()?,
        super::format_millis(tombstone.deleted_at)
    );
    Ok(())
}
