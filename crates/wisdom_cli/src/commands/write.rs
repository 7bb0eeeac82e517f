//! Write command implementation.

use super::{format_millis, open_library, CommandResult};
use crate::config::WisdomConfig;
use std::path::PathBuf;
use wisdom_core::{DocumentWrite, Origin, Role};

/// Options for `wisdom write`.
#[derive(Debug, Clone)]
pub struct WriteArgs {
    /// Library-relative path.
    pub relative_path: String,
    /// Owning adapter.
    pub adapter: String,
    /// Inline content; wins over `file`.
    pub content: Option<String>,
    /// File to read content from.
    pub file: Option<PathBuf>,
    /// Mark as imported.
    pub import: bool,
    /// Mark as a shadow representation.
    pub shadow: bool,
    /// Metadata as a JSON object.
    pub metadata: Option<String>,
}

/// Writes one document through the mutation pipeline.
///
/// Without `--content` or `--file` the content is read from the file at
/// the same relative path under the content root.
pub fn run(config: &WisdomConfig, args: WriteArgs) -> CommandResult {
    let library = open_library(config)?;

    let content = match (args.content, &args.file) {
        (Some(content), _) => content,
        (None, Some(file)) => std::fs::read_to_string(file)
            .map_err(|e| format!("read {}: {}", file.display(), e))?,
        (None, None) => {
            let path = config.content_root.join(&args.relative_path);
            std::fs::read_to_string(&path)
                .map_err(|e| format!("read {}: {}", path.display(), e))?
        }
    };

    let mut write = DocumentWrite::new(args.relative_path, args.adapter, content);
    if args.import {
        write = write.origin(Origin::Import);
    }
    if args.shadow {
        write = write.role(Role::Shadow);
    }
    if let Some(raw) = args.metadata {
        write = write.metadata(serde_json::from_str(&raw)?);
    }

    let head_before = library.head()?;
    let doc = library.write_document(write)?;
    let head = library.head()?;

    if head == head_before {
        println!("unchanged {} ({})", doc.relative_path, doc.doc_id);
    } else {
        println!(
            "wrote {} ({}) seq={} updated_at={}",
            doc.relative_path,
            doc.doc_id,
            head,
            format_millis(doc.updated_at)
        );
    }
    Ok(())
}
