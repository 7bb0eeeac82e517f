//! CLI command implementations.

pub mod delete;
pub mod dump_log;
pub mod init;
pub mod link;
pub mod mirror_sync;
pub mod show;
pub mod status;
pub mod verify;
pub mod write;

use crate::config::WisdomConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use wisdom_core::{DocId, Document, Library};

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing library; `init` is the only command that creates one.
pub fn open_library(config: &WisdomConfig) -> CommandResult<Library> {
    let store = config.store_config().create_if_missing(false);
    Library::open_with_config(&config.db_path, store).map_err(|e| {
        format!(
            "cannot open library at {} ({}); run `wisdom init` first",
            config.db_path.display(),
            e
        )
        .into()
    })
}

/// Finds a live document by relative path or by id.
pub fn resolve_document(library: &Library, key: &str) -> CommandResult<Document> {
    if let Some(doc) = library.document_by_path(key)? {
        return Ok(doc);
    }
    if let Ok(doc_id) = DocId::parse(key) {
        if let Some(doc) = library.document(&doc_id)? {
            return Ok(doc);
        }
    }
    Err(format!("no live document with path or id {key:?}").into())
}

/// Formats Unix milliseconds as an RFC 3339 UTC timestamp for text output.
///
/// Values chrono cannot represent are printed as raw milliseconds.
pub fn format_millis(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(at) => at.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{millis}ms"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisdom_core::DocumentWrite;

    #[test]
    fn resolves_by_path_then_id() {
        let library = Library::open_in_memory().unwrap();
        let doc = library
            .write_document(DocumentWrite::new("a.md", "markdown", "a"))
            .unwrap();

        assert_eq!(resolve_document(&library, "a.md").unwrap().doc_id, doc.doc_id);
        assert_eq!(
            resolve_document(&library, &doc.doc_id.to_string())
                .unwrap()
                .relative_path,
            "a.md"
        );
        assert!(resolve_document(&library, "missing.md").is_err());
    }

    #[test]
    fn millis_format() {
        assert_eq!(format_millis(1_500), "1970-01-01T00:00:01.500Z");
        assert_eq!(format_millis(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
        assert_eq!(format_millis(i64::MAX), format!("{}ms", i64::MAX));
    }
}
