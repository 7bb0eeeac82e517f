//! Input validation for mutations.
//!
//! Everything here runs before a transaction is opened, so a rejected write
//! never touches the store.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::DocumentWrite;
use sha2::{Digest, Sha256};

/// Computes the content fingerprint stored in `documents.content_hash`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Checks that a relative path is usable as a library key.
pub fn validate_path(path: &str, config: &StoreConfig) -> CoreResult<()> {
    if path.trim().is_empty() {
        return Err(CoreError::validation("relative path is empty"));
    }
    if path != path.trim() {
        return Err(CoreError::validation(format!(
            "relative path has surrounding whitespace: {path:?}"
        )));
    }
    if path.len() > config.max_path_len {
        return Err(CoreError::validation(format!(
            "relative path is longer than {} bytes",
            config.max_path_len
        )));
    }
    if path.starts_with('/') {
        return Err(CoreError::validation(format!(
            "relative path must not be absolute: {path:?}"
        )));
    }
    if path.chars().any(|c| c == '\\' || c.is_control()) {
        return Err(CoreError::validation(format!(
            "relative path contains a backslash or control character: {path:?}"
        )));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(CoreError::validation(format!(
                "relative path has an empty or dot segment: {path:?}"
            )));
        }
    }
    Ok(())
}

/// Checks that the adapter is registered.
pub fn validate_adapter(adapter: &str, config: &StoreConfig) -> CoreResult<()> {
    if adapter.trim().is_empty() {
        return Err(CoreError::validation("adapter is empty"));
    }
    if !config.knows_adapter(adapter) {
        return Err(CoreError::validation(format!("unknown adapter: {adapter:?}")));
    }
    Ok(())
}

/// Normalizes metadata to a JSON object.
pub fn normalize_metadata(metadata: serde_json::Value) -> CoreResult<serde_json::Value> {
    match metadata {
        serde_json::Value::Null => Ok(serde_json::Value::Object(serde_json::Map::new())),
        serde_json::Value::Object(_) => Ok(metadata),
        other => Err(CoreError::validation(format!(
            "metadata must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Validates a whole write and returns it with normalized metadata.
pub fn validate_write(mut write: DocumentWrite, config: &StoreConfig) -> CoreResult<DocumentWrite> {
    validate_path(&write.relative_path, config)?;
    validate_adapter(&write.adapter, config)?;
    write.metadata = normalize_metadata(write.metadata)?;
    Ok(write)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_hex() {
        let a = content_hash("# A");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("# A"));
        assert_ne!(a, content_hash("# A updated"));
    }

    #[test]
    fn accepts_nested_paths() {
        let config = StoreConfig::default();
        validate_path("notes/a.md", &config).unwrap();
        validate_path("inbox/2024/summary.md", &config).unwrap();
    }

    #[test]
    fn rejects_malformed_paths() {
        let config = StoreConfig::default();
        for path in [
            "",
            "   ",
            "/abs.md",
            "notes//a.md",
            "notes/../a.md",
            "./a.md",
            "notes/",
            "win\\path.md",
            " notes/a.md",
            "bad\u{0}name",
        ] {
            assert!(validate_path(path, &config).is_err(), "accepted {path:?}");
        }
    }

    #[test]
    fn rejects_long_paths() {
        let config = StoreConfig::default().max_path_len(8);
        assert!(validate_path("abcdefghi", &config).is_err());
        validate_path("abcdefgh", &config).unwrap();
    }

    #[test]
    fn adapter_must_be_registered() {
        let config = StoreConfig::default();
        validate_adapter("markdown", &config).unwrap();
        assert!(validate_adapter("", &config).is_err());
        assert!(validate_adapter("docx", &config).is_err());
    }

    #[test]
    fn metadata_defaults_to_object() {
        assert_eq!(normalize_metadata(serde_json::Value::Null).unwrap(), json!({}));
        assert_eq!(
            normalize_metadata(json!({"title": "A"})).unwrap(),
            json!({"title": "A"})
        );
        assert!(normalize_metadata(json!([1, 2])).is_err());
        assert!(normalize_metadata(json!("text")).is_err());
    }
}
