//! Filesystem preparation before a library is opened.

use crate::config::WisdomConfig;
use crate::error::{CliError, CliResult};
use std::io::ErrorKind;
use std::path::Path;

/// Creates the data directory, the content root and the database's parent
/// directory as needed.
pub fn prepare_filesystem(config: &WisdomConfig) -> CliResult<()> {
    ensure_directory(&config.data_dir, "data directory")?;
    ensure_directory(&config.content_root, "content root")?;
    ensure_database_path(&config.db_path)
}

fn ensure_directory(path: &Path, label: &'static str) -> CliResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CliError::NotADirectory {
            label,
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            std::fs::create_dir_all(path).map_err(|e| CliError::io(format!("create {label}"), e))?;
            tracing::debug!(path = %path.display(), "created {}", label);
            Ok(())
        }
        Err(e) => Err(CliError::io(format!("stat {label}"), e)),
    }
}

fn ensure_database_path(path: &Path) -> CliResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(CliError::DatabaseIsDirectory(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => match path.parent() {
            Some(parent) => ensure_directory(parent, "database parent directory"),
            None => Ok(()),
        },
        Err(e) => Err(CliError::io("stat database path", e)),
    }
}
