//! Errors raised before a library is opened.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration and startup.
pub type CliResult<T> = Result<T, CliError>;

/// Configuration and filesystem preparation errors.
#[derive(Error, Debug)]
pub enum CliError {
    /// A configuration value could not be used.
    #[error("invalid {key}: {message}")]
    Config {
        /// Environment variable or flag name.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// A path that must be a directory is something else.
    #[error("{label} is not a directory: {}", path.display())]
    NotADirectory {
        /// Which directory.
        label: &'static str,
        /// Offending path.
        path: PathBuf,
    },

    /// The database path points at a directory.
    #[error("database path is a directory: {}", .0.display())]
    DatabaseIsDirectory(PathBuf),

    /// Filesystem error.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub(crate) fn config(key: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            key,
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
