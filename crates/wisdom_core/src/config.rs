//! Store configuration.

use std::collections::BTreeSet;
use std::time::Duration;

/// Adapter registered by default.
pub const DEFAULT_ADAPTER: &str = "markdown";

/// Configuration for opening a [`Library`](crate::Library).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Content adapters that may own documents.
    pub adapters: BTreeSet<String>,

    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// Longest accepted relative path, in bytes.
    pub max_path_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            adapters: BTreeSet::from([DEFAULT_ADAPTER.to_string()]),
            busy_timeout: Duration::from_millis(5000),
            create_if_missing: true,
            max_path_len: 1024,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an additional adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapters.insert(adapter.into());
        self
    }

    /// Sets the SQLite busy timeout.
    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the maximum relative path length.
    #[must_use]
    pub fn max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }

    /// Returns true if the adapter is registered.
    pub fn knows_adapter(&self, adapter: &str) -> bool {
        self.adapters.contains(adapter)
    }
}
