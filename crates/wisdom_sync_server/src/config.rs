//! Server configuration.

use wisdom_sync_protocol::PROTOCOL_VERSION;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Batch size used when a pull request asks for 0 events.
    pub default_pull_batch: u32,
    /// Upper bound on events per pull response.
    pub max_pull_batch: u32,
    /// Protocol version the server accepts.
    pub protocol_version: u16,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            default_pull_batch: 100,
            max_pull_batch: 1000,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Sets the default pull batch size.
    pub fn with_default_pull_batch(mut self, size: u32) -> Self {
        self.default_pull_batch = size;
        self
    }

    /// Sets the maximum pull batch size.
    pub fn with_max_pull_batch(mut self, size: u32) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Sets the accepted protocol version.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }

    /// Resolves a requested limit to the number of events to serve.
    ///
    /// 0 means the default; anything is capped at the maximum.
    pub fn batch_size(&self, requested: u32) -> u32 {
        let max = self.max_pull_batch.max(1);
        match requested {
            0 => self.default_pull_batch.clamp(1, max),
            n => n.min(max),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.default_pull_batch, 100);
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn batch_size_is_bounded() {
        let config = ServerConfig::new()
            .with_default_pull_batch(10)
            .with_max_pull_batch(50);

        assert_eq!(config.batch_size(0), 10);
        assert_eq!(config.batch_size(7), 7);
        assert_eq!(config.batch_size(500), 50);
        assert_eq!(ServerConfig::new().with_max_pull_batch(0).batch_size(0), 1);
    }
}
