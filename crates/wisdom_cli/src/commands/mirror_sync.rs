//! Mirror-sync command implementation.
//!
//! Runs a full client sync against the local library through the real
//! protocol path: CBOR messages handed to an in-process sync server.

use super::{open_library, CommandResult};
use crate::config::WisdomConfig;
use std::path::PathBuf;
use wisdom_sync_engine::{
    ChannelTransport, MessageChannel, Mirror, RetryConfig, SqliteMirror, SyncConfig, SyncEngine,
    SyncError, SyncResult,
};
use wisdom_sync_server::{ServerConfig, SyncServer};

/// Options for `wisdom mirror-sync`.
#[derive(Debug, Clone)]
pub struct MirrorSyncArgs {
    /// Mirror database; defaults to `<data>/mirror.db`.
    pub mirror: Option<PathBuf>,
    /// Client id reported to the server.
    pub client_id: String,
    /// Events per pull; defaults to `WISDOM_PULL_BATCH`.
    pub batch: Option<u32>,
    /// Rebuild the mirror from cursor 0.
    pub reset: bool,
    /// List mirrored documents afterwards.
    pub list: bool,
}

/// Hands encoded messages straight to a [`SyncServer`].
pub struct InProcessChannel {
    server: SyncServer,
}

impl InProcessChannel {
    /// Wraps a server.
    pub fn new(server: SyncServer) -> Self {
        Self { server }
    }
}

impl MessageChannel for InProcessChannel {
    fn exchange(&self, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        self.server.handle_bytes(&body).map_err(|e| {
            if e.is_client_error() {
                SyncError::Protocol(e.to_string())
            } else {
                SyncError::ServerError(e.to_string())
            }
        })
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Brings the mirror up to date with the library.
pub fn run(config: &WisdomConfig, args: MirrorSyncArgs) -> CommandResult {
    let library = open_library(config)?;
    let server = SyncServer::new(ServerConfig::default(), library);

    let mirror_path = args.mirror.unwrap_or_else(|| config.mirror_path());
    let mirror = SqliteMirror::open(&mirror_path)?;
    if args.reset {
        mirror.reset()?;
    }

    let sync_config = SyncConfig::new(args.client_id)
        .with_pull_batch_size(args.batch.unwrap_or(config.pull_batch))
        .with_retry(RetryConfig::new(3));
    let engine = SyncEngine::new(
        sync_config,
        ChannelTransport::new(InProcessChannel::new(server)),
        mirror,
    );

    let result = engine.sync_with_retry()?;
    println!("Mirror {}", mirror_path.display());
    println!("  Cursor:   {}", result.cursor);
    println!("  Batches:  {}", result.batches);
    println!(
        "  Events:   {} pulled, {} applied, {} skipped, {} ignored",
        result.pulled, result.applied, result.skipped, result.ignored
    );
    if result.reset {
        println!("  Mirror was ahead of the log and has been rebuilt");
    }
    println!("  Took:     {:?}", result.duration);

    if args.list {
        for doc in engine.mirror().documents()? {
            println!("  {} {} ({})", doc.last_seq, doc.relative_path, doc.doc_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisdom_core::{DocumentWrite, Library};

    #[test]
    fn in_process_sync_reaches_head() {
        let library = Library::open_in_memory().unwrap();
        library
            .write_document(DocumentWrite::new("a.md", "markdown", "a"))
            .unwrap();
        library
            .write_document(DocumentWrite::new("b.md", "markdown", "b"))
            .unwrap();
        let server = SyncServer::new(ServerConfig::default(), library);

        let engine = SyncEngine::new(
            SyncConfig::new("cli-test").with_pull_batch_size(1),
            ChannelTransport::new(InProcessChannel::new(server)),
            SqliteMirror::open_in_memory().unwrap(),
        );
        let result = engine.sync().unwrap();
        assert_eq!(result.cursor, 2);
        assert_eq!(engine.mirror().documents().unwrap().len(), 2);
    }
}
