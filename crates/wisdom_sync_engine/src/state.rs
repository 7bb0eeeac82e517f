//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mirror::Mirror;
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wisdom_sync_protocol::{AckRequest, HandshakeRequest, PullRequest};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is handshaking with the server.
    Connecting,
    /// Engine is pulling and applying batches.
    Pulling,
    /// Engine is reporting its cursor.
    Acknowledging,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
    /// Engine is waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Connecting | SyncState::Pulling | SyncState::Acknowledging
        )
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            SyncState::Idle | SyncState::Synced | SyncState::Error | SyncState::RetryWait
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Events that changed the mirror.
    pub events_applied: u64,
    /// Events delivered again at or below the cursor.
    pub events_skipped: u64,
    /// Events with no effect on the mirror.
    pub events_ignored: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Times the mirror was rebuilt from cursor 0.
    pub resets: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// Events received.
    pub pulled: u64,
    /// Events that changed the mirror.
    pub applied: u64,
    /// Events at or below the cursor.
    pub skipped: u64,
    /// Events with no effect on the mirror.
    pub ignored: u64,
    /// Pull round trips.
    pub batches: u64,
    /// Mirror cursor at the end of the cycle.
    pub cursor: i64,
    /// Whether the mirror was reset because its cursor was ahead.
    pub reset: bool,
    /// Whether the sync was successful.
    pub success: bool,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// Cancels a running sync from another thread.
///
/// The flag is checked between batches; a batch that is already being
/// applied completes first.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Brings a client mirror up to date with the server's change log.
pub struct SyncEngine<T: SyncTransport, M: Mirror> {
    config: SyncConfig,
    transport: Arc<T>,
    mirror: Arc<M>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: Arc<AtomicBool>,
    current_retry: AtomicU64,
}

impl<T: SyncTransport, M: Mirror> SyncEngine<T, M> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, mirror: M) -> Self {
        Self::with_shared(config, Arc::new(transport), Arc::new(mirror))
    }

    /// Creates a sync engine over a transport and mirror the caller keeps
    /// handles to.
    pub fn with_shared(config: SyncConfig, transport: Arc<T>, mirror: Arc<M>) -> Self {
        Self {
            config,
            transport,
            mirror,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            current_retry: AtomicU64::new(0),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the mirror.
    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current attempt within `sync_with_retry`, 0 for the first.
    pub fn current_retry(&self) -> u64 {
        self.current_retry.load(Ordering::SeqCst)
    }

    /// Cancels any ongoing sync operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns a handle that cancels this engine's syncs.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Clears a pending cancellation.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Consumes a pending cancellation.
    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.swap(false, Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one sync cycle: handshake, pull and apply until the server has
    /// nothing more, then acknowledge the applied cursor.
    ///
    /// Every applied batch is committed with its cursor before the next pull,
    /// so an interrupted cycle resumes from the last committed batch.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        let state = self.state();
        if !state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", state),
                to: "Connecting".into(),
            });
        }

        let start = Instant::now();
        let mut result = SyncCycleResult::default();

        if let Err(e) = self.run_cycle(&mut result) {
            self.handle_error(&e);
            return Err(e);
        }

        result.success = true;
        result.duration = start.elapsed();
        self.set_state(SyncState::Synced);
        self.current_retry.store(0, Ordering::SeqCst);

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.events_applied += result.applied;
            stats.events_skipped += result.skipped;
            stats.events_ignored += result.ignored;
            if result.reset {
                stats.resets += 1;
            }
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        tracing::info!(
            client_id = %self.config.client_id,
            cursor = result.cursor,
            pulled = result.pulled,
            applied = result.applied,
            batches = result.batches,
            "sync cycle complete"
        );
        Ok(result)
    }

    /// Performs a sync with retry on transient errors.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry_config = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                let delay = retry_config.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying sync");
                std::thread::sleep(delay);

                self.stats.write().retries += 1;
            }

            self.check_cancelled()?;
            self.current_retry.store(u64::from(attempt), Ordering::SeqCst);

            match self.sync() {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        tracing::warn!(attempt, error = %e, "sync attempt failed");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn run_cycle(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        self.check_cancelled()?;
        self.set_state(SyncState::Connecting);
        result.reset = self.handshake()?;

        self.set_state(SyncState::Pulling);
        self.pull_all(result)?;

        self.set_state(SyncState::Acknowledging);
        self.acknowledge(result.cursor)
    }

    /// Performs the handshake. Returns true if the mirror was reset.
    fn handshake(&self) -> SyncResult<bool> {
        let cursor = self.mirror.cursor()?;
        let request = HandshakeRequest {
            client_id: self.config.client_id.clone(),
            protocol_version: self.config.protocol_version,
            last_cursor: cursor,
        };

        let response = self.transport.handshake(&request)?;

        if !response.success {
            if response.protocol_version != self.config.protocol_version {
                return Err(SyncError::VersionMismatch {
                    local: self.config.protocol_version,
                    remote: response.protocol_version,
                });
            }
            return Err(SyncError::Protocol(
                response.error.unwrap_or_else(|| "handshake failed".into()),
            ));
        }

        if response.cursor_ahead {
            tracing::warn!(
                cursor,
                server_cursor = response.server_cursor,
                "mirror cursor is ahead of the server, rebuilding"
            );
            self.mirror.reset()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Pulls and applies batches until the server reports no more.
    fn pull_all(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        loop {
            self.check_cancelled()?;

            let cursor = self.mirror.cursor()?;
            let request = PullRequest::new(cursor, self.config.pull_batch_size);
            let response = self.transport.pull(&request)?;
            result.batches += 1;

            if response.new_cursor < cursor {
                return Err(SyncError::Protocol(format!(
                    "server moved cursor back from {} to {}",
                    cursor, response.new_cursor
                )));
            }
            if response.has_more && response.events.is_empty() {
                return Err(SyncError::Protocol(format!(
                    "server reported more events after {} but sent none",
                    cursor
                )));
            }

            let outcome = self.mirror.apply(&response.events)?;
            result.pulled += response.events.len() as u64;
            result.applied += outcome.applied;
            result.skipped += outcome.skipped;
            result.ignored += outcome.ignored;
            result.cursor = outcome.cursor;

            if response.new_cursor > outcome.cursor {
                // Never commit a cursor past what was actually applied.
                tracing::debug!(
                    applied_cursor = outcome.cursor,
                    new_cursor = response.new_cursor,
                    "server cursor past the applied events"
                );
            }

            if !response.has_more {
                return Ok(());
            }
            if outcome.cursor == cursor {
                return Err(SyncError::Protocol(format!(
                    "server reported more events after {} but sent none past it",
                    cursor
                )));
            }
        }
    }

    fn acknowledge(&self, cursor: i64) -> SyncResult<()> {
        let request = AckRequest::new(self.config.client_id.clone(), cursor);
        let response = self.transport.ack(&request)?;
        if !response.success {
            return Err(SyncError::ServerError(
                response.error.unwrap_or_else(|| "ack rejected".into()),
            ));
        }
        Ok(())
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }
}
