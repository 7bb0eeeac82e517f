//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use wisdom_sync_protocol::{
    AckRequest, AckResponse, HandshakeRequest, HandshakeResponse, PullRequest, PullResponse,
};

/// A sync transport carries protocol messages to the sync server.
///
/// The engine only sees this trait, so the same engine runs over an
/// in-process channel, a network client, or a mock.
pub trait SyncTransport: Send + Sync {
    /// Performs a handshake with the server.
    fn handshake(&self, request: &HandshakeRequest) -> SyncResult<HandshakeResponse>;

    /// Pulls a batch of events after a cursor.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Reports the highest durably applied cursor.
    fn ack(&self, request: &AckRequest) -> SyncResult<AckResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A scripted transport for testing.
///
/// Pull responses are served from a queue; once it runs dry every pull
/// returns an empty batch at the requested cursor.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    handshake_response: Mutex<Option<HandshakeResponse>>,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    pull_failures: AtomicU32,
    pull_requests: Mutex<Vec<PullRequest>>,
    acks: Mutex<Vec<AckRequest>>,
}

impl MockTransport {
    /// Creates a new, connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the handshake response.
    pub fn set_handshake_response(&self, response: HandshakeResponse) {
        *self.handshake_response.lock() = Some(response);
    }

    /// Queues a pull response.
    pub fn push_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Makes the next `count` pulls fail with a retryable error.
    pub fn fail_pulls(&self, count: u32) {
        self.pull_failures.store(count, Ordering::SeqCst);
    }

    /// Pull requests received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Acknowledgements received so far.
    pub fn acks(&self) -> Vec<AckRequest> {
        self.acks.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl SyncTransport for MockTransport {
    fn handshake(&self, _request: &HandshakeRequest) -> SyncResult<HandshakeResponse> {
        self.ensure_connected()?;
        self.handshake_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock handshake response set".into()))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.ensure_connected()?;
        self.pull_requests.lock().push(request.clone());

        let failing = self
            .pull_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::transport_retryable("simulated connection drop"));
        }

        Ok(self
            .pull_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| PullResponse::empty(request.cursor)))
    }

    fn ack(&self, request: &AckRequest) -> SyncResult<AckResponse> {
        self.ensure_connected()?;
        self.acks.lock().push(request.clone());
        Ok(AckResponse::success(request.cursor))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());
        let result = transport.handshake(&HandshakeRequest::new("phone", 0));
        assert!(matches!(result, Err(SyncError::NotConnected)));

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn mock_transport_serves_queue_then_empty() {
        let transport = MockTransport::new();
        transport.push_pull_response(PullResponse::new(Vec::new(), 4, true));

        let first = transport.pull(&PullRequest::new(0, 10)).unwrap();
        assert_eq!(first.new_cursor, 4);
        let second = transport.pull(&PullRequest::new(4, 10)).unwrap();
        assert_eq!(second, PullResponse::empty(4));
        assert_eq!(transport.pull_requests().len(), 2);
    }

    #[test]
    fn mock_transport_fails_pulls() {
        let transport = MockTransport::new();
        transport.fail_pulls(2);

        for _ in 0..2 {
            let err = transport.pull(&PullRequest::new(0, 10)).unwrap_err();
            assert!(err.is_retryable());
        }
        assert!(transport.pull(&PullRequest::new(0, 10)).is_ok());
    }
}
