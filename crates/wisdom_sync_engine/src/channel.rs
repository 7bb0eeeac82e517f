//! Message-channel transport.
//!
//! Every request is wrapped in a [`SyncMessage`], encoded as CBOR, handed to
//! a [`MessageChannel`] and the reply decoded the same way. The channel is
//! the only piece that knows how bytes travel: a network client, a pipe, or
//! a direct call into an in-process server.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use wisdom_sync_protocol::{
    AckRequest, AckResponse, HandshakeRequest, HandshakeResponse, PullRequest, PullResponse,
    SyncMessage,
};

/// Moves encoded messages to the server and back.
pub trait MessageChannel: Send + Sync {
    /// Sends one encoded request and returns the encoded reply.
    ///
    /// Failures must already be classified: a retryable transport error for
    /// a dropped connection, [`SyncError::Protocol`] for a rejected request.
    fn exchange(&self, body: Vec<u8>) -> SyncResult<Vec<u8>>;

    /// Checks if the channel is usable.
    fn is_healthy(&self) -> bool;
}

/// CBOR transport over a [`MessageChannel`].
pub struct ChannelTransport<C: MessageChannel> {
    channel: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: MessageChannel> ChannelTransport<C> {
    /// Creates a new transport over `channel`.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the last channel error, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn round_trip(&self, request: SyncMessage) -> SyncResult<SyncMessage> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = request.encode()?;
        let reply = match self.channel.exchange(body) {
            Ok(reply) => reply,
            Err(e) => {
                *self.last_error.write() = Some(e.to_string());
                return Err(e);
            }
        };
        *self.last_error.write() = None;

        Ok(SyncMessage::decode(&reply)?)
    }
}

fn unexpected(expected: &str, reply: &SyncMessage) -> SyncError {
    SyncError::Protocol(format!(
        "expected {} reply, got message type {}",
        expected,
        reply.type_code()
    ))
}

impl<C: MessageChannel> SyncTransport for ChannelTransport<C> {
    fn handshake(&self, request: &HandshakeRequest) -> SyncResult<HandshakeResponse> {
        match self.round_trip(SyncMessage::HandshakeRequest(request.clone()))? {
            SyncMessage::HandshakeResponse(response) => Ok(response),
            other => Err(unexpected("handshake", &other)),
        }
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        match self.round_trip(SyncMessage::PullRequest(request.clone()))? {
            SyncMessage::PullResponse(response) => Ok(response),
            other => Err(unexpected("pull", &other)),
        }
    }

    fn ack(&self, request: &AckRequest) -> SyncResult<AckResponse> {
        match self.round_trip(SyncMessage::AckRequest(request.clone()))? {
            SyncMessage::AckResponse(response) => Ok(response),
            other => Err(unexpected("ack", &other)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.channel.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ScriptedChannel {
        reply: Mutex<Option<SyncResult<Vec<u8>>>>,
        healthy: AtomicBool,
    }

    impl ScriptedChannel {
        fn replying(message: SyncMessage) -> Self {
            Self {
                reply: Mutex::new(Some(Ok(message.encode().unwrap()))),
                healthy: AtomicBool::new(true),
            }
        }
    }

    impl MessageChannel for ScriptedChannel {
        fn exchange(&self, body: Vec<u8>) -> SyncResult<Vec<u8>> {
            SyncMessage::decode(&body).unwrap();
            self.reply
                .lock()
                .take()
                .unwrap_or_else(|| Err(SyncError::transport_retryable("closed")))
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn handshake_round_trip() {
        let channel =
            ScriptedChannel::replying(SyncMessage::HandshakeResponse(HandshakeResponse::success(7, false)));
        let transport = ChannelTransport::new(channel);

        let response = transport
            .handshake(&HandshakeRequest::new("phone", 0))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.server_cursor, 7);
    }

    #[test]
    fn mismatched_reply_is_protocol_error() {
        let channel = ScriptedChannel::replying(SyncMessage::AckResponse(AckResponse::success(1)));
        let transport = ChannelTransport::new(channel);

        let err = transport.pull(&PullRequest::new(0, 10)).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn channel_error_is_recorded() {
        let channel = ScriptedChannel {
            reply: Mutex::new(None),
            healthy: AtomicBool::new(true),
        };
        let transport = ChannelTransport::new(channel);

        let err = transport.pull(&PullRequest::new(0, 10)).unwrap_err();
        assert!(err.is_retryable());
        assert!(transport.last_error().unwrap().contains("closed"));
        assert!(transport.is_connected());
    }

    #[test]
    fn unhealthy_channel_is_not_connected() {
        let channel = ScriptedChannel::replying(SyncMessage::AckResponse(AckResponse::success(1)));
        channel.healthy.store(false, Ordering::SeqCst);
        let transport = ChannelTransport::new(channel);

        assert!(!transport.is_connected());
        assert!(matches!(
            transport.ack(&AckRequest::new("phone", 1)),
            Err(SyncError::NotConnected)
        ));
    }
}
