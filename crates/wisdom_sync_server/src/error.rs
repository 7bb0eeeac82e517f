//! Error types for the sync server.

use thiserror::Error;
use wisdom_core::CoreError;
use wisdom_sync_protocol::ProtocolError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request violates the protocol, e.g. a negative cursor.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: {0}")]
    ProtocolMismatch(String),

    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Library error.
    #[error("library error: {0}")]
    Core(#[from] CoreError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Protocol(_)
            | ServerError::InvalidRequest(_)
            | ServerError::ProtocolMismatch(_)
            | ServerError::Codec(_) => true,
            ServerError::Core(e) => e.is_client_error(),
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::Protocol("cursor -1".into()).is_client_error());
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Core(CoreError::not_ready("no tables")).is_server_error());
        assert!(ServerError::Core(CoreError::validation("empty")).is_client_error());
    }

    #[test]
    fn error_display() {
        let msg = ServerError::Protocol("cursor 9 is ahead of head 3".into()).to_string();
        assert!(msg.starts_with("protocol error"));
        assert!(msg.contains("head 3"));
    }
}
