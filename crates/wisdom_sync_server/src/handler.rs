//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use wisdom_core::{now_millis, Library};
use wisdom_sync_protocol::{
    AckRequest, AckResponse, HandshakeRequest, HandshakeResponse, PullRequest, PullResponse,
};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Library whose change log is served.
    pub library: Library,
    /// Client sessions (client_id -> session info).
    sessions: RwLock<HashMap<String, ClientSession>>,
}

/// What the server knows about a client.
///
/// Sessions are for observability only; nothing here affects what a
/// pull returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    /// Cursor reported at the last handshake.
    pub handshake_cursor: i64,
    /// Highest cursor acknowledged, if any.
    pub acked_cursor: Option<i64>,
    /// Last contact, Unix milliseconds.
    pub last_seen: i64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, library: Library) -> Self {
        Self {
            config,
            library,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn register_session(&self, client_id: &str, cursor: i64) {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(client_id.to_string())
            .or_insert_with(|| ClientSession {
                handshake_cursor: cursor,
                acked_cursor: None,
                last_seen: 0,
            });
        session.handshake_cursor = cursor;
        session.last_seen = now_millis();
    }

    fn record_ack(&self, client_id: &str, cursor: i64) {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(client_id.to_string())
            .or_insert_with(|| ClientSession {
                handshake_cursor: 0,
                acked_cursor: None,
                last_seen: 0,
            });
        session.acked_cursor = Some(cursor);
        session.last_seen = now_millis();
    }

    /// Gets a client session.
    pub fn session(&self, client_id: &str) -> Option<ClientSession> {
        self.sessions.read().get(client_id).cloned()
    }

    /// Number of known clients.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a handshake request.
    ///
    /// An unsupported protocol version yields an unsuccessful response
    /// rather than an error. A cursor beyond the log head is flagged with
    /// `cursor_ahead` so the client can reset its mirror.
    pub fn handle_handshake(&self, request: HandshakeRequest) -> ServerResult<HandshakeResponse> {
        if request.protocol_version != self.context.config.protocol_version {
            return Ok(HandshakeResponse::error(format!(
                "unsupported protocol version: {}",
                request.protocol_version
            )));
        }
        require_client_id(&request.client_id)?;
        if request.last_cursor < 0 {
            return Err(ServerError::Protocol(format!(
                "cursor {} is negative",
                request.last_cursor
            )));
        }

        let head = self.context.library.head()?;
        let cursor_ahead = request.last_cursor > head;
        if cursor_ahead {
            tracing::warn!(
                client_id = %request.client_id,
                cursor = request.last_cursor,
                head,
                "client cursor is ahead of the log"
            );
        }

        self.context
            .register_session(&request.client_id, request.last_cursor);
        tracing::debug!(client_id = %request.client_id, cursor = request.last_cursor, head, "handshake");
        Ok(HandshakeResponse::success(head, cursor_ahead))
    }

    /// Handles a pull request.
    ///
    /// Returns events with `seq > cursor` in seq order. `new_cursor` is the
    /// last returned seq, or the request cursor when nothing is returned.
    /// Never waits for new events.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        if request.cursor < 0 {
            return Err(ServerError::Protocol(format!(
                "cursor {} is negative",
                request.cursor
            )));
        }
        let head = self.context.library.head()?;
        if request.cursor > head {
            tracing::warn!(cursor = request.cursor, head, "rejected pull past the log head");
            return Err(ServerError::Protocol(format!(
                "cursor {} is ahead of head {}",
                request.cursor, head
            )));
        }

        let limit = self.context.config.batch_size(request.limit);
        let (events, has_more) = self.context.library.events_page(request.cursor, limit)?;
        let new_cursor = events.last().map(|e| e.seq).unwrap_or(request.cursor);

        tracing::debug!(
            cursor = request.cursor,
            new_cursor,
            count = events.len(),
            has_more,
            "pull"
        );
        Ok(PullResponse::new(events, new_cursor, has_more))
    }

    /// Handles a cursor acknowledgement.
    pub fn handle_ack(&self, request: AckRequest) -> ServerResult<AckResponse> {
        require_client_id(&request.client_id)?;
        let head = self.context.library.head()?;
        if request.cursor < 0 || request.cursor > head {
            return Err(ServerError::Protocol(format!(
                "acknowledged cursor {} is outside 0..={}",
                request.cursor, head
            )));
        }

        self.context.record_ack(&request.client_id, request.cursor);
        tracing::debug!(client_id = %request.client_id, cursor = request.cursor, "ack");
        Ok(AckResponse::success(request.cursor))
    }
}

fn require_client_id(client_id: &str) -> ServerResult<()> {
    if client_id.trim().is_empty() {
        return Err(ServerError::InvalidRequest("client_id is empty".into()));
    }
    Ok(())
}
