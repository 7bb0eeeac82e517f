//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{ClientSession, HandlerContext, RequestHandler};
use std::sync::Arc;
use wisdom_core::Library;
use wisdom_sync_protocol::{
    AckRequest, AckResponse, HandshakeRequest, HandshakeResponse, PullRequest, PullResponse,
    SyncMessage,
};

/// The sync server.
///
/// Serves the change log of a [`Library`] to mirror clients. Requests are
/// synchronous and never wait for new events; any number of clients may
/// pull concurrently, each with its own cursor.
///
/// # Example
///
/// ```rust,ignore
/// use wisdom_core::Library;
/// use wisdom_sync_server::{ServerConfig, SyncServer};
///
/// let library = Library::open_in_memory()?;
/// let server = SyncServer::new(ServerConfig::default(), library);
///
/// // An HTTP layer would decode request bodies and call
/// // server.handle_handshake(), handle_pull() and handle_ack().
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server over a library.
    pub fn new(config: ServerConfig, library: Library) -> Self {
        let context = Arc::new(HandlerContext::new(config, library));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a handshake request.
    pub fn handle_handshake(&self, request: HandshakeRequest) -> ServerResult<HandshakeResponse> {
        self.handler.handle_handshake(request)
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(request)
    }

    /// Handles a cursor acknowledgement.
    pub fn handle_ack(&self, request: AckRequest) -> ServerResult<AckResponse> {
        self.handler.handle_ack(request)
    }

    /// Handles a sync message (dispatches to appropriate handler).
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::HandshakeRequest(req) => self
                .handle_handshake(req)
                .map(SyncMessage::HandshakeResponse),
            SyncMessage::PullRequest(req) => self.handle_pull(req).map(SyncMessage::PullResponse),
            SyncMessage::AckRequest(req) => self.handle_ack(req).map(SyncMessage::AckResponse),
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message type {}",
                other.type_code()
            ))),
        }
    }

    /// Decodes a CBOR message, handles it and encodes the reply.
    pub fn handle_bytes(&self, bytes: &[u8]) -> ServerResult<Vec<u8>> {
        let message = SyncMessage::decode(bytes)?;
        let reply = self.handle_message(message)?;
        Ok(reply.encode()?)
    }

    /// Returns the current log head.
    pub fn cursor(&self) -> ServerResult<i64> {
        Ok(self.context.library.head()?)
    }

    /// Returns the number of events in the change log.
    pub fn event_count(&self) -> ServerResult<u64> {
        Ok(self.context.library.event_count()?)
    }

    /// Returns what the server knows about a client.
    pub fn session(&self, client_id: &str) -> Option<ClientSession> {
        self.context.session(client_id)
    }

    /// Returns the served library.
    pub fn library(&self) -> &Library {
        &self.context.library
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisdom_core::DocumentWrite;

    fn create_server() -> SyncServer {
        SyncServer::new(ServerConfig::default(), Library::open_in_memory().unwrap())
    }

    #[test]
    fn server_lifecycle() {
        let server = create_server();
        assert_eq!(server.cursor().unwrap(), 0);
        assert_eq!(server.event_count().unwrap(), 0);
    }

    #[test]
    fn full_sync_flow() {
        let server = create_server();
        let doc = server
            .library()
            .write_document(DocumentWrite::new("notes/a.md", "markdown", "# A"))
            .unwrap();

        // 1. Handshake
        let response = server
            .handle_handshake(HandshakeRequest::new("laptop", 0))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.server_cursor, 1);

        // 2. Pull
        let response = server.handle_pull(PullRequest::new(0, 10)).unwrap();
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].entity_id, doc.doc_id.to_string());

        // 3. Ack
        let ack = server
            .handle_ack(AckRequest::new("laptop", response.new_cursor))
            .unwrap();
        assert!(ack.success);
        assert_eq!(server.session("laptop").unwrap().acked_cursor, Some(1));
    }

    #[test]
    fn message_dispatch() {
        let server = create_server();

        let message = SyncMessage::HandshakeRequest(HandshakeRequest::new("laptop", 0));
        let response = server.handle_message(message).unwrap();
        assert!(matches!(response, SyncMessage::HandshakeResponse(_)));

        let wrong = SyncMessage::PullResponse(PullResponse::empty(0));
        assert!(matches!(
            server.handle_message(wrong).unwrap_err(),
            ServerError::InvalidRequest(_)
        ));
    }

    #[test]
    fn bytes_roundtrip_through_cbor() {
        let server = create_server();
        let request = SyncMessage::PullRequest(PullRequest::new(0, 5)).encode().unwrap();

        let reply = SyncMessage::decode(&server.handle_bytes(&request).unwrap()).unwrap();
        match reply {
            SyncMessage::PullResponse(response) => {
                assert!(response.events.is_empty());
                assert_eq!(response.new_cursor, 0);
            }
            other => panic!("unexpected reply {other:?}"),
        }

        assert!(matches!(
            server.handle_bytes(&[0xff, 0x00]).unwrap_err(),
            ServerError::Codec(_)
        ));
    }
}
