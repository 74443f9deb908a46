//! Per-connection state and identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry the handshake request and attached session to inner layers
//! - Queue outbound frames for the connection's I/O task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use hyper::Request;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::stack::session::{Session, SessionError};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Errors confined to a single connection. They close that connection and
/// nothing else.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unsupported data: {0}")]
    Unsupported(&'static str),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("application error: {0}")]
    Application(String),

    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// Close code sent to the peer when this error ends the connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            ConnectionError::Protocol(_) => CloseCode::Protocol,
            ConnectionError::Unsupported(_) => CloseCode::Unsupported,
            _ => CloseCode::Error,
        }
    }

    /// Short reason for the close frame (close reasons are capped at 123 bytes).
    pub fn close_reason(&self) -> &'static str {
        match self {
            ConnectionError::Protocol(_) => "protocol violation",
            ConnectionError::Unsupported(what) => *what,
            _ => "internal error",
        }
    }

    /// Whether the transport is already unusable, so no close frame can be sent.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConnectionError::WebSocket(_) | ConnectionError::Http(_) | ConnectionError::Closed
        )
    }
}

/// Work queued for a connection's I/O task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Message),
    Close,
}

/// Cloneable sender for a connection. Stays valid after the hooks return, so
/// an application can keep it to push frames later (e.g. from a timer).
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame. Fails once the connection is gone.
    pub fn send(&self, message: Message) -> Result<(), ConnectionError> {
        self.tx
            .send(Outbound::Frame(message))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Ask the I/O task to close the connection after queued frames.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An upgraded connection as seen by message-phase layers.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    request: Request<()>,
    protocol: Option<String>,
    session: Option<Session>,
    handle: ConnectionHandle,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        peer: SocketAddr,
        request: Request<()>,
        protocol: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            id,
            peer,
            request,
            protocol,
            session: None,
            handle: ConnectionHandle { id, tx },
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The handshake request, without body.
    pub fn request(&self) -> &Request<()> {
        &self.request
    }

    /// Negotiated sub-protocol, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Session attached by the session layer, if that layer is configured.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn send(&self, message: Message) -> Result<(), ConnectionError> {
        self.handle.send(message)
    }

    pub fn close(&self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::testing;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn frames_are_queued_in_order() {
        let (conn, mut rx) = testing::connection(&[]);
        conn.send(Message::text("one")).unwrap();
        conn.handle().send(Message::text("two")).unwrap();
        conn.close();

        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(m)) if m == Message::text("one")));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(m)) if m == Message::text("two")));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }

    #[test]
    fn send_after_io_task_ends_fails() {
        let (conn, rx) = testing::connection(&[]);
        let handle = conn.handle().clone();
        drop(rx);

        assert!(handle.is_closed());
        assert!(matches!(handle.send(Message::text("late")), Err(ConnectionError::Closed)));
    }

    #[test]
    fn close_codes() {
        assert_eq!(ConnectionError::Protocol("x".into()).close_code(), CloseCode::Protocol);
        assert_eq!(ConnectionError::Unsupported("binary").close_code(), CloseCode::Unsupported);
        assert_eq!(ConnectionError::Application("x".into()).close_code(), CloseCode::Error);
        assert!(ConnectionError::Closed.is_transport());
    }
}
