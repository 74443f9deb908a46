//! Session binding layer.
//!
//! # Responsibilities
//! - Read the session identifier from the handshake `Cookie` header
//! - Load the session through the configured backend
//! - Attach it to the connection before the inner layers see it

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hyper::header::{HeaderMap, COOKIE};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

use crate::stack::{Connection, ConnectionError, MessageComponent};

/// Opaque key/value contents of a session.
pub type SessionData = HashMap<String, serde_json::Value>;

#[derive(Debug, Error)]
#[error("session backend error: {0}")]
pub struct SessionError(pub String);

/// Storage the session layer reads from. Must not block: it runs on the
/// reactor thread.
pub trait SessionBackend {
    /// Look up a session by identifier. `Ok(None)` means unknown id.
    fn read(&self, session_id: &str) -> Result<Option<SessionData>, SessionError>;
}

/// Session attached to a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    id: Option<String>,
    data: SessionData,
}

impl Session {
    /// A session with no identifier and no data.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(id: impl Into<String>, data: SessionData) -> Self {
        Self {
            id: Some(id.into()),
            data,
        }
    }

    /// Identifier presented by the client, even if the backend did not know it.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// In-process backend, useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    sessions: RefCell<HashMap<String, SessionData>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: impl Into<String>, data: SessionData) {
        self.sessions.borrow_mut().insert(session_id.into(), data);
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionData> {
        self.sessions.borrow_mut().remove(session_id)
    }
}

impl SessionBackend for MemorySessionBackend {
    fn read(&self, session_id: &str) -> Result<Option<SessionData>, SessionError> {
        Ok(self.sessions.borrow().get(session_id).cloned())
    }
}

/// Value of cookie `name` across every `Cookie` header, first match wins.
pub fn session_id_from_cookies(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub struct SessionProvider {
    inner: Rc<dyn MessageComponent>,
    backend: Rc<dyn SessionBackend>,
    cookie_name: String,
}

impl SessionProvider {
    pub fn new(inner: Rc<dyn MessageComponent>, backend: Rc<dyn SessionBackend>, cookie_name: impl Into<String>) -> Self {
        Self {
            inner,
            backend,
            cookie_name: cookie_name.into(),
        }
    }

    fn load(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let Some(id) = session_id_from_cookies(headers, &self.cookie_name) else {
            return Ok(Session::anonymous());
        };
        let data = self.backend.read(&id)?.unwrap_or_default();
        Ok(Session::new(id, data))
    }
}

impl MessageComponent for SessionProvider {
    fn name(&self) -> &'static str {
        "session"
    }

    fn sub_protocols(&self) -> Vec<String> {
        self.inner.sub_protocols()
    }

    fn on_open(&self, conn: &mut Connection) -> Result<(), ConnectionError> {
        let session = self.load(conn.request().headers())?;
        tracing::trace!(
            connection_id = %conn.id(),
            session_id = session.id().unwrap_or("-"),
            "Session attached"
        );
        conn.set_session(session);
        self.inner.on_open(conn)
    }

    fn on_message(&self, conn: &mut Connection, message: Message) -> Result<(), ConnectionError> {
        self.inner.on_message(conn, message)
    }

    fn on_close(&self, conn: &mut Connection) {
        self.inner.on_close(conn)
    }

    fn on_error(&self, conn: &mut Connection, error: &ConnectionError) {
        self.inner.on_error(conn, error)
    }
}
