//! Stack composition.
//!
//! Layers are wrapped innermost first, in a fixed order:
//! WAMP adapter → session (optional) → WebSocket → origin check (optional)
//! → HTTP upgrade. The result is frozen: no layer can be reached mutably once
//! `build()` returns.

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::StackError;
use crate::events::EventDispatcher;
use crate::reactor::ConnectionPermit;
use crate::stack::{
    HttpComponent, HttpServer, MessageComponent, OriginCheck, SessionBackend, SessionProvider, WampApplication,
    WampServer, WsServer,
};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Collects the optional parts of a stack, then composes it.
pub struct StackBuilder {
    dispatcher: Rc<EventDispatcher>,
    application: Option<Rc<dyn WampApplication>>,
    session: Option<(Rc<dyn SessionBackend>, String)>,
    origins: Option<Vec<String>>,
    handshake_timeout: Duration,
}

impl StackBuilder {
    /// Start a stack whose layers report to `dispatcher`.
    pub fn new(dispatcher: Rc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            application: None,
            session: None,
            origins: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn application(mut self, application: Rc<dyn WampApplication>) -> Self {
        self.application = Some(application);
        self
    }

    /// Add the session layer, reading the identifier from `cookie_name`.
    pub fn session_backend(mut self, backend: Rc<dyn SessionBackend>, cookie_name: impl Into<String>) -> Self {
        self.session = Some((backend, cookie_name.into()));
        self
    }

    /// Add the origin check. `origins` are appended after the defaults.
    /// Calling this again appends more origins.
    pub fn origin_check<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins
            .get_or_insert_with(Vec::new)
            .extend(origins.into_iter().map(Into::into));
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ProtocolStack, StackError> {
        let application = self.application.ok_or(StackError::MissingApplication)?;
        let mut layers = Vec::new();

        let mut messages: Rc<dyn MessageComponent> =
            Rc::new(WampServer::new(application, Rc::clone(&self.dispatcher)));
        layers.push(messages.name());

        if let Some((backend, cookie_name)) = self.session {
            messages = Rc::new(SessionProvider::new(messages, backend, cookie_name));
            layers.push(messages.name());
        }

        let mut http: Rc<dyn HttpComponent> = Rc::new(WsServer::new(messages));
        layers.push(http.name());

        if let Some(origins) = self.origins {
            let mut check = OriginCheck::new(http, Rc::clone(&self.dispatcher));
            for origin in origins {
                check.allow_origin(origin);
            }
            tracing::debug!(allowed = ?check.allowed_origins(), "Origin check enabled");
            http = Rc::new(check);
            layers.push(http.name());
        }

        let server = HttpServer::new(http, self.handshake_timeout);
        layers.push(server.name());
        layers.reverse();

        Ok(ProtocolStack { server, layers })
    }
}

/// The composed chain, ready to take raw connections.
pub struct ProtocolStack {
    server: HttpServer,
    layers: Vec<&'static str>,
}

impl ProtocolStack {
    /// Layer names, outermost first.
    pub fn layers(&self) -> &[&'static str] {
        &self.layers
    }

    /// Run one connection through the chain. Errors stay with the connection.
    /// `permit` is released once the handshake and any frame loop are done.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr, permit: Option<ConnectionPermit>) {
        if let Err(e) = self.server.serve_connection(stream, peer, permit).await {
            tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
        }
    }
}

impl std::fmt::Debug for ProtocolStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolStack")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
