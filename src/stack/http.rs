//! HTTP upgrade layer, the outermost layer of the stack.
//!
//! # Responsibilities
//! - Parse the request head (hyper http1, bounded by a header read timeout)
//! - Refuse anything that is not a well-formed WebSocket upgrade
//! - Hand valid handshakes to the inner chain and write its response

use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::reactor::ConnectionPermit;
use crate::stack::{reject, ConnectionError, ConnectionId, Handshake, HttpComponent, HttpResponse};

/// The only WebSocket protocol version accepted.
const WEBSOCKET_VERSION: &str = "13";

/// Why a request was refused before reaching the inner chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeRejection {
    #[error("method {0} is not allowed for a WebSocket upgrade")]
    MethodNotAllowed(Method),

    #[error("Upgrade header does not request websocket")]
    NotWebSocket,

    #[error("Connection header does not contain upgrade")]
    MissingConnectionUpgrade,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unsupported Sec-WebSocket-Version")]
    UnsupportedVersion,
}

impl HandshakeRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeRejection::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandshakeRejection::UnsupportedVersion => StatusCode::UPGRADE_REQUIRED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            HandshakeRejection::MethodNotAllowed(_) => "Method Not Allowed",
            HandshakeRejection::NotWebSocket => "Expected Upgrade: websocket",
            HandshakeRejection::MissingConnectionUpgrade => "Expected Connection: upgrade",
            HandshakeRejection::MissingKey => "Missing Sec-WebSocket-Key",
            HandshakeRejection::UnsupportedVersion => "Unsupported WebSocket version",
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let mut response = reject(self.status(), self.reason());
        if self == HandshakeRejection::UnsupportedVersion {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static(WEBSOCKET_VERSION));
        }
        response
    }
}

/// Check that a request is a WebSocket version 13 upgrade.
pub fn validate_upgrade(method: &Method, headers: &HeaderMap) -> Result<(), HandshakeRejection> {
    if *method != Method::GET {
        return Err(HandshakeRejection::MethodNotAllowed(method.clone()));
    }
    if !has_token(headers, &UPGRADE, "websocket") {
        return Err(HandshakeRejection::NotWebSocket);
    }
    if !has_token(headers, &CONNECTION, "upgrade") {
        return Err(HandshakeRejection::MissingConnectionUpgrade);
    }
    match headers.get(SEC_WEBSOCKET_KEY) {
        Some(key) if !key.is_empty() => {}
        _ => return Err(HandshakeRejection::MissingKey),
    }
    match headers.get(SEC_WEBSOCKET_VERSION).map(HeaderValue::as_bytes) {
        Some(version) if version == WEBSOCKET_VERSION.as_bytes() => Ok(()),
        _ => Err(HandshakeRejection::UnsupportedVersion),
    }
}

/// Whether any value of a comma-separated header holds `token`.
fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// Outermost layer: owns the raw socket until the upgrade completes.
pub struct HttpServer {
    inner: Rc<dyn HttpComponent>,
    handshake_timeout: Duration,
}

impl HttpServer {
    pub fn new(inner: Rc<dyn HttpComponent>, handshake_timeout: Duration) -> Self {
        Self {
            inner,
            handshake_timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        "http"
    }

    /// Serve one handshake on `stream`.
    ///
    /// Must run on the reactor: the WebSocket layer spawns the frame loop as
    /// a local task. `permit` is shared with that task, so the connection
    /// slot stays taken until the frame loop ends too.
    pub async fn serve_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: Option<ConnectionPermit>,
    ) -> Result<(), ConnectionError> {
        let inner = Rc::clone(&self.inner);
        let permit = permit.map(Rc::new);
        let service = service_fn(move |request: Request<Incoming>| {
            let response = upgrade(inner.as_ref(), request, peer, permit.clone());
            async move { Ok::<_, Infallible>(response) }
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.handshake_timeout);

        builder
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades()
            .await?;
        Ok(())
    }
}

fn upgrade(
    inner: &dyn HttpComponent,
    mut request: Request<Incoming>,
    peer: SocketAddr,
    permit: Option<Rc<ConnectionPermit>>,
) -> HttpResponse {
    if let Err(rejection) = validate_upgrade(request.method(), request.headers()) {
        tracing::debug!(peer = %peer, reason = %rejection, "Malformed handshake");
        return rejection.into_response();
    }

    let upgrade = hyper::upgrade::on(&mut request);
    let (parts, _body) = request.into_parts();
    let handshake = Handshake {
        id: ConnectionId::new(),
        peer,
        request: Request::from_parts(parts, ()),
        upgrade,
        permit,
    };

    tracing::trace!(peer = %peer, connection_id = %handshake.id, "Handshake accepted by HTTP layer");
    inner.on_open(handshake)
}
