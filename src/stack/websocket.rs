//! WebSocket framing layer.
//!
//! # Responsibilities
//! - Answer the upgrade with `101 Switching Protocols`
//! - Negotiate a sub-protocol with the inner chain
//! - Run the frame loop: inbound frames to the inner layer, outbound frames
//!   from the connection's queue
//!
//! # Data Flow
//! ```text
//! Client ←── frames ──→ tungstenite ──→ MessageComponent::on_message
//!                            ▲
//!                            └── ConnectionHandle::send (mpsc queue)
//! ```

use std::rc::Rc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    UPGRADE,
};
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::stack::connection::Outbound;
use crate::stack::{reject, Connection, ConnectionError, Handshake, HttpComponent, HttpResponse, MessageComponent};

pub struct WsServer {
    inner: Rc<dyn MessageComponent>,
}

impl WsServer {
    pub fn new(inner: Rc<dyn MessageComponent>) -> Self {
        Self { inner }
    }
}

impl HttpComponent for WsServer {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn on_open(&self, handshake: Handshake) -> HttpResponse {
        let Handshake {
            id,
            peer,
            request,
            upgrade,
            permit,
        } = handshake;

        let Some(key) = request.headers().get(SEC_WEBSOCKET_KEY) else {
            return reject(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key");
        };
        let Ok(accept) = HeaderValue::from_str(&derive_accept_key(key.as_bytes())) else {
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        };
        let protocol = select_protocol(request.headers(), &self.inner.sub_protocols());

        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = response.headers_mut();
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        if let Some(value) = protocol.as_deref().and_then(|p| HeaderValue::from_str(p).ok()) {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let inner = Rc::clone(&self.inner);
        tokio::task::spawn_local(async move {
            let _permit = permit;
            let upgraded = match upgrade.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::debug!(peer = %peer, connection_id = %id, error = %e, "Upgrade did not complete");
                    return;
                }
            };
            let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
            let (conn, outbound) = Connection::new(id, peer, request, protocol);
            drive(inner, conn, ws, outbound).await;
        });

        response
    }
}

/// First protocol offered by the client that `supported` contains.
fn select_protocol(headers: &HeaderMap, supported: &[String]) -> Option<String> {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|offered| supported.iter().any(|s| s == offered))
        .map(str::to_owned)
}

/// Frame loop for one upgraded connection. Returns once it is closed.
async fn drive<S>(
    inner: Rc<dyn MessageComponent>,
    mut conn: Connection,
    ws: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    tracing::debug!(
        connection_id = %conn.id(),
        peer = %conn.peer(),
        protocol = conn.protocol().unwrap_or("-"),
        "WebSocket connection open"
    );

    let mut failure: Option<ConnectionError> = inner.on_open(&mut conn).err();
    while failure.is_none() {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    failure = inner.on_message(&mut conn, message).err();
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => failure = Some(e.into()),
            },
            Some(out) = outbound.recv() => match out {
                Outbound::Frame(message) => {
                    failure = sink.send(message).await.err().map(Into::into);
                }
                Outbound::Close => break,
            },
        }
    }

    if let Some(error) = failure {
        tracing::debug!(connection_id = %conn.id(), peer = %conn.peer(), error = %error, "Closing connection after error");
        inner.on_error(&mut conn, &error);
        if !error.is_transport() {
            let frame = CloseFrame {
                code: error.close_code(),
                reason: error.close_reason().into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
        }
    }
    let _ = sink.close().await;

    inner.on_close(&mut conn);
    tracing::debug!(connection_id = %conn.id(), peer = %conn.peer(), "WebSocket connection closed");
}
