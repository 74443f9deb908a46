//! Protocol stack: the decorator chain every connection passes through.
//!
//! # Data Flow
//! ```text
//! TcpStream
//!     → http.rs          HttpServer     parse request, validate upgrade (400/405/426)
//!     → origin_check.rs  OriginCheck    optional, 403 on unknown Origin
//!     → websocket.rs     WsServer       101 response, frame I/O loop
//!     → session.rs       SessionProvider optional, attach session from cookie
//!     → wamp.rs          WampServer     JSON array frames → WampApplication
//! ```
//!
//! # Design Decisions
//! - Two capability traits: [`HttpComponent`] sees the handshake request,
//!   [`MessageComponent`] sees frames once the upgrade completed
//! - Each layer owns an `Rc` to the next-inner layer; composition happens
//!   once in builder.rs and is immutable afterwards
//! - Only the HTTP layer and the origin check may refuse a connection

pub mod builder;
pub mod connection;
pub mod http;
pub mod origin_check;
pub mod session;
pub mod wamp;
pub mod websocket;

use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONNECTION};
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use tokio_tungstenite::tungstenite::Message;

use crate::reactor::ConnectionPermit;

pub use builder::{ProtocolStack, StackBuilder};
pub use connection::{Connection, ConnectionError, ConnectionHandle, ConnectionId};
pub use http::{validate_upgrade, HandshakeRejection, HttpServer};
pub use origin_check::{OriginCheck, DEFAULT_ORIGINS};
pub use session::{MemorySessionBackend, Session, SessionBackend, SessionData, SessionError, SessionProvider};
pub use wamp::{WampApplication, WampMessage, WampServer, WAMP_SUBPROTOCOL};
pub use websocket::WsServer;

/// Response type produced by handshake-phase layers.
pub type HttpResponse = Response<Full<Bytes>>;

/// A validated upgrade request on its way inward.
#[derive(Debug)]
pub struct Handshake {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub request: Request<()>,
    /// Resolves to the raw stream once the response has been written.
    pub upgrade: OnUpgrade,
    /// Connection slot, `None` when the connection is not counted.
    pub permit: Option<Rc<ConnectionPermit>>,
}

/// A layer that sees the HTTP upgrade request.
///
/// Either answers it (refusing the connection) or delegates inward and
/// returns the inner layer's response.
pub trait HttpComponent {
    fn name(&self) -> &'static str;

    fn on_open(&self, handshake: Handshake) -> HttpResponse;
}

/// A layer that sees WebSocket messages after the upgrade.
///
/// An `Err` from `on_open` or `on_message` closes that connection only.
pub trait MessageComponent {
    fn name(&self) -> &'static str;

    /// Sub-protocols this layer can speak, in preference order.
    fn sub_protocols(&self) -> Vec<String> {
        Vec::new()
    }

    fn on_open(&self, conn: &mut Connection) -> Result<(), ConnectionError>;

    fn on_message(&self, conn: &mut Connection, message: Message) -> Result<(), ConnectionError>;

    fn on_close(&self, conn: &mut Connection);

    fn on_error(&self, conn: &mut Connection, error: &ConnectionError);
}

/// Plain-text response that ends the connection without upgrading.
pub fn reject(status: StatusCode, reason: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
