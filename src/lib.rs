//! WAMP WebSocket Server Library

pub mod config;
pub mod error;
pub mod events;
pub mod reactor;
pub mod registry;
pub mod server;
pub mod stack;

pub use config::schema::{Config, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use events::{EventDispatcher, ServerEvent};
pub use reactor::{Reactor, Shutdown};
pub use registry::{OriginRegistry, PeriodicRegistry, PeriodicTask};
pub use server::{ServerType, WebSocketServer};
pub use stack::{Connection, ConnectionError, WampApplication, WampMessage};
