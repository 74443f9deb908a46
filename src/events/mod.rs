//! Server event dispatch.
//!
//! # Data Flow
//! ```text
//! WebSocketServer::launch  ──▶ Launched { reactor }       (once, before run)
//! OriginCheck              ──▶ ClientRejected             (per denied handshake)
//! WampServer               ──▶ ClientConnected / ClientDisconnected / ClientError
//!
//!         EventDispatcher::dispatch
//!             → listener 1 → listener 2 → ... (registration order, synchronous)
//! ```
//!
//! # Design Decisions
//! - Synchronous observer list, no queue: `Launched` listeners must finish
//!   attaching their own timers and sockets before the loop runs
//! - Events borrow their payload; listeners copy what they want to keep

use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::reactor::Reactor;
use crate::stack::{ConnectionError, ConnectionId};

/// Something that happened in the server worth telling other subsystems.
#[derive(Debug)]
pub enum ServerEvent<'a> {
    /// The socket is bound and timers are registered; the loop is about to
    /// run. Listeners may add their own work to `reactor`.
    Launched { reactor: &'a Reactor },

    /// A handshake was refused by the origin check.
    ClientRejected { origin: &'a str, peer: SocketAddr },

    ClientConnected { id: ConnectionId, peer: SocketAddr },

    ClientDisconnected { id: ConnectionId, peer: SocketAddr },

    /// A connection failed and is being closed.
    ClientError {
        id: ConnectionId,
        peer: SocketAddr,
        error: &'a ConnectionError,
    },
}

impl ServerEvent<'_> {
    /// Stable event name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Launched { .. } => "server.launched",
            ServerEvent::ClientRejected { .. } => "client.rejected",
            ServerEvent::ClientConnected { .. } => "client.connected",
            ServerEvent::ClientDisconnected { .. } => "client.disconnected",
            ServerEvent::ClientError { .. } => "client.error",
        }
    }
}

type Listener = Rc<dyn Fn(&ServerEvent<'_>)>;

/// Ordered list of event listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RefCell<Vec<Listener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ServerEvent<'_>) + 'static,
    {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Deliver `event` to every listener before returning.
    pub fn dispatch(&self, event: &ServerEvent<'_>) {
        // Snapshot so a listener may subscribe others without a borrow panic.
        let listeners: Vec<Listener> = self.listeners.borrow().clone();
        tracing::trace!(event = event.name(), listeners = listeners.len(), "Dispatching event");

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
