//! Server façade.
//!
//! # Data Flow
//! ```text
//! WebSocketServer::launch()
//!     → StackBuilder          compose layers, origins registered up front
//!     → Reactor::new/bind     fatal on failure, nothing is running yet
//!     → add_periodic          every registered task, registry order
//!     → serve                 accept loop attached (idle until run)
//!     → Launched event        listeners attach their own work
//!     → run                   blocks until shutdown
//! ```

use std::rc::Rc;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::events::{EventDispatcher, ServerEvent};
use crate::reactor::Reactor;
use crate::registry::{OriginRegistry, PeriodicRegistry};
use crate::stack::{SessionBackend, StackBuilder, WampApplication};

/// Something a launcher can start and describe.
pub trait ServerType {
    /// Build, bind and run. Returns once the loop stops, or earlier with the
    /// first startup error.
    fn launch(&mut self) -> ServerResult<()>;

    /// `host:port` as configured.
    fn address(&self) -> String;

    /// Name of the underlying protocol engine.
    fn name(&self) -> &'static str;
}

/// WAMP over WebSocket on a single-threaded reactor.
pub struct WebSocketServer {
    config: ServerConfig,
    dispatcher: Rc<EventDispatcher>,
    periodic: PeriodicRegistry,
    application: Rc<dyn WampApplication>,
    origins: OriginRegistry,
    session_backend: Option<Rc<dyn SessionBackend>>,
}

impl WebSocketServer {
    pub fn new(
        config: ServerConfig,
        dispatcher: Rc<EventDispatcher>,
        periodic: PeriodicRegistry,
        application: Rc<dyn WampApplication>,
        origins: OriginRegistry,
    ) -> Self {
        Self {
            config,
            dispatcher,
            periodic,
            application,
            origins,
            session_backend: None,
        }
    }

    /// Enable the session layer for the next launch.
    pub fn set_session_backend(&mut self, backend: Rc<dyn SessionBackend>) {
        self.session_backend = Some(backend);
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl ServerType for WebSocketServer {
    fn launch(&mut self) -> ServerResult<()> {
        tracing::info!("Starting web socket server");

        let mut builder = StackBuilder::new(Rc::clone(&self.dispatcher))
            .application(Rc::clone(&self.application))
            .handshake_timeout(self.config.handshake_timeout());
        if let Some(backend) = &self.session_backend {
            builder = builder.session_backend(Rc::clone(backend), self.config.session_cookie.clone());
        }
        if self.config.origin_check {
            let origins = self
                .config
                .allowed_origins
                .iter()
                .chain(self.origins.origins())
                .cloned();
            builder = builder.origin_check(origins);
        }
        let stack = Rc::new(builder.build()?);
        tracing::debug!(layers = ?stack.layers(), "Protocol stack built");

        let reactor = Reactor::new()?;
        let listener = reactor.bind(&self.config.host, self.config.port, self.config.max_connections)?;

        for task in self.periodic.take() {
            reactor.add_periodic(task)?;
        }

        reactor.serve(listener, move |stream, peer, permit| {
            let stack = Rc::clone(&stack);
            async move { stack.handle(stream, peer, Some(permit)).await }
        });

        self.dispatcher
            .dispatch(&ServerEvent::Launched { reactor: &reactor });

        tracing::info!("Launching {} on {}", self.name(), self.address());
        reactor.run();
        Ok(())
    }

    fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn name(&self) -> &'static str {
        "Tungstenite"
    }
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("address", &self.address())
            .field("origin_check", &self.config.origin_check)
            .field("session", &self.session_backend.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::stack::{Connection, ConnectionError, WampMessage};
    use std::cell::Cell;

    struct Noop;

    impl WampApplication for Noop {
        fn on_message(&self, _conn: &Connection, _message: WampMessage) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    fn server(config: ServerConfig, dispatcher: Rc<EventDispatcher>) -> WebSocketServer {
        WebSocketServer::new(
            config,
            dispatcher,
            PeriodicRegistry::new(),
            Rc::new(Noop),
            OriginRegistry::new(),
        )
    }

    #[test]
    fn identity() {
        let server = server(ServerConfig::new("127.0.0.1", 9000), Rc::new(EventDispatcher::new()));
        assert_eq!(server.address(), "127.0.0.1:9000");
        assert_eq!(server.name(), "Tungstenite");
    }

    #[test]
    fn address_is_not_normalised() {
        let server = server(ServerConfig::new("::1", 80), Rc::new(EventDispatcher::new()));
        assert_eq!(server.address(), "::1:80");
    }

    #[test]
    fn bind_failure_skips_launch_event() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let dispatcher = Rc::new(EventDispatcher::new());
        let launched = Rc::new(Cell::new(false));
        let flag = Rc::clone(&launched);
        dispatcher.subscribe(move |event| {
            if matches!(event, ServerEvent::Launched { .. }) {
                flag.set(true);
            }
        });

        let mut server = server(ServerConfig::new("127.0.0.1", port), dispatcher);
        let err = server.launch().unwrap_err();

        assert!(matches!(err, ServerError::Bind(_)));
        assert!(!launched.get());
    }

    #[test]
    fn zero_connection_limit_fails_before_launch() {
        let dispatcher = Rc::new(EventDispatcher::new());
        let launched = Rc::new(Cell::new(false));
        let flag = Rc::clone(&launched);
        dispatcher.subscribe(move |event| {
            if matches!(event, ServerEvent::Launched { .. }) {
                flag.set(true);
            }
        });

        let mut config = ServerConfig::new("127.0.0.1", 0);
        config.max_connections = 0;
        let err = server(config, dispatcher).launch().unwrap_err();

        match err {
            ServerError::Bind(err) => assert_eq!(err.source.kind(), std::io::ErrorKind::InvalidInput),
            other => panic!("expected a bind error, got {other:?}"),
        }
        assert!(!launched.get());
    }

    #[test]
    fn launch_listener_can_stop_the_loop() {
        let dispatcher = Rc::new(EventDispatcher::new());
        let seen = Rc::new(Cell::new(0));
        let count = Rc::clone(&seen);
        dispatcher.subscribe(move |event| {
            if let ServerEvent::Launched { reactor } = event {
                count.set(count.get() + 1);
                reactor.stop();
            }
        });

        let mut server = server(ServerConfig::new("127.0.0.1", 0), dispatcher);
        server.launch().unwrap();

        assert_eq!(seen.get(), 1);
    }
}
