//! WAMP WebSocket Server
//!
//! Runs an echo application behind the full protocol stack:
//!
//! ```text
//!   client ──▶ HTTP upgrade ──▶ origin check ──▶ WebSocket ──▶ WAMP ──▶ EchoApplication
//!                                (optional)
//! ```
//!
//! The reactor owns its own runtime, so `main` is synchronous and blocks in
//! `launch()` until Ctrl-C.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wamp_server::config::{load_config, Config};
use wamp_server::{
    Connection, ConnectionError, EventDispatcher, OriginRegistry, PeriodicRegistry, PeriodicTask, ServerEvent,
    ServerType, WampApplication, WampMessage, WebSocketServer,
};

const HEARTBEAT_SECS: f64 = 30.0;

#[derive(Parser)]
#[command(name = "wamp-server")]
#[command(about = "WAMP over WebSocket on a single-threaded reactor", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Refuse handshakes from origins that are not allowed
    #[arg(long)]
    origin_check: bool,

    /// Extra allowed origin host (repeatable)
    #[arg(long = "allow-origin", value_name = "HOST")]
    allow_origins: Vec<String>,
}

/// Sends every WAMP message back to its sender.
#[derive(Default)]
struct EchoApplication {
    open: Cell<usize>,
}

impl WampApplication for EchoApplication {
    fn on_open(&self, conn: &Connection) -> Result<(), ConnectionError> {
        self.open.set(self.open.get() + 1);
        tracing::info!(connection_id = %conn.id(), peer = %conn.peer(), "Client connected");
        Ok(())
    }

    fn on_message(&self, conn: &Connection, message: WampMessage) -> Result<(), ConnectionError> {
        tracing::debug!(connection_id = %conn.id(), code = message.code(), "Echoing message");
        conn.send(message.to_frame())
    }

    fn on_close(&self, conn: &Connection) {
        self.open.set(self.open.get().saturating_sub(1));
        tracing::info!(connection_id = %conn.id(), "Client disconnected");
    }

    fn on_error(&self, conn: &Connection, error: &ConnectionError) {
        tracing::warn!(connection_id = %conn.id(), error = %error, "Client error");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wamp-server v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.server.origin_check |= args.origin_check;

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        origin_check = config.server.origin_check,
        max_connections = config.server.max_connections,
        "Configuration loaded"
    );

    let application = Rc::new(EchoApplication::default());

    let mut origins = OriginRegistry::new();
    for origin in args.allow_origins {
        origins.add_origin(origin);
    }

    let mut periodic = PeriodicRegistry::new();
    let heartbeat_app = Rc::clone(&application);
    periodic.add_periodic(PeriodicTask::new("heartbeat", HEARTBEAT_SECS, move || {
        tracing::info!(connections = heartbeat_app.open.get(), "Heartbeat");
        Ok(())
    })?);

    let dispatcher = Rc::new(EventDispatcher::new());
    dispatcher.subscribe(|event| match event {
        ServerEvent::Launched { reactor } => {
            let shutdown = reactor.shutdown_handle();
            reactor.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received");
                    shutdown.trigger();
                }
            });
        }
        ServerEvent::ClientRejected { origin, peer } => {
            tracing::info!(origin = %origin, peer = %peer, "Handshake refused");
        }
        _ => {}
    });

    let mut server = WebSocketServer::new(config.server, dispatcher, periodic, application, origins);
    server.launch()?;

    tracing::info!("wamp-server stopped");
    Ok(())
}
