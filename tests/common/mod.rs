//! Shared utilities for integration testing.
//!
//! The server owns a single-threaded reactor and blocks in `launch()`, so it
//! runs on its own OS thread. Tests talk to it over real sockets.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wamp_server::stack::{MemorySessionBackend, SessionData};
use wamp_server::{
    Connection, ConnectionError, EventDispatcher, OriginRegistry, PeriodicRegistry, Reactor, ServerConfig,
    ServerEvent, ServerResult, ServerType, Shutdown, WampApplication, WampMessage, WebSocketServer,
};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ordered record of what the server saw, shared with the test thread.
pub type Log = Arc<Mutex<Vec<String>>>;

/// Get a port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[derive(Default, Clone)]
pub struct ServerOptions {
    pub origin_check: bool,
    /// Allowed origins from the server configuration.
    pub config_origins: Vec<String>,
    /// Allowed origins registered through the registry.
    pub registry_origins: Vec<String>,
    /// Enable the session layer with these known sessions.
    pub sessions: Option<Vec<(String, SessionData)>>,
    /// Override the connection limit.
    pub max_connections: Option<usize>,
    /// Extra work attached from the launch notification.
    pub on_launch: Option<fn(&Reactor, &Log)>,
}

/// Echoes every WAMP message and logs each hook.
pub struct RecordingApplication {
    log: Log,
}

impl RecordingApplication {
    pub fn new(log: Log) -> Self {
        Self { log }
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl WampApplication for RecordingApplication {
    fn on_open(&self, conn: &Connection) -> Result<(), ConnectionError> {
        let session = conn
            .session()
            .and_then(|s| s.get("user"))
            .and_then(|user| user.as_str())
            .unwrap_or("-")
            .to_string();
        self.push(format!("open {}", session));
        Ok(())
    }

    fn on_message(&self, conn: &Connection, message: WampMessage) -> Result<(), ConnectionError> {
        self.push(format!("message {}", message.to_text()));
        conn.send(message.to_frame())
    }

    fn on_close(&self, _conn: &Connection) {
        self.push("close".to_string());
    }

    fn on_error(&self, _conn: &Connection, error: &ConnectionError) {
        self.push(format!("error {}", error));
    }
}

/// A running server; stopped and joined on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub log: Log,
    shutdown: Shutdown,
    thread: Option<JoinHandle<ServerResult<()>>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Stop the loop and return what `launch()` returned.
    pub fn stop(mut self) -> ServerResult<()> {
        self.shutdown.trigger();
        self.thread.take().unwrap().join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn start_server(options: ServerOptions) -> TestServer {
    let port = free_port();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    let server_log = Arc::clone(&log);
    let thread = std::thread::spawn(move || {
        let dispatcher = Rc::new(EventDispatcher::new());
        let event_log = Arc::clone(&server_log);
        let on_launch = options.on_launch;
        dispatcher.subscribe(move |event| match event {
            ServerEvent::Launched { reactor } => {
                event_log.lock().unwrap().push("launched".to_string());
                if let Some(hook) = on_launch {
                    hook(reactor, &event_log);
                }
                let _ = tx.send(reactor.shutdown_handle());
            }
            ServerEvent::ClientRejected { origin, .. } => {
                event_log.lock().unwrap().push(format!("rejected {}", origin));
            }
            _ => {}
        });

        let mut config = ServerConfig::new("127.0.0.1", port);
        config.origin_check = options.origin_check;
        config.allowed_origins = options.config_origins;
        if let Some(max) = options.max_connections {
            config.max_connections = max;
        }

        let origins: OriginRegistry = options.registry_origins.into_iter().collect();
        let application = Rc::new(RecordingApplication::new(server_log));
        let mut server = WebSocketServer::new(config, dispatcher, PeriodicRegistry::new(), application, origins);

        if let Some(sessions) = options.sessions {
            let backend = MemorySessionBackend::new();
            for (id, data) in sessions {
                backend.insert(id, data);
            }
            server.set_session_backend(Rc::new(backend));
        }

        server.launch()
    });

    let shutdown = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not launch");

    TestServer {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        log,
        shutdown,
        thread: Some(thread),
    }
}

/// Open a WAMP WebSocket connection, optionally sending `Origin` and `Cookie`.
pub async fn connect(server: &TestServer, origin: Option<&str>, cookie: Option<&str>) -> Result<Client, WsError> {
    let mut request = server.url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static("wamp"));
    if let Some(origin) = origin {
        headers.insert("Origin", HeaderValue::from_str(origin).unwrap());
    }
    if let Some(cookie) = cookie {
        headers.insert("Cookie", HeaderValue::from_str(cookie).unwrap());
    }

    let (client, _response) = connect_async(request).await?;
    Ok(client)
}

/// Poll until `check` holds for the log, or panic after a few seconds.
pub async fn eventually<F>(log: &Log, check: F)
where
    F: Fn(&[String]) -> bool,
{
    for _ in 0..100 {
        if check(&log.lock().unwrap()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met, log: {:?}", log.lock().unwrap());
}
