//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// WebSocket server settings.
    pub server: ServerConfig,

    /// Logging settings.
    pub log: LogConfig,
}

/// Settings consumed by the server façade.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or IP address to listen on.
    pub host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Reject handshakes whose `Origin` is not allowed.
    pub origin_check: bool,

    /// Extra allowed origin hosts, appended after `localhost` and `127.0.0.1`.
    pub allowed_origins: Vec<String>,

    /// Name of the cookie carrying the session identifier.
    pub session_cookie: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Seconds a client has to send the full handshake request head.
    pub handshake_timeout_secs: u64,
}

impl ServerConfig {
    /// Build a config for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            origin_check: false,
            allowed_origins: Vec::new(),
            session_cookie: "session_id".to_string(),
            max_connections: 10_000,
            handshake_timeout_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "wamp_server=info".to_string(),
        }
    }
}
