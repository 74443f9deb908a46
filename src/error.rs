//! Startup error taxonomy.
//!
//! Everything in here is fatal: it aborts `launch()` before the reactor
//! starts running. Errors raised while serving a single connection live in
//! [`crate::stack::ConnectionError`] and never reach the caller.

use thiserror::Error;

/// Failed to bind the listening socket.
#[derive(Debug, Error)]
#[error("failed to bind {address}: {source}")]
pub struct BindError {
    /// The `host:port` that was requested.
    pub address: String,
    #[source]
    pub source: std::io::Error,
}

/// Errors raised by the reactor itself.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The single-threaded runtime could not be created.
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// A periodic timer was registered with a zero interval.
    #[error("periodic timer interval must be positive")]
    InvalidInterval,
}

/// Errors raised while composing the protocol stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("no WAMP application configured")]
    MissingApplication,
}

/// Errors that abort a server launch.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error(transparent)]
    Stack(#[from] StackError),
}

/// Result type for launch operations.
pub type ServerResult<T> = Result<T, ServerError>;
