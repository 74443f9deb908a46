//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts, limits)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Allowed origins are taken verbatim and never checked

use thiserror::Error;

use crate::config::schema::Config;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.host must not be empty")]
    EmptyHost,

    #[error("server.port must be between 1 and 65535")]
    InvalidPort,

    #[error("server.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("server.handshake_timeout_secs must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("server.session_cookie must not be empty")]
    EmptySessionCookie,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let server = &config.server;
    let mut errors = Vec::new();

    if server.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if server.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if server.handshake_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }
    if server.session_cookie.is_empty() {
        errors.push(ValidationError::EmptySessionCookie);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
