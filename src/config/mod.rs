//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → ServerConfig moved into the server façade
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the façade owns its copy
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The façade never validates; only the loader does

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{Config, LogConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
