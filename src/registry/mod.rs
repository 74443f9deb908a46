//! Assembly-phase registries.
//!
//! # Data Flow
//! ```text
//! application assembly
//!     → origin.rs (allowed origin hosts)
//!     → periodic.rs (recurring tick callbacks)
//!     → consumed once by WebSocketServer::launch()
//! ```
//!
//! # Design Decisions
//! - Both registries are plain owned collections, mutated only before launch
//! - Launch copies origins into the security layer and drains periodic tasks,
//!   so nothing can change them once the reactor runs

pub mod origin;
pub mod periodic;

pub use origin::OriginRegistry;
pub use periodic::{Periodic, PeriodicRegistry, PeriodicTask, RegistryError, TickError};
