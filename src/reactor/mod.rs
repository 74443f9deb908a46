//! Single-threaded reactor.
//!
//! # Data Flow
//! ```text
//! Reactor::new()          current-thread runtime + LocalSet
//!     → bind()            listener.rs (non-blocking socket, connection limit)
//!     → add_periodic()    recurring timer task
//!     → serve()           accept loop task, one local task per connection
//!     → run()             blocks until shutdown.rs is triggered
//! ```
//!
//! # Design Decisions
//! - Everything runs on the thread that calls `run()`; tasks may hold `Rc`
//! - Tasks registered before `run()` only start once the loop runs, so
//!   nothing is accepted before launch listeners have finished
//! - A failing tick or connection is logged, never fatal to the loop

pub mod listener;
pub mod shutdown;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio::task::{JoinHandle, LocalSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::{BindError, ReactorError};
use crate::registry::{Periodic, TickError};

pub use listener::{ConnectionPermit, Listener};
pub use shutdown::Shutdown;

/// Pause after a failed `accept()` so a persistent error (e.g. EMFILE) does
/// not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The event loop: one runtime thread, its local task set and a stop signal.
pub struct Reactor {
    runtime: Runtime,
    tasks: LocalSet,
    shutdown: Shutdown,
}

impl Reactor {
    pub fn new() -> Result<Self, ReactorError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ReactorError::Runtime)?;

        Ok(Self {
            runtime,
            tasks: LocalSet::new(),
            shutdown: Shutdown::new(),
        })
    }

    /// Bind a listening socket owned by this reactor's runtime.
    pub fn bind(&self, host: &str, port: u16, max_connections: usize) -> Result<Listener, BindError> {
        let _guard = self.runtime.enter();
        Listener::bind(host, port, max_connections)
    }

    /// Schedule a registered periodic task.
    pub fn add_periodic(&self, mut task: Box<dyn Periodic>) -> Result<(), ReactorError> {
        let name = task.name().to_string();
        let interval = task.interval();
        self.schedule(name, interval, move || task.tick())
    }

    /// Schedule a closure every `interval`, first firing one interval after
    /// the loop starts.
    pub fn add_periodic_timer<F>(&self, interval: Duration, tick: F) -> Result<(), ReactorError>
    where
        F: FnMut() -> Result<(), TickError> + 'static,
    {
        self.schedule("timer".to_string(), interval, tick)
    }

    fn schedule<F>(&self, name: String, period: Duration, mut tick: F) -> Result<(), ReactorError>
    where
        F: FnMut() -> Result<(), TickError> + 'static,
    {
        if period.is_zero() {
            return Err(ReactorError::InvalidInterval);
        }

        tracing::debug!(task = %name, interval = ?period, "Periodic timer registered");

        self.tasks.spawn_local(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            // A slow tick pushes the next one back instead of bursting.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = tick() {
                    tracing::warn!(task = %name, error = %e, "Periodic tick failed");
                }
            }
        });
        Ok(())
    }

    /// Spawn a task onto the loop. It starts running once `run()` is called
    /// (or immediately, if the loop is already running).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.tasks.spawn_local(future)
    }

    /// Accept connections from `listener` and hand each one to `handler` on
    /// its own local task. The handler owns the connection's permit; the slot
    /// is freed once every holder has dropped it.
    pub fn serve<H, Fut>(&self, listener: Listener, handler: H)
    where
        H: Fn(TcpStream, SocketAddr, ConnectionPermit) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.tasks.spawn_local(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer, permit)) => {
                        tokio::task::spawn_local(handler(stream, peer, permit));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        });
    }

    /// A `Send` handle that stops the loop when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Drive the loop on the calling thread until stopped.
    pub fn run(&self) {
        tracing::debug!("Reactor running");
        let shutdown = self.shutdown.clone();
        self.runtime
            .block_on(self.tasks.run_until(async move { shutdown.wait().await }));
        tracing::debug!("Reactor stopped");
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("stopped", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}
