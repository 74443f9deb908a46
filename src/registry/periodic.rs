//! Periodic tasks to be scheduled on the reactor at launch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error returned by a tick. Logged by the reactor; the timer keeps running.
pub type TickError = Box<dyn std::error::Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("periodic interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),
}

/// A unit of recurring work.
pub trait Periodic {
    /// Time between two ticks.
    fn interval(&self) -> Duration;

    /// Run one tick. Must return promptly; it runs on the reactor thread.
    fn tick(&mut self) -> Result<(), TickError>;

    /// Label used in logs.
    fn name(&self) -> &str {
        "periodic"
    }
}

/// A [`Periodic`] built from an interval and a closure.
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    tick: Box<dyn FnMut() -> Result<(), TickError>>,
}

impl PeriodicTask {
    /// Create a task firing every `interval_secs` seconds.
    pub fn new<F>(name: impl Into<String>, interval_secs: f64, tick: F) -> Result<Self, RegistryError>
    where
        F: FnMut() -> Result<(), TickError> + 'static,
    {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(RegistryError::InvalidInterval(interval_secs));
        }
        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| RegistryError::InvalidInterval(interval_secs))?;
        if interval.is_zero() {
            return Err(RegistryError::InvalidInterval(interval_secs));
        }

        Ok(Self {
            name: name.into(),
            interval,
            tick: Box::new(tick),
        })
    }
}

impl Periodic for PeriodicTask {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&mut self) -> Result<(), TickError> {
        (self.tick)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of periodic tasks, drained once at launch.
#[derive(Default)]
pub struct PeriodicRegistry {
    tasks: Vec<Box<dyn Periodic>>,
}

impl PeriodicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_periodic(&mut self, task: impl Periodic + 'static) {
        self.tasks.push(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Take every task out of the registry, in registration order.
    pub fn take(&mut self) -> Vec<Box<dyn Periodic>> {
        std::mem::take(&mut self.tasks)
    }
}

impl fmt::Debug for PeriodicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicRegistry")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
