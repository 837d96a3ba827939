//! Production environment using the operating system clocks.
//!
//! `SystemEnv` reads `std::time::Instant` for timeouts, `chrono::Utc` for
//! message timestamps and sleeps on the tokio timer. Production timing is
//! therefore real and non-deterministic; tests that need control over time
//! use the simulation environment instead.

use std::time::Duration;

use chatty_core::Environment;
use chrono::{DateTime, Utc};

/// Production environment backed by system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
