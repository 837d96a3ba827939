//! Virtual-time environment for deterministic simulation.
//!
//! Time only moves when the test calls [`SimEnv::advance`] or when the
//! runtime actually waits on [`Environment::sleep`]. Clones share one clock,
//! so the driver, the runtime and the test all agree on "now".

use std::{
    ops::{Add, Sub},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chatty_core::Environment;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Monotonic instant on the virtual clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Simulated environment with a shared virtual clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    elapsed_nanos: Arc<AtomicU64>,
    epoch: DateTime<Utc>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Clock starting at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        let epoch = Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default();
        Self::starting_at(epoch)
    }

    /// Clock whose wall time starts at `epoch`.
    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self { elapsed_nanos: Arc::new(AtomicU64::new(0)), epoch }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let offset = TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::MAX);
        self.epoch.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let env = self.clone();
        // Runs on first poll, so a sleep that loses a select never moves time.
        async move { env.advance(duration) }
    }
}
