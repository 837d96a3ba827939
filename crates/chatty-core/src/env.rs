//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system time. Production uses the OS clocks;
//! simulation uses a virtual clock that only moves when the test says so.

use std::{fmt::Debug, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};

/// Abstract environment providing time and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock()` is only used to stamp messages, never for timeouts
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses virtual time.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current calendar time.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// Only used by driver code, never by the state machines.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Both clocks read at once.
    fn moment(&self) -> Moment<Self::Instant> {
        Moment { instant: self.now(), wall: self.wall_clock() }
    }
}

/// A point in time as seen by the state machines.
///
/// Callers read the clocks once per event and pass the result down, so every
/// component handling that event agrees on the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment<I> {
    /// Monotonic time, used for timeouts
    pub instant: I,
    /// Calendar time, used for message timestamps
    pub wall: DateTime<Utc>,
}
