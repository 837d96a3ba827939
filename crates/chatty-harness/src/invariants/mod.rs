//! Invariant checking for deterministic simulation testing.
//!
//! Each [`Invariant`] inspects an [`AppSnapshot`], the observable part of a
//! client: who is logged in, the roster, the active peer, conversations and
//! unread counts. The [`InvariantRegistry`] runs a set of them after every
//! render of the simulation driver and after every step of the property
//! tests, so a violation is reported at the event that caused it.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_app(&app)?;
//! ```

mod checks;
mod snapshot;

use std::{fmt, ops::Sub, time::Duration};

use chatty_app::App;
pub use checks::{
    ActivePeerNotSelf, ConversationAttribution, LoggedOutIsClean, NoUnreadForActivePeer,
    RosterExcludesSelf,
};
pub use snapshot::AppSnapshot;
use thiserror::Error;

/// Result of one invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{invariant}: {message}")]
pub struct Violation {
    /// Name of the invariant
    pub invariant: &'static str,
    /// What the snapshot showed
    pub message: String,
}

/// Every invariant that failed on one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

/// A property of the client's observable state.
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check `state`.
    fn check(&self, state: &AppSnapshot) -> InvariantResult;
}

/// Set of invariants checked together.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every invariant the client must uphold:
    ///
    /// - [`NoUnreadForActivePeer`]
    /// - [`ConversationAttribution`]
    /// - [`RosterExcludesSelf`]
    /// - [`ActivePeerNotSelf`]
    /// - [`LoggedOutIsClean`]
    pub fn standard() -> Self {
        Self::new()
            .with(NoUnreadForActivePeer)
            .with(ConversationAttribution)
            .with(RosterExcludesSelf)
            .with(ActivePeerNotSelf)
            .with(LoggedOutIsClean)
    }

    /// Add `invariant`.
    #[must_use]
    pub fn with(mut self, invariant: impl Invariant + 'static) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Check `state` against every invariant.
    ///
    /// # Errors
    ///
    /// Every violation found, not only the first.
    pub fn check_all(&self, state: &AppSnapshot) -> Result<(), Violations> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|invariant| invariant.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(Violations(violations)) }
    }

    /// Snapshot `app` and check it.
    ///
    /// # Errors
    ///
    /// Every violation found.
    pub fn check_app<I>(&self, app: &App<I>) -> Result<(), Violations>
    where
        I: Copy + Ord + fmt::Debug + Sub<Output = Duration>,
    {
        self.check_all(&AppSnapshot::from_app(app))
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether no invariant is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
