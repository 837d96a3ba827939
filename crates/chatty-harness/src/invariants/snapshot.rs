//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the client at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::{collections::BTreeMap, fmt::Debug, ops::Sub, time::Duration};

use chatty_app::App;
use chatty_core::{ConnectionState, Message};

/// Snapshot of one client's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSnapshot {
    /// Logged-in username. `None` when logged out.
    pub me: Option<String>,
    /// Whether per-identity state exists.
    pub logged_in: bool,
    /// Transport lifecycle state.
    pub state: ConnectionState,
    /// Active peer. `None` if nothing is selected.
    pub active_peer: Option<String>,
    /// Loaded conversations, keyed by peer.
    pub conversations: BTreeMap<String, Vec<Message>>,
    /// Unread counts, keyed by peer.
    pub unread: BTreeMap<String, u32>,
    /// Online roster, ordered by name.
    pub roster: Vec<String>,
}

impl Default for AppSnapshot {
    fn default() -> Self {
        Self {
            me: None,
            logged_in: false,
            state: ConnectionState::Disconnected,
            active_peer: None,
            conversations: BTreeMap::new(),
            unread: BTreeMap::new(),
            roster: Vec::new(),
        }
    }
}

impl AppSnapshot {
    /// Capture the observable state of `app`.
    pub fn from_app<I>(app: &App<I>) -> Self
    where
        I: Copy + Ord + Debug + Sub<Output = Duration>,
    {
        Self {
            me: app.identity().map(|identity| identity.username().to_string()),
            logged_in: app.is_logged_in(),
            state: app.connection_state(),
            active_peer: app.active_peer().map(str::to_string),
            conversations: app
                .conversations()
                .map(|(peer, messages)| (peer.to_string(), messages.to_vec()))
                .collect(),
            unread: app.unread_counts().map(|(peer, count)| (peer.to_string(), count)).collect(),
            roster: app.roster().map(|peer| peer.username.clone()).collect(),
        }
    }

    /// Messages exchanged with `peer`.
    pub fn messages(&self, peer: &str) -> &[Message] {
        self.conversations.get(peer).map(Vec::as_slice).unwrap_or_default()
    }
}
