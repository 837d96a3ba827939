//! Online roster.
//!
//! The roster is never patched incrementally. Every presence event triggers a
//! full re-pull, and the newest snapshot replaces the previous one wholesale,
//! so missed events heal on the next refresh.

use std::collections::BTreeMap;

use chatty_proto::payloads::UserPayload;

use crate::{error::FetchError, message::PeerUser};

/// Ticket for one roster fetch.
///
/// Sequence numbers increase with every [`PresenceRegistry::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RosterRequest {
    seq: u64,
}

impl RosterRequest {
    /// Sequence number of this fetch.
    pub fn seq(self) -> u64 {
        self.seq
    }
}

/// Result of [`PresenceRegistry::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Roster replaced
    Applied {
        /// Peers now in the roster
        count: usize,
    },
    /// A newer snapshot was already applied; result discarded
    Stale,
    /// Fetch failed; roster unchanged
    Failed(FetchError),
}

/// Online peers of the current identity.
///
/// # Invariants
///
/// - Never contains the current identity.
/// - Contains only online users.
/// - A snapshot older than the newest applied one is never applied.
#[derive(Debug, Clone)]
pub struct PresenceRegistry {
    me: String,
    roster: BTreeMap<String, PeerUser>,
    /// Newest ticket handed out
    issued: u64,
    /// Ticket of the snapshot currently shown
    applied: u64,
}

impl PresenceRegistry {
    /// Empty roster for `me`.
    pub fn new(me: impl Into<String>) -> Self {
        Self::resume(me, 0)
    }

    /// Empty roster whose tickets continue after `floor`.
    ///
    /// Used on re-login so that a fetch issued by an earlier session can never
    /// match this one.
    pub fn resume(me: impl Into<String>, floor: u64) -> Self {
        Self { me: me.into(), roster: BTreeMap::new(), issued: floor, applied: floor }
    }

    /// Start a full roster refresh. The caller fetches and reports back via
    /// [`apply`](Self::apply).
    pub fn refresh(&mut self) -> RosterRequest {
        self.issued += 1;
        RosterRequest { seq: self.issued }
    }

    /// Apply the result of a roster fetch.
    pub fn apply(
        &mut self,
        request: RosterRequest,
        result: Result<Vec<UserPayload>, FetchError>,
    ) -> RefreshOutcome {
        if request.seq <= self.applied || request.seq > self.issued {
            tracing::debug!(seq = request.seq, applied = self.applied, "discarding stale roster");
            return RefreshOutcome::Stale;
        }

        let users = match result {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!("Roster refresh failed: {err}");
                return RefreshOutcome::Failed(err);
            },
        };

        let roster: BTreeMap<String, PeerUser> = users
            .into_iter()
            .filter(|user| user.username != self.me)
            .filter_map(PeerUser::from_payload)
            .map(|peer| (peer.username.clone(), peer))
            .collect();

        self.roster = roster;
        self.applied = request.seq;
        RefreshOutcome::Applied { count: self.roster.len() }
    }

    /// Online peers, ordered by name.
    pub fn peers(&self) -> impl Iterator<Item = &PeerUser> {
        self.roster.values()
    }

    /// Whether `username` is online.
    pub fn contains(&self, username: &str) -> bool {
        self.roster.contains_key(username)
    }

    /// Number of online peers.
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// Whether nobody else is online.
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Newest ticket handed out.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}
