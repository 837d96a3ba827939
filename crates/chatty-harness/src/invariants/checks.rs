//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use chatty_core::ConnectionState;

use super::{AppSnapshot, Invariant, InvariantResult, Violation};

/// The active conversation never has unread messages.
///
/// Selecting a peer clears its count, and messages for the active peer are
/// appended instead of counted.
pub struct NoUnreadForActivePeer;

impl Invariant for NoUnreadForActivePeer {
    fn name(&self) -> &'static str {
        "no_unread_for_active_peer"
    }

    fn check(&self, state: &AppSnapshot) -> InvariantResult {
        let Some(active) = &state.active_peer else {
            return Ok(());
        };
        match state.unread.get(active) {
            Some(count) => Err(Violation {
                invariant: self.name(),
                message: format!("active peer {active} has {count} unread"),
            }),
            None => Ok(()),
        }
    }
}

/// Every stored message belongs to the conversation it is stored under.
///
/// A message is exchanged between the current identity and exactly the peer
/// whose conversation holds it.
pub struct ConversationAttribution;

impl Invariant for ConversationAttribution {
    fn name(&self) -> &'static str {
        "conversation_attribution"
    }

    fn check(&self, state: &AppSnapshot) -> InvariantResult {
        let Some(me) = &state.me else {
            return Ok(());
        };

        for (peer, messages) in &state.conversations {
            for message in messages {
                if !message.involves(me) || message.counterpart(me) != peer {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "message {} -> {} stored under {peer} for {me}",
                            message.sender, message.recipient
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The roster never lists the current identity.
pub struct RosterExcludesSelf;

impl Invariant for RosterExcludesSelf {
    fn name(&self) -> &'static str {
        "roster_excludes_self"
    }

    fn check(&self, state: &AppSnapshot) -> InvariantResult {
        let Some(me) = &state.me else {
            return Ok(());
        };
        if state.roster.iter().any(|peer| peer == me) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{me} listed in own roster {:?}", state.roster),
            });
        }
        Ok(())
    }
}

/// Nobody chats with themselves.
pub struct ActivePeerNotSelf;

impl Invariant for ActivePeerNotSelf {
    fn name(&self) -> &'static str {
        "active_peer_not_self"
    }

    fn check(&self, state: &AppSnapshot) -> InvariantResult {
        if state.me.is_some() && state.active_peer == state.me {
            return Err(Violation {
                invariant: self.name(),
                message: format!("active peer is the current identity {:?}", state.me),
            });
        }
        Ok(())
    }
}

/// Identity and connection state move together.
///
/// Logged in exactly while the session is not disconnected, and a logged-out
/// client holds no per-identity state.
pub struct LoggedOutIsClean;

impl Invariant for LoggedOutIsClean {
    fn name(&self) -> &'static str {
        "logged_out_is_clean"
    }

    fn check(&self, state: &AppSnapshot) -> InvariantResult {
        let disconnected = state.state == ConnectionState::Disconnected;
        if state.logged_in != state.me.is_some() || state.logged_in == disconnected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "logged_in={} identity={:?} state={:?}",
                    state.logged_in, state.me, state.state
                ),
            });
        }

        if !state.logged_in {
            let leftovers = state.active_peer.is_some()
                || !state.conversations.is_empty()
                || !state.unread.is_empty()
                || !state.roster.is_empty();
            if leftovers {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("state survived logout: {state:?}"),
                });
            }
        }
        Ok(())
    }
}
