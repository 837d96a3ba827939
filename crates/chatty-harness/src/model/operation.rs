//! Operations for model-based testing.
//!
//! Operations represent everything that can happen to one client: user
//! commands, traffic from peers and network trouble. They are generated
//! randomly by proptest and applied to both the model and the real client.

use proptest::prelude::{Just, Strategy, any, prop_oneof};

/// Index into [`USERS`].
pub type UserId = u8;

/// Accounts known to the simulated backend.
pub const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// Username of `id`, wrapping around [`USERS`].
pub fn username(id: UserId) -> &'static str {
    USERS[usize::from(id) % USERS.len()]
}

/// Message bodies used by generated operations. Includes blank bodies.
pub const CONTENTS: [&str; 5] = ["hi", "how are you?", "", "   ", "grüße 👋"];

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Log in as a user.
    Login {
        /// Account to log in as.
        user: UserId,
    },

    /// Log out.
    Logout,

    /// Open the conversation with a user.
    Select {
        /// Peer to select.
        peer: UserId,
    },

    /// Send a message to the active peer.
    Send {
        /// Message body.
        content: &'static str,
    },

    /// A peer sends a message to the logged-in user.
    Receive {
        /// Sending peer.
        from: UserId,
        /// Message body.
        content: &'static str,
    },

    /// A peer comes online or goes offline.
    PeerPresence {
        /// Peer whose presence changes.
        peer: UserId,
        /// New presence.
        online: bool,
    },

    /// Re-pull the roster.
    RefreshRoster,

    /// The live transport drops. The network stays usable.
    DropConnection,

    /// The broker becomes unreachable and the live transport drops. REST
    /// keeps working.
    NetworkDown,

    /// The broker becomes reachable again.
    NetworkUp,

    /// Let the reconnect delay elapse.
    AdvanceTime,
}

fn user() -> impl Strategy<Value = UserId> {
    (0..USERS.len()).prop_map(|index| index as UserId)
}

fn content() -> impl Strategy<Value = &'static str> {
    (0..CONTENTS.len()).prop_map(|index| CONTENTS[index])
}

/// Strategy generating operations, weighted towards chat traffic.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        2 => user().prop_map(|user| Operation::Login { user }),
        1 => Just(Operation::Logout),
        3 => user().prop_map(|peer| Operation::Select { peer }),
        3 => content().prop_map(|content| Operation::Send { content }),
        4 => (user(), content()).prop_map(|(from, content)| Operation::Receive { from, content }),
        2 => (user(), any::<bool>())
            .prop_map(|(peer, online)| Operation::PeerPresence { peer, online }),
        1 => Just(Operation::RefreshRoster),
        1 => Just(Operation::DropConnection),
        1 => Just(Operation::NetworkDown),
        1 => Just(Operation::NetworkUp),
        2 => Just(Operation::AdvanceTime),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_wrap_around() {
        assert_eq!(username(0), "alice");
        assert_eq!(username(5), "bob");
    }
}
