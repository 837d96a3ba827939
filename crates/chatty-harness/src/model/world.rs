//! Model world - the client plus its backend.
//!
//! The world is the top-level container that applies operations to the
//! reference client. It's the oracle against which the real implementation
//! is verified.

use std::collections::BTreeMap;

use chatty_core::ConnectionState;

use super::{
    client::{ModelClient, ModelConnection},
    operation::{Operation, username},
    server::{ModelMessage, ModelServer},
};
use crate::invariants::AppSnapshot;

/// Observable state for oracle comparison.
///
/// This is the subset of client state that can be compared against the real
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Logged-in username.
    pub me: Option<String>,
    /// Connection state.
    pub connection: ModelConnection,
    /// Active peer.
    pub active: Option<String>,
    /// Loaded conversations.
    pub conversations: BTreeMap<String, Vec<ModelMessage>>,
    /// Unread counts.
    pub unread: BTreeMap<String, u32>,
    /// Online roster, ordered by name.
    pub roster: Vec<String>,
}

impl ObservableState {
    /// Project a snapshot of the real client onto the model's vocabulary.
    pub fn from_snapshot(snapshot: &AppSnapshot) -> Self {
        let connection = match snapshot.state {
            ConnectionState::Disconnected => ModelConnection::Disconnected,
            ConnectionState::Connecting => ModelConnection::Connecting,
            ConnectionState::Connected => ModelConnection::Connected,
            ConnectionState::Reconnecting => ModelConnection::Reconnecting,
        };
        let conversations = snapshot
            .conversations
            .iter()
            .map(|(peer, messages)| {
                let messages = messages
                    .iter()
                    .map(|m| ModelMessage::new(&m.sender, &m.recipient, &m.content))
                    .collect();
                (peer.clone(), messages)
            })
            .collect();

        Self {
            me: snapshot.me.clone(),
            connection,
            active: snapshot.active_peer.clone(),
            conversations,
            unread: snapshot.unread.clone(),
            roster: snapshot.roster.clone(),
        }
    }
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    client: ModelClient,
    server: ModelServer,
    network_up: bool,
}

impl Default for ModelWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelWorld {
    /// Logged-out client with a working network.
    pub fn new() -> Self {
        Self { client: ModelClient::new(), server: ModelServer::new(), network_up: true }
    }

    /// The reference client.
    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    /// The backend.
    pub fn server(&self) -> &ModelServer {
        &self.server
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Login { user } => {
                self.client.login(username(*user), self.network_up, &self.server);
            },
            Operation::Logout => self.client.logout(),
            Operation::Select { peer } => self.client.select(username(*peer), &self.server),
            Operation::Send { content } => {
                if let Some(message) = self.client.send(content) {
                    self.server.persist(message);
                }
            },
            Operation::Receive { from, content } => {
                let Some(me) = self.client.me().map(str::to_string) else {
                    return;
                };
                let from = username(*from);
                if from == me {
                    return;
                }
                let message = ModelMessage::new(from, &me, content);
                self.server.persist(message.clone());
                self.client.receive(message);
            },
            Operation::PeerPresence { peer, online } => {
                let peer = username(*peer);
                if self.client.me() == Some(peer) {
                    return;
                }
                if self.server.set_online(peer, *online) {
                    self.client.refresh_roster(&self.server);
                }
            },
            Operation::RefreshRoster => self.client.refresh_roster(&self.server),
            Operation::DropConnection => self.client.connection_lost(),
            Operation::NetworkDown => {
                self.network_up = false;
                self.client.connection_lost();
            },
            Operation::NetworkUp => self.network_up = true,
            Operation::AdvanceTime => self.client.retry(self.network_up, &self.server),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            me: self.client.me().map(str::to_string),
            connection: self.client.connection(),
            active: self.client.active().map(str::to_string),
            conversations: self.client.conversations(),
            unread: self.client.unread(),
            roster: self.client.roster(),
        }
    }
}
