//! Model chat backend.
//!
//! Persists every message and tracks which peers are online. Both the
//! reference model and the simulated world answer REST fetches from it, so
//! the client under test and the model see the same backend.

use std::collections::BTreeSet;

use chatty_proto::payloads::{ChatMessagePayload, UserPayload};
use chrono::{DateTime, Utc};

/// Persisted chat message, reduced to what both sides can observe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModelMessage {
    /// Sending user.
    pub sender: String,
    /// Receiving user.
    pub recipient: String,
    /// Message body.
    pub content: String,
}

impl ModelMessage {
    /// Message from `sender` to `recipient`.
    pub fn new(sender: &str, recipient: &str, content: &str) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
        }
    }

    /// Whether the message was exchanged between `a` and `b`.
    pub fn between(&self, a: &str, b: &str) -> bool {
        (self.sender == a && self.recipient == b) || (self.sender == b && self.recipient == a)
    }
}

/// Model backend state.
#[derive(Debug, Clone, Default)]
pub struct ModelServer {
    /// Peers with an open session, ordered by name.
    online: BTreeSet<String>,
    /// Every accepted message in arrival order.
    log: Vec<ModelMessage>,
}

impl ModelServer {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `peer` online or offline. Returns whether anything changed.
    pub fn set_online(&mut self, peer: &str, online: bool) -> bool {
        if online { self.online.insert(peer.to_string()) } else { self.online.remove(peer) }
    }

    /// Peers currently online.
    pub fn online(&self) -> impl Iterator<Item = &str> {
        self.online.iter().map(String::as_str)
    }

    /// Persist a message. Returns its server id.
    pub fn persist(&mut self, message: ModelMessage) -> u64 {
        self.log.push(message);
        self.log.len() as u64
    }

    /// Messages exchanged between `a` and `b`, oldest first.
    pub fn history(&self, a: &str, b: &str) -> Vec<ModelMessage> {
        self.log.iter().filter(|message| message.between(a, b)).cloned().collect()
    }

    /// Online peers as `GET /users` reports them to `me`.
    ///
    /// Lists `me` as well, the way the backend does.
    pub fn roster_payload(&self, me: &str) -> Vec<UserPayload> {
        let mut users: Vec<UserPayload> = self.online().map(UserPayload::online).collect();
        users.push(UserPayload::online(me));
        users
    }

    /// History between `a` and `b` as `GET /messages` reports it.
    pub fn history_payload(&self, a: &str, b: &str, now: DateTime<Utc>) -> Vec<ChatMessagePayload> {
        self.log
            .iter()
            .enumerate()
            .filter(|(_, message)| message.between(a, b))
            .map(|(index, message)| ChatMessagePayload {
                id: Some((index + 1).to_string()),
                sender: message.sender.clone(),
                recipient: message.recipient.clone(),
                content: message.content.clone(),
                timestamp: Some(now),
            })
            .collect()
    }
}
