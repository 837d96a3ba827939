//! Data model shared by the session components.

use std::fmt;

use chatty_proto::payloads::{ChatMessagePayload, UserPayload};
use chrono::{DateTime, Utc};

/// Logged-in identity.
///
/// Immutable after login. Dropped together with the connection on logout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    username: String,
    session_token: Option<String>,
}

impl Identity {
    /// Identity without a session token.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), session_token: None }
    }

    /// Attach the session cookie presented on the websocket upgrade.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Account name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Session cookie, if the backend issued one.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// Presence status of a roster entry. Only online users are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceStatus {
    /// User has an open session
    Online,
}

/// Roster entry. Never represents the current identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerUser {
    /// Account name
    pub username: String,
    /// Presence status
    pub status: PresenceStatus,
}

impl PeerUser {
    /// Online peer.
    pub fn online(username: impl Into<String>) -> Self {
        Self { username: username.into(), status: PresenceStatus::Online }
    }

    /// Roster entry for a backend user record. `None` unless online.
    pub fn from_payload(payload: UserPayload) -> Option<Self> {
        if payload.is_online() { Some(Self::online(payload.username)) } else { None }
    }
}

/// Message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Assigned by the backend
    Server(String),
    /// Temporary id of a locally sent message
    Local(u64),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => f.write_str(id),
            Self::Local(n) => write!(f, "local-{n}"),
        }
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Sent by this client, no server confirmation
    Pending,
    /// Received from the server
    Confirmed,
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server id, local id, or none for history entries without one
    pub id: Option<MessageId>,
    /// Author
    pub sender: String,
    /// Addressee
    pub recipient: String,
    /// Text
    pub content: String,
    /// Send time (receipt time if the server omitted it)
    pub timestamp: DateTime<Utc>,
    /// Delivery state
    pub delivery: DeliveryState,
}

impl Message {
    /// The other participant, seen from `me`.
    pub fn counterpart(&self, me: &str) -> &str {
        if self.sender == me { &self.recipient } else { &self.sender }
    }

    /// Whether `me` takes part in this message.
    pub fn involves(&self, me: &str) -> bool {
        self.sender == me || self.recipient == me
    }

    /// Message received from the backend.
    pub fn from_payload(payload: ChatMessagePayload, received_at: DateTime<Utc>) -> Self {
        Self {
            id: payload.id.map(MessageId::Server),
            sender: payload.sender,
            recipient: payload.recipient,
            content: payload.content,
            timestamp: payload.timestamp.unwrap_or(received_at),
            delivery: DeliveryState::Confirmed,
        }
    }

    /// Outbound chat payload. Local ids are never sent.
    pub fn to_payload(&self) -> ChatMessagePayload {
        ChatMessagePayload {
            id: None,
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            content: self.content.clone(),
            timestamp: Some(self.timestamp),
        }
    }
}
