//! Model client.
//!
//! Straight-line reference for what one client should show after each
//! operation. No tickets, no attempts, no frames: fetches complete instantly
//! and the transport is either up or waiting for the retry timer.

use std::collections::BTreeMap;

use super::server::{ModelMessage, ModelServer};

/// Coarse connection state of the model client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelConnection {
    /// Logged out.
    Disconnected,
    /// Transport in the middle of the handshake.
    Connecting,
    /// Transport up and subscribed.
    Connected,
    /// Waiting for the retry timer.
    Reconnecting,
}

/// Per-identity state of the model client.
#[derive(Debug, Clone)]
struct Session {
    me: String,
    connection: ModelConnection,
    active: Option<String>,
    conversations: BTreeMap<String, Vec<ModelMessage>>,
    unread: BTreeMap<String, u32>,
    roster: Vec<String>,
}

/// Reference client.
#[derive(Debug, Clone, Default)]
pub struct ModelClient {
    session: Option<Session>,
}

impl ModelClient {
    /// Logged-out client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged-in username.
    pub fn me(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.me.as_str())
    }

    /// Current connection state.
    pub fn connection(&self) -> ModelConnection {
        self.session.as_ref().map_or(ModelConnection::Disconnected, |session| session.connection)
    }

    /// Active peer.
    pub fn active(&self) -> Option<&str> {
        self.session.as_ref().and_then(|session| session.active.as_deref())
    }

    /// Loaded conversations.
    pub fn conversations(&self) -> BTreeMap<String, Vec<ModelMessage>> {
        self.session.as_ref().map(|session| session.conversations.clone()).unwrap_or_default()
    }

    /// Unread counts.
    pub fn unread(&self) -> BTreeMap<String, u32> {
        self.session.as_ref().map(|session| session.unread.clone()).unwrap_or_default()
    }

    /// Online roster.
    pub fn roster(&self) -> Vec<String> {
        self.session.as_ref().map(|session| session.roster.clone()).unwrap_or_default()
    }

    /// Log in. Ignored while logged in.
    pub fn login(&mut self, me: &str, network_up: bool, server: &ModelServer) {
        if self.session.is_some() {
            return;
        }
        self.session = Some(Session {
            me: me.to_string(),
            connection: ModelConnection::Reconnecting,
            active: None,
            conversations: BTreeMap::new(),
            unread: BTreeMap::new(),
            roster: Vec::new(),
        });
        if network_up {
            self.connected(server);
        }
    }

    /// Log out, dropping all per-identity state.
    pub fn logout(&mut self) {
        self.session = None;
    }

    /// Select `peer` and load its history.
    pub fn select(&mut self, peer: &str, server: &ModelServer) {
        let Some(session) = &mut self.session else {
            return;
        };
        if peer == session.me {
            return;
        }
        session.active = Some(peer.to_string());
        session.unread.remove(peer);
        session.conversations.insert(peer.to_string(), server.history(&session.me, peer));
    }

    /// Send `content` to the active peer.
    ///
    /// Returns the message the backend accepts, if any.
    pub fn send(&mut self, content: &str) -> Option<ModelMessage> {
        let session = self.session.as_mut()?;
        let peer = session.active.clone()?;
        if content.trim().is_empty() || session.connection != ModelConnection::Connected {
            return None;
        }

        let message = ModelMessage::new(&session.me, &peer, content);
        session.conversations.entry(peer).or_default().push(message.clone());
        Some(message)
    }

    /// Deliver a message pushed by the backend. Only a connected client
    /// receives pushes.
    pub fn receive(&mut self, message: ModelMessage) {
        let Some(session) = &mut self.session else {
            return;
        };
        if session.connection != ModelConnection::Connected {
            return;
        }

        let peer = message.sender.clone();
        if session.active.as_deref() == Some(peer.as_str()) {
            session.conversations.entry(peer).or_default().push(message);
        } else {
            *session.unread.entry(peer).or_default() += 1;
        }
    }

    /// Re-pull the roster. Only a connected client refreshes.
    pub fn refresh_roster(&mut self, server: &ModelServer) {
        let Some(session) = &mut self.session else {
            return;
        };
        if session.connection != ModelConnection::Connected {
            return;
        }
        session.roster =
            server.online().filter(|peer| *peer != session.me).map(str::to_string).collect();
    }

    /// The transport dropped.
    pub fn connection_lost(&mut self) {
        if let Some(session) = &mut self.session {
            if session.connection == ModelConnection::Connected {
                session.connection = ModelConnection::Reconnecting;
            }
        }
    }

    /// The retry timer fired.
    pub fn retry(&mut self, network_up: bool, server: &ModelServer) {
        let waiting =
            self.session.as_ref().is_some_and(|s| s.connection == ModelConnection::Reconnecting);
        if waiting && network_up {
            self.connected(server);
        }
    }

    fn connected(&mut self, server: &ModelServer) {
        if let Some(session) = &mut self.session {
            session.connection = ModelConnection::Connected;
        }
        self.refresh_roster(server);
    }
}
