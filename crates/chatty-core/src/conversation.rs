//! Per-peer conversations.
//!
//! The store owns the active selection, history loading and optimistic sends.
//!
//! # Stale history
//!
//! Every [`select`](ConversationStore::select) bumps a generation counter and
//! hands out a [`HistoryRequest`] carrying `{peer, generation}`. A history
//! result is applied only while both still match, so switching A -> B -> A
//! before the first fetch resolves discards the first fetch too. Fetches are
//! never cancelled, only ignored when they land.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    error::{FetchError, UserError},
    message::{DeliveryState, Message, MessageId},
    notifications::NotificationAggregator,
};

/// Ticket for one history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRequest {
    peer: String,
    generation: u64,
}

impl HistoryRequest {
    /// Peer whose history is fetched.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Selection generation at dispatch time.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of [`ConversationStore::apply_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// Conversation replaced by the snapshot
    Applied {
        /// Messages now in the conversation
        count: usize,
    },
    /// Selection changed since dispatch; result discarded
    Stale,
    /// Fetch failed; conversation unchanged
    Failed(FetchError),
}

/// Message lists keyed by peer, plus the active selection.
///
/// # Invariants
///
/// - At most one peer is active, and it is never the current identity.
/// - A message is only ever stored under its counterpart.
/// - Within a conversation, messages keep arrival/send order; a history
///   snapshot replaces the list wholesale.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    me: String,
    active: Option<String>,
    generation: u64,
    conversations: HashMap<String, Vec<Message>>,
    next_local_id: u64,
}

impl ConversationStore {
    /// Empty store for `me`.
    pub fn new(me: impl Into<String>) -> Self {
        Self::resume(me, 0)
    }

    /// Empty store whose generations continue after `floor`.
    pub fn resume(me: impl Into<String>, floor: u64) -> Self {
        Self {
            me: me.into(),
            active: None,
            generation: floor,
            conversations: HashMap::new(),
            next_local_id: 0,
        }
    }

    /// Make `peer` active and clear its unread count.
    ///
    /// Returns the ticket for the history fetch the caller must issue.
    /// Reselecting the active peer refetches too.
    ///
    /// # Errors
    ///
    /// - `UserError::SelfConversation` if `peer` is the current identity
    pub fn select(
        &mut self,
        peer: &str,
        notifications: &mut NotificationAggregator,
    ) -> Result<HistoryRequest, UserError> {
        if peer == self.me {
            return Err(UserError::SelfConversation);
        }

        self.generation += 1;
        self.active = Some(peer.to_string());
        notifications.clear(peer);

        Ok(HistoryRequest { peer: peer.to_string(), generation: self.generation })
    }

    /// Drop the active selection. Invalidates in-flight history fetches.
    pub fn deselect(&mut self) {
        self.generation += 1;
        self.active = None;
    }

    /// Whether a fetch ticket still matches the live selection.
    pub fn is_current(&self, request: &HistoryRequest) -> bool {
        request.generation == self.generation
            && self.active.as_deref() == Some(request.peer.as_str())
    }

    /// Apply a history snapshot.
    ///
    /// Entries not exchanged with the requested peer are dropped.
    pub fn apply_history(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<Message>, FetchError>,
    ) -> HistoryOutcome {
        if !self.is_current(request) {
            tracing::debug!(
                peer = %request.peer,
                generation = request.generation,
                current = self.generation,
                "discarding stale history"
            );
            return HistoryOutcome::Stale;
        }

        let messages = match result {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!("History fetch for {} failed: {err}", request.peer);
                return HistoryOutcome::Failed(err);
            },
        };

        let me = self.me.as_str();
        let history: Vec<Message> = messages
            .into_iter()
            .filter(|message| message.involves(me) && message.counterpart(me) == request.peer)
            .collect();

        let count = history.len();
        self.conversations.insert(request.peer.clone(), history);
        HistoryOutcome::Applied { count }
    }

    /// Append a message to its counterpart's conversation.
    pub fn append(&mut self, message: Message) {
        let peer = message.counterpart(&self.me).to_string();
        self.conversations.entry(peer).or_default().push(message);
    }

    /// Build an outgoing message for the active peer.
    ///
    /// The message has a fresh local id and is `Pending`. It is not stored;
    /// the caller appends it once publishing succeeded.
    ///
    /// # Errors
    ///
    /// - `UserError::NoActivePeer` if nothing is selected
    /// - `UserError::EmptyContent` if `content` is blank
    pub fn prepare_send(
        &mut self,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message, UserError> {
        let Some(peer) = &self.active else {
            return Err(UserError::NoActivePeer);
        };
        if content.trim().is_empty() {
            return Err(UserError::EmptyContent);
        }

        self.next_local_id += 1;
        Ok(Message {
            id: Some(MessageId::Local(self.next_local_id)),
            sender: self.me.clone(),
            recipient: peer.clone(),
            content: content.to_string(),
            timestamp,
            delivery: DeliveryState::Pending,
        })
    }

    /// Active peer.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Current selection generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Messages exchanged with `peer`.
    pub fn messages(&self, peer: &str) -> &[Message] {
        self.conversations.get(peer).map(Vec::as_slice).unwrap_or_default()
    }

    /// Messages of the active conversation.
    pub fn active_messages(&self) -> &[Message] {
        self.active.as_deref().map(|peer| self.messages(peer)).unwrap_or_default()
    }

    /// All conversations, keyed by peer.
    pub fn conversations(&self) -> impl Iterator<Item = (&str, &[Message])> {
        self.conversations.iter().map(|(peer, messages)| (peer.as_str(), messages.as_slice()))
    }
}
