//! Inbound demultiplexing.
//!
//! The router turns `MESSAGE` frames into typed [`InboundEvent`]s and decides
//! where each event goes. Decoding and routing are separate steps so the
//! routing decision reads the active peer at delivery time.

use chatty_proto::{
    Command, Frame,
    destinations::{self, INBOX_SUBSCRIPTION_ID, PRESENCE_SUBSCRIPTION_ID, PRESENCE_TOPIC},
    payloads::{self, ChatMessagePayload},
};
use chrono::{DateTime, Utc};

use crate::{error::InboundError, message::Message, session::ConnectionState};

/// Logical channel of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Broadcast presence topic
    Presence,
    /// Private per-identity queue
    Inbox,
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The roster changed somewhere; payload is irrelevant
    PresenceChanged,
    /// Private message decoded from the inbox
    MessageReceived(Message),
    /// Session moved to a new connection state
    ConnectionStateChanged(ConnectionState),
}

/// Where an inbound event must be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Pull a fresh roster snapshot
    RefreshPresence,
    /// Append to the active conversation
    Append(Message),
    /// Count as unread for `peer`
    Notify {
        /// Counterpart of the message
        peer: String,
    },
    /// Connection state changed
    ConnectionChanged(ConnectionState),
}

/// Demultiplexer for one identity's subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionRouter {
    me: String,
    inbox: String,
}

impl SubscriptionRouter {
    /// Router for `me`.
    pub fn new(me: impl Into<String>) -> Self {
        let me = me.into();
        let inbox = destinations::inbox(&me);
        Self { me, inbox }
    }

    /// `(subscription id, destination)` pairs to subscribe once connected.
    pub fn subscriptions(&self) -> [(&'static str, &str); 2] {
        [(PRESENCE_SUBSCRIPTION_ID, PRESENCE_TOPIC), (INBOX_SUBSCRIPTION_ID, self.inbox.as_str())]
    }

    /// Channel a `MESSAGE` frame belongs to.
    ///
    /// The `subscription` header decides; the `destination` header is the
    /// fallback for brokers that rewrite subscription ids.
    pub fn channel(&self, frame: &Frame) -> Result<Channel, InboundError> {
        match frame.subscription() {
            Some(PRESENCE_SUBSCRIPTION_ID) => return Ok(Channel::Presence),
            Some(INBOX_SUBSCRIPTION_ID) => return Ok(Channel::Inbox),
            _ => {},
        }

        match frame.destination() {
            Some(PRESENCE_TOPIC) => Ok(Channel::Presence),
            Some(destination) if destination == self.inbox => Ok(Channel::Inbox),
            Some(destination) => Err(InboundError::UnknownSubscription(
                frame.subscription().unwrap_or(destination).to_string(),
            )),
            None => Err(chatty_proto::ProtocolError::MissingHeader("destination").into()),
        }
    }

    /// Decode a frame into an event.
    ///
    /// # Errors
    ///
    /// - `InboundError::UnexpectedCommand` for anything but `MESSAGE`
    /// - `InboundError::UnknownSubscription` for foreign channels
    /// - `InboundError::Protocol` if the inbox payload is malformed
    /// - `InboundError::Misaddressed` if the message does not involve this
    ///   identity or is addressed to its own sender
    pub fn decode(
        &self,
        frame: &Frame,
        received_at: DateTime<Utc>,
    ) -> Result<InboundEvent, InboundError> {
        if frame.command != Command::Message {
            return Err(InboundError::UnexpectedCommand(frame.command));
        }

        match self.channel(frame)? {
            Channel::Presence => Ok(InboundEvent::PresenceChanged),
            Channel::Inbox => {
                let payload: ChatMessagePayload = payloads::from_json(&frame.body)?;
                let message = Message::from_payload(payload, received_at);

                if !message.involves(&self.me) || message.sender == message.recipient {
                    return Err(InboundError::Misaddressed {
                        sender: message.sender,
                        recipient: message.recipient,
                        me: self.me.clone(),
                    });
                }

                Ok(InboundEvent::MessageReceived(message))
            },
        }
    }

    /// Routing decision for `event`, given the peer active right now.
    pub fn route(&self, event: InboundEvent, active_peer: Option<&str>) -> Route {
        match event {
            InboundEvent::PresenceChanged => Route::RefreshPresence,
            InboundEvent::ConnectionStateChanged(state) => Route::ConnectionChanged(state),
            InboundEvent::MessageReceived(message) => {
                let peer = message.counterpart(&self.me);
                if active_peer == Some(peer) {
                    Route::Append(message)
                } else {
                    Route::Notify { peer: peer.to_string() }
                }
            },
        }
    }
}
