//! Error types for the Chatty session core.
//!
//! One enum per failure class. None of them is fatal to the running client:
//! the worst outcome is a return to [`ConnectionState::Disconnected`].

use std::time::Duration;

use chatty_proto::{Command, ProtocolError};
use thiserror::Error;

use crate::session::ConnectionState;

/// Caller mistakes, rejected before any I/O and without state mutation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    /// No identity is logged in
    #[error("not logged in")]
    NotLoggedIn,

    /// Send attempted with no conversation selected
    #[error("no conversation selected")]
    NoActivePeer,

    /// Message content is empty or whitespace
    #[error("message is empty")]
    EmptyContent,

    /// Tried to open a conversation with oneself
    #[error("cannot open a conversation with yourself")]
    SelfConversation,
}

/// REST snapshot failures (history and roster).
///
/// The affected state is left unchanged, never partially merged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request could not be sent or no response arrived
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with a non-success status
    #[error("server responded with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Realtime transport failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Publish attempted while not connected
    #[error("not connected")]
    NotConnected,

    /// Websocket could not be opened
    #[error("connection failed: {0}")]
    Connection(String),

    /// Frame could not be written to the socket
    #[error("send failed: {0}")]
    Send(String),

    /// Socket closed by the peer or the network
    #[error("connection closed")]
    Closed,

    /// Broker sent an `ERROR` frame
    #[error("server error: {0}")]
    Server(String),

    /// No `CONNECTED` arrived in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// Time waited since `CONNECT` was sent
        elapsed: Duration,
    },

    /// Outbound frame could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// Session operation invoked in a state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Invalid state transition attempted
    #[error("invalid session transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Reasons a chat message was not sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Rejected before any network call
    #[error(transparent)]
    User(#[from] UserError),

    /// Publish failed or was impossible
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Inbound frames the router could not use. Logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InboundError {
    /// Frame or payload is malformed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Private message that does not belong to this identity
    #[error("message from {sender} to {recipient} is not addressed to {me}")]
    Misaddressed {
        /// Sender named in the payload
        sender: String,
        /// Recipient named in the payload
        recipient: String,
        /// Current identity
        me: String,
    },

    /// Frame for a subscription this client never made
    #[error("frame for unknown subscription {0:?}")]
    UnknownSubscription(String),

    /// Frame command that carries no subscription data
    #[error("unexpected {0} frame")]
    UnexpectedCommand(Command),
}
