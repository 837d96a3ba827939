//! Application input events.
//!
//! This module defines [`AppEvent`], the complete set of inputs that drive
//! the [`crate::App`] state machine.
//!
//! Events originate from three sources:
//! - User commands and periodic ticks.
//! - The realtime transport, tagged with the attempt they belong to.
//! - Completed REST fetches and publish acknowledgements.

use chatty_core::{FetchError, HistoryRequest, Message, RosterRequest, TransportError};
use chatty_proto::{
    Frame,
    payloads::{ChatMessagePayload, UserPayload},
};

use crate::UserCommand;

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// User intent.
    Command(UserCommand),

    /// Periodic tick.
    Tick,

    /// Transport opened.
    TransportOpened {
        /// Attempt the transport belongs to.
        attempt: u64,
    },

    /// Transport could not be opened, or was lost.
    TransportFailed {
        /// Attempt the transport belongs to.
        attempt: u64,
        /// What went wrong.
        error: TransportError,
    },

    /// Frame received from the broker.
    FrameReceived {
        /// Attempt the transport belongs to.
        attempt: u64,
        /// Decoded frame.
        frame: Frame,
    },

    /// Reconnect timer fired.
    ReconnectDue {
        /// Attempt whose failure armed the timer.
        attempt: u64,
    },

    /// History fetch completed.
    HistoryLoaded {
        /// Ticket issued with the fetch.
        request: HistoryRequest,
        /// Snapshot or failure.
        result: Result<Vec<ChatMessagePayload>, FetchError>,
    },

    /// Roster fetch completed.
    RosterLoaded {
        /// Ticket issued with the fetch.
        request: RosterRequest,
        /// Snapshot or failure.
        result: Result<Vec<UserPayload>, FetchError>,
    },

    /// Chat message written to the transport.
    MessageSent {
        /// The message as prepared for sending.
        message: Message,
    },

    /// Chat message could not be written.
    SendFailed {
        /// The message as prepared for sending.
        message: Message,
        /// Why it failed.
        error: TransportError,
    },
}
