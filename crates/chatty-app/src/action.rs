//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use std::time::Duration;

use chatty_core::{HistoryRequest, Identity, Message, RosterRequest};
use chatty_proto::Frame;

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Open the realtime transport.
    OpenTransport {
        /// Identity presented on the upgrade request.
        identity: Identity,
        /// Attempt number to tag transport events with.
        attempt: u64,
    },

    /// Close the realtime transport.
    CloseTransport,

    /// Write a frame to the transport.
    Transmit {
        /// Frame to write.
        frame: Frame,
        /// Chat message carried by the frame. Its outcome is reported back as
        /// [`crate::AppEvent::MessageSent`] or [`crate::AppEvent::SendFailed`].
        message: Option<Message>,
    },

    /// Arm the reconnect timer, replacing any armed one.
    ScheduleReconnect {
        /// Time until the retry.
        delay: Duration,
        /// Attempt that failed.
        attempt: u64,
    },

    /// Disarm the reconnect timer.
    CancelReconnect,

    /// Fetch conversation history.
    FetchHistory {
        /// Current identity.
        owner: String,
        /// Ticket to report the result with.
        request: HistoryRequest,
    },

    /// Fetch the online roster.
    FetchRoster(RosterRequest),
}
