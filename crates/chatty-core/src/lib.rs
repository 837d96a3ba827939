//! Chatty session core
//!
//! Sans-IO components of the chat client. Every operation takes its inputs
//! (including time) as arguments and returns the effects the caller must
//! perform, so the same code runs under the production driver and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`SessionController`]: transport lifecycle, identity, the only builder
//!   of outbound frames
//! - [`SubscriptionRouter`]: demultiplexes inbound frames into typed
//!   [`InboundEvent`]s and routing decisions
//! - [`ConversationStore`]: per-peer message lists, history loading and
//!   optimistic sends
//! - [`NotificationAggregator`]: unread counts keyed by peer
//! - [`PresenceRegistry`]: online roster, replaced wholesale on refresh

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod conversation;
pub mod env;
pub mod error;
pub mod message;
pub mod notifications;
pub mod presence;
pub mod router;
pub mod session;

pub use conversation::{ConversationStore, HistoryOutcome, HistoryRequest};
pub use env::{Environment, Moment};
pub use error::{FetchError, InboundError, SendError, SessionError, TransportError, UserError};
pub use message::{DeliveryState, Identity, Message, MessageId, PeerUser, PresenceStatus};
pub use notifications::NotificationAggregator;
pub use presence::{PresenceRegistry, RefreshOutcome, RosterRequest};
pub use router::{Channel, InboundEvent, Route, SubscriptionRouter};
pub use session::{ConnectionState, SessionAction, SessionConfig, SessionController};
