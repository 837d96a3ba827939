//! Application layer for Chatty
//!
//! Pure state machine and generic runtime for the chat client, enabling
//! deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`App`]: composes the session core (connection, conversations, unread
//!   counts, roster) behind typed events and actions
//! - [`UserCommand`]: user intents, parsed from input lines
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop using a Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod command;
mod driver;
mod event;
mod runtime;

pub use action::AppAction;
pub use app::App;
pub use command::{CommandError, UserCommand};
pub use driver::{Driver, DriverInstant};
pub use event::AppEvent;
pub use runtime::{TICK_INTERVAL, Runtime, Step};
