//! Chatty wire protocol
//!
//! Frames and payloads exchanged between the chat client and its backend.
//! The realtime channel speaks STOMP 1.2 over websocket text messages; frame
//! bodies are JSON documents.
//!
//! # Components
//!
//! - [`Frame`]: STOMP frame with encode/decode
//! - [`destinations`]: broker destinations the client subscribes and publishes
//!   to
//! - [`payloads`]: JSON bodies carried by frames and REST responses
//!
//! This crate is pure data: no I/O, no clocks.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod destinations;
pub mod errors;
mod frame;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::{Command, Frame};
