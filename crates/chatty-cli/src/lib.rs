//! Chatty terminal client.
//!
//! Line-oriented frontend over the production driver:
//!
//! - [`session`]: authenticate, run the client, log out
//! - [`input`]: stdin lines to user commands
//! - [`render`]: state changes to plain-text lines

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod input;
pub mod render;
pub mod session;

pub use render::LineRenderer;
pub use session::{Credentials, RuntimeError};
