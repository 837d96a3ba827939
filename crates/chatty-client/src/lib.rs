//! Production I/O for the Chatty client.
//!
//! Connects the Sans-IO application layer to the real backend:
//!
//! - [`ClientConfig`]: server location and timings
//! - [`RestClient`]: auth API plus roster and history snapshots over HTTP
//! - [`transport`]: STOMP frames over a websocket, one task per attempt
//! - [`SystemEnv`]: operating system clocks and the tokio timer
//! - [`NetworkDriver`]: the [`chatty_app::Driver`] wiring it all together

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod driver;
pub mod rest;
pub mod system_env;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use driver::{CommandSender, DriverError, NetworkDriver, Renderer};
pub use rest::{AuthError, AuthUser, RestClient};
pub use system_env::SystemEnv;
