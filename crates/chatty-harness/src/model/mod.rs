//! Reference model for model-based testing.
//!
//! Operations are applied to both the model and the real client, and their
//! observable states are compared.

mod client;
mod operation;
mod server;
mod world;

pub use client::{ModelClient, ModelConnection};
pub use operation::{CONTENTS, Operation, USERS, UserId, operation, username};
pub use server::{ModelMessage, ModelServer};
pub use world::{ModelWorld, ObservableState};
