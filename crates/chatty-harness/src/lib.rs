//! Deterministic simulation harness for the Chatty client.
//!
//! Virtual-time implementations of the Environment and Driver traits, so the
//! production runtime can be driven step by step without sockets or clocks.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and a [`SimWorld`], and
//! their observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the common
//! App invariants.

#![forbid(unsafe_code)]

pub mod invariants;
pub mod model;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_world;

pub use invariants::{
    ActivePeerNotSelf, AppSnapshot, ConversationAttribution, Invariant, InvariantRegistry,
    InvariantResult, LoggedOutIsClean, NoUnreadForActivePeer, RosterExcludesSelf, Violation,
    Violations,
};
pub use model::{
    ModelClient, ModelConnection, ModelMessage, ModelServer, ModelWorld, ObservableState,
    Operation, UserId,
};
pub use sim_driver::{ArmedReconnect, HistoryFetch, OpenRequest, SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_world::SimWorld;
