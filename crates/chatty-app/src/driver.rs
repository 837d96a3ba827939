//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.
//!
//! Long-running work (opening the transport, REST fetches, the reconnect
//! timer) is started by the driver and reported back later through
//! [`Driver::poll_event`], so the runtime never blocks on it.

use std::{future::Future, time::Duration};

use chatty_core::{Environment, HistoryRequest, Identity, RosterRequest, TransportError};
use chatty_proto::Frame;
use tokio_util::sync::CancellationToken;

use crate::{App, AppEvent};

/// Instant type of a driver's environment.
pub type DriverInstant<D> = <<D as Driver>::Env as Environment>::Instant;

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in production and simulation.
///
/// # Implementations
///
/// - **Network**: tokio-tungstenite websocket and reqwest REST client
/// - **Simulation**: scripted events, recorded effects, virtual time
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time source. Enables virtual time in simulation.
    type Env: Environment;

    /// The environment this driver runs in.
    fn env(&self) -> &Self::Env;

    /// Wait for the next input event.
    ///
    /// Returns `None` once the event source is exhausted.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, Self::Error>> + Send;

    /// Start opening the transport for `attempt`.
    ///
    /// Completion is reported as [`AppEvent::TransportOpened`] or
    /// [`AppEvent::TransportFailed`]. Any previous transport is closed first.
    fn open_transport(&mut self, identity: &Identity, attempt: u64);

    /// Write a frame to the open transport.
    ///
    /// Resolves once the frame has been written to the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport is open or the write fails.
    fn send_frame(&mut self, frame: Frame)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the transport, if any. Idempotent.
    fn close_transport(&mut self);

    /// Report [`AppEvent::ReconnectDue`] after `delay` unless `cancel` fires
    /// first.
    fn schedule_reconnect(&mut self, delay: Duration, attempt: u64, cancel: CancellationToken);

    /// Start fetching the history between `owner` and the requested peer.
    ///
    /// Completion is reported as [`AppEvent::HistoryLoaded`].
    fn fetch_history(&mut self, owner: &str, request: HistoryRequest);

    /// Start fetching the online roster.
    ///
    /// Completion is reported as [`AppEvent::RosterLoaded`].
    fn fetch_roster(&mut self, request: RosterRequest);

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(
        &mut self,
        app: &App<<Self::Env as Environment>::Instant>,
    ) -> Result<(), Self::Error>;

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
