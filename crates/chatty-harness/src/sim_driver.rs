//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the network driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`chatty_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Nothing happens on its own: every effect the runtime asks for is recorded,
//! and the test decides when (and how) it completes by injecting the matching
//! event.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    future::ready,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chatty_app::{App, AppEvent, Driver, UserCommand};
use chatty_core::{
    Environment, FetchError, HistoryRequest, Identity, RosterRequest, TransportError,
};
use chatty_proto::{
    Command, Frame,
    payloads::{ChatMessagePayload, UserPayload},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    invariants::InvariantRegistry,
    sim_env::{SimEnv, SimInstant},
};

/// Error type for simulation driver.
#[derive(Error, Debug, Clone)]
#[error("simulation driver: {0}")]
pub struct SimDriverError(pub String);

/// Transport open requested by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Identity presented on the upgrade request
    pub identity: Identity,
    /// Attempt the transport belongs to
    pub attempt: u64,
}

/// Reconnect timer armed by the runtime.
#[derive(Debug, Clone)]
pub struct ArmedReconnect {
    /// Attempt whose failure armed the timer
    pub attempt: u64,
    /// Virtual time the timer fires at
    pub due: SimInstant,
    /// Disarmed by the runtime when cancelled
    pub token: CancellationToken,
}

/// History fetch requested by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFetch {
    /// Identity the history belongs to
    pub owner: String,
    /// Ticket to answer with
    pub request: HistoryRequest,
}

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
#[derive(Default)]
struct SharedState {
    pending_events: VecDeque<AppEvent>,
    open_requests: Vec<OpenRequest>,
    /// Attempt of the transport that is currently open
    open_transport: Option<u64>,
    outgoing_frames: Vec<Frame>,
    closes: usize,
    reconnects: Vec<ArmedReconnect>,
    history_fetches: Vec<HistoryFetch>,
    roster_fetches: Vec<RosterRequest>,
    renders: usize,
    fail_sends: bool,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] trait so the same [`chatty_app::Runtime`]
/// orchestration code runs in both production and simulation tests.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
    invariants: Option<Arc<InvariantRegistry>>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// Create a new simulation driver with a fresh virtual clock.
    pub fn new() -> Self {
        Self::with_env(SimEnv::new())
    }

    /// Create a simulation driver on an existing clock.
    pub fn with_env(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(SharedState::default())), invariants: None }
    }

    /// Enable invariant checking on every render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(Arc::new(registry));
        self
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.lock().pending_events.push_back(event);
    }

    /// Inject a user command.
    pub fn inject_command(&self, command: UserCommand) {
        self.inject_event(AppEvent::Command(command));
    }

    /// Inject a tick event.
    pub fn inject_tick(&self) {
        self.inject_event(AppEvent::Tick);
    }

    /// Inject a frame from the broker on `attempt`'s transport.
    pub fn inject_frame(&self, attempt: u64, frame: Frame) {
        self.inject_event(AppEvent::FrameReceived { attempt, frame });
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending_events.is_empty()
    }

    /// Complete the most recent transport open. Returns its attempt.
    pub fn accept_transport(&self) -> Option<u64> {
        let mut state = self.lock();
        let attempt = state.open_requests.last()?.attempt;
        state.open_transport = Some(attempt);
        state.pending_events.push_back(AppEvent::TransportOpened { attempt });
        Some(attempt)
    }

    /// Answer the handshake on `attempt` with `CONNECTED`.
    pub fn acknowledge_handshake(&self, attempt: u64) {
        let frame = Frame::new(Command::Connected).with_header("version", "1.2");
        self.inject_frame(attempt, frame);
    }

    /// Report the transport of `attempt` as lost.
    pub fn fail_transport(&self, attempt: u64, error: TransportError) {
        let mut state = self.lock();
        if state.open_transport == Some(attempt) {
            state.open_transport = None;
        }
        state.pending_events.push_back(AppEvent::TransportFailed { attempt, error });
    }

    /// Make every following `send_frame` fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Fire every armed reconnect timer that is due and not cancelled.
    ///
    /// Returns the number of timers fired. Cancelled timers are discarded.
    pub fn fire_due_reconnects(&self) -> usize {
        let now = self.env.now();
        let mut state = self.lock();

        let armed = std::mem::take(&mut state.reconnects);
        let mut fired = 0;
        for timer in armed {
            if timer.token.is_cancelled() {
                continue;
            }
            if timer.due <= now {
                state.pending_events.push_back(AppEvent::ReconnectDue { attempt: timer.attempt });
                fired += 1;
            } else {
                state.reconnects.push(timer);
            }
        }
        fired
    }

    /// Reconnect timers that are armed and not cancelled.
    pub fn armed_reconnects(&self) -> Vec<ArmedReconnect> {
        self.lock()
            .reconnects
            .iter()
            .filter(|timer| !timer.token.is_cancelled())
            .cloned()
            .collect()
    }

    /// Take all pending history fetches.
    pub fn take_history_fetches(&self) -> Vec<HistoryFetch> {
        std::mem::take(&mut self.lock().history_fetches)
    }

    /// Complete a history fetch.
    pub fn resolve_history(
        &self,
        request: HistoryRequest,
        result: Result<Vec<ChatMessagePayload>, FetchError>,
    ) {
        self.inject_event(AppEvent::HistoryLoaded { request, result });
    }

    /// Take all pending roster fetches.
    pub fn take_roster_fetches(&self) -> Vec<RosterRequest> {
        std::mem::take(&mut self.lock().roster_fetches)
    }

    /// Complete a roster fetch.
    pub fn resolve_roster(
        &self,
        request: RosterRequest,
        result: Result<Vec<UserPayload>, FetchError>,
    ) {
        self.inject_event(AppEvent::RosterLoaded { request, result });
    }

    /// Take all captured outgoing frames.
    pub fn take_outgoing(&self) -> Vec<Frame> {
        std::mem::take(&mut self.lock().outgoing_frames)
    }

    /// Transport opens requested so far.
    pub fn open_requests(&self) -> Vec<OpenRequest> {
        self.lock().open_requests.clone()
    }

    /// Attempt of the open transport. `None` if closed.
    pub fn live_transport(&self) -> Option<u64> {
        self.lock().open_transport
    }

    /// Number of transport closes requested.
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Number of renders.
    pub fn render_count(&self) -> usize {
        self.lock().renders
    }

    /// Whether the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Env = SimEnv;

    fn env(&self) -> &SimEnv {
        &self.env
    }

    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, Self::Error>> + Send {
        let event = self.lock().pending_events.pop_front();
        ready(Ok(event))
    }

    fn open_transport(&mut self, identity: &Identity, attempt: u64) {
        let mut state = self.lock();
        state.open_transport = None;
        state.open_requests.push(OpenRequest { identity: identity.clone(), attempt });
    }

    fn send_frame(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let mut state = self.lock();
        let result = if state.fail_sends {
            Err(TransportError::Send("simulated write failure".to_string()))
        } else if state.open_transport.is_none() {
            Err(TransportError::NotConnected)
        } else {
            state.outgoing_frames.push(frame);
            Ok(())
        };
        ready(result)
    }

    fn close_transport(&mut self) {
        let mut state = self.lock();
        state.open_transport = None;
        state.closes += 1;
    }

    fn schedule_reconnect(&mut self, delay: Duration, attempt: u64, cancel: CancellationToken) {
        let due = self.env.now() + delay;
        self.lock().reconnects.push(ArmedReconnect { attempt, due, token: cancel });
    }

    fn fetch_history(&mut self, owner: &str, request: HistoryRequest) {
        self.lock().history_fetches.push(HistoryFetch { owner: owner.to_string(), request });
    }

    fn fetch_roster(&mut self, request: RosterRequest) {
        self.lock().roster_fetches.push(request);
    }

    fn render(&mut self, app: &App<SimInstant>) -> Result<(), Self::Error> {
        self.lock().renders += 1;

        if let Some(registry) = &self.invariants {
            registry.check_app(app).map_err(|violations| SimDriverError(violations.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}
