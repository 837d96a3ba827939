//! Session layer state machine.
//!
//! Owns the realtime transport lifecycle and the logged-in identity. Uses the
//! action pattern: methods take time and transport events as input and return
//! [`SessionAction`]s for the driver to execute. The controller is the only
//! component that builds outbound frames.
//!
//! # State Machine
//!
//! ```text
//!                connect                  CONNECTED frame
//! ┌──────────────┐ ───> ┌────────────┐ ───────────────> ┌───────────┐
//! │ Disconnected │      │ Connecting │                  │ Connected │
//! └──────────────┘      └────────────┘ <─┐              └───────────┘
//!        ^                    │          │ retry due          │
//!        │ disconnect         │ error    │                    │ error
//!        │ (from any state)   v          │                    v
//!        │              ┌──────────────┐ │                    │
//!        └───────────── │ Reconnecting │ ┘ <──────────────────┘
//!                       └──────────────┘
//! ```
//!
//! # Attempts
//!
//! Every transport open gets a fresh attempt number. Transport events and
//! reconnect timers carry the attempt they belong to; anything tagged with a
//! superseded attempt is ignored.

use std::{fmt::Debug, ops::Sub, time::Duration};

use chatty_proto::{
    Frame,
    destinations::{ADD_USER, DISCONNECT_USER},
    payloads::{self, LeavePayload, UserPayload},
};
use serde::Serialize;

use crate::{
    error::{SessionError, TransportError},
    message::Identity,
};

/// Delay before retrying a failed transport.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allowed between sending `CONNECT` and receiving `CONNECTED`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport, no pending retry
    Disconnected,
    /// Transport opening or STOMP handshake in progress
    Connecting,
    /// Handshake acknowledged, subscriptions registered
    Connected,
    /// Transport lost, retry scheduled
    Reconnecting,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed delay between a transport failure and the next attempt
    pub reconnect_delay: Duration,
    /// Timeout for the STOMP handshake
    pub handshake_timeout: Duration,
    /// Virtual host sent in `CONNECT`
    pub host: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            host: "localhost".to_string(),
        }
    }
}

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a new transport for this attempt
    OpenTransport {
        /// Identity presented on the upgrade request
        identity: Identity,
        /// Attempt number the transport belongs to
        attempt: u64,
    },
    /// Write this frame to the transport
    Transmit(Frame),
    /// Close the current transport
    CloseTransport,
    /// Arm the reconnect timer
    ScheduleReconnect {
        /// Time until the retry
        delay: Duration,
        /// Attempt that failed
        attempt: u64,
    },
    /// Disarm any pending reconnect timer
    CancelReconnect,
    /// Connection state changed
    StateChanged(ConnectionState),
}

/// Session state machine.
///
/// Pure: no I/O, no clock reads. Generic over `I` so simulation can drive it
/// with virtual time.
#[derive(Debug, Clone)]
pub struct SessionController<I> {
    config: SessionConfig,
    state: ConnectionState,
    identity: Option<Identity>,
    attempt: u64,
    /// When `CONNECT` was sent on the current attempt
    handshake_started: Option<I>,
}

impl<I> SessionController<I>
where
    I: Copy + Ord + Debug + Sub<Output = Duration>,
{
    /// Create a controller in [`ConnectionState::Disconnected`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            identity: None,
            attempt: 0,
            handshake_started: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Identity of the live session. `None` when disconnected.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Current attempt number.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for `identity`.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless disconnected
    pub fn connect(&mut self, identity: Identity) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != ConnectionState::Disconnected {
            return Err(SessionError::InvalidState { state: self.state, operation: "connect" });
        }

        self.identity = Some(identity.clone());
        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        tracing::info!(user = identity.username(), attempt = self.attempt, "connecting");

        Ok(vec![
            SessionAction::StateChanged(ConnectionState::Connecting),
            SessionAction::OpenTransport { identity, attempt: self.attempt },
        ])
    }

    /// The transport for `attempt` is open. Sends `CONNECT` and starts the
    /// handshake timer.
    pub fn transport_opened(&mut self, attempt: u64, now: I) -> Vec<SessionAction> {
        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            tracing::debug!(attempt, current = self.attempt, "ignoring stale transport open");
            return Vec::new();
        }

        self.handshake_started = Some(now);
        vec![SessionAction::Transmit(Frame::connect(&self.config.host))]
    }

    /// The broker acknowledged the handshake on `attempt`.
    ///
    /// Subscribes to `subscriptions` and publishes the join announcement.
    ///
    /// # Errors
    ///
    /// - `TransportError::Encode` if the join payload cannot be encoded
    pub fn handshake_acknowledged(
        &mut self,
        attempt: u64,
        subscriptions: &[(&str, &str)],
    ) -> Result<Vec<SessionAction>, TransportError> {
        if attempt != self.attempt || self.state != ConnectionState::Connecting {
            tracing::debug!(attempt, state = ?self.state, "ignoring unexpected CONNECTED");
            return Ok(Vec::new());
        }
        let Some(identity) = &self.identity else {
            return Ok(Vec::new());
        };

        let join = UserPayload::online(identity.username());
        self.state = ConnectionState::Connected;
        self.handshake_started = None;

        let mut actions: Vec<SessionAction> = subscriptions
            .iter()
            .map(|(id, destination)| SessionAction::Transmit(Frame::subscribe(id, destination)))
            .collect();
        actions.push(SessionAction::Transmit(self.publish(ADD_USER, &join)?));
        actions.push(SessionAction::StateChanged(ConnectionState::Connected));

        tracing::info!(user = %join.username, attempt, "connected");
        Ok(actions)
    }

    /// The transport for `attempt` failed.
    ///
    /// Unless explicitly disconnected, closes the transport and schedules a
    /// retry after the fixed delay.
    pub fn transport_failed(&mut self, attempt: u64, reason: &TransportError) -> Vec<SessionAction> {
        if attempt != self.attempt {
            tracing::debug!(attempt, current = self.attempt, "ignoring stale transport failure");
            return Vec::new();
        }

        match self.state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting => Vec::new(),
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::warn!(
                    "Transport failed on attempt {attempt}: {reason}; retrying in {:?}",
                    self.config.reconnect_delay
                );
                self.state = ConnectionState::Reconnecting;
                self.handshake_started = None;

                vec![
                    SessionAction::CloseTransport,
                    SessionAction::ScheduleReconnect {
                        delay: self.config.reconnect_delay,
                        attempt,
                    },
                    SessionAction::StateChanged(ConnectionState::Reconnecting),
                ]
            },
        }
    }

    /// The reconnect timer armed after `attempt` failed has fired.
    pub fn reconnect_due(&mut self, attempt: u64) -> Vec<SessionAction> {
        if attempt != self.attempt || self.state != ConnectionState::Reconnecting {
            tracing::debug!(attempt, state = ?self.state, "ignoring stale reconnect timer");
            return Vec::new();
        }
        let Some(identity) = self.identity.clone() else {
            return Vec::new();
        };

        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        tracing::info!(attempt = self.attempt, "reconnecting");

        vec![
            SessionAction::StateChanged(ConnectionState::Connecting),
            SessionAction::OpenTransport { identity, attempt: self.attempt },
        ]
    }

    /// End the session. Idempotent.
    ///
    /// When connected, publishes the leave announcement and `DISCONNECT`
    /// first. Always cancels the pending retry and drops the identity.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(identity) = &self.identity {
            let leave = LeavePayload { username: identity.username().to_string() };
            match self.publish(DISCONNECT_USER, &leave) {
                Ok(frame) => {
                    actions.push(SessionAction::Transmit(frame));
                    actions.push(SessionAction::Transmit(Frame::disconnect()));
                },
                Err(TransportError::NotConnected) => {},
                Err(err) => tracing::warn!("Failed to build leave announcement: {err}"),
            }
        }

        actions.push(SessionAction::CancelReconnect);
        actions.push(SessionAction::CloseTransport);
        actions.push(SessionAction::StateChanged(ConnectionState::Disconnected));

        tracing::info!(from = ?self.state, "disconnected");
        self.state = ConnectionState::Disconnected;
        self.identity = None;
        self.handshake_started = None;
        // Events still in flight from the closed transport must not match.
        self.attempt += 1;

        actions
    }

    /// Build a `SEND` frame publishing `payload` to `destination`.
    ///
    /// # Errors
    ///
    /// - `TransportError::NotConnected` unless connected
    /// - `TransportError::Encode` if the payload cannot be serialized
    pub fn publish<T: Serialize>(
        &self,
        destination: &str,
        payload: &T,
    ) -> Result<Frame, TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let json = payloads::to_json(payload)?;
        Ok(Frame::send_json(destination, json))
    }

    /// Elapsed handshake time, if the timeout is exceeded. `None` otherwise.
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let started = self.handshake_started?;
        let elapsed = now - started;
        (elapsed > self.config.handshake_timeout).then_some(elapsed)
    }

    /// Periodic maintenance. A handshake that outlived its timeout counts as
    /// a transport failure.
    pub fn tick(&mut self, now: I) -> Vec<SessionAction> {
        match self.check_timeout(now) {
            Some(elapsed) => {
                self.transport_failed(self.attempt, &TransportError::HandshakeTimeout { elapsed })
            },
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chatty_proto::Command;

    use super::*;

    const SUBSCRIPTIONS: [(&str, &str); 2] =
        [("sub-presence", "/topic/user"), ("sub-inbox", "/user/alice/queue/messages")];

    fn connected(now: Instant) -> SessionController<Instant> {
        let mut session = SessionController::new(SessionConfig::default());
        session.connect(Identity::new("alice")).unwrap();
        session.transport_opened(1, now);
        session.handshake_acknowledged(1, &SUBSCRIPTIONS).unwrap();
        session
    }

    fn transmitted(actions: &[SessionAction]) -> Vec<&Frame> {
        actions
            .iter()
            .filter_map(|action| match action {
                SessionAction::Transmit(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_opens_transport() {
        let mut session = SessionController::<Instant>::new(SessionConfig::default());
        let actions = session.connect(Identity::new("alice")).unwrap();

        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(actions.contains(&SessionAction::OpenTransport {
            identity: Identity::new("alice"),
            attempt: 1,
        }));
    }

    #[test]
    fn connect_twice_rejected() {
        let mut session = SessionController::<Instant>::new(SessionConfig::default());
        session.connect(Identity::new("alice")).unwrap();

        let result = session.connect(Identity::new("alice"));
        assert_eq!(
            result,
            Err(SessionError::InvalidState { state: ConnectionState::Connecting, operation: "connect" })
        );
    }

    #[test]
    fn handshake_subscribes_then_joins() {
        let now = Instant::now();
        let mut session = SessionController::new(SessionConfig::default());
        session.connect(Identity::new("alice")).unwrap();

        let opened = session.transport_opened(1, now);
        assert_eq!(transmitted(&opened)[0].command, Command::Connect);

        let actions = session.handshake_acknowledged(1, &SUBSCRIPTIONS).unwrap();
        let frames = transmitted(&actions);

        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].command, Command::Subscribe);
        assert_eq!(frames[1].destination(), Some("/user/alice/queue/messages"));
        assert_eq!(frames[2].destination(), Some(ADD_USER));
        assert_eq!(frames[2].body_str().unwrap(), r#"{"username":"alice","status":"ONLINE"}"#);
        assert_eq!(actions.last(), Some(&SessionAction::StateChanged(ConnectionState::Connected)));
    }

    #[test]
    fn failure_schedules_fixed_delay_retry() {
        let mut session = connected(Instant::now());

        let actions = session.transport_failed(1, &TransportError::Closed);

        assert_eq!(session.state(), ConnectionState::Reconnecting);
        assert!(actions.contains(&SessionAction::ScheduleReconnect {
            delay: DEFAULT_RECONNECT_DELAY,
            attempt: 1,
        }));

        let retry = session.reconnect_due(1);
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(retry.contains(&SessionAction::OpenTransport {
            identity: Identity::new("alice"),
            attempt: 2,
        }));
    }

    #[test]
    fn stale_attempt_events_ignored() {
        let mut session = connected(Instant::now());
        session.transport_failed(1, &TransportError::Closed);
        session.reconnect_due(1);

        assert!(session.transport_failed(1, &TransportError::Closed).is_empty());
        assert!(session.reconnect_due(1).is_empty());
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[test]
    fn disconnect_cancels_retry() {
        let mut session = connected(Instant::now());
        session.transport_failed(1, &TransportError::Closed);

        let actions = session.disconnect();

        assert!(actions.contains(&SessionAction::CancelReconnect));
        assert!(transmitted(&actions).is_empty());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.identity().is_none());
        assert!(session.reconnect_due(1).is_empty());
    }

    #[test]
    fn disconnect_when_connected_leaves_first() {
        let mut session = connected(Instant::now());

        let actions = session.disconnect();
        let frames = transmitted(&actions);

        assert_eq!(frames[0].destination(), Some(DISCONNECT_USER));
        assert_eq!(frames[0].body_str().unwrap(), r#"{"username":"alice"}"#);
        assert_eq!(frames[1].command, Command::Disconnect);
        assert!(session.disconnect().is_empty());
    }

    #[test]
    fn publish_requires_connection() {
        let session = SessionController::<Instant>::new(SessionConfig::default());
        let result = session.publish("/app/chat", &LeavePayload { username: "a".into() });
        assert_eq!(result, Err(TransportError::NotConnected));
    }

    #[test]
    fn handshake_timeout_triggers_retry() {
        let start = Instant::now();
        let mut session = SessionController::new(SessionConfig::default());
        session.connect(Identity::new("alice")).unwrap();
        session.transport_opened(1, start);

        assert!(session.tick(start + Duration::from_secs(5)).is_empty());

        let actions = session.tick(start + Duration::from_secs(11));
        assert_eq!(session.state(), ConnectionState::Reconnecting);
        assert!(actions.contains(&SessionAction::CloseTransport));
    }
}
