//! Simulated world: the real client runtime wired to a scripted backend.
//!
//! `SimWorld` runs the production [`Runtime`] on a [`SimDriver`] and plays
//! the broker and REST API itself. After every operation it settles: it
//! answers transport opens, handshakes, fetches and published frames until
//! the client has nothing left to do.

use std::time::Duration;

use chatty_app::{App, Driver, Runtime, UserCommand};
use chatty_core::{ConnectionState, Environment, Identity, SessionConfig, TransportError};
use chatty_proto::{
    Command, Frame,
    destinations::{
        ADD_USER, CHAT, INBOX_SUBSCRIPTION_ID, PRESENCE_SUBSCRIPTION_ID, PRESENCE_TOPIC, inbox,
    },
    payloads::{self, ChatMessagePayload, Status, UserPayload},
};

use crate::{
    invariants::{AppSnapshot, InvariantRegistry},
    model::{ModelMessage, ModelServer, ObservableState, Operation, username},
    sim_driver::{SimDriver, SimDriverError},
    sim_env::{SimEnv, SimInstant},
};

/// The client under test plus the backend it talks to.
pub struct SimWorld {
    runtime: Runtime<SimDriver>,
    /// Handle sharing state with the driver owned by the runtime
    driver: SimDriver,
    server: ModelServer,
    broker_reachable: bool,
    reconnect_delay: Duration,
    /// Transport opens already answered
    opens_seen: usize,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Logged-out client with default session settings.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Logged-out client with the given session settings.
    ///
    /// The standard invariants are checked on every render.
    pub fn with_config(config: SessionConfig) -> Self {
        let driver = SimDriver::new().with_invariants(InvariantRegistry::standard());
        let reconnect_delay = config.reconnect_delay;
        let runtime = Runtime::new(driver.clone(), config);

        Self {
            runtime,
            driver,
            server: ModelServer::new(),
            broker_reachable: true,
            reconnect_delay,
            opens_seen: 0,
        }
    }

    /// The client state machine.
    pub fn app(&self) -> &App<SimInstant> {
        self.runtime.app()
    }

    /// The simulation driver.
    pub fn driver(&self) -> &SimDriver {
        &self.driver
    }

    /// The simulated clock.
    pub fn env(&self) -> &SimEnv {
        self.driver.env()
    }

    /// The backend.
    pub fn server(&self) -> &ModelServer {
        &self.server
    }

    /// Mutable access to the backend, for seeding history or presence.
    pub fn server_mut(&mut self) -> &mut ModelServer {
        &mut self.server
    }

    /// Observable state of the client.
    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot::from_app(self.runtime.app())
    }

    /// Observable state in the model's vocabulary.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState::from_snapshot(&self.snapshot())
    }

    /// Run a user command to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant is violated along the way.
    pub async fn command(&mut self, command: UserCommand) -> Result<(), SimDriverError> {
        self.driver.inject_command(command);
        self.settle().await
    }

    /// Apply a model operation to the real client and settle.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant is violated along the way.
    pub async fn apply(&mut self, op: &Operation) -> Result<(), SimDriverError> {
        match op {
            Operation::Login { user } => {
                let name = username(*user);
                let identity = Identity::new(name).with_session_token(format!("token-{name}"));
                self.driver.inject_command(UserCommand::Login(identity));
            },
            Operation::Logout => self.driver.inject_command(UserCommand::Logout),
            Operation::Select { peer } => {
                self.driver.inject_command(UserCommand::Select(username(*peer).to_string()));
            },
            Operation::Send { content } => {
                self.driver.inject_command(UserCommand::Send((*content).to_string()));
            },
            Operation::Receive { from, content } => {
                let from = username(*from);
                self.peer_sends(from, content);
            },
            Operation::PeerPresence { peer, online } => {
                self.peer_presence(username(*peer), *online);
            },
            Operation::RefreshRoster => self.driver.inject_command(UserCommand::RefreshRoster),
            Operation::DropConnection => self.drop_connection(),
            Operation::NetworkDown => {
                self.broker_reachable = false;
                self.drop_connection();
            },
            Operation::NetworkUp => self.broker_reachable = true,
            Operation::AdvanceTime => {
                self.env().advance(self.reconnect_delay);
                self.driver.fire_due_reconnects();
                self.driver.inject_tick();
            },
        }
        self.settle().await
    }

    /// A peer sends `content` to the logged-in user.
    ///
    /// The backend persists it and pushes it if the client is subscribed.
    /// Ignored while logged out or if `from` is the client itself.
    pub fn peer_sends(&mut self, from: &str, content: &str) {
        let Some(me) = self.me() else {
            return;
        };
        if from == me {
            return;
        }

        let id = self.server.persist(ModelMessage::new(from, &me, content));
        let payload = ChatMessagePayload {
            id: Some(id.to_string()),
            sender: from.to_string(),
            recipient: me.clone(),
            content: content.to_string(),
            timestamp: Some(self.env().wall_clock()),
        };
        if let Ok(body) = payloads::to_json(&payload) {
            let frame = Frame::new(Command::Message)
                .with_header("subscription", INBOX_SUBSCRIPTION_ID)
                .with_header("destination", inbox(&me))
                .with_body(body);
            self.push(frame);
        }
    }

    /// A peer's presence changes. Broadcast if anything changed.
    ///
    /// Ignored if `peer` is the logged-in user.
    pub fn peer_presence(&mut self, peer: &str, online: bool) {
        if self.me().as_deref() == Some(peer) {
            return;
        }
        if self.server.set_online(peer, online) {
            let status = if online { Status::Online } else { Status::Offline };
            let user = UserPayload { username: peer.to_string(), status: Some(status) };
            self.broadcast_presence(&user);
        }
    }

    /// Drop the live transport, if any.
    pub fn drop_connection(&self) {
        if let Some(attempt) = self.driver.live_transport() {
            self.driver.fail_transport(attempt, TransportError::Closed);
        }
    }

    /// Serve the client until it has nothing left to do.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant is violated along the way.
    pub async fn settle(&mut self) -> Result<(), SimDriverError> {
        loop {
            self.runtime.run_until_idle().await?;

            let mut progressed = self.answer_opens();

            for frame in self.driver.take_outgoing() {
                progressed = true;
                self.serve_frame(&frame);
            }

            let now = self.env().wall_clock();
            for fetch in self.driver.take_history_fetches() {
                progressed = true;
                let peer = fetch.request.peer().to_string();
                let history = self.server.history_payload(&fetch.owner, &peer, now);
                self.driver.resolve_history(fetch.request, Ok(history));
            }

            for request in self.driver.take_roster_fetches() {
                progressed = true;
                let users = match self.me() {
                    Some(me) => self.server.roster_payload(&me),
                    None => Vec::new(),
                };
                self.driver.resolve_roster(request, Ok(users));
            }

            if !progressed && !self.driver.has_pending() {
                return Ok(());
            }
        }
    }

    /// Answer the newest transport open, if there is an unanswered one.
    fn answer_opens(&mut self) -> bool {
        let opens = self.driver.open_requests();
        if opens.len() <= self.opens_seen {
            return false;
        }
        self.opens_seen = opens.len();

        // Older opens were superseded before the broker saw them.
        if let Some(latest) = opens.last() {
            if self.broker_reachable {
                self.driver.accept_transport();
            } else {
                let error = TransportError::Connection("broker unreachable".to_string());
                self.driver.fail_transport(latest.attempt, error);
            }
        }
        true
    }

    /// React to a frame the client wrote.
    fn serve_frame(&mut self, frame: &Frame) {
        match frame.command {
            Command::Connect => {
                if let Some(attempt) = self.driver.live_transport() {
                    self.driver.acknowledge_handshake(attempt);
                }
            },
            Command::Send => match frame.destination() {
                Some(CHAT) => match payloads::from_json::<ChatMessagePayload>(&frame.body) {
                    Ok(chat) => {
                        self.server.persist(ModelMessage::new(
                            &chat.sender,
                            &chat.recipient,
                            &chat.content,
                        ));
                    },
                    Err(err) => tracing::warn!("Rejecting malformed chat payload: {err}"),
                },
                Some(ADD_USER) => {
                    if let Ok(join) = payloads::from_json::<UserPayload>(&frame.body) {
                        self.broadcast_presence(&join);
                    }
                },
                _ => {},
            },
            _ => {},
        }
    }

    fn broadcast_presence(&self, user: &UserPayload) {
        if let Ok(body) = payloads::to_json(user) {
            let frame = Frame::new(Command::Message)
                .with_header("subscription", PRESENCE_SUBSCRIPTION_ID)
                .with_header("destination", PRESENCE_TOPIC)
                .with_body(body);
            self.push(frame);
        }
    }

    /// Push a frame to the client if it is subscribed.
    fn push(&self, frame: Frame) {
        if self.runtime.app().connection_state() != ConnectionState::Connected {
            return;
        }
        if let Some(attempt) = self.driver.live_transport() {
            self.driver.inject_frame(attempt, frame);
        }
    }

    fn me(&self) -> Option<String> {
        self.runtime.app().identity().map(|identity| identity.username().to_string())
    }
}
