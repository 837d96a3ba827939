//! Application state machine.
//!
//! This module defines the [`App`] state machine, which composes the session
//! core components behind a single event/action interface, completely
//! decoupled from I/O.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Drives the [`SessionController`] and turns its actions into transport
//!   work.
//! - Feeds inbound frames through the [`SubscriptionRouter`] and applies each
//!   route to conversations, unread counts or the roster.
//! - Issues and applies history and roster fetches.
//! - Tears down all per-identity state atomically on logout.

use std::{fmt::Debug, ops::Sub, time::Duration};

use chatty_core::{
    ConnectionState, ConversationStore, HistoryOutcome, Identity, InboundEvent, Message, Moment,
    NotificationAggregator, PeerUser, PresenceRegistry, RefreshOutcome, Route, SendError,
    SessionAction, SessionConfig, SessionController, SubscriptionRouter, TransportError, UserError,
};
use chatty_proto::{Command, Frame, destinations::CHAT};

use crate::{AppAction, AppEvent, UserCommand};

/// Per-identity state. Exists exactly while logged in.
#[derive(Debug, Clone)]
struct ChatState {
    router: SubscriptionRouter,
    conversations: ConversationStore,
    notifications: NotificationAggregator,
    presence: PresenceRegistry,
}

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App<I> {
    /// Transport lifecycle and identity.
    session: SessionController<I>,
    /// Per-identity state. `None` when logged out.
    chat: Option<ChatState>,
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
    /// Selection generation the next login starts from.
    generation_floor: u64,
    /// Roster ticket the next login starts from.
    roster_floor: u64,
}

impl<I> App<I>
where
    I: Copy + Ord + Debug + Sub<Output = Duration>,
{
    /// Create a logged-out App.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: SessionController::new(config),
            chat: None,
            status_message: None,
            generation_floor: 0,
            roster_floor: 0,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent, now: Moment<I>) -> Vec<AppAction> {
        match event {
            AppEvent::Command(command) => self.execute(command, now),
            AppEvent::Tick => {
                let actions = self.session.tick(now.instant);
                self.session_actions(actions)
            },
            AppEvent::TransportOpened { attempt } => {
                let actions = self.session.transport_opened(attempt, now.instant);
                self.session_actions(actions)
            },
            AppEvent::TransportFailed { attempt, error } => {
                let actions = self.session.transport_failed(attempt, &error);
                self.session_actions(actions)
            },
            AppEvent::FrameReceived { attempt, frame } => {
                if attempt != self.session.attempt() {
                    tracing::debug!(attempt, "dropping frame from superseded transport");
                    return Vec::new();
                }
                self.handle_frame(attempt, &frame, now)
            },
            AppEvent::ReconnectDue { attempt } => {
                let actions = self.session.reconnect_due(attempt);
                self.session_actions(actions)
            },
            AppEvent::HistoryLoaded { request, result } => {
                let Some(chat) = &mut self.chat else {
                    tracing::debug!(peer = request.peer(), "history arrived after logout");
                    return Vec::new();
                };

                let result = result.map(|payloads| {
                    payloads
                        .into_iter()
                        .map(|payload| Message::from_payload(payload, now.wall))
                        .collect()
                });

                match chat.conversations.apply_history(&request, result) {
                    HistoryOutcome::Applied { .. } => vec![AppAction::Render],
                    HistoryOutcome::Stale => Vec::new(),
                    HistoryOutcome::Failed(err) => {
                        self.status_message =
                            Some(format!("Could not load history with {}: {err}", request.peer()));
                        vec![AppAction::Render]
                    },
                }
            },
            AppEvent::RosterLoaded { request, result } => {
                let Some(chat) = &mut self.chat else {
                    return Vec::new();
                };

                match chat.presence.apply(request, result) {
                    RefreshOutcome::Applied { .. } => vec![AppAction::Render],
                    RefreshOutcome::Stale => Vec::new(),
                    RefreshOutcome::Failed(err) => {
                        self.status_message = Some(format!("Could not load users: {err}"));
                        vec![AppAction::Render]
                    },
                }
            },
            AppEvent::MessageSent { message } => {
                let Some(chat) = &mut self.chat else {
                    return Vec::new();
                };
                // Ack for a message of an earlier login.
                let me = self.session.identity().map(Identity::username);
                if me != Some(message.sender.as_str()) {
                    return Vec::new();
                }

                chat.conversations.append(message);
                vec![AppAction::Render]
            },
            AppEvent::SendFailed { message, error } => {
                self.status_message =
                    Some(format!("Message to {} not sent: {error}", message.recipient));
                vec![AppAction::Render]
            },
        }
    }

    /// Execute a user command.
    pub fn execute(&mut self, command: UserCommand, now: Moment<I>) -> Vec<AppAction> {
        self.status_message = None;

        match command {
            UserCommand::Login(identity) => self.login(identity),
            UserCommand::Logout => self.logout(),
            UserCommand::Select(peer) => self.select_peer(&peer),
            UserCommand::Send(content) => match self.send_message(&content, now) {
                Ok(actions) => actions,
                Err(err) => {
                    self.status_message = Some(err.to_string());
                    vec![AppAction::Render]
                },
            },
            UserCommand::RefreshRoster => self.refresh_roster(),
            UserCommand::Quit => {
                let mut actions = if self.chat.is_some() { self.logout() } else { Vec::new() };
                actions.push(AppAction::Quit);
                actions
            },
        }
    }

    /// Start a session for an authenticated identity.
    pub fn login(&mut self, identity: Identity) -> Vec<AppAction> {
        if let Some(current) = self.session.identity() {
            self.status_message = Some(format!("Already logged in as {}", current.username()));
            return vec![AppAction::Render];
        }

        let username = identity.username().to_string();
        match self.session.connect(identity) {
            Ok(actions) => {
                self.chat = Some(ChatState {
                    router: SubscriptionRouter::new(&username),
                    conversations: ConversationStore::resume(&username, self.generation_floor),
                    notifications: NotificationAggregator::new(),
                    presence: PresenceRegistry::resume(&username, self.roster_floor),
                });
                self.session_actions(actions)
            },
            Err(err) => {
                self.status_message = Some(err.to_string());
                vec![AppAction::Render]
            },
        }
    }

    /// End the session.
    ///
    /// Identity, roster, conversations, selection and unread counts are
    /// dropped together with the transport.
    pub fn logout(&mut self) -> Vec<AppAction> {
        let Some(chat) = self.chat.take() else {
            return self.user_error(UserError::NotLoggedIn);
        };

        // In-flight fetches of this session must never match the next one.
        self.generation_floor = chat.conversations.generation() + 1;
        self.roster_floor = chat.presence.issued();

        let actions = self.session.disconnect();
        self.session_actions(actions)
    }

    /// Make `peer` the active conversation and fetch its history.
    pub fn select_peer(&mut self, peer: &str) -> Vec<AppAction> {
        let Some(chat) = &mut self.chat else {
            return self.user_error(UserError::NotLoggedIn);
        };

        match chat.conversations.select(peer, &mut chat.notifications) {
            Ok(request) => {
                let owner = self.session.identity().map(|id| id.username().to_string());
                let mut actions = Vec::new();
                if let Some(owner) = owner {
                    actions.push(AppAction::FetchHistory { owner, request });
                }
                actions.push(AppAction::Render);
                actions
            },
            Err(err) => self.user_error(err),
        }
    }

    /// Send `content` to the active peer.
    ///
    /// Returns the publish action. The message is appended to the
    /// conversation once the transport reports it written.
    ///
    /// # Errors
    ///
    /// Checked in order, nothing is published on failure:
    /// - `UserError::NotLoggedIn`
    /// - `UserError::NoActivePeer`
    /// - `UserError::EmptyContent`
    /// - `TransportError::NotConnected`
    pub fn send_message(
        &mut self,
        content: &str,
        now: Moment<I>,
    ) -> Result<Vec<AppAction>, SendError> {
        let chat = self.chat.as_mut().ok_or(UserError::NotLoggedIn)?;
        let message = chat.conversations.prepare_send(content, now.wall)?;
        let frame = self.session.publish(CHAT, &message.to_payload())?;

        Ok(vec![AppAction::Transmit { frame, message: Some(message) }])
    }

    /// Re-pull the online roster.
    pub fn refresh_roster(&mut self) -> Vec<AppAction> {
        let Some(chat) = &mut self.chat else {
            return self.user_error(UserError::NotLoggedIn);
        };
        if self.session.state() != ConnectionState::Connected {
            self.status_message = Some(TransportError::NotConnected.to_string());
            return vec![AppAction::Render];
        }

        vec![AppAction::FetchRoster(chat.presence.refresh()), AppAction::Render]
    }

    fn user_error(&mut self, err: UserError) -> Vec<AppAction> {
        self.status_message = Some(err.to_string());
        vec![AppAction::Render]
    }

    fn handle_frame(&mut self, attempt: u64, frame: &Frame, now: Moment<I>) -> Vec<AppAction> {
        match frame.command {
            Command::Connected => {
                let Some(chat) = &self.chat else {
                    return Vec::new();
                };
                let acknowledged =
                    self.session.handshake_acknowledged(attempt, &chat.router.subscriptions());
                match acknowledged {
                    Ok(actions) => self.session_actions(actions),
                    Err(err) => {
                        let actions = self.session.transport_failed(attempt, &err);
                        self.session_actions(actions)
                    },
                }
            },
            Command::Error => {
                let reason = frame.header("message").unwrap_or("broker error").to_string();
                let actions = self.session.transport_failed(attempt, &TransportError::Server(reason));
                self.session_actions(actions)
            },
            Command::Receipt => Vec::new(),
            _ => {
                let Some(chat) = &self.chat else {
                    return Vec::new();
                };
                let decoded = chat.router.decode(frame, now.wall);
                match decoded {
                    Ok(event) => self.dispatch(event),
                    Err(err) => {
                        tracing::warn!("Dropping inbound frame: {err}");
                        Vec::new()
                    },
                }
            },
        }
    }

    /// Apply the routing decision for an inbound event.
    fn dispatch(&mut self, event: InboundEvent) -> Vec<AppAction> {
        let Some(chat) = &mut self.chat else {
            return vec![AppAction::Render];
        };

        let route = chat.router.route(event, chat.conversations.active());
        match route {
            Route::RefreshPresence => vec![AppAction::FetchRoster(chat.presence.refresh())],
            Route::Append(message) => {
                chat.conversations.append(message);
                vec![AppAction::Render]
            },
            Route::Notify { peer } => {
                let unread = chat.notifications.increment(&peer);
                tracing::debug!(peer = %peer, unread, "unread message");
                vec![AppAction::Render]
            },
            Route::ConnectionChanged(ConnectionState::Connected) => {
                // Presence changes missed while offline are recovered here.
                vec![AppAction::FetchRoster(chat.presence.refresh()), AppAction::Render]
            },
            Route::ConnectionChanged(_) => vec![AppAction::Render],
        }
    }

    /// Translate session actions, routing state changes through the router.
    fn session_actions(&mut self, actions: Vec<SessionAction>) -> Vec<AppAction> {
        let mut out = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                SessionAction::OpenTransport { identity, attempt } => {
                    out.push(AppAction::OpenTransport { identity, attempt });
                },
                SessionAction::Transmit(frame) => {
                    out.push(AppAction::Transmit { frame, message: None });
                },
                SessionAction::CloseTransport => out.push(AppAction::CloseTransport),
                SessionAction::ScheduleReconnect { delay, attempt } => {
                    out.push(AppAction::ScheduleReconnect { delay, attempt });
                },
                SessionAction::CancelReconnect => out.push(AppAction::CancelReconnect),
                SessionAction::StateChanged(state) => {
                    out.extend(self.dispatch(InboundEvent::ConnectionStateChanged(state)));
                },
            }
        }
        out
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Current transport attempt number.
    pub fn attempt(&self) -> u64 {
        self.session.attempt()
    }

    /// Logged-in identity. `None` when logged out.
    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    /// Whether an identity is logged in.
    pub fn is_logged_in(&self) -> bool {
        self.chat.is_some()
    }

    /// Active peer. `None` if no conversation is selected.
    pub fn active_peer(&self) -> Option<&str> {
        self.chat.as_ref().and_then(|chat| chat.conversations.active())
    }

    /// Messages exchanged with `peer`.
    pub fn messages(&self, peer: &str) -> &[Message] {
        self.chat.as_ref().map(|chat| chat.conversations.messages(peer)).unwrap_or_default()
    }

    /// Messages of the active conversation.
    pub fn active_messages(&self) -> &[Message] {
        self.chat.as_ref().map(|chat| chat.conversations.active_messages()).unwrap_or_default()
    }

    /// All loaded conversations, keyed by peer.
    pub fn conversations(&self) -> impl Iterator<Item = (&str, &[Message])> {
        self.chat.iter().flat_map(|chat| chat.conversations.conversations())
    }

    /// Unread count for `peer`. `None` means no unread messages.
    pub fn unread(&self, peer: &str) -> Option<u32> {
        self.chat.as_ref().and_then(|chat| chat.notifications.get(peer))
    }

    /// Peers with unread messages, ordered by name.
    pub fn unread_counts(&self) -> impl Iterator<Item = (&str, u32)> {
        self.chat.iter().flat_map(|chat| chat.notifications.iter())
    }

    /// Online peers, ordered by name.
    pub fn roster(&self) -> impl Iterator<Item = &PeerUser> {
        self.chat.iter().flat_map(|chat| chat.presence.peers())
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chatty_core::{DeliveryState, FetchError, MessageId};
    use chatty_proto::payloads::{ChatMessagePayload, UserPayload};
    use chrono::{TimeZone, Utc};

    use super::*;

    fn now() -> Moment<Instant> {
        Moment { instant: Instant::now(), wall: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() }
    }

    fn connected_app() -> App<Instant> {
        let mut app = App::new(SessionConfig::default());
        app.login(Identity::new("alice"));
        app.handle(AppEvent::TransportOpened { attempt: 1 }, now());
        app.handle(
            AppEvent::FrameReceived { attempt: 1, frame: Frame::new(Command::Connected) },
            now(),
        );
        app
    }

    fn inbox(sender: &str, content: &str) -> AppEvent {
        let body = format!(r#"{{"sender":"{sender}","recipient":"alice","content":"{content}"}}"#);
        AppEvent::FrameReceived {
            attempt: 1,
            frame: Frame::new(Command::Message)
                .with_header("subscription", "sub-inbox")
                .with_header("destination", "/user/alice/queue/messages")
                .with_body(body),
        }
    }

    #[test]
    fn login_opens_transport() {
        let mut app = App::<Instant>::new(SessionConfig::default());
        let actions = app.login(Identity::new("alice"));

        assert!(actions.contains(&AppAction::OpenTransport {
            identity: Identity::new("alice"),
            attempt: 1
        }));
        assert_eq!(app.connection_state(), ConnectionState::Connecting);
        assert!(app.is_logged_in());
    }

    #[test]
    fn connected_refreshes_roster() {
        let mut app = App::new(SessionConfig::default());
        app.login(Identity::new("alice"));
        app.handle(AppEvent::TransportOpened { attempt: 1 }, now());

        let actions = app.handle(
            AppEvent::FrameReceived { attempt: 1, frame: Frame::new(Command::Connected) },
            now(),
        );

        assert_eq!(app.connection_state(), ConnectionState::Connected);
        assert!(actions.iter().any(|action| matches!(action, AppAction::FetchRoster(_))));
    }

    #[test]
    fn select_fetches_history() {
        let mut app = connected_app();
        let actions = app.select_peer("bob");

        assert!(matches!(actions.as_slice(), [
            AppAction::FetchHistory { owner, .. },
            AppAction::Render
        ] if owner == "alice"));
        assert_eq!(app.active_peer(), Some("bob"));
    }

    #[test]
    fn history_applied_for_current_selection() {
        let mut app = connected_app();
        let actions = app.select_peer("bob");
        let Some(AppAction::FetchHistory { request, .. }) = actions.into_iter().next() else {
            panic!("expected history fetch");
        };

        let payload = ChatMessagePayload {
            id: Some("1".into()),
            sender: "bob".into(),
            recipient: "alice".into(),
            content: "earlier".into(),
            timestamp: None,
        };
        app.handle(AppEvent::HistoryLoaded { request, result: Ok(vec![payload]) }, now());

        assert_eq!(app.active_messages().len(), 1);
        assert_eq!(app.active_messages()[0].id, Some(MessageId::Server("1".into())));
    }

    #[test]
    fn inbound_message_for_inactive_peer_counts_unread() {
        let mut app = connected_app();
        app.handle(inbox("bob", "hi"), now());

        assert_eq!(app.unread("bob"), Some(1));
        assert!(app.messages("bob").is_empty());

        app.select_peer("bob");
        assert_eq!(app.unread("bob"), None);
    }

    #[test]
    fn inbound_message_for_active_peer_appends() {
        let mut app = connected_app();
        app.select_peer("bob");
        app.handle(inbox("bob", "hi"), now());

        assert_eq!(app.active_messages().len(), 1);
        assert_eq!(app.unread("bob"), None);
    }

    #[test]
    fn presence_event_refreshes_roster() {
        let mut app = connected_app();
        let frame = Frame::new(Command::Message)
            .with_header("subscription", "sub-presence")
            .with_header("destination", "/topic/user")
            .with_body("{}");

        let actions = app.handle(AppEvent::FrameReceived { attempt: 1, frame }, now());
        let Some(AppAction::FetchRoster(request)) = actions.into_iter().next() else {
            panic!("expected roster fetch");
        };

        let users = vec![UserPayload::online("alice"), UserPayload::online("bob")];
        app.handle(AppEvent::RosterLoaded { request, result: Ok(users) }, now());

        let roster: Vec<_> = app.roster().map(|peer| peer.username.as_str()).collect();
        assert_eq!(roster, ["bob"]);
    }

    #[test]
    fn send_appends_only_after_ack() {
        let mut app = connected_app();
        app.select_peer("bob");

        let actions = app.send_message("hey", now()).unwrap();
        let [AppAction::Transmit { frame, message: Some(message) }] = actions.as_slice() else {
            panic!("expected a single transmit");
        };
        assert_eq!(frame.destination(), Some(CHAT));
        assert_eq!(message.delivery, DeliveryState::Pending);
        assert!(app.active_messages().is_empty());

        app.handle(AppEvent::MessageSent { message: message.clone() }, now());
        assert_eq!(app.active_messages().len(), 1);
    }

    #[test]
    fn send_preconditions() {
        let mut app = App::<Instant>::new(SessionConfig::default());
        assert_eq!(app.send_message("hey", now()), Err(SendError::User(UserError::NotLoggedIn)));

        app.login(Identity::new("alice"));
        assert_eq!(app.send_message("hey", now()), Err(SendError::User(UserError::NoActivePeer)));

        app.select_peer("bob");
        assert_eq!(app.send_message(" ", now()), Err(SendError::User(UserError::EmptyContent)));
        assert_eq!(
            app.send_message("hey", now()),
            Err(SendError::Transport(TransportError::NotConnected))
        );
    }

    #[test]
    fn failed_send_not_appended() {
        let mut app = connected_app();
        app.select_peer("bob");
        let actions = app.send_message("hey", now()).unwrap();
        let Some(AppAction::Transmit { message: Some(message), .. }) = actions.into_iter().next()
        else {
            panic!("expected transmit");
        };

        app.handle(AppEvent::SendFailed { message, error: TransportError::Closed }, now());

        assert!(app.active_messages().is_empty());
        assert!(app.status_message().is_some());
    }

    #[test]
    fn logout_clears_everything() {
        let mut app = connected_app();
        app.select_peer("bob");
        app.handle(inbox("carol", "hi"), now());

        let actions = app.logout();

        assert!(actions.contains(&AppAction::CancelReconnect));
        assert!(actions.contains(&AppAction::CloseTransport));
        assert!(!app.is_logged_in());
        assert_eq!(app.identity(), None);
        assert_eq!(app.active_peer(), None);
        assert_eq!(app.unread_counts().count(), 0);
        assert_eq!(app.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn history_from_previous_login_discarded() {
        let mut app = connected_app();
        let actions = app.select_peer("bob");
        let Some(AppAction::FetchHistory { request, .. }) = actions.into_iter().next() else {
            panic!("expected history fetch");
        };

        app.logout();
        let _ = connected_app_again(&mut app);
        app.select_peer("bob");

        let outcome = app.handle(
            AppEvent::HistoryLoaded { request, result: Err(FetchError::Status { status: 500 }) },
            now(),
        );
        assert!(outcome.is_empty());
        assert_eq!(app.status_message(), None);
    }

    fn connected_app_again(app: &mut App<Instant>) -> Vec<AppAction> {
        let mut actions = app.login(Identity::new("alice"));
        let attempt = app.attempt();
        actions.extend(app.handle(AppEvent::TransportOpened { attempt }, now()));
        actions.extend(app.handle(
            AppEvent::FrameReceived { attempt, frame: Frame::new(Command::Connected) },
            now(),
        ));
        actions
    }

    #[test]
    fn error_frame_triggers_reconnect() {
        let mut app = connected_app();
        let frame = Frame::new(Command::Error).with_header("message", "boom");

        let actions = app.handle(AppEvent::FrameReceived { attempt: 1, frame }, now());

        assert_eq!(app.connection_state(), ConnectionState::Reconnecting);
        assert!(actions.iter().any(|action| matches!(action, AppAction::ScheduleReconnect { .. })));
    }

    #[test]
    fn quit_logs_out_first() {
        let mut app = connected_app();
        let actions = app.execute(UserCommand::Quit, now());

        assert_eq!(actions.last(), Some(&AppAction::Quit));
        assert!(actions.contains(&AppAction::CloseTransport));
        assert!(!app.is_logged_in());
    }
}
