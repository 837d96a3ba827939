//! Fuzz target for the App state machine
//!
//! Interleave user commands, transport lifecycle events, pushed frames and
//! out-of-order fetch completions, and check the standard invariants after
//! every step (HIGH priority)
//!
//! # Strategy
//!
//! - Identities and peers drawn from a small pool so collisions are common
//! - Fetch results resolved in arbitrary order, including long after the
//!   selection or login they were issued for
//! - Transport events tagged with the current attempt
//!
//! # Invariants
//!
//! - No unread entry for the active peer
//! - Every message sits in its counterpart's conversation
//! - Roster and selection never contain the identity itself
//! - Logged out means no conversations, unread counts or roster

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use chatty_app::{App, AppAction, AppEvent, UserCommand};
use chatty_core::{
    Environment, FetchError, HistoryRequest, Identity, RosterRequest, SessionConfig,
    TransportError,
};
use chatty_harness::{InvariantRegistry, SimEnv, SimInstant, model::username};
use chatty_proto::{
    Command, Frame,
    destinations::{INBOX_SUBSCRIPTION_ID, PRESENCE_SUBSCRIPTION_ID},
    payloads::{ChatMessagePayload, UserPayload},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Login(u8),
    Logout,
    Select(u8),
    Send { blank: bool },
    RefreshRoster,
    Opened,
    Failed,
    Handshake,
    Inbox { from: u8, to: u8 },
    Presence,
    ReconnectDue,
    ResolveHistory { pick: u8, ok: bool },
    ResolveRoster { pick: u8, users: Vec<u8> },
    Tick { secs: u8 },
}

fn message_frame(subscription: &str, body: String) -> Frame {
    Frame::new(Command::Message).with_header("subscription", subscription).with_body(body)
}

fuzz_target!(|ops: Vec<Op>| {
    let env = SimEnv::new();
    let registry = InvariantRegistry::standard();
    let mut app = App::<SimInstant>::new(SessionConfig::default());
    let mut histories: Vec<(String, HistoryRequest)> = Vec::new();
    let mut rosters: Vec<RosterRequest> = Vec::new();

    for op in ops {
        let attempt = app.attempt();
        let event = match op {
            Op::Login(user) => {
                AppEvent::Command(UserCommand::Login(Identity::new(username(user))))
            },
            Op::Logout => AppEvent::Command(UserCommand::Logout),
            Op::Select(peer) => AppEvent::Command(UserCommand::Select(username(peer).into())),
            Op::Send { blank } => {
                let content = if blank { "   " } else { "hi" };
                AppEvent::Command(UserCommand::Send(content.into()))
            },
            Op::RefreshRoster => AppEvent::Command(UserCommand::RefreshRoster),
            Op::Opened => AppEvent::TransportOpened { attempt },
            Op::Failed => AppEvent::TransportFailed { attempt, error: TransportError::Closed },
            Op::Handshake => {
                AppEvent::FrameReceived { attempt, frame: Frame::new(Command::Connected) }
            },
            Op::Inbox { from, to } => {
                let body = format!(
                    r#"{{"sender":"{}","recipient":"{}","content":"ping"}}"#,
                    username(from),
                    username(to)
                );
                AppEvent::FrameReceived {
                    attempt,
                    frame: message_frame(INBOX_SUBSCRIPTION_ID, body),
                }
            },
            Op::Presence => AppEvent::FrameReceived {
                attempt,
                frame: message_frame(PRESENCE_SUBSCRIPTION_ID, "{}".into()),
            },
            Op::ReconnectDue => AppEvent::ReconnectDue { attempt },
            Op::ResolveHistory { pick, ok } => {
                if histories.is_empty() {
                    continue;
                }
                let (owner, request) = histories.swap_remove(usize::from(pick) % histories.len());
                let result = if ok {
                    Ok(vec![ChatMessagePayload {
                        id: Some("1".into()),
                        sender: request.peer().to_string(),
                        recipient: owner,
                        content: "old".into(),
                        timestamp: None,
                    }])
                } else {
                    Err(FetchError::Status { status: 500 })
                };
                AppEvent::HistoryLoaded { request, result }
            },
            Op::ResolveRoster { pick, users } => {
                if rosters.is_empty() {
                    continue;
                }
                let request = rosters.swap_remove(usize::from(pick) % rosters.len());
                let users = users.into_iter().map(|u| UserPayload::online(username(u))).collect();
                AppEvent::RosterLoaded { request, result: Ok(users) }
            },
            Op::Tick { secs } => {
                env.advance(Duration::from_secs(u64::from(secs)));
                AppEvent::Tick
            },
        };

        for action in app.handle(event, env.moment()) {
            match action {
                AppAction::FetchHistory { owner, request } => histories.push((owner, request)),
                AppAction::FetchRoster(request) => rosters.push(request),
                AppAction::Transmit { message: Some(message), .. } => {
                    app.handle(AppEvent::MessageSent { message }, env.moment());
                },
                _ => {},
            }
        }

        if let Err(violations) = registry.check_app(&app) {
            panic!("invariants violated: {violations}");
        }
    }
});
