//! Plain-text renderer.
//!
//! Prints what changed since the previous render, one line per change:
//! connection state, the online roster, the active conversation, new unread
//! messages and status errors. Lines describing state start with `*`,
//! errors with `!`; chat lines are `[HH:MM] sender: text`.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    time::Instant,
};

use chatty_app::App;
use chatty_client::Renderer;
use chatty_core::{ConnectionState, Message};
use chrono::{DateTime, Utc};

/// What was already printed.
#[derive(Debug, Default)]
struct Printed {
    state: Option<ConnectionState>,
    roster: Option<Vec<String>>,
    active: Option<String>,
    messages: Vec<(String, String, DateTime<Utc>)>,
    unread: BTreeMap<String, u32>,
    status: Option<String>,
}

/// Renderer writing change lines to `out`.
pub struct LineRenderer<W> {
    out: W,
    printed: Printed,
}

impl<W: Write> LineRenderer<W> {
    /// Renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, printed: Printed::default() }
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn write_state(&mut self, state: ConnectionState) -> io::Result<()> {
        if self.printed.state == Some(state) {
            return Ok(());
        }
        self.printed.state = Some(state);

        let line = match state {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting...",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "connection lost, retrying...",
        };
        writeln!(self.out, "* {line}")
    }

    fn write_roster(&mut self, roster: Vec<String>, logged_in: bool) -> io::Result<()> {
        let roster = logged_in.then_some(roster);
        if self.printed.roster == roster {
            return Ok(());
        }

        if let Some(names) = &roster {
            if names.is_empty() {
                writeln!(self.out, "* nobody else is online")?;
            } else {
                writeln!(self.out, "* online: {}", names.join(", "))?;
            }
        }
        self.printed.roster = roster;
        Ok(())
    }

    fn write_conversation(&mut self, active: Option<&str>, messages: &[Message]) -> io::Result<()> {
        let lines: Vec<_> =
            messages.iter().map(|m| (m.sender.clone(), m.content.clone(), m.timestamp)).collect();

        if self.printed.active.as_deref() != active {
            self.printed.active = active.map(str::to_string);
            self.printed.messages.clear();
            if let Some(peer) = active {
                writeln!(self.out, "* talking to {peer}")?;
            }
        }

        let start = if lines.starts_with(&self.printed.messages) {
            self.printed.messages.len()
        } else {
            // History replaced what was shown.
            if let Some(peer) = active {
                writeln!(self.out, "--- conversation with {peer} ---")?;
            }
            0
        };

        for (sender, content, timestamp) in &lines[start..] {
            writeln!(self.out, "[{}] {sender}: {content}", timestamp.format("%H:%M"))?;
        }
        self.printed.messages = lines;
        Ok(())
    }

    fn write_unread(&mut self, unread: BTreeMap<String, u32>) -> io::Result<()> {
        for (peer, count) in &unread {
            if self.printed.unread.get(peer).is_none_or(|seen| seen < count) {
                let noun = if *count == 1 { "message" } else { "messages" };
                writeln!(self.out, "* {count} unread {noun} from {peer}")?;
            }
        }
        self.printed.unread = unread;
        Ok(())
    }

    fn write_status(&mut self, status: Option<&str>) -> io::Result<()> {
        if self.printed.status.as_deref() == status {
            return Ok(());
        }
        self.printed.status = status.map(str::to_string);
        match status {
            Some(message) => writeln!(self.out, "! {message}"),
            None => Ok(()),
        }
    }

    /// Print everything that changed since the last call.
    pub fn render_app(&mut self, app: &App<Instant>) -> io::Result<()> {
        self.write_state(app.connection_state())?;
        self.write_roster(
            app.roster().map(|peer| peer.username.clone()).collect(),
            app.is_logged_in(),
        )?;
        self.write_conversation(app.active_peer(), app.active_messages())?;
        self.write_unread(app.unread_counts().map(|(peer, n)| (peer.to_string(), n)).collect())?;
        self.write_status(app.status_message())?;
        self.out.flush()
    }
}

impl<W: Write + Send + 'static> Renderer for LineRenderer<W> {
    fn render(&mut self, app: &App<Instant>) -> io::Result<()> {
        self.render_app(app)
    }
}

#[cfg(test)]
mod tests {
    use chatty_app::{AppAction, AppEvent};
    use chatty_core::{FetchError, Identity, Moment, RosterRequest, SessionConfig};
    use chatty_proto::{Command, Frame, payloads::UserPayload};
    use chrono::TimeZone;

    use super::*;

    #[allow(clippy::disallowed_methods)]
    fn now() -> Moment<Instant> {
        Moment { instant: Instant::now(), wall: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap() }
    }

    fn output(renderer: &LineRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.get_ref().clone()).unwrap()
    }

    fn roster_fetch(actions: Vec<AppAction>) -> RosterRequest {
        match actions.into_iter().find(|a| matches!(a, AppAction::FetchRoster(_))) {
            Some(AppAction::FetchRoster(request)) => request,
            _ => panic!("expected roster fetch"),
        }
    }

    fn connected(app: &mut App<Instant>) -> Vec<AppAction> {
        app.login(Identity::new("alice"));
        app.handle(AppEvent::TransportOpened { attempt: 1 }, now());
        app.handle(
            AppEvent::FrameReceived { attempt: 1, frame: Frame::new(Command::Connected) },
            now(),
        )
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
    fn prints_only_changes() {
        let mut app = App::new(SessionConfig::default());
        let mut renderer = LineRenderer::new(Vec::new());

        renderer.render_app(&app).unwrap();
        renderer.render_app(&app).unwrap();
        assert_eq!(output(&renderer), "* disconnected\n");

        let request = roster_fetch(connected(&mut app));
        let users = vec![UserPayload::online("alice"), UserPayload::online("bob")];
        app.handle(AppEvent::RosterLoaded { request, result: Ok(users) }, now());
        renderer.render_app(&app).unwrap();

        assert_eq!(output(&renderer), "* disconnected\n* connected\n* online: bob\n");
    }

    #[test]
    fn conversation_lines_and_unread() {
        let mut app = App::new(SessionConfig::default());
        connected(&mut app);
        let mut renderer = LineRenderer::new(Vec::new());
        renderer.render_app(&app).unwrap();

        app.handle(inbox("carol", "psst"), now());
        renderer.render_app(&app).unwrap();

        app.select_peer("bob");
        app.handle(inbox("bob", "hello"), now());
        renderer.render_app(&app).unwrap();

        assert_eq!(
            output(&renderer),
            "* connected\n\
             * nobody else is online\n\
             * 1 unread message from carol\n\
             * talking to bob\n\
             [09:30] bob: hello\n"
        );
    }

    #[test]
    fn status_errors_are_printed_once() {
        let mut app = App::new(SessionConfig::default());
        let request = roster_fetch(connected(&mut app));
        let mut renderer = LineRenderer::new(Vec::new());

        let error = FetchError::Status { status: 500 };
        app.handle(AppEvent::RosterLoaded { request, result: Err(error.clone()) }, now());
        renderer.render_app(&app).unwrap();
        renderer.render_app(&app).unwrap();

        assert_eq!(
            output(&renderer),
            format!("* connected\n* nobody else is online\n! Could not load users: {error}\n")
        );
    }
}
