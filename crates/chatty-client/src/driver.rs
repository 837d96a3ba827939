//! Production driver.
//!
//! [`NetworkDriver`] implements [`Driver`] on top of the websocket
//! transport and the REST client. Everything slow runs in spawned tasks that
//! report back through one event channel, so the runtime only ever waits in
//! [`Driver::poll_event`] and on frame writes.

use std::{io, time::Duration};

use chatty_app::{App, AppEvent, Driver, UserCommand};
use chatty_core::{HistoryRequest, Identity, RosterRequest, TransportError};
use chatty_proto::Frame;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConfigError,
    rest::RestClient,
    system_env::SystemEnv,
    transport::{self, Connection, Timeouts},
};

/// Presents application state to the user.
pub trait Renderer: Send + 'static {
    /// Render the current state.
    ///
    /// Called after every state change.
    fn render(&mut self, app: &App<std::time::Instant>) -> io::Result<()>;
}

/// Driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Renderer could not write its output.
    #[error("render failed: {0}")]
    Render(#[from] io::Error),
}

/// Submits user commands to a running [`NetworkDriver`].
#[derive(Debug, Clone)]
pub struct CommandSender(mpsc::UnboundedSender<AppEvent>);

impl CommandSender {
    /// Queue a command. Returns `false` once the driver is gone.
    pub fn send(&self, command: UserCommand) -> bool {
        self.0.send(AppEvent::Command(command)).is_ok()
    }
}

/// Driver for real network I/O.
pub struct NetworkDriver<R> {
    env: SystemEnv,
    rest: RestClient,
    ws_url: Url,
    timeouts: Timeouts,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    connection: Option<Connection>,
    /// Cancels every task this driver spawned
    shutdown: CancellationToken,
    renderer: R,
}

impl<R: Renderer> NetworkDriver<R> {
    /// Driver talking to the backend `rest` is configured for.
    pub fn new(rest: RestClient, renderer: R) -> Result<Self, ConfigError> {
        let ws_url = rest.config().ws_url()?;
        let timeouts = rest.config().socket_timeouts();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            env: SystemEnv::new(),
            rest,
            ws_url,
            timeouts,
            events_tx,
            events_rx,
            connection: None,
            shutdown: CancellationToken::new(),
            renderer,
        })
    }

    /// Handle for submitting user commands from another task.
    pub fn commands(&self) -> CommandSender {
        CommandSender(self.events_tx.clone())
    }

    /// Run `task` until it completes or the driver stops.
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {},
                () = task => {},
            }
        });
    }
}

fn emit(events: &mpsc::UnboundedSender<AppEvent>, event: AppEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Runtime gone, dropping event");
    }
}

impl<R: Renderer> Driver for NetworkDriver<R> {
    type Error = DriverError;
    type Env = SystemEnv;

    fn env(&self) -> &SystemEnv {
        &self.env
    }

    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, DriverError>> + Send {
        let events = &mut self.events_rx;
        async move { Ok(events.recv().await) }
    }

    fn open_transport(&mut self, identity: &Identity, attempt: u64) {
        self.close_transport();
        tracing::info!(attempt, url = %self.ws_url, "Opening transport");

        let connection = transport::connect(
            &self.ws_url,
            identity.session_token(),
            attempt,
            self.timeouts,
            self.events_tx.clone(),
        );
        self.connection = Some(connection);
    }

    fn send_frame(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let connection = self.connection.clone();
        async move {
            match connection {
                Some(connection) => connection.send(frame).await,
                None => Err(TransportError::NotConnected),
            }
        }
    }

    fn close_transport(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(attempt = connection.attempt(), "Closing transport");
            connection.close();
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration, attempt: u64, cancel: CancellationToken) {
        tracing::info!(attempt, ?delay, "Reconnect scheduled");
        let events = self.events_tx.clone();

        self.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(attempt, "Reconnect cancelled");
                },
                () = tokio::time::sleep(delay) => {
                    emit(&events, AppEvent::ReconnectDue { attempt });
                },
            }
        });
    }

    fn fetch_history(&mut self, owner: &str, request: HistoryRequest) {
        let rest = self.rest.clone();
        let owner = owner.to_string();
        let events = self.events_tx.clone();

        self.spawn(async move {
            let result = rest.fetch_history(&owner, request.peer()).await;
            if let Err(error) = &result {
                tracing::warn!(peer = request.peer(), %error, "History fetch failed");
            }
            emit(&events, AppEvent::HistoryLoaded { request, result });
        });
    }

    fn fetch_roster(&mut self, request: RosterRequest) {
        let rest = self.rest.clone();
        let events = self.events_tx.clone();

        self.spawn(async move {
            let result = rest.fetch_roster().await;
            if let Err(error) = &result {
                tracing::warn!(seq = request.seq(), %error, "Roster fetch failed");
            }
            emit(&events, AppEvent::RosterLoaded { request, result });
        });
    }

    fn render(&mut self, app: &App<std::time::Instant>) -> Result<(), DriverError> {
        self.renderer.render(app)?;
        Ok(())
    }

    fn stop(&mut self) {
        self.close_transport();
        self.shutdown.cancel();
    }
}
