//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: session state machine
//! - [`Driver`]: platform-specific I/O
//!
//! It also owns the cancellation token of the pending reconnect timer, so a
//! logout can always disarm a retry before it fires.

use std::{collections::VecDeque, time::Duration};

use chatty_core::{Environment, SessionConfig};
use tokio_util::sync::CancellationToken;

use crate::{App, AppAction, AppEvent, Driver, DriverInstant};

/// How often the runtime ticks the state machine when idle.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of one runtime step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep going
    Continue,
    /// The App asked to quit
    Quit,
    /// The driver has no more events
    Exhausted,
}

/// Generic runtime that orchestrates App and Driver.
pub struct Runtime<D: Driver> {
    driver: D,
    app: App<DriverInstant<D>>,
    /// Token of the armed reconnect timer. `None` if no retry is pending.
    reconnect: Option<CancellationToken>,
}

impl<D: Driver> Runtime<D> {
    /// Create a new runtime with the given driver and session configuration.
    pub fn new(driver: D, config: SessionConfig) -> Self {
        Self {
            driver,
            app: App::new(config),
            reconnect: None,
        }
    }

    /// Run the main event loop until the App quits or the driver runs dry.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app)?;

        loop {
            match self.step().await? {
                Step::Continue => {},
                Step::Quit | Step::Exhausted => break,
            }
        }

        self.cancel_reconnect();
        self.driver.stop();
        Ok(())
    }

    /// Process events until the driver has none left or the App quits.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run_until_idle(&mut self) -> Result<Step, D::Error> {
        loop {
            match self.step().await? {
                Step::Continue => {},
                step => return Ok(step),
            }
        }
    }

    /// Wait for one event (or an idle tick) and process it.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<Step, D::Error> {
        let env = self.driver.env().clone();

        let event = tokio::select! {
            biased;
            polled = self.driver.poll_event() => match polled? {
                Some(event) => event,
                None => return Ok(Step::Exhausted),
            },
            () = env.sleep(TICK_INTERVAL) => AppEvent::Tick,
        };

        self.dispatch(event).await
    }

    /// Feed one event to the App and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn dispatch(&mut self, event: AppEvent) -> Result<Step, D::Error> {
        if matches!(event, AppEvent::ReconnectDue { .. }) {
            self.reconnect = None;
        }

        let actions = self.app.handle(event, self.driver.env().moment());
        self.process_actions(actions).await
    }

    /// Process actions returned by the App.
    async fn process_actions(&mut self, actions: Vec<AppAction>) -> Result<Step, D::Error> {
        let mut pending: VecDeque<AppAction> = actions.into();
        let mut quit = false;

        while let Some(action) = pending.pop_front() {
            match action {
                AppAction::Render => self.driver.render(&self.app)?,
                AppAction::Quit => quit = true,
                AppAction::OpenTransport { identity, attempt } => {
                    self.driver.open_transport(&identity, attempt);
                },
                AppAction::CloseTransport => self.driver.close_transport(),
                AppAction::Transmit { frame, message } => {
                    let result = self.driver.send_frame(frame).await;
                    let followup = match (result, message) {
                        (Ok(()), Some(message)) => Some(AppEvent::MessageSent { message }),
                        (Err(error), Some(message)) => {
                            Some(AppEvent::SendFailed { message, error })
                        },
                        (Ok(()), None) => None,
                        (Err(error), None) => {
                            // The transport reports its own failure.
                            tracing::warn!("Failed to transmit frame: {error}");
                            None
                        },
                    };

                    if let Some(event) = followup {
                        let now = self.driver.env().moment();
                        pending.extend(self.app.handle(event, now));
                    }
                },
                AppAction::ScheduleReconnect { delay, attempt } => {
                    self.cancel_reconnect();
                    let token = CancellationToken::new();
                    self.reconnect = Some(token.clone());
                    self.driver.schedule_reconnect(delay, attempt, token);
                },
                AppAction::CancelReconnect => self.cancel_reconnect(),
                AppAction::FetchHistory { owner, request } => {
                    self.driver.fetch_history(&owner, request);
                },
                AppAction::FetchRoster(request) => self.driver.fetch_roster(request),
            }
        }

        Ok(if quit { Step::Quit } else { Step::Continue })
    }

    fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect.take() {
            token.cancel();
        }
    }

    /// Whether a reconnect timer is armed.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.as_ref().is_some_and(|token| !token.is_cancelled())
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App<DriverInstant<D>> {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App<DriverInstant<D>> {
        &mut self.app
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
