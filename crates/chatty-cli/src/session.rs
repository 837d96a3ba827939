//! Session lifecycle of the terminal client.
//!
//! Authenticates over REST, runs the client runtime until the user quits and
//! ends the server-side session afterwards. Commands are read on a dedicated
//! thread because a blocking stdin read cannot be cancelled.

use std::{io, thread};

use chatty_app::{Runtime, UserCommand};
use chatty_client::{
    AuthError, ClientConfig, ConfigError, DriverError, NetworkDriver, RestClient,
};
use chatty_core::Identity;
use thiserror::Error;

use crate::{input, render::LineRenderer};

/// Errors that end the client.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid server URL or settings.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Login, registration or session check failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// No password given and no session to resume.
    #[error("not authenticated; pass --password or set CHATTY_PASSWORD")]
    NotAuthenticated,

    /// Server answered for a different user than requested.
    #[error("server authenticated {actual:?}, expected {expected:?}")]
    WrongUser {
        /// Username that was requested
        expected: String,
        /// Username the server reported
        actual: String,
    },

    /// Driver failure, usually the terminal going away.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Input thread could not be started.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How to authenticate.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Log in to an existing account.
    Login {
        /// Account name
        username: String,
        /// Password
        password: String,
    },
    /// Create an account, then use it.
    Register {
        /// Account name
        username: String,
        /// Email address
        email: String,
        /// Password
        password: String,
    },
    /// Resume an existing server session.
    Resume {
        /// Account name the session must belong to
        username: String,
    },
}

impl Credentials {
    /// Authenticate and return the identity to log in with.
    pub async fn authenticate(&self, rest: &RestClient) -> Result<Identity, RuntimeError> {
        let (expected, identity) = match self {
            Self::Login { username, password } => (username, rest.login(username, password).await?),
            Self::Register { username, email, password } => {
                (username, rest.register(username, email, password).await?)
            },
            Self::Resume { username } => {
                (username, rest.me().await.ok_or(RuntimeError::NotAuthenticated)?)
            },
        };

        if identity.username() != expected {
            return Err(RuntimeError::WrongUser {
                expected: expected.clone(),
                actual: identity.username().to_string(),
            });
        }
        Ok(identity)
    }
}

/// Authenticate, chat until the user quits, then log out.
pub async fn run(config: ClientConfig, credentials: &Credentials) -> Result<(), RuntimeError> {
    let rest = RestClient::new(config.clone())?;
    let identity = credentials.authenticate(&rest).await?;
    tracing::info!(username = identity.username(), server = %config.server, "Authenticated");

    let driver = NetworkDriver::new(rest.clone(), LineRenderer::new(io::stdout()))?;
    let commands = driver.commands();
    commands.send(UserCommand::Login(identity.clone()));

    let input_commands = commands.clone();
    thread::Builder::new().name("chatty-input".to_string()).spawn(move || {
        let mut feedback = io::stderr();
        let stdin = io::stdin().lock();
        if let Err(e) = input::forward_lines(stdin, &identity, &input_commands, &mut feedback) {
            tracing::warn!("Input failed: {e}");
            input_commands.send(UserCommand::Quit);
        }
    })?;

    Runtime::new(driver, config.session_config()).run().await?;

    if let Err(e) = rest.logout().await {
        tracing::warn!("Server-side logout failed: {e}");
    }
    Ok(())
}
