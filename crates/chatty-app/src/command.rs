//! User commands.
//!
//! Intents the [`crate::App`] executes, and the line syntax used by text
//! frontends:
//!
//! | Input            | Command                    |
//! |------------------|----------------------------|
//! | `/select <peer>` | open the conversation      |
//! | `/users`         | refresh the online roster  |
//! | `/logout`        | end the session            |
//! | `/quit`          | end the session and exit   |
//! | anything else    | send to the active peer    |

use chatty_core::Identity;
use thiserror::Error;

/// Intent submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Start a session for an authenticated identity
    Login(Identity),
    /// End the session and clear all state
    Logout,
    /// Open the conversation with a peer
    Select(String),
    /// Send a message to the active peer
    Send(String),
    /// Re-pull the online roster
    RefreshRoster,
    /// End the session and exit
    Quit,
}

/// Input line that is not a valid command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Blank line
    #[error("empty input")]
    Empty,

    /// Slash command this client does not know
    #[error("unknown command: {0}")]
    Unknown(String),

    /// Command given without its required argument
    #[error("/{command} requires {argument}")]
    MissingArgument {
        /// Command name without the slash
        command: &'static str,
        /// Description of the missing argument
        argument: &'static str,
    },
}

impl UserCommand {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let text = line.trim();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }
        if !text.starts_with('/') {
            return Ok(Self::Send(text.to_string()));
        }

        let (command, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let rest = rest.trim();

        match command {
            "/select" if rest.is_empty() => {
                Err(CommandError::MissingArgument { command: "select", argument: "a username" })
            },
            "/select" => Ok(Self::Select(rest.to_string())),
            "/users" => Ok(Self::RefreshRoster),
            "/logout" => Ok(Self::Logout),
            "/quit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
