//! Command input.
//!
//! Reads one command per line and submits it to the running client. Lines
//! that are not valid commands are answered on the feedback writer and never
//! reach the client.
//!
//! On top of the shared line syntax, `/login` starts a new session for the
//! identity authenticated at startup, so a `/logout` can be undone.

use std::io::{self, BufRead, Write};

use chatty_app::{CommandError, UserCommand};
use chatty_client::CommandSender;
use chatty_core::Identity;

const USAGE: &str =
    "commands: /select <user>, /users, /logout, /login, /quit; anything else is sent";

/// Forward commands from `input` until it ends, the user quits or the
/// client is gone.
///
/// End of input counts as `/quit`.
pub fn forward_lines(
    input: impl BufRead,
    identity: &Identity,
    commands: &CommandSender,
    feedback: &mut impl Write,
) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim() == "/login" {
            if !commands.send(UserCommand::Login(identity.clone())) {
                return Ok(());
            }
            continue;
        }

        let command = match UserCommand::parse(&line) {
            Ok(command) => command,
            Err(CommandError::Empty) => continue,
            Err(err) => {
                writeln!(feedback, "! {err}")?;
                writeln!(feedback, "  {USAGE}")?;
                continue;
            },
        };

        let quitting = command == UserCommand::Quit;
        if !commands.send(command) || quitting {
            return Ok(());
        }
    }

    tracing::debug!("Input closed");
    commands.send(UserCommand::Quit);
    Ok(())
}
