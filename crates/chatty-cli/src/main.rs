//! Chatty terminal client binary.
//!
//! # Usage
//!
//! ```bash
//! # Log in to an existing account
//! chatty --server http://localhost:8080 --username alice --password secret
//!
//! # Create an account first
//! chatty --server http://localhost:8080 --username bob --password pw --register --email bob@example.com
//! ```

use std::time::Duration;

use chatty_cli::{Credentials, session};
use chatty_client::ClientConfig;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chatty terminal client
#[derive(Parser, Debug)]
#[command(name = "chatty")]
#[command(about = "Line-oriented client for the Chatty messaging service")]
#[command(version)]
struct Args {
    /// Backend base URL
    #[arg(short, long, env = "CHATTY_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Account name
    #[arg(short, long, env = "CHATTY_USERNAME")]
    username: String,

    /// Password. Without one, an existing server session is resumed.
    #[arg(short, long, env = "CHATTY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Create the account before connecting
    #[arg(long, requires = "email", requires = "password")]
    register: bool,

    /// Email address for --register
    #[arg(long)]
    email: Option<String>,

    /// Seconds to wait before reconnecting after a lost connection
    #[arg(long, default_value = "5")]
    reconnect_delay: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn credentials(&self) -> Credentials {
        let username = self.username.clone();
        match (&self.password, &self.email) {
            (Some(password), Some(email)) if self.register => {
                Credentials::Register { username, email: email.clone(), password: password.clone() }
            },
            (Some(password), _) => Credentials::Login { username, password: password.clone() },
            (None, _) => Credentials::Resume { username },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = ClientConfig::new(&args.server)?;
    config.reconnect_delay = Duration::from_secs(args.reconnect_delay);

    session::run(config, &args.credentials()).await?;
    Ok(())
}
