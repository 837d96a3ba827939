//! Client configuration.
//!
//! One [`ClientConfig`] describes where the backend lives and how patient the
//! client is with it. The REST endpoints and the websocket URL are derived
//! from the same server base URL, so both always talk to the same backend.

use std::time::Duration;

use chatty_core::{SessionConfig, session};
use reqwest::Url;
use thiserror::Error;

use crate::transport::Timeouts;

/// Websocket path of the STOMP endpoint.
pub const DEFAULT_WS_PATH: &str = "ws";

/// Time allowed for the websocket upgrade to complete.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for one frame to reach the socket.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a single REST request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Invalid client configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Server URL could not be parsed
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// Server URL is not `http` or `https`
    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}

/// Backend location and client timings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend (`http` or `https`)
    pub server: Url,
    /// Path of the websocket endpoint, relative to `server`
    pub ws_path: String,
    /// Fixed delay between a transport failure and the next attempt
    pub reconnect_delay: Duration,
    /// Time allowed between `CONNECT` and `CONNECTED`
    pub handshake_timeout: Duration,
    /// Time allowed for the websocket upgrade
    pub connect_timeout: Duration,
    /// Time allowed for one frame write before the transport counts as lost
    pub write_timeout: Duration,
    /// Time allowed for one REST request
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with default timings for the backend at `server`.
    pub fn new(server: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(server)
            .map_err(|e| ConfigError::InvalidUrl { url: server.to_string(), reason: e.to_string() })?;

        match url.scheme() {
            "http" | "https" => {},
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: server.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            server: url,
            ws_path: DEFAULT_WS_PATH.to_string(),
            reconnect_delay: session::DEFAULT_RECONNECT_DELAY,
            handshake_timeout: session::DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// URL of a REST endpoint below the server base.
    ///
    /// Each segment is percent-encoded, so usernames are safe to pass as-is.
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.server.clone();
        // Bases are validated in `new`, so the segments are always writable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Websocket URL: the server base with `http` mapped to `ws` and `https`
    /// to `wss`.
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.endpoint(self.ws_path.split('/').filter(|s| !s.is_empty()));
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme).map_err(|()| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        Ok(url)
    }

    /// Time limits of each websocket attempt.
    pub fn socket_timeouts(&self) -> Timeouts {
        Timeouts { connect: self.connect_timeout, write: self.write_timeout }
    }

    /// Timings and virtual host for the session state machine.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_delay: self.reconnect_delay,
            handshake_timeout: self.handshake_timeout,
            host: self.server.host_str().unwrap_or("localhost").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ws_url_follows_scheme() {
        let plain = ClientConfig::new("http://chat.example:8080").unwrap();
        assert_eq!(plain.ws_url().unwrap().as_str(), "ws://chat.example:8080/ws");

        let secure = ClientConfig::new("https://chat.example/").unwrap();
        assert_eq!(secure.ws_url().unwrap().as_str(), "wss://chat.example/ws");
    }

    #[test]
    fn endpoints_keep_base_path() {
        let config = ClientConfig::new("http://host/backend/").unwrap();

        assert_eq!(config.endpoint(["users"]).as_str(), "http://host/backend/users");
        assert_eq!(config.ws_url().unwrap().as_str(), "ws://host/backend/ws");
    }

    #[test]
    fn endpoint_segments_are_encoded() {
        let config = ClientConfig::new("http://host").unwrap();
        let url = config.endpoint(["messages", "al ice", "b/ob"]);

        assert_eq!(url.as_str(), "http://host/messages/al%20ice/b%2Fob");
    }

    #[test]
    fn rejects_non_http_servers() {
        assert_eq!(
            ClientConfig::new("ftp://host").unwrap_err(),
            ConfigError::UnsupportedScheme("ftp".into())
        );
        assert!(matches!(ClientConfig::new("not a url"), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn session_config_uses_server_host() {
        let mut config = ClientConfig::new("http://chat.example:8080").unwrap();
        config.reconnect_delay = Duration::from_secs(1);

        let session = config.session_config();
        assert_eq!(session.host, "chat.example");
        assert_eq!(session.reconnect_delay, Duration::from_secs(1));
        assert_eq!(session.handshake_timeout, session::DEFAULT_HANDSHAKE_TIMEOUT);
    }

    proptest! {
        /// Any username stays inside its own path segment.
        #[test]
        fn usernames_never_escape_their_segment(
            owner in "[a-zA-Z0-9 _%/?#-]{1,16}",
            peer in "[a-zA-Z0-9 _%/?#-]{1,16}",
        ) {
            let config = ClientConfig::new("http://host/api/").unwrap();
            let url = config.endpoint(["messages", owner.as_str(), peer.as_str()]);

            prop_assert_eq!(url.host_str(), Some("host"));
            prop_assert_eq!(url.query(), None);
            prop_assert_eq!(url.fragment(), None);
            let segments: Vec<_> = url.path_segments().unwrap().collect();
            prop_assert_eq!(segments.len(), 4);
            prop_assert_eq!(&segments[..2], &["api", "messages"]);
        }
    }
}
