//! REST backend: authentication, roster and history snapshots.
//!
//! All requests share one cookie jar, so the session cookie set by `login`
//! or `register` is presented on every later request and can be handed to
//! the websocket upgrade as the identity's session token.

use std::sync::Arc;

use chatty_core::{FetchError, Identity};
use chatty_proto::payloads::{self, ChatMessagePayload, UserPayload};
use reqwest::{
    Client, Response, StatusCode,
    cookie::{CookieStore, Jar},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClientConfig;

/// Authentication failures.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Server refused the credentials or the registration
    #[error("rejected by server ({status}): {reason}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, or a generic reason if it was empty
        reason: String,
    },

    /// Request could not be sent or no response arrived
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// The authenticated user as reported by the auth API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    /// Login name
    pub username: String,
    /// Email address, if the server reports one
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// HTTP client for the backend's REST API.
///
/// Cheap to clone: clones share the connection pool and the cookie jar.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    jar: Arc<Jar>,
    config: Arc<ClientConfig>,
}

impl RestClient {
    /// Client for the backend described by `config`.
    pub fn new(config: ClientConfig) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, jar, config: Arc::new(config) })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Log in with a username and password.
    ///
    /// On success the session cookie is stored and attached to the returned
    /// identity.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let url = self.config.endpoint(["api", "auth", "login"]);
        let response =
            self.http.post(url).json(&LoginRequest { username, password }).send().await?;

        let response = check_auth(response, "invalid credentials").await?;
        let user = decode_user(response).await?;
        tracing::info!(username = %user.username, "Logged in");
        Ok(self.identity_for(user))
    }

    /// Create an account and log in with it.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let url = self.config.endpoint(["api", "auth", "register"]);
        let request = RegisterRequest { username, email, password };
        let response = self.http.post(url).json(&request).send().await?;

        let response = check_auth(response, "registration failed").await?;
        let user = decode_user(response).await?;
        tracing::info!(username = %user.username, "Registered");
        Ok(self.identity_for(user))
    }

    /// End the server-side session.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let url = self.config.endpoint(["api", "auth", "logout"]);
        let response = self.http.post(url).send().await?;
        check_auth(response, "logout failed").await?;
        Ok(())
    }

    /// Resume an existing session.
    ///
    /// Returns `None` if the session is not authenticated or the server is
    /// unreachable.
    pub async fn me(&self) -> Option<Identity> {
        let url = self.config.endpoint(["api", "auth", "me"]);
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Session check failed: {e}");
                return None;
            },
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Not authenticated");
            return None;
        }
        match decode_user(response).await {
            Ok(user) => Some(self.identity_for(user)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable session check response: {e}");
                None
            },
        }
    }

    /// Cookie header the server set for this client, if any.
    pub fn session_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.config.server)?;
        cookies.to_str().ok().map(str::to_string)
    }

    /// Snapshot of the connected users (`GET /users`).
    pub async fn fetch_roster(&self) -> Result<Vec<UserPayload>, FetchError> {
        let url = self.config.endpoint(["users"]);
        self.get_json(url).await
    }

    /// Full history between `owner` and `peer`
    /// (`GET /messages/{owner}/{peer}`).
    pub async fn fetch_history(
        &self,
        owner: &str,
        peer: &str,
    ) -> Result<Vec<ChatMessagePayload>, FetchError> {
        let url = self.config.endpoint(["messages", owner, peer]);
        self.get_json(url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: reqwest::Url,
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Request(e.to_string()))?;
        payloads::from_json(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn identity_for(&self, user: AuthUser) -> Identity {
        let identity = Identity::new(user.username);
        match self.session_token() {
            Some(token) => identity.with_session_token(token),
            None => identity,
        }
    }
}

async fn check_auth(response: Response, fallback: &str) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => fallback.to_string(),
        _ if body.trim().is_empty() => fallback.to_string(),
        _ => body.trim().to_string(),
    };
    Err(AuthError::Rejected { status: status.as_u16(), reason })
}

async fn decode_user(response: Response) -> Result<AuthUser, AuthError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))
}
