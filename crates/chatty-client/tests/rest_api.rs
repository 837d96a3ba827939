//! REST client against canned HTTP replies.

#![allow(clippy::unwrap_used, clippy::panic, reason = "Tests")]

mod support;

use chatty_client::{AuthError, ClientConfig, RestClient};
use chatty_core::FetchError;
use support::{Backend, Reply};

fn client_for(backend: &Backend) -> RestClient {
    RestClient::new(ClientConfig::new(&backend.http_url()).unwrap()).unwrap()
}

#[tokio::test]
async fn register_sends_all_fields_and_keeps_cookie() {
    let mut backend = Backend::start(
        vec![(
            "POST /api/auth/register",
            Reply::json(r#"{"username":"carol"}"#).with_header("set-cookie", "SESSION=c1; Path=/"),
        )],
        false,
    )
    .await;
    let client = client_for(&backend);

    let identity = client.register("carol", "carol@example.com", "pw").await.unwrap();

    assert_eq!(identity.username(), "carol");
    assert_eq!(identity.session_token(), Some("SESSION=c1"));
    let seen = backend.next_request().await;
    let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(body["email"], "carol@example.com");
    assert_eq!(body["password"], "pw");
}

#[tokio::test]
async fn rejected_login_and_register_report_reason() {
    let backend = Backend::start(
        vec![
            ("POST /api/auth/login", Reply::status(401)),
            ("POST /api/auth/register", Reply {
                status: 409,
                headers: Vec::new(),
                body: "Username already taken".into(),
            }),
        ],
        false,
    )
    .await;
    let client = client_for(&backend);

    match client.login("alice", "wrong").await {
        Err(AuthError::Rejected { status: 401, reason }) => assert_eq!(reason, "invalid credentials"),
        other => panic!("expected rejection, got {other:?}"),
    }
    match client.register("alice", "a@x.io", "pw").await {
        Err(AuthError::Rejected { status: 409, reason }) => {
            assert_eq!(reason, "Username already taken");
        },
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn me_is_none_when_unauthenticated_or_unreachable() {
    let backend = Backend::start(vec![("GET /api/auth/me", Reply::status(403))], false).await;
    assert_eq!(client_for(&backend).me().await, None);

    let dead = format!("http://{}", support::dead_addr().await);
    let offline = RestClient::new(ClientConfig::new(&dead).unwrap()).unwrap();
    assert_eq!(offline.me().await, None);
}

#[tokio::test]
async fn me_resumes_session() {
    let backend =
        Backend::start(vec![("GET /api/auth/me", Reply::json(r#"{"username":"dave"}"#))], false)
            .await;

    let identity = client_for(&backend).me().await.unwrap();
    assert_eq!(identity.username(), "dave");
}

#[tokio::test]
async fn fetch_errors_are_classified() {
    let backend = Backend::start(
        vec![
            ("GET /users", Reply::json("not json")),
            ("GET /messages/alice/bob", Reply::status(500)),
        ],
        false,
    )
    .await;
    let client = client_for(&backend);

    assert!(matches!(client.fetch_roster().await, Err(FetchError::Decode(_))));
    assert_eq!(
        client.fetch_history("alice", "bob").await,
        Err(FetchError::Status { status: 500 })
    );

    let dead = format!("http://{}", support::dead_addr().await);
    let offline = RestClient::new(ClientConfig::new(&dead).unwrap()).unwrap();
    assert!(matches!(offline.fetch_roster().await, Err(FetchError::Request(_))));
}

#[tokio::test]
async fn history_path_encodes_usernames() {
    let mut backend =
        Backend::start(vec![("GET /messages/alice/bob%20smith", Reply::json("[]"))], false).await;

    let history = client_for(&backend).fetch_history("alice", "bob smith").await.unwrap();

    assert!(history.is_empty());
    assert_eq!(backend.next_request().await.path, "/messages/alice/bob%20smith");
}

#[tokio::test]
async fn logout_posts_with_session_cookie() {
    let mut backend = Backend::start(
        vec![
            (
                "POST /api/auth/login",
                Reply::json(r#"{"username":"alice"}"#)
                    .with_header("set-cookie", "SESSION=s9; Path=/"),
            ),
            ("POST /api/auth/logout", Reply::status(200)),
        ],
        false,
    )
    .await;
    let client = client_for(&backend);
    client.login("alice", "pw").await.unwrap();

    client.logout().await.unwrap();

    let _login = backend.next_request().await;
    let logout = backend.next_request().await;
    assert_eq!(logout.path, "/api/auth/logout");
    assert_eq!(logout.cookie.as_deref(), Some("SESSION=s9"));
}
