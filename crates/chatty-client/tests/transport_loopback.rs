//! Websocket transport against an in-process broker.

#![allow(clippy::unwrap_used, clippy::panic, reason = "Tests")]

mod support;

use std::time::Duration;

use chatty_app::AppEvent;
use chatty_client::transport::{self, Connection, Timeouts};
use chatty_core::TransportError;
use chatty_proto::{Command, Frame};
use reqwest::Url;
use support::{Backend, PATIENCE};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::tungstenite::Message;

const TIMEOUTS: Timeouts =
    Timeouts { connect: Duration::from_secs(2), write: Duration::from_secs(2) };

async fn next_event(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> AppEvent {
    tokio::time::timeout(PATIENCE, events.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn upgrade_carries_session_cookie_and_frames_flow_both_ways() {
    let mut backend = Backend::start(Vec::new(), false).await;
    let (tx, mut events) = mpsc::unbounded_channel();

    let connection =
        transport::connect(&backend.ws_url(), Some("SESSION=abc"), 7, TIMEOUTS, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 7 });

    let mut upgrade = backend.next_upgrade().await;
    assert_eq!(upgrade.cookie.as_deref(), Some("SESSION=abc"));

    connection.send(Frame::connect("localhost")).await.unwrap();
    let connect = upgrade.next_frame().await.unwrap();
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.header("accept-version"), Some("1.2"));

    let connected = Frame::new(Command::Connected).with_header("version", "1.2");
    upgrade.push_frame(&connected);
    assert_eq!(
        next_event(&mut events).await,
        AppEvent::FrameReceived { attempt: 7, frame: connected }
    );
}

#[tokio::test]
async fn frames_sent_before_open_are_written_once_open() {
    let mut backend = Backend::start(Vec::new(), false).await;
    let (tx, _events) = mpsc::unbounded_channel();
    let connection = transport::connect(&backend.ws_url(), None, 1, TIMEOUTS, tx);

    let early = tokio::spawn({
        let connection = connection.clone();
        async move { connection.send(Frame::disconnect()).await }
    });

    let mut upgrade = backend.next_upgrade().await;
    assert_eq!(upgrade.cookie, None);
    assert_eq!(early.await.unwrap(), Ok(()));
    assert_eq!(upgrade.next_frame().await.unwrap().command, Command::Disconnect);
}

#[tokio::test]
async fn server_close_reports_failure_for_the_attempt() {
    let mut backend = Backend::start(Vec::new(), false).await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let connection = transport::connect(&backend.ws_url(), None, 3, TIMEOUTS, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 3 });

    backend.next_upgrade().await.close();

    assert_eq!(
        next_event(&mut events).await,
        AppEvent::TransportFailed { attempt: 3, error: TransportError::Closed }
    );
    assert_eq!(connection.send(Frame::disconnect()).await, Err(TransportError::Closed));
}

#[tokio::test]
async fn refused_connection_reports_failure() {
    let url = Url::parse(&format!("ws://{}/ws", support::dead_addr().await)).unwrap();
    let (tx, mut events) = mpsc::unbounded_channel();
    let _connection = transport::connect(&url, None, 2, TIMEOUTS, tx);

    match next_event(&mut events).await {
        AppEvent::TransportFailed { attempt: 2, error: TransportError::Connection(_) } => {},
        other => panic!("expected connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn local_close_reports_nothing() {
    let mut backend = Backend::start(Vec::new(), false).await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let connection = transport::connect(&backend.ws_url(), None, 4, TIMEOUTS, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 4 });
    let mut upgrade = backend.next_upgrade().await;

    connection.close();

    assert_eq!(upgrade.next_frame().await, None);
    let after = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(!matches!(after, Ok(Some(_))), "unexpected event after local close: {after:?}");
    assert!(connection.is_closed());
}

#[tokio::test]
async fn undecodable_frames_and_heartbeats_are_skipped() {
    let mut backend = Backend::start(Vec::new(), false).await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let _connection = transport::connect(&backend.ws_url(), None, 5, TIMEOUTS, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 5 });
    let upgrade = backend.next_upgrade().await;

    upgrade.push_raw(Message::Text("BOGUS\n\n\0".to_string()));
    upgrade.push_raw(Message::Text("\n".to_string()));
    let receipt = Frame::new(Command::Receipt).with_header("receipt-id", "r1");
    upgrade.push_frame(&receipt);

    assert_eq!(
        next_event(&mut events).await,
        AppEvent::FrameReceived { attempt: 5, frame: receipt }
    );
}

/// Websocket peer that completes the upgrade and then never reads.
async fn stalled_peer() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/ws", listener.local_addr().unwrap())).unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        std::future::pending::<()>().await;
    });
    url
}

/// Send large frames until one fails.
async fn flood(connection: &Connection) -> TransportError {
    let body = "x".repeat(1 << 20);
    for _ in 0..256 {
        if let Err(error) = connection.send(Frame::send_json("/app/chat", body.clone())).await {
            return error;
        }
    }
    panic!("peer never stopped accepting writes");
}

#[tokio::test]
async fn stalled_peer_fails_the_write_and_the_transport() {
    let url = stalled_peer().await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let timeouts = Timeouts { write: Duration::from_millis(300), ..TIMEOUTS };
    let connection = transport::connect(&url, None, 8, timeouts, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 8 });

    let error = tokio::time::timeout(PATIENCE * 4, flood(&connection)).await.unwrap();
    assert!(matches!(error, TransportError::Send(_)), "unexpected error: {error:?}");

    match next_event(&mut events).await {
        AppEvent::TransportFailed { attempt: 8, error: TransportError::Send(_) } => {},
        other => panic!("expected write failure, got {other:?}"),
    }
    assert!(connection.is_closed());
}

#[tokio::test]
async fn close_interrupts_a_stalled_write() {
    let url = stalled_peer().await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let timeouts = Timeouts { write: Duration::from_secs(60), ..TIMEOUTS };
    let connection = transport::connect(&url, None, 9, timeouts, tx);
    assert_eq!(next_event(&mut events).await, AppEvent::TransportOpened { attempt: 9 });

    let writer = tokio::spawn({
        let connection = connection.clone();
        async move { flood(&connection).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    connection.close();

    let error = tokio::time::timeout(PATIENCE, writer).await.unwrap().unwrap();
    assert_eq!(error, TransportError::Closed);
    let after = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(!matches!(after, Ok(Some(_))), "unexpected event after local close: {after:?}");
}
