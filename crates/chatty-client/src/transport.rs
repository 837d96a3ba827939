//! Websocket transport for STOMP frames.
//!
//! [`connect`] spawns one task per attempt that owns the socket. The task
//! reports its lifecycle to the runtime as [`AppEvent`]s tagged with the
//! attempt number, and writes outbound frames on behalf of
//! [`Connection::send`]. This is a thin layer that only moves frames;
//! protocol logic stays in the Sans-IO session core.
//!
//! Every write is bounded by [`Timeouts::write`]. A peer that stops reading
//! fails the attempt instead of stalling the runtime, and a local close
//! interrupts a write in progress.

use std::time::Duration;

use chatty_app::AppEvent;
use chatty_core::TransportError;
use chatty_proto::Frame;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::COOKIE},
    },
};
use tokio_util::sync::CancellationToken;

/// Frames queued for the writer before `send` applies back-pressure.
const OUTBOUND_CAPACITY: usize = 64;

/// Time limits of one transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed for the websocket upgrade
    pub connect: Duration,
    /// Time allowed for one frame to reach the socket, queueing included
    pub write: Duration,
}

type Outbound = (String, oneshot::Sender<Result<(), TransportError>>);

/// Handle to one transport attempt.
///
/// Clones share the socket. Dropping every handle does not close it; call
/// [`Connection::close`].
#[derive(Debug, Clone)]
pub struct Connection {
    attempt: u64,
    write_timeout: Duration,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl Connection {
    /// Attempt this connection belongs to.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Write a frame and wait until it reached the socket.
    ///
    /// Frames sent before the socket opened are written once it does.
    ///
    /// # Errors
    ///
    /// - `TransportError::Encode` if the frame cannot be encoded
    /// - `TransportError::Closed` if the socket closed before the write
    /// - `TransportError::Send` if the write failed or did not finish within
    ///   the write timeout
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let text = frame.encode()?;
        let (ack, written) = oneshot::channel();

        let delivered = async {
            self.outbound.send((text, ack)).await.map_err(|_| TransportError::Closed)?;
            written.await.map_err(|_| TransportError::Closed)?
        };
        tokio::time::timeout(self.write_timeout, delivered).await.map_err(|_| {
            TransportError::Send(format!("frame not written within {:?}", self.write_timeout))
        })?
    }

    /// Close the socket. No failure is reported for a local close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the socket task has finished or was told to.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }
}

/// Open a websocket to `url` for `attempt`.
///
/// `session_token` is sent as the `Cookie` header of the upgrade request.
/// Lifecycle and inbound frames are reported on `events`:
///
/// - [`AppEvent::TransportOpened`] once the upgrade completed
/// - [`AppEvent::FrameReceived`] for every decoded frame
/// - [`AppEvent::TransportFailed`] if the open fails or the socket is lost
pub fn connect(
    url: &Url,
    session_token: Option<&str>,
    attempt: u64,
    timeouts: Timeouts,
    events: mpsc::UnboundedSender<AppEvent>,
) -> Connection {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let cancel = CancellationToken::new();

    let request = build_request(url, session_token);
    let task = SocketTask { attempt, events, cancel: cancel.clone(), timeouts };
    tokio::spawn(task.run(request, outbound_rx));

    Connection { attempt, write_timeout: timeouts.write, outbound: outbound_tx, cancel }
}

type UpgradeRequest = tokio_tungstenite::tungstenite::handshake::client::Request;

fn build_request(url: &Url, session_token: Option<&str>) -> Result<UpgradeRequest, TransportError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::Connection(format!("invalid websocket url: {e}")))?;

    if let Some(token) = session_token {
        let value = HeaderValue::from_str(token)
            .map_err(|e| TransportError::Connection(format!("invalid session token: {e}")))?;
        request.headers_mut().insert(COOKIE, value);
    }
    Ok(request)
}

struct SocketTask {
    attempt: u64,
    events: mpsc::UnboundedSender<AppEvent>,
    cancel: CancellationToken,
    timeouts: Timeouts,
}

impl SocketTask {
    async fn run(
        self,
        request: Result<UpgradeRequest, TransportError>,
        mut outbound: mpsc::Receiver<Outbound>,
    ) {
        let request = match request {
            Ok(request) => request,
            Err(error) => return self.fail(error),
        };

        let connect_timeout = self.timeouts.connect;
        let opened = tokio::select! {
            () = self.cancel.cancelled() => return,
            opened = tokio::time::timeout(connect_timeout, connect_async(request)) => opened,
        };
        let stream = match opened {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return self.fail(TransportError::Connection(e.to_string())),
            Err(_) => {
                let reason = format!("no upgrade within {connect_timeout:?}");
                return self.fail(TransportError::Connection(reason));
            },
        };

        tracing::debug!(attempt = self.attempt, "Websocket open");
        self.emit(AppEvent::TransportOpened { attempt: self.attempt });

        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(attempt = self.attempt, "Close frame not sent: {e}");
                    }
                    tracing::debug!(attempt = self.attempt, "Websocket closed locally");
                    return;
                },

                Some((text, ack)) = outbound.recv() => {
                    let written = tokio::select! {
                        // A peer that stopped reading must not pin the task.
                        () = self.cancel.cancelled() => {
                            tracing::debug!(attempt = self.attempt, "Websocket closed during write");
                            return;
                        },
                        written = tokio::time::timeout(
                            self.timeouts.write,
                            write.send(Message::Text(text)),
                        ) => written,
                    };

                    let error = match written {
                        Ok(Ok(())) => {
                            // Nobody waiting is fine.
                            let _ = ack.send(Ok(()));
                            continue;
                        },
                        Ok(Err(e)) => TransportError::Send(e.to_string()),
                        Err(_) => TransportError::Send(format!(
                            "write stalled for {:?}",
                            self.timeouts.write
                        )),
                    };
                    let _ = ack.send(Err(error.clone()));
                    return self.fail(error);
                },

                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.deliver(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => self.deliver(&data),
                    Some(Ok(Message::Close(_))) | None => return self.fail(TransportError::Closed),
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        tracing::debug!(attempt = self.attempt, "Websocket error: {e}");
                        return self.fail(TransportError::Closed);
                    },
                },
            }
        }
    }

    fn deliver(&self, bytes: &[u8]) {
        match Frame::decode(bytes) {
            Ok(Some(frame)) => self.emit(AppEvent::FrameReceived { attempt: self.attempt, frame }),
            Ok(None) => {},
            Err(e) => tracing::warn!(attempt = self.attempt, "Dropping undecodable frame: {e}"),
        }
    }

    fn fail(&self, error: TransportError) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!(attempt = self.attempt, %error, "Transport failed");
        self.cancel.cancel();
        self.emit(AppEvent::TransportFailed { attempt: self.attempt, error });
    }

    fn emit(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(attempt = self.attempt, "Runtime gone, dropping transport event");
        }
    }
}
