//! In-process backend for loopback tests.
//!
//! One TCP listener serves both surfaces of the real backend: websocket
//! upgrades on `/ws` become a scripted STOMP broker, every other request is
//! answered from a table of canned HTTP replies.

#![allow(dead_code, reason = "Each test binary uses a subset")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test support")]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use chatty_proto::{Command, Frame};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

/// How long tests wait for anything before failing.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Canned HTTP reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self { status: 200, headers: Vec::new(), body: body.into() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: String::new() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// HTTP request as seen by the backend.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub cookie: Option<String>,
    pub body: String,
}

/// One accepted websocket.
pub struct Upgrade {
    /// `Cookie` header of the upgrade request
    pub cookie: Option<String>,
    frames: mpsc::UnboundedReceiver<Frame>,
    push: mpsc::UnboundedSender<Message>,
}

impl Upgrade {
    /// Next frame the client wrote, `None` once the socket closed.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(PATIENCE, self.frames.recv()).await.expect("no frame from client")
    }

    /// Skip frames until one matches.
    pub async fn frame_where(&mut self, pred: impl Fn(&Frame) -> bool) -> Frame {
        loop {
            let frame = self.next_frame().await.expect("socket closed");
            if pred(&frame) {
                return frame;
            }
        }
    }

    pub fn push_frame(&self, frame: &Frame) {
        self.push_raw(Message::Text(frame.encode().unwrap()));
    }

    pub fn push_raw(&self, message: Message) {
        self.push.send(message).unwrap();
    }

    pub fn close(&self) {
        self.push_raw(Message::Close(None));
    }
}

struct Shared {
    routes: HashMap<String, Reply>,
    ack_connect: bool,
    upgrades: mpsc::UnboundedSender<Upgrade>,
    requests: mpsc::UnboundedSender<Seen>,
}

pub struct Backend {
    pub addr: SocketAddr,
    upgrades: mpsc::UnboundedReceiver<Upgrade>,
    requests: mpsc::UnboundedReceiver<Seen>,
}

impl Backend {
    /// Start serving `routes`, keyed by `"METHOD /path"`.
    ///
    /// With `ack_connect` the broker answers `CONNECT` with `CONNECTED`.
    pub async fn start(routes: Vec<(&str, Reply)>, ack_connect: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (upgrades_tx, upgrades) = mpsc::unbounded_channel();
        let (requests_tx, requests) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            routes: routes.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ack_connect,
            upgrades: upgrades_tx,
            requests: requests_tx,
        });

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self { addr, upgrades, requests }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> Url {
        Url::parse(&format!("ws://{}/ws", self.addr)).unwrap()
    }

    pub async fn next_upgrade(&mut self) -> Upgrade {
        tokio::time::timeout(PATIENCE, self.upgrades.recv())
            .await
            .expect("no websocket upgrade")
            .expect("backend gone")
    }

    pub async fn next_request(&mut self) -> Seen {
        tokio::time::timeout(PATIENCE, self.requests.recv())
            .await
            .expect("no http request")
            .expect("backend gone")
    }
}

/// Address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Some(head) = peek_head(&stream).await else {
        return;
    };
    if head.starts_with("GET /ws") {
        serve_ws(stream, &shared).await;
    } else {
        serve_http(stream, &head, &shared).await;
    }
}

async fn peek_head(stream: &TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = stream.peek(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        if let Some(end) = text.find("\r\n\r\n") {
            return Some(text[..end + 4].to_string());
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

async fn serve_http(mut stream: TcpStream, head: &str, shared: &Shared) {
    let content_length: usize =
        header(head, "content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut raw = vec![0u8; head.len() + content_length];
    if stream.read_exact(&mut raw).await.is_err() {
        return;
    }
    let body = String::from_utf8_lossy(&raw[head.len()..]).into_owned();

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let cookie = header(head, "cookie").map(str::to_string);

    let reply = shared
        .routes
        .get(&format!("{method} {path}"))
        .cloned()
        .unwrap_or_else(|| Reply::status(404));
    let _ = shared.requests.send(Seen { method, path, cookie, body });

    let mut out = format!("HTTP/1.1 {} Canned\r\n", reply.status);
    out.push_str("content-type: application/json\r\n");
    for (name, value) in &reply.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("content-length: {}\r\nconnection: close\r\n\r\n", reply.body.len()));
    out.push_str(&reply.body);

    let _ = stream.write_all(out.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn serve_ws(stream: TcpStream, shared: &Shared) {
    let cookie = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&cookie);
    let capture = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let value = request
            .headers()
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *seen.lock().unwrap() = value;
        Ok(response)
    };

    let Ok(mut socket) = accept_hdr_async(stream, capture).await else {
        return;
    };

    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (push, mut pushed) = mpsc::unbounded_channel();
    let cookie = cookie.lock().unwrap().take();
    let _ = shared.upgrades.send(Upgrade { cookie, frames, push });

    loop {
        tokio::select! {
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Ok(Some(frame)) = Frame::decode(text.as_bytes()) else {
                        continue;
                    };
                    if shared.ack_connect && frame.command == Command::Connect {
                        let ack = Frame::new(Command::Connected).with_header("version", "1.2");
                        let _ = socket.send(Message::Text(ack.encode().unwrap())).await;
                    }
                    let _ = frames_tx.send(frame);
                },
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {},
            },
            Some(message) = pushed.recv() => {
                let closing = matches!(message, Message::Close(_));
                let _ = socket.send(message).await;
                if closing {
                    return;
                }
            },
        }
    }
}
