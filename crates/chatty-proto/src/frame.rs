//! STOMP frame type.
//!
//! A `Frame` is the unit exchanged on the realtime channel. Layout on the
//! wire:
//!
//! ```text
//! COMMAND EOL
//! *( name:value EOL )
//! EOL
//! body NUL
//! ```
//!
//! EOL is `\n` or `\r\n`. For every command except `CONNECT` and `CONNECTED`
//! the characters `\`, LF, CR and `:` inside header names and values are
//! escaped as `\\`, `\n`, `\r` and `\c`.

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Framing header, owned by the codec.
const CONTENT_LENGTH: &str = "content-length";

/// STOMP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Client handshake (STOMP 1.2 spelling).
    Stomp,
    /// Server handshake acknowledgement.
    Connected,
    /// Publish to a destination.
    Send,
    /// Register interest in a destination.
    Subscribe,
    /// Cancel a subscription.
    Unsubscribe,
    /// Graceful client shutdown.
    Disconnect,
    /// Server delivery on a subscription.
    Message,
    /// Server acknowledgement of a `receipt` header.
    Receipt,
    /// Server-side failure. The server closes the connection afterwards.
    Error,
}

impl Command {
    const ALL: [Self; 10] = [
        Self::Connect,
        Self::Stomp,
        Self::Connected,
        Self::Send,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Disconnect,
        Self::Message,
        Self::Receipt,
        Self::Error,
    ];

    /// Wire spelling of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line. `None` if the command is unknown.
    pub fn parse(line: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == line)
    }

    /// Handshake frames carry their headers verbatim.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STOMP frame.
///
/// # Invariants
///
/// - `content-length` is never stored among the headers. [`Frame::encode`]
///   derives it from the body and [`Frame::decode`] consumes it, so a decoded
///   frame compares equal to the frame that was encoded.
/// - Header order is preserved. When a name repeats, the first occurrence wins
///   on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order, unescaped.
    headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Largest body accepted by [`Frame::encode`] and [`Frame::decode`].
    pub const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    /// Append a header. A `content-length` header is ignored.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name != CONTENT_LENGTH {
            self.headers.push((name, value.into()));
        }
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` opening a STOMP 1.2 session on virtual host `host`.
    ///
    /// Heart-beating is disabled; liveness is left to the websocket.
    pub fn connect(host: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    /// `SUBSCRIBE` to `destination` under subscription `id`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `SEND` of a JSON document to `destination`.
    pub fn send_json(destination: &str, json: String) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(json)
    }

    /// `DISCONNECT` ending the STOMP session.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// All headers in wire order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// `subscription` header of a `MESSAGE` frame.
    pub fn subscription(&self) -> Option<&str> {
        self.header("subscription")
    }

    /// Body as UTF-8 text.
    pub fn body_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Encode as websocket text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::BodyTooLarge` if the body exceeds
    ///   [`Frame::MAX_BODY_SIZE`]
    /// - `ProtocolError::InvalidUtf8` if the body is not UTF-8
    pub fn encode(&self) -> Result<String> {
        if self.body.len() > Self::MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: self.body.len(),
                max: Self::MAX_BODY_SIZE,
            });
        }
        let body = self.body_str()?;

        let mut out = String::with_capacity(64 + body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                escape_into(name, &mut out);
                out.push(':');
                escape_into(value, &mut out);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !body.is_empty() {
            out.push_str(CONTENT_LENGTH);
            out.push(':');
            out.push_str(&body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(body);
        out.push('\0');
        Ok(out)
    }

    /// Decode one frame.
    ///
    /// Returns `None` for a heart-beat (input made only of EOLs). Leading EOLs
    /// and anything after the terminating NUL are ignored.
    ///
    /// # Errors
    ///
    /// Any structural violation of the frame grammar, see [`ProtocolError`].
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let Some(start) = bytes.iter().position(|b| !matches!(b, b'\n' | b'\r')) else {
            return Ok(None);
        };
        let input = &bytes[start..];
        let mut cursor = 0;

        let line = next_line(input, &mut cursor)?;
        let command =
            Command::parse(line).ok_or_else(|| ProtocolError::UnknownCommand(line.to_string()))?;

        let mut headers = Vec::new();
        let mut content_length = None;
        loop {
            let line = next_line(input, &mut cursor)?;
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            let (name, value) = if command.escapes_headers() {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };

            if name == CONTENT_LENGTH {
                if content_length.is_none() {
                    let declared = value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| ProtocolError::InvalidContentLength(value.clone()))?;
                    content_length = Some(declared);
                }
            } else {
                headers.push((name, value));
            }
        }

        let rest = &input[cursor..];
        let body_len = match content_length {
            Some(declared) => {
                if declared > Self::MAX_BODY_SIZE {
                    return Err(ProtocolError::BodyTooLarge {
                        size: declared,
                        max: Self::MAX_BODY_SIZE,
                    });
                }
                if rest.len() < declared {
                    return Err(ProtocolError::BodyTruncated { declared, actual: rest.len() });
                }
                if rest.get(declared) != Some(&0) {
                    return Err(ProtocolError::MissingNul);
                }
                declared
            },
            None => rest.iter().position(|b| *b == 0).ok_or(ProtocolError::MissingNul)?,
        };

        if body_len > Self::MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge { size: body_len, max: Self::MAX_BODY_SIZE });
        }

        Ok(Some(Self { command, headers, body: Bytes::copy_from_slice(&rest[..body_len]) }))
    }
}

/// Read one EOL-terminated line starting at `cursor` and advance past it.
fn next_line<'a>(input: &'a [u8], cursor: &mut usize) -> Result<&'a str> {
    let rest = &input[*cursor..];
    let end = rest.iter().position(|b| *b == b'\n').ok_or(ProtocolError::Truncated)?;
    *cursor += end + 1;

    let line = &rest[..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
