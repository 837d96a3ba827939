//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
///
/// None of these are fatal to a session: the offending frame or payload is
/// dropped and the connection carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame command line is not a known STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Input ended before the header block was terminated.
    #[error("frame truncated before end of headers")]
    Truncated,

    /// Header line without a `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Header contains an undefined escape sequence.
    #[error("invalid escape sequence in header {0:?}")]
    InvalidEscape(String),

    /// `content-length` header is not a non-negative integer.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Body is shorter than `content-length` claims.
    #[error("body truncated: content-length {declared}, got {actual} bytes")]
    BodyTruncated {
        /// Length declared by the header
        declared: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Body is not followed by the NUL terminator.
    #[error("frame body not terminated by NUL")]
    MissingNul,

    /// Body exceeds [`crate::Frame::MAX_BODY_SIZE`].
    #[error("frame body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Actual body size
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Frame text or body is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// Required header missing for this command.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// JSON body could not be (de)serialized.
    #[error("invalid JSON payload: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
