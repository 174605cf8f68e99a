//! WebSocket error types.

use crate::config::ConfigError;
use crate::websocket::frame::CloseCode;
use std::io;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type WebSocketResult<T> = Result<T, WebSocketError>;

/// A frame or message that breaks RFC 6455. Always fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// RSV1-3 set without a negotiated extension.
    #[error("reserved bits used without a negotiated extension")]
    ReservedBitsUsed,

    /// Opcode in 0x3-0x7 or 0xB-0xF.
    #[error("reserved opcode used: {0:#x}")]
    ReservedOpcodeUsed(u8),

    /// Control frame with FIN clear.
    #[error("control frame must not be fragmented")]
    ControlFrameFragmented,

    /// Control frame declaring more than 125 payload bytes.
    #[error("control frame payload too large: length field {declared} (max 125)")]
    PayloadTooLarge {
        /// The 7-bit length field that was declared.
        declared: u8,
    },

    /// 64-bit length with its most significant bit set.
    #[error("payload length {0} exceeds 2^63 - 1")]
    PayloadLengthOverflow(u64),

    /// Frame payload above the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared payload length.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Reassembled message above the configured limit.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Accumulated size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Continuation frame with no message in progress.
    #[error("continuation frame without a preceding text or binary frame")]
    UnexpectedContinuation,

    /// New text/binary frame while a fragmented message is still open.
    #[error("new data frame while a fragmented message is in progress")]
    ExpectedContinuation,

    /// Client frame arrived without a mask.
    #[error("client frame is not masked")]
    UnmaskedFrame,

    /// Server frame arrived with a mask.
    #[error("server frame is masked")]
    MaskedFrame,

    /// Close frame with a 1-byte payload or a non-UTF-8 reason.
    #[error("invalid close frame payload")]
    InvalidClosePayload,

    /// Close code that must not appear on the wire.
    #[error("invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Text message that is not UTF-8.
    #[error("invalid UTF-8 in text message")]
    InvalidUtf8,
}

impl ProtocolViolation {
    /// Close status code to send when failing the connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::FrameTooLarge { .. } | Self::MessageTooLarge { .. } => CloseCode::MessageTooBig,
            Self::InvalidUtf8 => CloseCode::InvalidData,
            _ => CloseCode::Protocol,
        }
    }
}

/// Reasons a server refuses an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Request method other than GET.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Resource path not served.
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Malformed request or missing/invalid upgrade headers.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Server at capacity.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl Rejection {
    /// HTTP status for the rejection response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotAllowed(_) => 405,
            Self::Forbidden(_) => 403,
            Self::BadRequest(_) => 400,
            Self::ServiceUnavailable(_) => 503,
        }
    }
}

/// Client-side failures while verifying the server's `101` response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Status line did not carry `101`.
    #[error("unexpected handshake status: {0}")]
    UnexpectedStatus(u16),

    /// A required header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// A required header has the wrong value.
    #[error("invalid value for header {name}: {value}")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// Value received.
        value: String,
    },

    /// `Sec-WebSocket-Accept` does not match the key we sent.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch {
        /// Value computed from the sent key.
        expected: String,
        /// Value the server returned.
        actual: String,
    },

    /// Response head could not be parsed.
    #[error("malformed handshake response: {0}")]
    Malformed(String),
}

/// Errors surfaced by the public WebSocket APIs.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server refused the upgrade.
    #[error("upgrade rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Client handshake verification failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Protocol violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Connection is closing or closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Control frame payload above 125 bytes.
    #[error("control frame payload too large: {0} bytes (max 125)")]
    ControlPayloadTooLarge(usize),

    /// HTTP head exceeded the configured size.
    #[error("handshake head exceeds {max} bytes")]
    HeadTooLarge {
        /// Configured maximum.
        max: usize,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
