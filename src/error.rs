//! Error types for the WebSocket engine.
//!
//! Protocol errors are fatal to the input half and map onto an outgoing close
//! code via [`Error::close_code`]. Handshake errors map onto an HTTP status via
//! [`Error::http_status`] and never reach the engine.

use thiserror::Error;

use crate::message::CloseCode;
use crate::protocol::OpCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Reserved bits set without negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Opcode nibble is not one of the six defined values.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Text or Binary frame received while a data message is still open.
    #[error("Unexpected start of a new message while one is still open")]
    UnexpectedStart,

    /// Continuation frame received with no open data message.
    #[error("Unexpected continuation frame")]
    UnexpectedContinuation,

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload exceeds the limit configured for its opcode.
    #[error("{opcode} payload too large: {size} bytes (max: {max})")]
    ControlFrameTooLarge {
        /// Opcode of the offending frame.
        opcode: OpCode,
        /// Declared payload size.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Frame length cannot be represented or held.
    #[error("Frame too long: {0} bytes")]
    FrameTooLong(u64),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A read or write on the underlying stream timed out.
    #[error("Operation timed out")]
    Timeout,

    /// The affected direction of the connection is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Close code that must not be sent in a Close frame.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// A close reason was given without a status code.
    #[error("Close reason requires a status code")]
    InvalidCloseReason,

    /// A pending ping was replaced or the input half closed before a Pong arrived.
    #[error("Ping abandoned before a pong was received")]
    PingAbandoned,

    /// Invalid UTF-8 in text data.
    #[error("Invalid UTF-8 in text data")]
    InvalidUtf8,

    /// Upgrade request lacks `Upgrade: websocket` / `Connection: Upgrade`.
    #[error("WebSocket upgrade required")]
    UpgradeRequired,

    /// Unsupported `Sec-WebSocket-Version`.
    #[error("Unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    /// Required handshake header missing.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Client did not offer the sub-protocol the server requires.
    #[error("Sub-protocol not supported: {0}")]
    SubprotocolNotSupported(String),

    /// Header value contains CR or LF.
    #[error("Invalid value for header {0}")]
    InvalidHeaderValue(&'static str),
}

impl Error {
    /// Close code sent to the peer when this error ends the input half.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::ReservedBitsSet
            | Error::InvalidOpcode(_)
            | Error::UnexpectedStart
            | Error::UnexpectedContinuation
            | Error::FragmentedControlFrame
            | Error::IncompleteFrame { .. } => CloseCode::ProtocolError,
            Error::ControlFrameTooLarge { .. } | Error::FrameTooLong(_) => {
                CloseCode::MessageTooLong
            }
            Error::InvalidUtf8 => CloseCode::MessageInconsistent,
            Error::Timeout => CloseCode::GenericError,
            _ => CloseCode::UnexpectedError,
        }
    }

    /// Short description carried as the reason of the outgoing Close.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Error::ReservedBitsSet => "RSVn bits non zero",
            Error::InvalidOpcode(_) => "opcode invalid",
            Error::UnexpectedStart => "unexpected frame start",
            Error::UnexpectedContinuation => "unexpected continuation",
            Error::FragmentedControlFrame => "fragmented control frame",
            Error::ControlFrameTooLarge { .. } => "control payload too long",
            Error::FrameTooLong(_) => "payload too long",
            Error::Timeout => "read frame timeout",
            _ => "unexpected reception error",
        }
    }

    /// HTTP status for a failed upgrade, `None` for non-handshake errors.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Error::UpgradeRequired => Some(426),
            Error::UnsupportedVersion(_)
            | Error::MissingHeader(_)
            | Error::InvalidHeaderValue(_) => Some(400),
            Error::SubprotocolNotSupported(_) => Some(501),
            _ => None,
        }
    }

    /// Returns `true` for malformed-frame and sequencing errors.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::ReservedBitsSet
                | Error::InvalidOpcode(_)
                | Error::UnexpectedStart
                | Error::UnexpectedContinuation
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge { .. }
                | Error::FrameTooLong(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
