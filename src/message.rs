//! Close status codes, the close record and assembled messages.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Close payloads longer than this are treated as carrying no status.
pub const MAX_STATUS_MESSAGE: usize = 1024;

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001), e.g. server shutdown or all handles dropped.
    GoingAway,
    /// Protocol error (1002). Malformed frame or sequencing violation.
    ProtocolError,
    /// Cannot accept (1003). Data type the endpoint cannot handle.
    CannotAccept,
    /// No status code present (1005). Never sent on the wire.
    NoStatus,
    /// Abnormal closure (1006). Never sent on the wire.
    Abnormal,
    /// Inconsistent message (1007), e.g. non-UTF-8 text.
    MessageInconsistent,
    /// Generic / policy error (1008). Also used for read timeouts.
    GenericError,
    /// Message too long (1009). Oversized control frame or frame length.
    MessageTooLong,
    /// Expected extension (1010).
    ExpectedExtension,
    /// Unexpected error (1011). Unexpected I/O failure.
    UnexpectedError,
    /// TLS failure (1015). Never sent on the wire.
    TlsFailed,
}

impl CloseCode {
    /// Look up a close code by its numeric value.
    ///
    /// Returns `None` for codes outside the known set.
    #[must_use]
    pub const fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::CannotAccept,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::MessageInconsistent,
            1008 => CloseCode::GenericError,
            1009 => CloseCode::MessageTooLong,
            1010 => CloseCode::ExpectedExtension,
            1011 => CloseCode::UnexpectedError,
            1015 => CloseCode::TlsFailed,
            _ => return None,
        })
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::CannotAccept => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::MessageInconsistent => 1007,
            CloseCode::GenericError => 1008,
            CloseCode::MessageTooLong => 1009,
            CloseCode::ExpectedExtension => 1010,
            CloseCode::UnexpectedError => 1011,
            CloseCode::TlsFailed => 1015,
        }
    }

    /// Check if this close code is reserved and MUST NOT be sent in a Close frame.
    ///
    /// Reserved codes per RFC 6455 Section 7.4.1: 1005, 1006 and 1015.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(
            self,
            CloseCode::NoStatus | CloseCode::Abnormal | CloseCode::TlsFailed
        )
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Status code and reason of the first Close frame received from the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseRecord {
    /// The close status code, `None` if absent or unknown.
    pub code: Option<CloseCode>,
    /// Raw reason bytes following the code, `None` when there is no code.
    pub reason: Option<Vec<u8>>,
}

impl CloseRecord {
    /// Create a record with a code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(code),
            reason: Some(reason.into()),
        }
    }

    /// Extract code and reason from a Close frame payload.
    ///
    /// A payload shorter than two bytes, longer than [`MAX_STATUS_MESSAGE`],
    /// or carrying an unknown code yields a code-less record.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < 2 || payload.len() > MAX_STATUS_MESSAGE {
            return Self::default();
        }
        match CloseCode::from_u16(u16::from_be_bytes([payload[0], payload[1]])) {
            Some(code) => Self::new(code, &payload[2..]),
            None => Self::default(),
        }
    }

    /// The reason decoded as UTF-8, lossily.
    #[must_use]
    pub fn reason_text(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(|r| String::from_utf8_lossy(r).into_owned())
    }
}

/// Build a Close frame payload.
///
/// # Errors
///
/// - `Error::InvalidCloseReason` if a non-empty reason is given without a code
/// - `Error::InvalidCloseCode` for codes that must not be sent
pub fn encode_close_payload(code: Option<CloseCode>, reason: &[u8]) -> Result<Bytes> {
    match code {
        None if !reason.is_empty() => Err(Error::InvalidCloseReason),
        None => Ok(Bytes::new()),
        Some(code) if code.is_reserved() => Err(Error::InvalidCloseCode(code.as_u16())),
        Some(code) => {
            let mut data = BytesMut::with_capacity(2 + reason.len());
            data.put_u16(code.as_u16());
            data.put_slice(reason);
            Ok(data.freeze())
        }
    }
}

/// A complete data message assembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message (arbitrary bytes).
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Build a message from reassembled payload and the text flag of its first frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if a text message is not valid UTF-8.
    pub fn from_parts(payload: Vec<u8>, is_text: bool) -> Result<Self> {
        if is_text {
            Ok(Message::Text(String::from_utf8(payload)?))
        } else {
            Ok(Message::Binary(payload))
        }
    }

    /// Returns `true` if this is a text message.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Consume and return the payload bytes.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(data) => data,
        }
    }
}
