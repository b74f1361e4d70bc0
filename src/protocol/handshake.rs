//! Upgrade handshake helpers (RFC 6455 Section 4).
//!
//! The HTTP server that accepts the connection and parses headers lives
//! outside this crate. These helpers take the parsed headers, decide whether
//! the upgrade can proceed, and produce the `101 Switching Protocols` head.
//! Only after the head has been written is the raw stream handed to
//! [`WebSocket::new`](crate::WebSocket).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsduplex::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random Sec-WebSocket-Key for a client request.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Check a server's Sec-WebSocket-Accept against the key the client sent.
#[must_use]
pub fn verify_accept(key: &str, accept: &str) -> bool {
    compute_accept_key(key) == accept.trim()
}

/// Validate that a header value does not contain CR or LF characters.
fn validate_header_value(header: &'static str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue(header));
    }
    Ok(())
}

/// Upgrade-relevant headers of a client request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// The Upgrade header value.
    pub upgrade: Option<String>,
    /// The Connection header value.
    pub connection: Option<String>,
    /// The Sec-WebSocket-Key header value.
    pub key: Option<String>,
    /// The Sec-WebSocket-Version header value.
    pub version: Option<String>,
    /// The Sec-WebSocket-Protocol values offered by the client.
    pub protocols: Vec<String>,
}

impl UpgradeRequest {
    /// Collect the upgrade headers from `(name, value)` pairs.
    ///
    /// Header names are matched case-insensitively; unknown headers are ignored.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut req = Self::default();
        for (name, value) in headers {
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "upgrade" => req.upgrade = Some(value.to_string()),
                "connection" => req.connection = Some(value.to_string()),
                "sec-websocket-key" => req.key = Some(value.to_string()),
                "sec-websocket-version" => req.version = Some(value.to_string()),
                "sec-websocket-protocol" => req.protocols.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
        req
    }

    /// Decide whether the connection may be upgraded.
    ///
    /// `subprotocol` is the sub-protocol the server insists on, if any; the
    /// client must have offered it.
    ///
    /// # Errors
    ///
    /// - `Error::UpgradeRequired` (426) without `Upgrade: websocket` and a
    ///   `Connection` header containing `upgrade`
    /// - `Error::UnsupportedVersion` (400) unless the version is `13`
    /// - `Error::MissingHeader` (400) without a key
    /// - `Error::SubprotocolNotSupported` (501) if `subprotocol` was not offered
    pub fn verify(&self, subprotocol: Option<&str>) -> Result<UpgradeResponse> {
        let upgrade_ok = self
            .upgrade
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case("websocket"));
        let connection_ok = self.connection.as_deref().is_some_and(|c| {
            c.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        if !upgrade_ok || !connection_ok {
            return Err(Error::UpgradeRequired);
        }

        match self.version.as_deref() {
            Some(WS_VERSION) => {}
            Some(other) => return Err(Error::UnsupportedVersion(other.to_string())),
            None => return Err(Error::MissingHeader("Sec-WebSocket-Version")),
        }

        let key = self
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(Error::MissingHeader("Sec-WebSocket-Key"))?;

        if let Some(proto) = subprotocol {
            if !self.protocols.iter().any(|p| p == proto) {
                return Err(Error::SubprotocolNotSupported(proto.to_string()));
            }
        }

        Ok(UpgradeResponse {
            accept: compute_accept_key(key),
            protocol: subprotocol.map(str::to_string),
        })
    }
}

/// A successful `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol (optional).
    pub protocol: Option<String>,
}

impl UpgradeResponse {
    /// HTTP status of this response.
    pub const STATUS: u16 = 101;

    /// Headers to send with the 101 status line.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Upgrade", "websocket".to_string()),
            ("Connection", "Upgrade".to_string()),
            ("Sec-WebSocket-Accept", self.accept.clone()),
        ];
        if let Some(proto) = &self.protocol {
            headers.push(("Sec-WebSocket-Protocol", proto.clone()));
        }
        headers
    }

    /// Write the HTTP response head to a buffer.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if the protocol contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        for (name, value) in self.headers() {
            validate_header_value(name, &value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}
