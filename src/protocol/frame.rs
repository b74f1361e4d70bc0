//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! This module is pure: it knows the byte layout of one frame and nothing
//! about streams. The async reader and writer in [`crate::codec`] build on it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Largest payload length representable on the wire (top bit of the 64-bit field clear).
pub const MAX_PAYLOAD_LEN: u64 = i64::MAX as u64;

/// Payload lengths up to this value fit the 7-bit length field.
const LEN7_MAX: u64 = 125;

/// Payload lengths up to this value fit the 16-bit extended length field.
const LEN16_MAX: u64 = u16::MAX as u64;

/// Decoded frame header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
/// |     Extended payload length continued, if payload len == 127  |
/// + - - - - - - - - - - - - - - - +-------------------------------+
/// |                               |Masking-key, if MASK set to 1  |
/// +-------------------------------+-------------------------------+
/// | Masking-key (continued)       |          Payload Data         |
/// +-------------------------------- - - - - - - - - - - - - - - - +
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key in wire order, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Total header size implied by the first two header bytes.
    ///
    /// The async reader reads two bytes, asks for the full size, then reads
    /// the rest before calling [`FrameHeader::parse`].
    #[inline]
    #[must_use]
    pub const fn size_hint(byte1: u8) -> usize {
        let ext = match byte1 & 0x7F {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let mask = if byte1 & 0x80 != 0 { 4 } else { 0 };
        2 + ext + mask
    }

    /// Parse a header from the start of `buf`.
    ///
    /// Returns the header and the number of bytes it occupies.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` is shorter than the header
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::InvalidOpcode` if the opcode nibble is undefined
    /// - `Error::FrameTooLong` if the 64-bit length has its top bit set
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        if byte0 & 0x70 != 0 {
            return Err(Error::ReservedBitsSet);
        }
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let fin = byte0 & 0x80 != 0;
        let masked = byte1 & 0x80 != 0;

        let header_len = Self::size_hint(byte1);
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let (payload_len, mask_offset) = match byte1 & 0x7F {
            126 => (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4),
            127 => {
                let mut len = [0u8; 8];
                len.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(len), 10)
            }
            len => (len as u64, 2),
        };

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::FrameTooLong(payload_len));
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&buf[mask_offset..mask_offset + 4]);
            Some(key)
        } else {
            None
        };

        Ok((
            Self {
                fin,
                opcode,
                mask,
                payload_len,
            },
            header_len,
        ))
    }

    /// Number of bytes this header occupies on the wire.
    #[inline]
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let ext = if self.payload_len <= LEN7_MAX {
            0
        } else if self.payload_len <= LEN16_MAX {
            2
        } else {
            8
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + ext + mask
    }

    /// Append the encoded header to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        buf.put_u8(byte0);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        if self.payload_len <= LEN7_MAX {
            buf.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= LEN16_MAX {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(self.payload_len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(self.payload_len);
        }

        if let Some(key) = self.mask {
            buf.put_slice(&key);
        }
    }
}

/// A WebSocket frame with its payload in memory.
///
/// The engine streams data payloads and only materialises whole frames for
/// control frames and for everything it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given parameters.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    ///
    /// The reason is dropped when no code is given.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &[u8]) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = BytesMut::with_capacity(2 + reason.len());
                data.put_u16(code);
                data.put_slice(reason);
                data.freeze()
            }
            None => Bytes::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Header describing this frame sent with the given mask.
    #[must_use]
    pub fn header(&self, mask: Option<[u8; 4]>) -> FrameHeader {
        FrameHeader {
            fin: self.fin,
            opcode: self.opcode,
            mask,
            payload_len: self.payload.len() as u64,
        }
    }

    /// Parse a complete frame from a buffer, unmasking its payload.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - any error of [`FrameHeader::parse`]
    /// - `Error::FrameTooLong` if the payload cannot be addressed in memory
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, header_len) = FrameHeader::parse(buf)?;

        let payload_len = usize::try_from(header.payload_len)
            .map_err(|_| Error::FrameTooLong(header.payload_len))?;
        let total_size = header_len
            .checked_add(payload_len)
            .ok_or(Error::FrameTooLong(header.payload_len))?;

        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let mut payload = buf[header_len..total_size].to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        Ok((Frame::new(header.fin, header.opcode, payload), total_size))
    }

    /// Append the encoded frame to `buf`, masking the payload when a key is given.
    ///
    /// Header, extended length, key and payload are laid out contiguously so
    /// the result can go out in one write.
    pub fn write(&self, buf: &mut BytesMut, mask: Option<[u8; 4]>) {
        let header = self.header(mask);
        buf.reserve(header.encoded_len() + self.payload.len());
        header.write(buf);

        let start = buf.len();
        buf.put_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask_fast(&mut buf[start..], key);
        }
    }

    /// Encode the frame into a fresh buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.write(&mut buf, mask);
        buf.to_vec()
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let mask = masked.then_some([0u8; 4]);
        self.header(mask).encoded_len() + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unmasked_text_frame() {
        // FIN=1, opcode=1 (text), unmasked, payload="Hello"
        let data = &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_masked_text_frame() {
        let data = &[
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // Mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // Masked "Hello"
        ];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 11);
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_close_frame() {
        let data = &[0x88, 0x02, 0x03, 0xe8];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 4);
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.payload(), &[0x03, 0xe8]);
    }

    #[test]
    fn test_parse_fragmented_frame() {
        // FIN=0, opcode=1 (text), payload="Hel"
        let data = &[0x01, 0x03, 0x48, 0x65, 0x6c];
        let (frame, _) = Frame::parse(data).unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hel");
    }

    #[test]
    fn test_parse_extended_length_126() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00]; // len=256
        data.extend(vec![0xab; 256]);

        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 4 + 256);
        assert_eq!(frame.payload().len(), 256);
        assert!(frame.payload().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_parse_extended_length_127() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);

        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 10 + 65536);
        assert_eq!(frame.payload().len(), 65536);
    }

    #[test]
    fn test_parse_empty_payload() {
        let (frame, len) = Frame::parse(&[0x81, 0x00]).unwrap();
        assert_eq!(len, 2);
        assert_eq!(frame.payload(), b"");
    }

    #[test]
    fn test_parse_reserved_bits() {
        for byte0 in [0xC1, 0xA1, 0x91] {
            let result = Frame::parse(&[byte0, 0x00]);
            assert_eq!(result, Err(Error::ReservedBitsSet));
        }
    }

    #[test]
    fn test_reserved_bits_checked_before_opcode() {
        // RSV1 set and opcode 0x3
        assert_eq!(Frame::parse(&[0xC3, 0x00]), Err(Error::ReservedBitsSet));
    }

    #[test]
    fn test_parse_invalid_opcode() {
        assert_eq!(Frame::parse(&[0x83, 0x00]), Err(Error::InvalidOpcode(0x03)));
        assert_eq!(Frame::parse(&[0x8b, 0x00]), Err(Error::InvalidOpcode(0x0B)));
    }

    #[test]
    fn test_parse_length_top_bit_set() {
        let mut data = vec![0x82, 0x7f];
        data.extend((1u64 << 63).to_be_bytes());
        assert_eq!(Frame::parse(&data), Err(Error::FrameTooLong(1u64 << 63)));
    }

    #[test]
    fn test_parse_incomplete_header() {
        let result = Frame::parse(&[0x81]);
        assert_eq!(result, Err(Error::IncompleteFrame { needed: 1 }));
    }

    #[test]
    fn test_parse_incomplete_payload() {
        let result = Frame::parse(&[0x81, 0x05, 0x48, 0x65, 0x6c]);
        assert_eq!(result, Err(Error::IncompleteFrame { needed: 2 }));
    }

    #[test]
    fn test_parse_incomplete_extended_length() {
        assert_eq!(
            Frame::parse(&[0x82, 0x7e, 0x01]),
            Err(Error::IncompleteFrame { needed: 1 })
        );
        assert_eq!(
            Frame::parse(&[0x82, 0x7f, 0x00, 0x00, 0x00]),
            Err(Error::IncompleteFrame { needed: 5 })
        );
    }

    #[test]
    fn test_parse_incomplete_mask() {
        assert_eq!(
            Frame::parse(&[0x81, 0x85, 0x37, 0xfa]),
            Err(Error::IncompleteFrame { needed: 2 })
        );
    }

    #[test]
    fn test_size_hint() {
        assert_eq!(FrameHeader::size_hint(0x05), 2);
        assert_eq!(FrameHeader::size_hint(0x85), 6);
        assert_eq!(FrameHeader::size_hint(0x7e), 4);
        assert_eq!(FrameHeader::size_hint(0xfe), 8);
        assert_eq!(FrameHeader::size_hint(0x7f), 10);
        assert_eq!(FrameHeader::size_hint(0xff), 14);
    }

    #[test]
    fn test_write_unmasked() {
        let frame = Frame::text("Hello");
        let encoded = frame.encode(None);
        assert_eq!(encoded, vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_write_masked_rfc_example() {
        let frame = Frame::text("Hello");
        let encoded = frame.encode(Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(
            encoded,
            vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_write_non_final_continuation() {
        let frame = Frame::new(false, OpCode::Continuation, vec![1, 2]);
        assert_eq!(frame.encode(None), vec![0x00, 0x02, 1, 2]);
    }

    #[test]
    fn test_length_tiers() {
        for (len, byte1, header) in [
            (125usize, 125u8, 2usize),
            (126, 126, 4),
            (65535, 126, 4),
            (65536, 127, 10),
        ] {
            let frame = Frame::binary(vec![0u8; len]);
            let encoded = frame.encode(None);
            assert_eq!(encoded[1], byte1, "length field for {len}");
            assert_eq!(encoded.len(), header + len);
            assert_eq!(frame.wire_size(false), header + len);

            let (parsed, consumed) = Frame::parse(&encoded).unwrap();
            assert_eq!(consumed, encoded.len());
            assert_eq!(parsed.payload().len(), len);
        }
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = Frame::close(Some(1000), b"Bye");
        assert_eq!(frame.payload(), &[0x03, 0xe8, b'B', b'y', b'e']);

        let frame = Frame::close(None, b"ignored");
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_header_roundtrip_masked() {
        let header = FrameHeader {
            fin: false,
            opcode: OpCode::Binary,
            mask: Some([1, 2, 3, 4]),
            payload_len: 70_000,
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), header.encoded_len());

        let (parsed, len) = FrameHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(len, 14);
    }
}
