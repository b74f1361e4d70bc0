use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::protocol::mask::{apply_mask_fast, apply_mask_offset};
use crate::protocol::FrameHeader;

/// Longest possible header: 2 bytes, 8 bytes of extended length, 4 bytes of key.
const MAX_HEADER_LEN: usize = 14;

/// Reads frames from the read half of a stream.
///
/// Headers are parsed as soon as enough bytes are in. Control payloads are
/// read whole with [`read_payload`](Self::read_payload); data payloads are
/// pulled in chunks with [`read_chunk`](Self::read_chunk) so a large frame
/// never has to fit in memory.
pub struct FrameReader<R> {
    io: R,
    read_timeout: Option<Duration>,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, read_timeout: Option<Duration>) -> Self {
        Self { io, read_timeout }
    }

    #[must_use]
    pub fn into_inner(self) -> R {
        self.io
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = self.io.read_exact(buf);
        match self.read_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| Error::Timeout)??;
            }
            None => {
                read.await?;
            }
        }
        Ok(())
    }

    /// Read and decode the next frame header.
    ///
    /// Reserved bits and the opcode are checked on the first two bytes,
    /// before the rest of the header is read.
    pub async fn read_header(&mut self) -> Result<FrameHeader> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        self.read_exact(&mut buf[..2]).await?;

        match FrameHeader::parse(&buf[..2]) {
            Ok((header, _)) => return Ok(header),
            Err(Error::IncompleteFrame { .. }) => {}
            Err(e) => return Err(e),
        }

        let len = FrameHeader::size_hint(buf[1]);
        self.read_exact(&mut buf[2..len]).await?;
        let (header, _) = FrameHeader::parse(&buf[..len])?;
        Ok(header)
    }

    /// Read the whole payload of `header` and unmask it.
    pub async fn read_payload(&mut self, header: &FrameHeader) -> Result<Bytes> {
        let len = usize::try_from(header.payload_len)
            .map_err(|_| Error::FrameTooLong(header.payload_len))?;
        let mut payload = BytesMut::zeroed(len);
        self.read_exact(&mut payload).await?;
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }
        Ok(payload.freeze())
    }

    /// Read the next chunk of a streamed payload.
    ///
    /// `offset` is the number of payload bytes of this frame already read;
    /// at most `max` bytes are returned.
    pub async fn read_chunk(
        &mut self,
        header: &FrameHeader,
        offset: u64,
        max: usize,
    ) -> Result<Bytes> {
        let remaining = header.payload_len.saturating_sub(offset);
        let len = remaining.min(max as u64) as usize;
        let mut chunk = BytesMut::zeroed(len);
        self.read_exact(&mut chunk).await?;
        if let Some(mask) = header.mask {
            apply_mask_offset(&mut chunk, mask, offset);
        }
        Ok(chunk.freeze())
    }
}
