use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::protocol::mask::mask_key;

/// Seed for the fallback mask generator.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}

/// Writes frames to the write half of a stream.
///
/// Each frame is encoded into one contiguous buffer, written with a single
/// `write_all` and flushed.
pub struct FrameWriter<W> {
    io: W,
    buf: BytesMut,
    mask_frames: bool,
    mask_counter: u32,
    write_timeout: Option<Duration>,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, mask_frames: bool, write_timeout: Option<Duration>) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
            mask_frames,
            mask_counter: random_mask_seed(),
            write_timeout,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.io
    }

    /// Fresh key for the next frame.
    fn next_mask(&mut self) -> [u8; 4] {
        let mut key = [0u8; 4];
        if getrandom::getrandom(&mut key).is_ok() {
            return key;
        }
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        mask_key(c.wrapping_mul(0xC2B2_AE35))
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encode, mask if configured, write and flush one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.mask_frames.then(|| self.next_mask());
        self.buf.clear();
        frame.write(&mut self.buf, mask);

        let io = &mut self.io;
        let buf = &self.buf[..];
        let write = async move {
            io.write_all(buf).await?;
            io.flush().await
        };
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| Error::Timeout)??,
            None => write.await?,
        }
        Ok(())
    }

    /// Shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[tokio::test]
    async fn test_write_frame_unmasked() {
        let mut writer = FrameWriter::new(Vec::new(), false, None);
        writer.write_frame(&Frame::text("Hi")).await.unwrap();

        let written = writer.into_inner();
        assert_eq!(written, vec![0x81, 0x02, b'H', b'i']);
    }

    #[tokio::test]
    async fn test_write_frame_masked() {
        let mut writer = FrameWriter::new(Vec::new(), true, None);
        writer.write_frame(&Frame::text("Hi")).await.unwrap();

        let written = writer.into_inner();
        assert_eq!(written[0], 0x81);
        assert_eq!(written[1], 0x82);
        assert_eq!(written.len(), 8);

        let (frame, _) = Frame::parse(&written).unwrap();
        assert_eq!(frame.payload(), b"Hi");
    }

    #[tokio::test]
    async fn test_frames_written_back_to_back() {
        let mut writer = FrameWriter::new(Vec::new(), false, None);
        writer
            .write_frame(&Frame::new(false, OpCode::Binary, vec![1u8]))
            .await
            .unwrap();
        writer.write_frame(&Frame::ping("p")).await.unwrap();
        writer
            .write_frame(&Frame::new(true, OpCode::Continuation, vec![2u8]))
            .await
            .unwrap();

        let written = writer.into_inner();
        assert_eq!(written, vec![0x02, 0x01, 1, 0x89, 0x01, b'p', 0x80, 0x01, 2]);
    }

    #[tokio::test]
    async fn test_masks_differ_between_frames() {
        use std::collections::HashSet;

        let mut writer = FrameWriter::new(Vec::new(), true, None);
        for _ in 0..5 {
            writer.write_frame(&Frame::binary(vec![0u8; 4])).await.unwrap();
        }

        let written = writer.into_inner();
        let masks: HashSet<_> = written.chunks(10).map(|f| f[2..6].to_vec()).collect();
        assert!(masks.len() > 1, "every frame should get its own key");
    }

    #[test]
    fn test_next_mask_varies() {
        let mut writer = FrameWriter::new(Vec::<u8>::new(), true, None);
        writer.mask_counter = 0;
        let first = writer.next_mask();
        let second = writer.next_mask();
        assert_ne!(first, second);
    }
}
