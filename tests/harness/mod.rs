//! Raw peer for driving a `WebSocket` over an in-memory duplex stream.
//!
//! The peer speaks the wire format directly through the public codec, so
//! tests can send malformed frames and inspect exactly what the engine wrote.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use wsduplex::{Config, Error, Frame, WebSocket};

/// Mask key used for every peer frame.
pub const PEER_MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

pub struct Peer {
    io: DuplexStream,
    buf: Vec<u8>,
}

/// Start an engine on one end of a duplex pipe and return the other end.
pub fn pair(config: Config) -> (WebSocket, Peer) {
    let (local, remote) = tokio::io::duplex(1 << 20);
    (
        WebSocket::new(local, config),
        Peer {
            io: remote,
            buf: Vec::new(),
        },
    )
}

impl Peer {
    /// Send a frame masked like a client would.
    pub async fn send(&mut self, frame: &Frame) {
        self.send_raw(&frame.encode(Some(PEER_MASK))).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
    }

    /// Next frame from the engine, `None` once the stream is released.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match Frame::parse(&self.buf) {
                Ok((frame, len)) => {
                    self.buf.drain(..len);
                    return Some(frame);
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => panic!("engine wrote a malformed frame: {e}"),
            }

            let mut chunk = [0u8; 4096];
            let n = self.io.read(&mut chunk).await.unwrap();
            if n == 0 {
                assert!(self.buf.is_empty(), "stream ended inside a frame");
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Collect frames up to and including the first Close.
    pub async fn recv_until_close(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.recv().await {
            let done = frame.opcode == wsduplex::OpCode::Close;
            frames.push(frame);
            if done {
                break;
            }
        }
        frames
    }

    /// Wait until the engine has shut the stream down.
    pub async fn expect_released(&mut self) {
        assert_eq!(self.recv().await, None);
    }
}

/// Status code of a Close frame payload.
pub fn close_code(frame: &Frame) -> Option<u16> {
    let payload = frame.payload();
    (payload.len() >= 2).then(|| u16::from_be_bytes([payload[0], payload[1]]))
}
