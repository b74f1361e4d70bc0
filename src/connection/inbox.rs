//! Application side of the inbound queue.
//!
//! The reception task sends payload chunks and message-end markers. The
//! inbox keeps the unread bytes and the offsets where messages end, so the
//! same data can be consumed as a byte stream (`read`, `read_line`) or as
//! whole messages (`recv_message`). Messages fully consumed by byte reads are
//! forgotten; a message partially consumed by byte reads yields its rest.

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::connection::shared::Shared;
use crate::error::Result;
use crate::message::Message;

/// Item of the inbound queue.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(Bytes),
    End { is_text: bool },
}

#[derive(Debug, Clone, Copy)]
struct Boundary {
    end: usize,
    is_text: bool,
}

pub(crate) struct Inbox {
    rx: mpsc::Receiver<Inbound>,
    shared: Arc<Shared>,
    buffer: BytesMut,
    boundaries: VecDeque<Boundary>,
    eof: bool,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::Receiver<Inbound>, shared: Arc<Shared>) -> Self {
        Self {
            rx,
            shared,
            buffer: BytesMut::new(),
            boundaries: VecDeque::new(),
            eof: false,
        }
    }

    /// Payload bytes received but not yet read.
    pub(crate) fn available(&self) -> u64 {
        self.buffer.len() as u64
            + self
                .shared
                .in_flight
                .load(std::sync::atomic::Ordering::Acquire)
    }

    fn absorb(&mut self, item: Option<Inbound>) {
        match item {
            Some(Inbound::Data(chunk)) => {
                self.shared.take_in_flight(chunk.len());
                self.buffer.extend_from_slice(&chunk);
            }
            Some(Inbound::End { is_text }) => self.boundaries.push_back(Boundary {
                end: self.buffer.len(),
                is_text,
            }),
            None => self.eof = true,
        }
    }

    /// Wait for the next queue item. Returns `false` at end of input.
    async fn fill(&mut self) -> bool {
        if self.eof {
            return false;
        }
        let item = self.rx.recv().await;
        self.absorb(item);
        !self.eof
    }

    /// Take everything already queued without waiting.
    fn drain_ready(&mut self) {
        while !self.eof {
            match self.rx.try_recv() {
                Ok(item) => self.absorb(Some(item)),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.absorb(None),
            }
        }
    }

    /// Drop `n` bytes from the front of the buffer.
    fn consume(&mut self, n: usize) -> BytesMut {
        let taken = self.buffer.split_to(n);
        if n > 0 {
            self.boundaries.retain_mut(|b| {
                if b.end <= n {
                    false
                } else {
                    b.end -= n;
                    true
                }
            });
        }
        taken
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        loop {
            if !self.buffer.is_empty() {
                let n = buf.len().min(self.buffer.len());
                buf[..n].copy_from_slice(&self.buffer[..n]);
                self.consume(n);
                return n;
            }
            if !self.fill().await {
                return 0;
            }
        }
    }

    pub(crate) fn read_available(&mut self) -> Bytes {
        self.drain_ready();
        let n = self.buffer.len();
        self.consume(n).freeze()
    }

    pub(crate) async fn read_line(&mut self) -> Result<Option<String>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let mut line = self.consume(scanned + pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Some(String::from_utf8(line.to_vec())?));
            }
            scanned = self.buffer.len();
            if !self.fill().await {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let n = self.buffer.len();
                let rest = self.consume(n);
                return Ok(Some(String::from_utf8(rest.to_vec())?));
            }
        }
    }

    fn next_message(&mut self) -> Option<Result<Message>> {
        let boundary = self.boundaries.pop_front()?;
        let payload = self.buffer.split_to(boundary.end);
        for b in &mut self.boundaries {
            b.end -= boundary.end;
        }
        Some(Message::from_parts(payload.to_vec(), boundary.is_text))
    }

    /// Poll for the next complete message. A message cut off by end of
    /// input is never returned; its bytes stay readable through `read`.
    pub(crate) fn poll_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Message>>> {
        loop {
            if let Some(message) = self.next_message() {
                return Poll::Ready(Some(message));
            }
            if self.eof {
                return Poll::Ready(None);
            }
            match self.rx.poll_recv(cx) {
                Poll::Ready(item) => self.absorb(item),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    pub(crate) async fn recv_message(&mut self) -> Result<Option<Message>> {
        std::future::poll_fn(|cx| self.poll_message(cx))
            .await
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;

    fn inbox() -> (Inbox, mpsc::Sender<Inbound>, Arc<Shared>) {
        let (control_tx, _control_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(1, Config::default(), control_tx));
        let (tx, rx) = mpsc::channel(16);
        (Inbox::new(rx, shared.clone()), tx, shared)
    }

    async fn push(tx: &mpsc::Sender<Inbound>, shared: &Shared, data: &'static [u8]) {
        shared.add_in_flight(data.len());
        tx.send(Inbound::Data(Bytes::from_static(data))).await.unwrap();
    }

    async fn end(tx: &mpsc::Sender<Inbound>, is_text: bool) {
        tx.send(Inbound::End { is_text }).await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_reassembled() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, b"Hel").await;
        push(&tx, &shared, b"lo").await;
        end(&tx, true).await;
        push(&tx, &shared, &[1, 2]).await;
        end(&tx, false).await;
        drop(tx);

        assert_eq!(inbox.available(), 7);
        assert_eq!(inbox.recv_message().await.unwrap(), Some(Message::text("Hello")));
        assert_eq!(
            inbox.recv_message().await.unwrap(),
            Some(Message::binary(vec![1, 2]))
        );
        assert_eq!(inbox.recv_message().await.unwrap(), None);
        assert_eq!(inbox.available(), 0);
    }

    #[tokio::test]
    async fn test_empty_message() {
        let (mut inbox, tx, _shared) = inbox();
        end(&tx, false).await;
        assert_eq!(
            inbox.recv_message().await.unwrap(),
            Some(Message::binary(Vec::new()))
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_text() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, &[0xff, 0xfe]).await;
        end(&tx, true).await;
        assert_eq!(inbox.recv_message().await, Err(Error::InvalidUtf8));
    }

    #[tokio::test]
    async fn test_read_bytes_then_eof() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, b"abcdef").await;
        end(&tx, false).await;
        drop(tx);

        let mut buf = [0u8; 4];
        assert_eq!(inbox.read(&mut buf).await, 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(inbox.read(&mut buf).await, 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(inbox.read(&mut buf).await, 0);
    }

    #[tokio::test]
    async fn test_partial_byte_read_leaves_rest_of_message() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, b"first").await;
        end(&tx, true).await;
        push(&tx, &shared, b"second").await;
        end(&tx, true).await;

        for _ in 0..4 {
            inbox.fill().await;
        }
        // all of "first" and "se"
        let mut buf = [0u8; 7];
        assert_eq!(inbox.read(&mut buf).await, 7);
        assert_eq!(inbox.recv_message().await.unwrap(), Some(Message::text("cond")));
    }

    #[tokio::test]
    async fn test_read_line() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, b"GET /\r\nHo").await;
        push(&tx, &shared, b"st: x\nlast").await;
        drop(tx);

        assert_eq!(inbox.read_line().await.unwrap().as_deref(), Some("GET /"));
        assert_eq!(inbox.read_line().await.unwrap().as_deref(), Some("Host: x"));
        assert_eq!(inbox.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(inbox.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_invalid_utf8() {
        let (mut inbox, tx, shared) = inbox();
        push(&tx, &shared, &[0xc3, 0x28, b'\n']).await;
        assert_eq!(inbox.read_line().await, Err(Error::InvalidUtf8));
    }

    #[tokio::test]
    async fn test_read_available_does_not_wait() {
        let (mut inbox, tx, shared) = inbox();
        assert!(inbox.read_available().is_empty());

        push(&tx, &shared, b"ab").await;
        push(&tx, &shared, b"cd").await;
        assert_eq!(&inbox.read_available()[..], b"abcd");
        assert_eq!(inbox.available(), 0);
    }
}
