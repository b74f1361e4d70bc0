//! Queued control frames and ping/pong correlation.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// A control frame waiting for the transmission task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ControlFrame {
    pub(crate) opcode: OpCode,
    pub(crate) payload: Bytes,
}

impl ControlFrame {
    pub(crate) fn ping(payload: Bytes) -> Self {
        Self {
            opcode: OpCode::Ping,
            payload,
        }
    }

    pub(crate) fn pong(payload: Bytes) -> Self {
        Self {
            opcode: OpCode::Pong,
            payload,
        }
    }

    pub(crate) fn close(payload: Bytes) -> Self {
        Self {
            opcode: OpCode::Close,
            payload,
        }
    }

    pub(crate) fn is_close(&self) -> bool {
        self.opcode == OpCode::Close
    }

    pub(crate) fn into_frame(self) -> Frame {
        Frame::new(true, self.opcode, self.payload)
    }
}

/// Single slot for the ping awaiting its pong.
///
/// Registering a new ping drops the previous sender, which resolves the
/// previous [`PingFuture`] with [`Error::PingAbandoned`].
#[derive(Debug, Default)]
pub(crate) struct PendingPing {
    slot: Mutex<Option<oneshot::Sender<Bytes>>>,
}

impl PendingPing {
    pub(crate) fn register(&self) -> PingFuture {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        if previous.is_some() {
            debug!("pending ping superseded");
        }
        PingFuture { rx }
    }

    /// Hand a received pong payload to the waiting ping, if any.
    pub(crate) fn resolve(&self, payload: Bytes) -> bool {
        let waiter = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match waiter {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub(crate) fn abandon(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Resolves with the payload of the pong answering a ping.
///
/// Fails with [`Error::PingAbandoned`] if a newer ping replaced this one or
/// the input half closed first. The engine never times pings out; wrap the
/// future in `tokio::time::timeout` for that.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PingFuture {
    rx: oneshot::Receiver<Bytes>,
}

impl Future for PingFuture {
    type Output = Result<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::PingAbandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_resolved_by_pong() {
        let pending = PendingPing::default();
        let fut = pending.register();
        assert!(pending.resolve(Bytes::from_static(b"PING PING")));
        assert_eq!(fut.await.unwrap(), Bytes::from_static(b"PING PING"));
    }

    #[tokio::test]
    async fn test_second_ping_abandons_first() {
        let pending = PendingPing::default();
        let first = pending.register();
        let second = pending.register();

        assert_eq!(first.await, Err(Error::PingAbandoned));
        assert!(pending.resolve(Bytes::from_static(b"x")));
        assert_eq!(second.await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_abandon() {
        let pending = PendingPing::default();
        let fut = pending.register();
        pending.abandon();
        assert_eq!(fut.await, Err(Error::PingAbandoned));
    }

    #[test]
    fn test_unsolicited_pong_ignored() {
        let pending = PendingPing::default();
        assert!(!pending.resolve(Bytes::new()));
    }

    #[test]
    fn test_control_into_frame() {
        let frame = ControlFrame::pong(Bytes::from_static(b"hi")).into_frame();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Pong);
        assert_eq!(frame.payload(), b"hi");
        assert!(ControlFrame::close(Bytes::new()).is_close());
        assert!(!ControlFrame::ping(Bytes::new()).is_close());
    }
}
