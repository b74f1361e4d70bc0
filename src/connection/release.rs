//! Exactly-once release of the underlying stream.
//!
//! The reception and transmission tasks each own one half of the stream.
//! When a task finishes it deposits its half here; the second task to arrive
//! reunites the halves, shuts the stream down and drops it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

struct Halves<T> {
    read: Option<ReadHalf<T>>,
    write: Option<WriteHalf<T>>,
}

pub(crate) struct Release<T> {
    remaining: AtomicU8,
    halves: Mutex<Halves<T>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Release<T> {
    pub(crate) fn new() -> Self {
        Self {
            remaining: AtomicU8::new(2),
            halves: Mutex::new(Halves {
                read: None,
                write: None,
            }),
        }
    }

    /// Deposit the read half. Returns `true` if this call released the stream.
    pub(crate) async fn deposit_read(&self, half: ReadHalf<T>) -> bool {
        self.lock().read = Some(half);
        self.arrive().await
    }

    /// Deposit the write half. Returns `true` if this call released the stream.
    pub(crate) async fn deposit_write(&self, half: WriteHalf<T>) -> bool {
        self.lock().write = Some(half);
        self.arrive().await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Halves<T>> {
        self.halves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn arrive(&self) -> bool {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return false;
        }

        let (read, write) = {
            let mut halves = self.lock();
            (halves.read.take(), halves.write.take())
        };
        if let (Some(read), Some(write)) = (read, write) {
            let mut io = read.unsplit(write);
            if let Err(e) = io.shutdown().await {
                debug!(error = %e, "shutdown failed");
            }
        }
        debug!("stream released");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_second_arrival_releases() {
        let (local, mut peer) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(local);
        let release = Release::new();

        assert!(!release.deposit_read(read).await);
        assert!(release.deposit_write(write).await);

        // the stream was shut down and dropped, so the peer sees EOF
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_deposits_release_once() {
        use std::sync::Arc;

        for _ in 0..50 {
            let (local, _peer) = tokio::io::duplex(64);
            let (read, write) = tokio::io::split(local);
            let release = Arc::new(Release::new());

            let r = release.clone();
            let a = tokio::spawn(async move { r.deposit_read(read).await });
            let w = release.clone();
            let b = tokio::spawn(async move { w.deposit_write(write).await });

            let released = [a.await.unwrap(), b.await.unwrap()];
            assert_eq!(released.iter().filter(|r| **r).count(), 1);
        }
    }
}
