use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, warn};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::Config;
use crate::connection::control::{ControlFrame, PingFuture};
use crate::connection::inbox::Inbox;
use crate::connection::reception::Reception;
use crate::connection::release::Release;
use crate::connection::shared::Shared;
use crate::connection::transmission::{Transmission, TxCommand};
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseRecord, Message};
use crate::protocol::OpCode;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A WebSocket endpoint running over an already-upgraded stream.
///
/// `WebSocket::new` splits the stream and spawns two tasks: one decodes
/// incoming frames, the other cuts outgoing data into frames and interleaves
/// control frames. This handle talks to both through channels.
///
/// Outgoing data is a byte stream: [`write`](Self::write) buffers bytes and
/// [`flush`](Self::flush) ends the current message. Incoming data can be read
/// as bytes ([`read`](Self::read), [`read_line`](Self::read_line)) or as whole
/// messages ([`recv_message`](Self::recv_message) or the `Stream` impl).
///
/// Dropping the handle makes the transmission task send `Close(1001)`.
///
/// ## Example
///
/// ```rust,no_run
/// use wsduplex::{CloseCode, Config, Message, WebSocket};
///
/// # async fn run(stream: tokio::net::TcpStream) -> wsduplex::Result<()> {
/// let mut ws = WebSocket::new(stream, Config::server());
///
/// ws.write_text("hello").await?;
/// while let Some(msg) = ws.recv_message().await? {
///     if let Message::Text(text) = msg {
///         println!("received: {text}");
///     }
/// }
/// ws.close(Some(CloseCode::Normal), "done").await?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocket {
    shared: Arc<Shared>,
    data_tx: mpsc::Sender<TxCommand>,
    inbox: Inbox,
    reception: Option<JoinHandle<()>>,
    transmission: Option<JoinHandle<()>>,
}

impl WebSocket {
    /// Start the engine on `io`.
    ///
    /// The upgrade handshake must already be complete. Must be called from
    /// within a tokio runtime.
    pub fn new<T>(io: T, config: Config) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = tokio::io::split(io);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(config.write_queue_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.read_queue_capacity.max(1));

        let reader = FrameReader::new(read_half, config.timeouts.read);
        let writer = FrameWriter::new(write_half, config.mask_frames, config.timeouts.write);
        let shared = Arc::new(Shared::new(id, config, control_tx));
        let release = Arc::new(Release::new());

        let rx = Reception::new(reader, shared.clone(), inbound_tx);
        let rx_release = release.clone();
        let reception = tokio::spawn(
            async move {
                let half = rx.run().await;
                rx_release.deposit_read(half).await;
            }
            .instrument(debug_span!("ws_rx", id)),
        );

        let tx = Transmission::new(writer, shared.clone(), data_rx, control_rx);
        let transmission = tokio::spawn(
            async move {
                let half = tx.run().await;
                release.deposit_write(half).await;
            }
            .instrument(debug_span!("ws_tx", id)),
        );

        debug!(id, mask = shared.config.mask_frames, "connection started");
        Self {
            inbox: Inbox::new(inbound_rx, shared.clone()),
            shared,
            data_tx,
            reception: Some(reception),
            transmission: Some(transmission),
        }
    }

    /// Connection id, unique within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    fn ensure_output_open(&self) -> Result<()> {
        if self.shared.output.is_open() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    async fn command(&self, cmd: TxCommand) -> Result<()> {
        self.data_tx
            .send(cmd)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn send_data(&self, data: &[u8]) -> Result<()> {
        let frame_size = self.shared.config.frame_size.max(1);
        for chunk in data.chunks(frame_size) {
            self.command(TxCommand::Data(Bytes::copy_from_slice(chunk)))
                .await?;
        }
        Ok(())
    }

    /// Append bytes to the outgoing message.
    ///
    /// Bytes go out in frames of `frame_size`. Fewer bytes than a frame wait
    /// for more data, a [`flush`](Self::flush) or a Close. The message ends
    /// with the frame that empties the buffer when nothing more is queued.
    /// Waits while the write queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` once a Close has been queued or sent.
    pub async fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_output_open()?;
        self.send_data(data.as_ref()).await
    }

    /// Send `text` as one complete text message.
    ///
    /// Any message left open by earlier writes is finished first.
    pub async fn write_text(&self, text: &str) -> Result<()> {
        self.send_message(text.as_bytes(), true).await
    }

    /// Send `data` as one complete binary message.
    ///
    /// Any message left open by earlier writes is finished first.
    pub async fn send_binary(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.send_message(data.as_ref(), false).await
    }

    async fn send_message(&self, data: &[u8], text: bool) -> Result<()> {
        self.ensure_output_open()?;
        self.command(TxCommand::Flush).await?;
        self.command(TxCommand::Kind { text }).await?;
        self.send_data(data).await?;
        self.command(TxCommand::Flush).await
    }

    /// Choose whether the next message that opens is Text or Binary.
    pub async fn mark_text(&self, text: bool) -> Result<()> {
        self.ensure_output_open()?;
        self.command(TxCommand::Kind { text }).await
    }

    /// End the current message: the last buffered bytes go out with `fin`.
    ///
    /// With nothing buffered, an open message is ended with an empty final
    /// frame; otherwise this does nothing.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_output_open()?;
        self.command(TxCommand::Flush).await
    }

    /// Payload bytes received and not yet read.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.inbox.available()
    }

    /// Read payload bytes into `buf`, waiting for at least one.
    ///
    /// Returns 0 once input has ended and everything was read.
    pub async fn read(&mut self, buf: &mut [u8]) -> usize {
        self.inbox.read(buf).await
    }

    /// Take all payload bytes received so far without waiting.
    pub fn read_available(&mut self) -> Bytes {
        self.inbox.read_available()
    }

    /// Read up to the next `\n`, dropping the line ending (`\n` or `\r\n`).
    ///
    /// Returns the unterminated rest at end of input, then `None`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the line is not valid UTF-8.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.inbox.read_line().await
    }

    /// Wait for the next complete message, `None` once input has ended.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` for a text message that is not valid UTF-8.
    pub async fn recv_message(&mut self) -> Result<Option<Message>> {
        self.inbox.recv_message().await
    }

    /// Send a Ping and return a future for the matching Pong payload.
    ///
    /// Only one ping is tracked; sending another abandons the previous one.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if output is no longer open
    /// - `Error::ControlFrameTooLarge` if `payload` exceeds the ping limit
    pub fn send_ping(&self, payload: impl Into<Bytes>) -> Result<PingFuture> {
        self.ensure_output_open()?;
        let payload = payload.into();
        self.shared
            .config
            .limits
            .check_control(OpCode::Ping, payload.len() as u64)?;

        let pong = self.shared.pending_ping.register();
        if !self.shared.input.is_open() {
            self.shared.pending_ping.abandon();
        }
        if !self.shared.enqueue_control(ControlFrame::ping(payload)) {
            return Err(Error::ConnectionClosed);
        }
        Ok(pong)
    }

    /// Queue a Close frame. Later calls have no effect.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCloseReason` for a non-empty reason without a code
    /// - `Error::InvalidCloseCode` for 1005, 1006 and 1015
    /// - `Error::ControlFrameTooLarge` if the payload exceeds the close limit
    pub fn send_close(&self, code: Option<CloseCode>, reason: impl AsRef<[u8]>) -> Result<()> {
        self.shared.send_close(code, reason.as_ref())
    }

    /// Send a Close and wait up to `timeout` for both tasks to finish.
    ///
    /// On expiry both tasks are aborted, which drops the stream.
    ///
    /// # Errors
    ///
    /// Any error of [`send_close`](Self::send_close), or `Error::Timeout`
    /// if the tasks had to be aborted.
    pub async fn close_and_wait(
        &mut self,
        code: Option<CloseCode>,
        reason: impl AsRef<[u8]>,
        timeout: Duration,
    ) -> Result<()> {
        self.send_close(code, reason)?;

        let (Some(mut reception), Some(mut transmission)) =
            (self.reception.take(), self.transmission.take())
        else {
            return Ok(());
        };

        let joined = tokio::time::timeout(timeout, async {
            let _ = (&mut reception).await;
            let _ = (&mut transmission).await;
        })
        .await;

        if joined.is_err() {
            warn!(id = self.shared.id, ?timeout, "close timed out, forcing release");
            reception.abort();
            transmission.abort();
            return Err(Error::Timeout);
        }
        debug!(id = self.shared.id, "connection closed");
        Ok(())
    }

    /// [`close_and_wait`](Self::close_and_wait) with the configured close timeout.
    pub async fn close(&mut self, code: Option<CloseCode>, reason: impl AsRef<[u8]>) -> Result<()> {
        let timeout = self.shared.config.timeouts.close;
        self.close_and_wait(code, reason, timeout).await
    }

    /// Call `listener` when input ends.
    ///
    /// For a Close from the peer it receives the peer's code and reason; when
    /// input ends on an error it receives the code and description sent back.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(Option<CloseCode>, Option<&[u8]>) + Send + Sync + 'static,
    {
        self.shared.set_close_listener(Arc::new(listener));
    }

    /// Call `listener` with the length and text flag of each complete message.
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(u64, bool) + Send + Sync + 'static,
    {
        self.shared.set_message_listener(Arc::new(listener));
    }

    /// Code and reason of the peer's Close, once one arrived.
    #[must_use]
    pub fn close_record(&self) -> Option<CloseRecord> {
        self.shared.close_record.get().cloned()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_halves(self.shared.input.load(), self.shared.output.load())
    }

    #[must_use]
    pub fn is_input_open(&self) -> bool {
        self.shared.input.is_open()
    }

    #[must_use]
    pub fn is_output_open(&self) -> bool {
        self.shared.output.is_open()
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl futures_core::Stream for WebSocket {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inbox.poll_message(cx)
    }
}
