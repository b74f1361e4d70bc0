//! Transmission task: turns buffered application data and queued control
//! frames into frames on the write half.
//!
//! Application data accumulates in a local buffer and goes out in frames of
//! `frame_size` bytes. A frame that takes the last buffered byte carries
//! `fin` unless more data is already queued behind it; a flush sends a short
//! buffer out right away. Ping and Pong may be sent between fragments; a
//! Close waits until every queued write is out.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, trace};

use crate::codec::FrameWriter;
use crate::connection::control::ControlFrame;
use crate::connection::shared::Shared;
use crate::error::Result;
use crate::message::CloseCode;
use crate::protocol::{Frame, OpCode};

/// Ordered command from the application to the transmission task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxCommand {
    Data(Bytes),
    Flush,
    Kind { text: bool },
}

pub(crate) struct Transmission<W> {
    writer: FrameWriter<W>,
    shared: Arc<Shared>,
    data_rx: mpsc::Receiver<TxCommand>,
    control_rx: mpsc::UnboundedReceiver<ControlFrame>,
    frame_size: usize,
    buffer: BytesMut,
    controls: VecDeque<ControlFrame>,
    /// Command taken off the channel that must wait for the buffer to go out.
    held: Option<TxCommand>,
    frame_open: bool,
    next_is_text: bool,
    flush_requested: bool,
    data_closed: bool,
}

impl<W: AsyncWrite + Unpin> Transmission<W> {
    pub(crate) fn new(
        writer: FrameWriter<W>,
        shared: Arc<Shared>,
        data_rx: mpsc::Receiver<TxCommand>,
        control_rx: mpsc::UnboundedReceiver<ControlFrame>,
    ) -> Self {
        let frame_size = shared.config.frame_size.max(1);
        Self {
            writer,
            shared,
            data_rx,
            control_rx,
            frame_size,
            buffer: BytesMut::new(),
            controls: VecDeque::new(),
            held: None,
            frame_open: false,
            next_is_text: false,
            flush_requested: false,
            data_closed: false,
        }
    }

    /// Transmit until a Close frame is written or the stream fails, then
    /// hand back the write half.
    pub(crate) async fn run(mut self) -> W {
        if let Err(e) = self.transmit().await {
            if self.shared.config.verbose_errors {
                error!(error = %e, "transmission failed");
            } else {
                debug!(error = %e, "transmission failed");
            }
        }

        self.data_rx.close();
        self.shared.output.close();
        debug!("output closed");
        self.writer.into_inner()
    }

    async fn transmit(&mut self) -> Result<()> {
        loop {
            self.drain_pending();

            if !self.is_ready() {
                tokio::select! {
                    Some(frame) = self.control_rx.recv() => self.controls.push_back(frame),
                    cmd = self.data_rx.recv(), if !self.data_closed => match cmd {
                        Some(cmd) => self.held = self.apply(cmd),
                        None => self.on_data_closed(),
                    },
                    else => return Ok(()),
                }
                continue;
            }

            let Some(frame) = self.next_frame() else {
                continue;
            };
            trace!(
                opcode = %frame.opcode,
                fin = frame.fin,
                len = frame.payload().len(),
                "frame sent"
            );
            self.writer.write_frame(&frame).await?;
            if frame.opcode == OpCode::Close {
                debug!("close sent");
                return Ok(());
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.buffer.len() >= self.frame_size
            || self.flush_requested
            || self.held.is_some()
            || !self.controls.is_empty()
    }

    /// Take queued controls, and data commands until one has to wait for
    /// the buffer to go out.
    fn drain_pending(&mut self) {
        while let Ok(frame) = self.control_rx.try_recv() {
            self.controls.push_back(frame);
        }
        loop {
            let cmd = match self.held.take() {
                Some(cmd) => cmd,
                None if self.data_closed => break,
                None => match self.data_rx.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.on_data_closed();
                        break;
                    }
                },
            };
            if let Some(blocked) = self.apply(cmd) {
                self.held = Some(blocked);
                break;
            }
        }
    }

    /// Apply a command, or hand it back if it has to wait.
    ///
    /// Data waits behind a pending flush and while the buffer holds more
    /// than one frame. A kind change waits until the buffered bytes are out,
    /// so it only affects the next message.
    fn apply(&mut self, cmd: TxCommand) -> Option<TxCommand> {
        match cmd {
            TxCommand::Data(data) => {
                if self.flush_requested || self.buffer.len() > self.frame_size {
                    return Some(TxCommand::Data(data));
                }
                self.buffer.extend_from_slice(&data);
            }
            TxCommand::Flush => {
                if !self.buffer.is_empty() || self.frame_open {
                    self.flush_requested = true;
                }
            }
            TxCommand::Kind { text } => {
                if !self.buffer.is_empty() {
                    return Some(TxCommand::Kind { text });
                }
                self.next_is_text = text;
            }
        }
        None
    }

    /// Pull the next command into `held` without applying it.
    fn peek(&mut self) -> Option<&TxCommand> {
        if self.held.is_none() && !self.data_closed {
            match self.data_rx.try_recv() {
                Ok(cmd) => self.held = Some(cmd),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.on_data_closed(),
            }
        }
        self.held.as_ref()
    }

    /// Every application handle is gone: say goodbye.
    fn on_data_closed(&mut self) {
        self.data_closed = true;
        debug!("all handles dropped");
        if let Err(e) = self.shared.send_close(Some(CloseCode::GoingAway), &[]) {
            debug!(error = %e, "close rejected");
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if let Some(close_head) = self.controls.front().map(ControlFrame::is_close) {
            // a Close waits until every queued write is out
            if !close_head || (self.buffer.is_empty() && self.peek().is_none()) {
                return self.controls.pop_front().map(ControlFrame::into_frame);
            }
        }

        if self.buffer.is_empty() {
            // flush with nothing buffered
            if std::mem::take(&mut self.flush_requested) && self.frame_open {
                self.frame_open = false;
                return Some(Frame::new(true, OpCode::Continuation, Bytes::new()));
            }
            return None;
        }

        let take = self.buffer.len().min(self.frame_size);
        let payload = self.buffer.split_to(take).freeze();
        let drained = self.buffer.is_empty();
        let fin = drained
            && (self.flush_requested || !matches!(self.peek(), Some(TxCommand::Data(_))));

        let opcode = if self.frame_open {
            OpCode::Continuation
        } else if self.next_is_text {
            OpCode::Text
        } else {
            OpCode::Binary
        };
        if drained {
            self.flush_requested = false;
        }
        self.frame_open = !fin;
        Some(Frame::new(fin, opcode, payload))
    }
}
