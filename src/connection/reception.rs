//! Reception task: decodes frames from the read half.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::codec::FrameReader;
use crate::connection::control::ControlFrame;
use crate::connection::inbox::Inbound;
use crate::connection::shared::Shared;
use crate::error::{Error, Result};
use crate::message::CloseRecord;
use crate::protocol::{FrameHeader, OpCode};

pub(crate) struct Reception<R> {
    reader: FrameReader<R>,
    shared: Arc<Shared>,
    inbound: mpsc::Sender<Inbound>,
    receiver_gone: bool,
    frame_incoming: bool,
    text_incoming: bool,
    message_len: u64,
}

impl<R: AsyncRead + Unpin> Reception<R> {
    pub(crate) fn new(
        reader: FrameReader<R>,
        shared: Arc<Shared>,
        inbound: mpsc::Sender<Inbound>,
    ) -> Self {
        Self {
            reader,
            shared,
            inbound,
            receiver_gone: false,
            frame_incoming: false,
            text_incoming: false,
            message_len: 0,
        }
    }

    /// Receive until a Close frame or a fatal error, then hand back the read half.
    pub(crate) async fn run(mut self) -> R {
        if let Err(e) = self.receive().await {
            self.fail(e);
        }

        let Self { reader, shared, .. } = self;
        // input first, so a ping registered after this sees it closed
        shared.input.close();
        shared.pending_ping.abandon();
        debug!("input closed");
        reader.into_inner()
    }

    async fn receive(&mut self) -> Result<()> {
        loop {
            let header = self.reader.read_header().await?;
            trace!(
                opcode = %header.opcode,
                fin = header.fin,
                len = header.payload_len,
                "frame received"
            );

            if header.opcode.is_control() {
                if !header.fin {
                    return Err(Error::FragmentedControlFrame);
                }
                self.shared
                    .config
                    .limits
                    .check_control(header.opcode, header.payload_len)?;
                let payload = self.reader.read_payload(&header).await?;

                match header.opcode {
                    OpCode::Close => {
                        self.on_close(&payload);
                        return Ok(());
                    }
                    OpCode::Ping => {
                        self.shared.enqueue_control(ControlFrame::pong(payload));
                    }
                    OpCode::Pong => {
                        if !self.shared.pending_ping.resolve(payload) {
                            trace!("unsolicited pong");
                        }
                    }
                    _ => {}
                }
                continue;
            }

            match (header.opcode, self.frame_incoming) {
                (OpCode::Continuation, false) => return Err(Error::UnexpectedContinuation),
                (OpCode::Continuation, true) => {}
                (_, true) => return Err(Error::UnexpectedStart),
                (opcode, false) => {
                    self.frame_incoming = true;
                    self.text_incoming = opcode == OpCode::Text;
                    self.message_len = 0;
                }
            }

            self.stream_payload(&header).await?;

            if header.fin {
                self.frame_incoming = false;
                self.deliver(Inbound::End {
                    is_text: self.text_incoming,
                })
                .await;
                self.shared
                    .fire_message(self.message_len, self.text_incoming);
            }
        }
    }

    async fn stream_payload(&mut self, header: &FrameHeader) -> Result<()> {
        let chunk_size = self.shared.config.read_chunk_size.max(1);
        let mut offset = 0;
        while offset < header.payload_len {
            let chunk = self.reader.read_chunk(header, offset, chunk_size).await?;
            offset += chunk.len() as u64;
            self.message_len += chunk.len() as u64;
            self.deliver(Inbound::Data(chunk)).await;
        }
        Ok(())
    }

    /// Push to the inbound queue, discarding once the application dropped its side.
    async fn deliver(&mut self, item: Inbound) {
        if self.receiver_gone {
            return;
        }
        let len = match &item {
            Inbound::Data(chunk) => chunk.len(),
            Inbound::End { .. } => 0,
        };
        self.shared.add_in_flight(len);
        if self.inbound.send(item).await.is_err() {
            self.shared.take_in_flight(len);
            self.receiver_gone = true;
            debug!("reader dropped, discarding payload");
        }
    }

    fn on_close(&mut self, payload: &Bytes) {
        let record = CloseRecord::parse(payload);
        debug!(code = ?record.code.map(|c| c.as_u16()), "close received");
        if self.shared.close_record.set(record.clone()).is_err() {
            trace!("close record already set");
        }

        // echo with the same status; codes that must not be sent go back code-less
        let code = record.code.filter(|c| !c.is_reserved());
        let reason: &[u8] = match code {
            Some(_) => record.reason.as_deref().unwrap_or_default(),
            None => &[],
        };
        if let Err(e) = self.shared.send_close(code, reason) {
            debug!(error = %e, "close echo rejected");
        }

        self.shared.input.close();
        self.shared.fire_close(record.code, record.reason.as_deref());
    }

    fn fail(&mut self, err: Error) {
        if err.is_protocol() {
            debug!(error = %err, "protocol violation");
        } else if self.shared.config.verbose_errors {
            error!(error = %err, "reception failed");
        } else {
            debug!(error = %err, "reception failed");
        }

        let code = err.close_code();
        let reason = err.close_reason().as_bytes();
        if self.shared.send_close(Some(code), reason).is_err() {
            // reason does not fit the configured close limit
            if let Err(e) = self.shared.send_close(Some(code), &[]) {
                debug!(error = %e, "close rejected");
            }
        }

        self.shared.input.close();
        self.shared.fire_close(Some(code), Some(reason));
    }
}
