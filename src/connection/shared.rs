//! State shared by the application handle and both worker tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::connection::control::{ControlFrame, PendingPing};
use crate::connection::state::{AtomicHalfState, HalfState};
use crate::error::Result;
use crate::message::{CloseCode, CloseRecord, encode_close_payload};
use crate::protocol::OpCode;

pub(crate) type CloseListener = Arc<dyn Fn(Option<CloseCode>, Option<&[u8]>) + Send + Sync>;
pub(crate) type MessageListener = Arc<dyn Fn(u64, bool) + Send + Sync>;

pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: Config,
    pub(crate) input: AtomicHalfState,
    pub(crate) output: AtomicHalfState,
    pub(crate) pending_ping: PendingPing,
    pub(crate) close_record: OnceLock<CloseRecord>,
    /// Payload bytes handed to the inbound queue but not yet taken by the inbox.
    pub(crate) in_flight: AtomicU64,
    control_tx: mpsc::UnboundedSender<ControlFrame>,
    on_close: RwLock<Option<CloseListener>>,
    on_message: RwLock<Option<MessageListener>>,
}

impl Shared {
    pub(crate) fn new(
        id: u64,
        config: Config,
        control_tx: mpsc::UnboundedSender<ControlFrame>,
    ) -> Self {
        Self {
            id,
            config,
            input: AtomicHalfState::new(),
            output: AtomicHalfState::new(),
            pending_ping: PendingPing::default(),
            close_record: OnceLock::new(),
            in_flight: AtomicU64::new(0),
            control_tx,
            on_close: RwLock::new(None),
            on_message: RwLock::new(None),
        }
    }

    /// Queue a control frame for the transmission task.
    ///
    /// Returns `false` once the transmission task is gone.
    pub(crate) fn enqueue_control(&self, frame: ControlFrame) -> bool {
        self.control_tx.send(frame).is_ok()
    }

    /// Queue a Close frame unless one already is.
    ///
    /// Only the caller that moves output from Open to Closing queues the
    /// frame; later calls succeed without effect.
    pub(crate) fn send_close(&self, code: Option<CloseCode>, reason: &[u8]) -> Result<()> {
        let payload = encode_close_payload(code, reason)?;
        self.config
            .limits
            .check_control(OpCode::Close, payload.len() as u64)?;

        if !self.output.transition(HalfState::Open, HalfState::Closing) {
            return Ok(());
        }
        debug!(code = ?code.map(|c| c.as_u16()), "close queued");
        self.enqueue_control(ControlFrame::close(payload));
        Ok(())
    }

    pub(crate) fn add_in_flight(&self, n: usize) {
        self.in_flight.fetch_add(n as u64, Ordering::AcqRel);
    }

    pub(crate) fn take_in_flight(&self, n: usize) {
        self.in_flight.fetch_sub(n as u64, Ordering::AcqRel);
    }

    pub(crate) fn set_close_listener(&self, listener: CloseListener) {
        *self.on_close.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub(crate) fn set_message_listener(&self, listener: MessageListener) {
        *self.on_message.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub(crate) fn fire_close(&self, code: Option<CloseCode>, reason: Option<&[u8]>) {
        let listener = self
            .on_close
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(code, reason);
        }
    }

    pub(crate) fn fire_message(&self, len: u64, is_text: bool) {
        let listener = self
            .on_message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(len, is_text);
        }
    }
}
