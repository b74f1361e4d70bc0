//! Half and whole-connection state.
//!
//! Each direction has its own state. Input goes `Open → Closed`, output goes
//! `Open → Closing → Closed`, where `Closing` means a Close frame is queued
//! or sent. The connection state is derived from the two halves.

use std::sync::atomic::{AtomicU8, Ordering};

/// State of one direction of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HalfState {
    /// Frames flow in this direction.
    Open = 0,
    /// A Close frame has been queued; no more data is accepted.
    Closing = 1,
    /// This direction is finished.
    Closed = 2,
}

impl HalfState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => HalfState::Open,
            1 => HalfState::Closing,
            _ => HalfState::Closed,
        }
    }
}

/// [`HalfState`] shared between the application handle and a worker task.
#[derive(Debug)]
pub(crate) struct AtomicHalfState(AtomicU8);

impl AtomicHalfState {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(HalfState::Open as u8))
    }

    pub(crate) fn load(&self) -> HalfState {
        HalfState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.load() == HalfState::Open
    }

    /// Move from `from` to `to`. Returns `true` for the caller that made the change.
    pub(crate) fn transition(&self, from: HalfState, to: HalfState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the half closed, returning the previous state.
    pub(crate) fn close(&self) -> HalfState {
        HalfState::from_u8(self.0.swap(HalfState::Closed as u8, Ordering::AcqRel))
    }
}

/// WebSocket connection state.
///
/// Represents the lifecycle states of a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Both directions are open.
    #[default]
    Open,
    /// One direction has started or finished closing.
    Closing,
    /// Both directions are closed.
    Closed,
}

impl ConnectionState {
    /// Derive the connection state from its two halves.
    #[must_use]
    pub fn from_halves(input: HalfState, output: HalfState) -> Self {
        match (input, output) {
            (HalfState::Open, HalfState::Open) => ConnectionState::Open,
            (HalfState::Closed, HalfState::Closed) => ConnectionState::Closed,
            _ => ConnectionState::Closing,
        }
    }

    /// Check if the connection is in an active state.
    ///
    /// Returns `true` for `Open` or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
