//! Configuration and limits for WebSocket connections.

use std::time::Duration;

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Default size of outgoing data frames (10 KiB).
pub const DEFAULT_FRAME_SIZE: usize = 0x2800;

/// Control frame payload limits.
///
/// A control frame whose declared length exceeds its limit is rejected
/// before any payload byte is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload of Ping and Pong frames.
    ///
    /// Default: 125 (RFC 6455 Section 5.5)
    pub max_ping_payload: usize,

    /// Maximum payload of Close frames.
    ///
    /// Default: 1024
    pub max_close_payload: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ping_payload: 125,
            max_close_payload: 1024,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_ping_payload: usize, max_close_payload: usize) -> Self {
        Self {
            max_ping_payload,
            max_close_payload,
        }
    }

    /// Payload limit for a control opcode. Data opcodes are unlimited.
    #[must_use]
    pub const fn control_limit(&self, opcode: OpCode) -> Option<usize> {
        match opcode {
            OpCode::Ping | OpCode::Pong => Some(self.max_ping_payload),
            OpCode::Close => Some(self.max_close_payload),
            _ => None,
        }
    }

    /// Validate a control frame payload length against its limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControlFrameTooLarge`] if `size` exceeds the limit for `opcode`.
    pub const fn check_control(&self, opcode: OpCode, size: u64) -> Result<()> {
        match self.control_limit(opcode) {
            Some(max) if size > max as u64 => Err(Error::ControlFrameTooLarge { opcode, size, max }),
            _ => Ok(()),
        }
    }
}

/// Timeout configuration for WebSocket connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Read timeout.
    ///
    /// Maximum time the reception task waits for the next bytes of a frame.
    /// Expiry ends input with close code 1008.
    /// Default: None
    pub read: Option<Duration>,

    /// Write timeout.
    ///
    /// Maximum time to write and flush one frame.
    /// Default: None
    pub write: Option<Duration>,

    /// Close timeout.
    ///
    /// How long [`WebSocket::close`](crate::WebSocket::close) waits for both
    /// tasks before forcing release.
    /// Default: 2 seconds
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: None,
            write: None,
            close: Duration::from_secs(2),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(read: Option<Duration>, write: Option<Duration>, close: Duration) -> Self {
        Self { read, write, close }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control frame limits.
    pub limits: Limits,

    /// Size of outgoing data frames (in bytes).
    ///
    /// Buffered application data is cut into frames of at most this size.
    ///
    /// Default: 10 KB (10240)
    pub frame_size: usize,

    /// Mask frames when sending.
    ///
    /// RFC 6455 requires clients to mask all frames. This should be `true`
    /// for clients and `false` for servers.
    ///
    /// Default: false
    pub mask_frames: bool,

    /// Log I/O failures at error level instead of debug.
    ///
    /// Default: false
    pub verbose_errors: bool,

    /// Size of the chunks data payloads are streamed in (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_chunk_size: usize,

    /// Capacity of the inbound chunk queue.
    ///
    /// When full, the reception task stops reading from the socket.
    /// Default: 64
    pub read_queue_capacity: usize,

    /// Capacity of the outbound write command queue.
    ///
    /// When full, `write` waits for the transmission task.
    /// Default: 64
    pub write_queue_capacity: usize,

    /// Timeout configuration.
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            mask_frames: false,
            verbose_errors: false,
            read_chunk_size: 8192,
            read_queue_capacity: 64,
            write_queue_capacity: 64,
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the outgoing frame size. Zero is treated as one.
    #[must_use]
    pub const fn with_frame_size(mut self, size: usize) -> Self {
        self.frame_size = if size == 0 { 1 } else { size };
        self
    }

    /// Enable or disable masking of outgoing frames.
    #[must_use]
    pub const fn with_mask_frames(mut self, mask: bool) -> Self {
        self.mask_frames = mask;
        self
    }

    /// Log I/O failures at error level.
    #[must_use]
    pub const fn with_verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }

    /// Set the inbound streaming chunk size. Zero is treated as one.
    #[must_use]
    pub const fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Set the inbound queue capacity. Zero is treated as one.
    #[must_use]
    pub const fn with_read_queue_capacity(mut self, capacity: usize) -> Self {
        self.read_queue_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Set the outbound queue capacity. Zero is treated as one.
    #[must_use]
    pub const fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Configure for server role (no masking).
    #[must_use]
    pub fn server() -> Self {
        Self::for_role(Role::Server)
    }

    /// Configure for client role (mask all frames).
    #[must_use]
    pub fn client() -> Self {
        Self::for_role(Role::Client)
    }

    /// Default configuration for the given endpoint role.
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        Self {
            mask_frames: role.must_mask(),
            ..Default::default()
        }
    }
}
