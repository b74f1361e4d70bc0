//! WebSocket protocol core implementation (RFC 6455).

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{Frame, FrameHeader, MAX_PAYLOAD_LEN};
pub use handshake::{UpgradeRequest, UpgradeResponse, WS_GUID, compute_accept_key};
pub use mask::{apply_mask, apply_mask_fast, apply_mask_offset, mask_key};
pub use opcode::OpCode;
