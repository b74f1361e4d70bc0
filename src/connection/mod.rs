//! The duplex engine: two tasks per connection over one upgraded stream.
//!
//! ## Lifecycle
//!
//! Each direction has its own [`HalfState`]. Input closes when a Close frame
//! arrives or reception fails; output moves to `Closing` when a Close is
//! queued and to `Closed` once it is written. [`ConnectionState`] is derived
//! from the two halves.
//!
//! When both tasks have finished, the stream is shut down and dropped.

mod role;
mod state;

pub use role::Role;
pub use state::{ConnectionState, HalfState};

#[cfg(feature = "async-tokio")]
mod control;
#[cfg(feature = "async-tokio")]
mod inbox;
#[cfg(feature = "async-tokio")]
mod reception;
#[cfg(feature = "async-tokio")]
mod release;
#[cfg(feature = "async-tokio")]
mod shared;
#[cfg(feature = "async-tokio")]
mod transmission;
#[cfg(feature = "async-tokio")]
mod websocket;

#[cfg(feature = "async-tokio")]
pub use control::PingFuture;
#[cfg(feature = "async-tokio")]
pub use websocket::WebSocket;
