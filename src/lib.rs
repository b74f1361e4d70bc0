//! # wsduplex - WebSocket framing over an already-upgraded stream
//!
//! `wsduplex` takes a byte stream whose HTTP upgrade has completed and runs
//! the RFC 6455 framing protocol over it with two tasks: reception decodes
//! incoming frames, transmission fragments outgoing data and interleaves
//! control frames.
//!
//! ## Features
//!
//! - Strict frame validation; protocol errors close the connection with the
//!   matching status code
//! - Byte-stream writes with message boundaries set by `flush`
//! - Byte, line and whole-message reads from the same input
//! - Ping with a future for the Pong, and automatic Pong replies
//! - Close handshake with exactly-once release of the stream
//! - Handshake helpers for the `Sec-WebSocket-Accept` computation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsduplex::{CloseCode, Config, WebSocket};
//!
//! # async fn run(stream: tokio::net::TcpStream) -> wsduplex::Result<()> {
//! let mut ws = WebSocket::new(stream, Config::server());
//!
//! ws.write(b"part one, ").await?;
//! ws.write(b"part two").await?;
//! ws.flush().await?;
//!
//! let rtt = ws.send_ping("t0")?;
//! assert_eq!(&rtt.await?[..], b"t0");
//!
//! ws.close(Some(CloseCode::Normal), "bye").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod codec;

pub use config::{Config, Limits, Timeouts};
pub use connection::{ConnectionState, HalfState, Role};
#[cfg(feature = "async-tokio")]
pub use connection::{PingFuture, WebSocket};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseRecord, Message};
pub use protocol::{Frame, FrameHeader, OpCode, WS_GUID, compute_accept_key};
