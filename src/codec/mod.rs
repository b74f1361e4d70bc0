//! Frame I/O over the two halves of an async stream.
//!
//! [`FrameReader`] and [`FrameWriter`] apply the pure codec in
//! [`crate::protocol::frame`] to a reader and a writer. The connection
//! engine owns one of each.

#[cfg(feature = "async-tokio")]
mod reader;
#[cfg(feature = "async-tokio")]
mod writer;

#[cfg(feature = "async-tokio")]
pub use reader::FrameReader;
#[cfg(feature = "async-tokio")]
pub use writer::FrameWriter;
