//! Reusable resource pools
//!
//! Byte buffers for part and copy staging, and wire clients for request
//! dispatch.

mod buffer;
mod client;

pub use buffer::BufferPool;
pub use client::ClientPool;
