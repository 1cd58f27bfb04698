//! Reusable byte buffer pool
//!
//! Reduces allocations by reusing buffers across part spools and copy
//! loops. The pool is unbounded; the memory high-water mark is set by
//! peak concurrency times the buffer size.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe pool of byte buffers of a configured capacity.
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
}

impl BufferPool {
    /// Create a new pool handing out buffers of `buffer_capacity` bytes.
    pub fn new(buffer_capacity: usize) -> Arc<Self> {
        Arc::new(BufferPool {
            buffers: Mutex::new(Vec::new()),
            buffer_capacity,
        })
    }

    /// The configured buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Acquire an empty buffer with at least `size` bytes of capacity.
    /// A pooled buffer that is too small is replaced.
    pub fn get(&self, size: usize) -> BytesMut {
        let mut buffer = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));

        if buffer.capacity() < size {
            buffer = BytesMut::with_capacity(size);
        }

        buffer.clear();
        buffer
    }

    /// Return a buffer to the pool. The caller must not use the buffer
    /// after returning it; returning the same buffer twice is forbidden.
    pub fn put(&self, mut buffer: BytesMut) {
        buffer.clear();
        if buffer.capacity() >= self.buffer_capacity {
            self.buffers.lock().push(buffer);
        }
    }

    /// Buffers currently sitting in the pool.
    pub fn available(&self) -> usize {
        self.buffers.lock().len()
    }
}
