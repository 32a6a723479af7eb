//! Reusable sample buffers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::SampleBuffer;

/// Default number of idle buffers a pool retains.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Pool of cleared buffers.
///
/// Clones share one pool, so a buffer acquired on a producer thread can be
/// released on a consumer thread.
#[derive(Debug, Clone)]
pub struct BufferPool<B> {
    idle: Arc<Mutex<Vec<B>>>,
    max_idle: usize,
}

impl<B: SampleBuffer> Default for BufferPool<B> {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl<B: SampleBuffer> BufferPool<B> {
    pub fn new(max_idle: usize) -> Self {
        Self { idle: Arc::new(Mutex::new(Vec::with_capacity(max_idle))), max_idle }
    }

    /// Takes an empty buffer, reusing a released allocation when one is idle.
    pub fn acquire(&self) -> B {
        self.idle.lock().pop().unwrap_or_default()
    }

    /// Returns a buffer for reuse; dropped when the pool is full.
    pub fn release(&self, mut buffer: B) {
        buffer.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }

    /// Number of idle buffers held.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }
}
