//! Reusable receive buffers.
//!
//! # Responsibilities
//! - Hand out fixed-size buffers to the receive loop
//! - Take them back when the worker is done with the packet
//!
//! # Design Decisions
//! - Return happens on drop, so a panicking worker still gives its buffer back
//! - Idle buffers are capped; extra ones are simply freed

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    max_idle: usize,
}

/// Shared pool of receive buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_idle)),
                buffer_size,
                max_idle,
            }),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn acquire(&self) -> PooledBuffer {
        let recycled = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let data = recycled.unwrap_or_else(|| vec![0; self.inner.buffer_size]);
        PooledBuffer {
            data,
            len: 0,
            pool: self.inner.clone(),
        }
    }
}

/// A buffer on loan from the pool. Derefs to the filled part.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    len: usize,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Whole buffer, for the socket to write into.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mark the first `len` bytes as filled.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut free = self.pool.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.pool.max_idle {
            free.push(std::mem::take(&mut self.data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_recycled() {
        let pool = BufferPool::new(64, 2);
        let mut buf = pool.acquire();
        assert_eq!(buf.spare_mut().len(), 64);
        buf.spare_mut()[..3].copy_from_slice(b"abc");
        buf.set_len(3);
        assert_eq!(&*buf, b"abc");

        drop(buf);
        assert_eq!(pool.idle(), 1);

        let again = pool.acquire();
        assert_eq!(pool.idle(), 0);
        assert!(again.is_empty());
    }

    #[test]
    fn test_idle_cap() {
        let pool = BufferPool::new(16, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_set_len_is_clamped() {
        let pool = BufferPool::new(8, 1);
        let mut buf = pool.acquire();
        buf.set_len(100);
        assert_eq!(buf.len(), 8);
    }
}
