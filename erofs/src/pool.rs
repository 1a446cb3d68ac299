//! Pooled block buffers.
//!
//! Every load borrows a scratch buffer sized to one block from the image's
//! pool and returns it when the caller is done, so a sequential read touches
//! at most one buffer at a time instead of allocating per block.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

pub(crate) struct BlockPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
}

impl BlockPool {
    const MAX_POOLED: usize = 8;

    pub(crate) fn new(buf_size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(Self::MAX_POOLED)),
            buf_size,
        }
    }

    pub(crate) fn get(&self) -> PooledBuf<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf {
            buf: Some(buf),
            pool: self,
        }
    }

    fn put(&self, buf: Vec<u8>) {
        let mut buffers = self.buffers.lock();
        if buffers.len() < Self::MAX_POOLED {
            buffers.push(buf);
        }
    }
}

/// A scratch buffer leased from a [`BlockPool`]; handed back on drop.
pub(crate) struct PooledBuf<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BlockPool,
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

/// A loaded block: a leased buffer plus the valid byte range inside it.
///
/// `bytes()` yields the slice `[offset, max_size)`, the remaining bytes of
/// the logical stream within this block.
pub(crate) struct Block<'a> {
    buf: PooledBuf<'a>,
    offset: usize,
    max_size: usize,
}

impl<'a> Block<'a> {
    pub(crate) fn new(buf: PooledBuf<'a>, offset: usize, max_size: usize) -> Self {
        Self {
            buf,
            offset,
            max_size,
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf[self.offset..self.max_size]
    }
}
