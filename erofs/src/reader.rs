//! Random-access byte sources backing an image.

use std::io;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A positional reader over an EROFS image.
///
/// Reads never move a shared cursor, so a single source can service multiple
/// handles concurrently. Implementations may be backed by memory, files, or
/// anything else that can produce bytes at an offset.
pub trait ReadAt {
    /// Reads bytes at `offset` into `buf`, returning how many were read.
    ///
    /// A return of zero means the offset is at or past the end of the
    /// source. Short reads are permitted; callers retry for the remainder.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

#[cfg(unix)]
impl ReadAt for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let offset = offset as usize;
        let n = buf.len().min(self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl<R: ReadAt + ?Sized> ReadAt for &R {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<R: ReadAt + ?Sized> ReadAt for Arc<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<R: ReadAt + ?Sized> ReadAt for Box<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// Fills `buf` from `offset`, treating a premature end of the source as a
/// structural error. Reader failures surface as [`Error::Io`].
pub(crate) fn read_exact_at<R: ReadAt + ?Sized>(
    reader: &R,
    buf: &mut [u8],
    offset: u64,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            return Err(Error::Corrupted(format!(
                "short read of {} bytes at offset {}",
                buf.len(),
                offset
            )));
        }
        filled += n;
    }
    Ok(())
}
