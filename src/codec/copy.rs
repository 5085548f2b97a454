//! Copy codec (stored entries).

use std::io::{self, Read};


/// A decoder that passes stored entry bytes through unchanged.
///
/// Reads stop after `size` bytes even if the inner reader continues, which
/// is how an entry is bounded inside the archive file.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read + Send> CopyDecoder<R> {
    /// Creates a new copy decoder.
    ///
    /// # Arguments
    ///
    /// * `inner` - The data source, positioned at the entry's first byte
    /// * `size` - Stored size of the entry
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read + Send> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let max_read = (self.remaining.min(buf.len() as u64)) as usize;
        let n = self.inner.read(&mut buf[..max_read])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry data ended {} bytes early", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
