//! Low-level binary reading utilities for header parsing.

use std::io::{self, Read};

/// A reader that tracks how many bytes were consumed.
///
/// Header errors report the offset where parsing stopped.
pub struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> CountingReader<R> {
    /// Wraps `inner`, starting the count at `position`.
    pub fn new(inner: R, position: u64) -> Self {
        Self { inner, position }
    }

    /// Bytes consumed so far (plus the starting position).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a NUL-terminated string, without the terminator.
///
/// Fails with `InvalidData` if no terminator appears within `max_len` bytes.
pub fn read_cstring<R: Read>(r: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_u8(r)?;
        if byte == 0 {
            return Ok(bytes);
        }
        if bytes.len() == max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("string exceeds {} bytes", max_len),
            ));
        }
        bytes.push(byte);
    }
}

/// Writes a string followed by a NUL terminator.
pub fn write_cstring<W: io::Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_u32_le() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0x04030201);
    }

    #[test]
    fn test_read_cstring() {
        let mut cursor = Cursor::new(b"prefix\0x\\y\0".to_vec());
        assert_eq!(read_cstring(&mut cursor, 64).unwrap(), b"prefix");
        assert_eq!(read_cstring(&mut cursor, 64).unwrap(), b"x\\y");
    }

    #[test]
    fn test_read_cstring_empty() {
        let mut cursor = Cursor::new(vec![0u8]);
        assert!(read_cstring(&mut cursor, 64).unwrap().is_empty());
    }

    #[test]
    fn test_read_cstring_unterminated() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        let err = read_cstring(&mut cursor, 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_cstring_too_long() {
        let mut cursor = Cursor::new(b"abcdef\0".to_vec());
        let err = read_cstring(&mut cursor, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_counting_reader() {
        let mut reader = CountingReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]), 10);
        read_u8(&mut reader).unwrap();
        read_u32_le(&mut reader).unwrap();
        assert_eq!(reader.position(), 15);
    }

    #[test]
    fn test_write_cstring() {
        let mut out = Vec::new();
        write_cstring(&mut out, "key").unwrap();
        assert_eq!(out, b"key\0");
    }
}
