//! SHA-1 trailer written after the entry data.

use std::io::{Read, Seek, SeekFrom, Write};

use sha1::{Digest, Sha1};

use super::{FileHeader, TRAILER_DIGEST_SIZE, TRAILER_SIZE};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// SHA-1 of the bytes in `start..end`.
pub fn digest_range<R: Read + Seek>(
    r: &mut R,
    start: u64,
    end: u64,
) -> Result<[u8; TRAILER_DIGEST_SIZE]> {
    r.seek(SeekFrom::Start(start))?;
    let mut hasher = Sha1::new();
    let mut remaining = end.saturating_sub(start);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while remaining > 0 {
        let want = remaining.min(READ_BUFFER_SIZE as u64) as usize;
        r.read_exact(&mut buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    let mut digest = [0u8; TRAILER_DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

/// Appends the trailer for the bytes in `start..end`.
///
/// The sink is left positioned after the trailer.
pub fn write_trailer<S: Read + Write + Seek>(sink: &mut S, start: u64, end: u64) -> Result<()> {
    let digest = digest_range(sink, start, end)?;
    sink.seek(SeekFrom::Start(end))?;
    sink.write_all(&[0])?;
    sink.write_all(&digest)?;
    Ok(())
}

/// Checks the trailer of a container read from `r`.
///
/// Containers without a trailer (or with trailing bytes of another size)
/// pass.
///
/// # Errors
///
/// [`Error::ChecksumMismatch`] if the stored digest differs; the error
/// carries the first eight digest bytes of each side.
pub fn verify_trailer<R: Read + Seek>(
    r: &mut R,
    header: &FileHeader,
    subject: &str,
) -> Result<()> {
    let end = header.data_end();
    if header.file_len != end + TRAILER_SIZE {
        return Ok(());
    }
    let actual = digest_range(r, 0, end)?;

    let mut stored = [0u8; 1 + TRAILER_DIGEST_SIZE];
    r.seek(SeekFrom::Start(end))?;
    r.read_exact(&mut stored)?;
    if stored[0] != 0 {
        log::warn!("'{}' has trailing bytes that are not a checksum", subject);
        return Ok(());
    }
    let stored = &stored[1..];
    if stored != actual {
        return Err(Error::ChecksumMismatch {
            subject: subject.to_string(),
            expected: prefix_u64(stored),
            actual: prefix_u64(&actual),
        });
    }
    log::debug!("Checksum of '{}' verified", subject);
    Ok(())
}

fn prefix_u64(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
