//! Entry codecs.
//!
//! Entries are either stored verbatim or packed with the container's LZSS
//! variant. Both decoders yield the decoded bytes through [`Read`].

mod copy;
pub mod lzss;

use std::io::{Cursor, Read};

/// Decoded entry bytes.
pub type Decoder = Box<dyn Read + Send>;

/// Copy decoder (stored entries).
pub use copy::CopyDecoder;

/// Decoder over an LZSS-packed entry.
///
/// Packed entries are decoded whole (the format's back references span the
/// full 4 KiB window and the checksum trails the data), then served from
/// memory.
pub struct LzssDecoder {
    decoded: Cursor<Vec<u8>>,
}

impl LzssDecoder {
    /// Decodes `packed` (payload plus trailing checksum) into
    /// `original_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is truncated or the checksum does not
    /// match the decoded bytes.
    pub fn new(packed: &[u8], original_size: u64, subject: &str) -> crate::Result<Self> {
        let decoded = lzss::decompress(packed, original_size, subject)?;
        Ok(Self {
            decoded: Cursor::new(decoded),
        })
    }
}

impl Read for LzssDecoder {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.decoded.read(buf)
    }
}
