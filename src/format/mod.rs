//! PBO container format constants, definitions, and the header codec.
//!
//! Container layout (all integers little-endian `u32`):
//!
//! ```text
//! [product record]  ""\0  'Vers'  0  0  0  0
//! [header list]     (key\0 value\0)*  \0
//! [entry table]     (path\0 method original reserved timestamp stored)*
//! [sentinel]        \0 + 20 zero bytes
//! [entry data]      stored bytes, back to back, in table order
//! [trailer]         0x00 + SHA-1 of everything before it (optional)
//! ```
//!
//! Entry data offsets are implicit: the first entry starts right after the
//! sentinel and each next entry right after the previous one's stored
//! bytes. Writers must therefore emit data in exactly table order.

pub mod header;
pub mod reader;
#[cfg(feature = "checksum")]
pub mod trailer;

pub use header::{EntryRecord, FileHeader, Header, read_file_header, write_header_block};

/// Packing method tag of the product record (`"Vers"` read as little-endian).
pub const PRODUCT_TAG: u32 = 0x5665_7273;

/// Packing method tag of packed entries (`"Cprs"` read as little-endian).
pub const PACKED_TAG: u32 = 0x4370_7273;

/// Packing method tag of stored entries.
pub const UNCOMPRESSED_TAG: u32 = 0;

/// Size of an entry record excluding its name.
pub const RECORD_FIELDS_SIZE: u64 = 20;

/// Size of the SHA-1 digest in the trailer.
pub const TRAILER_DIGEST_SIZE: usize = 20;

/// Size of the trailer: a zero byte plus the digest.
pub const TRAILER_SIZE: u64 = 1 + TRAILER_DIGEST_SIZE as u64;

/// Upper bound for a NUL-terminated string in the header block.
pub const MAX_STRING_LENGTH: usize = 32768;

/// How an entry's bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackingMethod {
    /// Stored verbatim.
    Uncompressed,
    /// LZSS packed with a trailing checksum.
    Packed,
    /// Marks the product record that introduces the header list.
    Product,
    /// Any other tag; read as stored bytes.
    Unknown(u32),
}

impl PackingMethod {
    /// Maps a raw tag to a method.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            UNCOMPRESSED_TAG => Self::Uncompressed,
            PACKED_TAG => Self::Packed,
            PRODUCT_TAG => Self::Product,
            other => Self::Unknown(other),
        }
    }

    /// The raw tag written to the entry table.
    pub fn tag(self) -> u32 {
        match self {
            Self::Uncompressed => UNCOMPRESSED_TAG,
            Self::Packed => PACKED_TAG,
            Self::Product => PRODUCT_TAG,
            Self::Unknown(tag) => tag,
        }
    }

    /// Returns true for LZSS packed entries.
    pub fn is_packed(self) -> bool {
        matches!(self, Self::Packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_spell_ascii() {
        assert_eq!(&PRODUCT_TAG.to_be_bytes(), b"Vers");
        assert_eq!(&PACKED_TAG.to_be_bytes(), b"Cprs");
    }

    #[test]
    fn test_tag_mapping() {
        for method in [
            PackingMethod::Uncompressed,
            PackingMethod::Packed,
            PackingMethod::Product,
            PackingMethod::Unknown(7),
        ] {
            assert_eq!(PackingMethod::from_tag(method.tag()), method);
        }
        assert!(PackingMethod::Packed.is_packed());
        assert!(!PackingMethod::Unknown(PACKED_TAG + 1).is_packed());
    }
}
