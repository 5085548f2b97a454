//! Write options and results.

use std::path::PathBuf;
use std::sync::Arc;

use crate::archive_path::ArchivePath;
use crate::source::BinarySource;

/// Default suffix of the staging file a container is written to before it
/// replaces the destination.
pub const DEFAULT_STAGING_SUFFIX: &str = ".t";

/// Options for writing a container.
///
/// # Example
///
/// ```rust
/// use pbokit::WriteOptions;
///
/// let options = WriteOptions::new().compression(false).staging_suffix(".tmp");
/// assert!(!options.compression);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Pack loose entries flagged for compression.
    ///
    /// Entries already packed inside an archive are always copied verbatim.
    pub compression: bool,
    /// Append the SHA-1 trailer (requires the `checksum` feature).
    pub checksum: bool,
    /// Suffix of the staging file used by path-based writes.
    pub staging_suffix: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: true,
            checksum: cfg!(feature = "checksum"),
            staging_suffix: DEFAULT_STAGING_SUFFIX.to_string(),
        }
    }
}

impl WriteOptions {
    /// Creates write options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables packing of loose entries.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Enables or disables the SHA-1 trailer.
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Sets the staging file suffix.
    pub fn staging_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.staging_suffix = suffix.into();
        self
    }
}

/// Where an entry landed in a written container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlacement {
    /// Entry path.
    pub path: ArchivePath,
    /// Offset of the stored bytes.
    pub offset: u64,
    /// Stored size.
    pub stored_size: u64,
    /// Decoded size.
    pub original_size: u64,
    /// Whether the entry was written packed.
    pub compressed: bool,
    /// Timestamp written to the entry table.
    pub timestamp: u32,
}

impl EntryPlacement {
    /// Source reading this entry back from `archive`.
    pub fn to_source(&self, archive: &Arc<PathBuf>) -> BinarySource {
        BinarySource::Packaged {
            archive: Arc::clone(archive),
            offset: self.offset,
            stored_size: self.stored_size,
            original_size: self.original_size,
            compressed: self.compressed,
            timestamp: self.timestamp,
        }
    }
}

/// Result of a write operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Number of entries written.
    pub entries_written: usize,
    /// Total decoded bytes.
    pub total_size: u64,
    /// Total stored bytes.
    pub stored_size: u64,
    /// Size of the container including header and trailer.
    pub archive_size: u64,
    /// Placement of every entry, in table order.
    pub placements: Vec<EntryPlacement>,
}

impl WriteResult {
    /// Returns the compression ratio (stored / decoded).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.stored_size as f64 / self.total_size as f64
        }
    }
}
