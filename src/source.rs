//! Where an entry's bytes currently live.
//!
//! A [`BinarySource`] is plain data: it can be cloned into descriptors and
//! sent to worker threads. Nothing is read until [`BinarySource::open`] or
//! [`BinarySource::open_stored`] is called.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;

use crate::codec::{CopyDecoder, Decoder, LzssDecoder};
use crate::format::PackingMethod;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Location of an entry's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySource {
    /// Inside an archive file at a fixed offset.
    Packaged {
        /// The archive file.
        archive: Arc<PathBuf>,
        /// Offset of the entry's first stored byte.
        offset: u64,
        /// Bytes occupied in the archive.
        stored_size: u64,
        /// Size after decoding.
        original_size: u64,
        /// Whether the stored bytes are LZSS packed.
        compressed: bool,
        /// Entry timestamp from the entry table.
        timestamp: u32,
    },
    /// A file on local disk, pending to be written into an archive.
    Loose {
        /// The local file.
        path: PathBuf,
        /// Whether the file should be packed when written.
        compressed: bool,
    },
}

impl BinarySource {
    /// Creates a loose source for an uncompressed local file.
    pub fn loose(path: impl Into<PathBuf>) -> Self {
        Self::Loose {
            path: path.into(),
            compressed: false,
        }
    }

    /// Returns the compression flag.
    ///
    /// For packaged sources this is the storage state; for loose sources it
    /// is the requested packing on the next write.
    pub fn is_compressed(&self) -> bool {
        match self {
            Self::Packaged { compressed, .. } | Self::Loose { compressed, .. } => *compressed,
        }
    }

    /// Returns true for sources inside an archive.
    pub fn is_packaged(&self) -> bool {
        matches!(self, Self::Packaged { .. })
    }

    /// Archive file or local file backing this source.
    pub fn backing_path(&self) -> &Path {
        match self {
            Self::Packaged { archive, .. } => archive.as_path(),
            Self::Loose { path, .. } => path,
        }
    }

    /// Returns a copy with the compression flag changed.
    ///
    /// Sources are replaced, never mutated in place, so this builds the
    /// successor.
    ///
    /// # Errors
    ///
    /// A packaged source's flag describes bytes already written; changing it
    /// fails with [`Error::InvalidOperation`]. Materialize the entry to disk
    /// first.
    pub fn with_compression(&self, compressed: bool) -> Result<Self> {
        match self {
            Self::Loose { path, .. } => Ok(Self::Loose {
                path: path.clone(),
                compressed,
            }),
            Self::Packaged {
                compressed: current,
                ..
            } if *current == compressed => Ok(self.clone()),
            Self::Packaged { archive, offset, .. } => Err(Error::invalid_operation(
                "set_compressed",
                format!(
                    "entry at {:#x} in '{}' must be materialized before its packing can change",
                    offset,
                    archive.display()
                ),
            )),
        }
    }

    /// Decoded size, reading file metadata for loose sources.
    pub fn original_size(&self) -> Result<u64> {
        match self {
            Self::Packaged { original_size, .. } => Ok(*original_size),
            Self::Loose { path, .. } => std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| Error::disk(path, e)),
        }
    }

    /// Entry timestamp (seconds since the Unix epoch).
    pub fn timestamp(&self) -> Result<u32> {
        match self {
            Self::Packaged { timestamp, .. } => Ok(*timestamp),
            Self::Loose { path, .. } => {
                let metadata = std::fs::metadata(path).map_err(|e| Error::disk(path, e))?;
                let seconds = FileTime::from_last_modification_time(&metadata).unix_seconds();
                Ok(u32::try_from(seconds.max(0)).unwrap_or(u32::MAX))
            }
        }
    }

    /// Opens a stream of the decoded bytes.
    ///
    /// # Errors
    ///
    /// [`Error::DiskAccess`] if the backing file can not be opened or read;
    /// [`Error::ChecksumMismatch`] if a packed entry fails verification.
    pub fn open(&self) -> Result<Decoder> {
        match self {
            Self::Packaged {
                compressed: true,
                original_size,
                ..
            } => {
                let mut packed = Vec::new();
                self.open_stored()?
                    .read_to_end(&mut packed)
                    .map_err(|e| Error::disk(self.backing_path(), e))?;
                let subject = self.describe();
                Ok(Box::new(LzssDecoder::new(&packed, *original_size, &subject)?))
            }
            Self::Packaged { .. } => self.open_stored(),
            Self::Loose { path, .. } => {
                let file = File::open(path).map_err(|e| Error::disk(path, e))?;
                let len = file.metadata().map_err(|e| Error::disk(path, e))?.len();
                let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
                Ok(Box::new(CopyDecoder::new(reader, len)))
            }
        }
    }

    /// Opens a stream of the bytes exactly as stored.
    ///
    /// For packaged sources this is the archive slice (packed data included);
    /// for loose sources it is the file itself.
    pub fn open_stored(&self) -> Result<Decoder> {
        match self {
            Self::Packaged {
                archive,
                offset,
                stored_size,
                ..
            } => {
                let path = archive.as_path();
                let mut file = File::open(path).map_err(|e| Error::disk(path, e))?;
                file.seek(SeekFrom::Start(*offset))
                    .map_err(|e| Error::disk(path, e))?;
                let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
                Ok(Box::new(CopyDecoder::new(reader, *stored_size)))
            }
            Self::Loose { .. } => {
                let plain = Self::Loose {
                    path: self.backing_path().to_path_buf(),
                    compressed: false,
                };
                plain.open()
            }
        }
    }

    /// Reads all decoded bytes into memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open()?
            .read_to_end(&mut data)
            .map_err(|e| Error::disk(self.backing_path(), e))?;
        Ok(data)
    }

    /// Copies the decoded bytes to `writer`, returning the byte count.
    pub fn copy_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        let mut reader = self.open()?;
        io::copy(&mut reader, writer).map_err(|e| Error::disk(self.backing_path(), e))
    }

    /// Packing method a verbatim copy of the stored bytes carries.
    pub fn stored_method(&self) -> PackingMethod {
        match self {
            Self::Packaged {
                compressed: true, ..
            } => PackingMethod::Packed,
            _ => PackingMethod::Uncompressed,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Packaged { archive, offset, .. } => {
                format!("{}@{:#x}", archive.display(), offset)
            }
            Self::Loose { path, .. } => path.display().to_string(),
        }
    }
}
