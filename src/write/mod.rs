//! Container writing.
//!
//! The header block goes out first with placeholder sizes, entry data is
//! streamed from each descriptor's source, then the entry table is patched
//! with the real sizes and the SHA-1 trailer appended.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use pbokit::format::Header;
//! use pbokit::progress::NoProgress;
//! use pbokit::{ArchiveWriter, WriteOptions};
//!
//! let mut bytes = Vec::new();
//! let mut writer = ArchiveWriter::new(Cursor::new(&mut bytes)).options(WriteOptions::new());
//! writer.add_header(Header::new("prefix", "x\\addon"))?;
//! let result = writer.finish(&mut NoProgress)?;
//! assert_eq!(result.entries_written, 0);
//! # Ok::<(), pbokit::Error>(())
//! ```

mod options;

pub use options::{DEFAULT_STAGING_SUFFIX, EntryPlacement, WriteOptions, WriteResult};

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::lzss;
use crate::format::header::header_block_size;
use crate::format::{EntryRecord, Header, PackingMethod, RECORD_FIELDS_SIZE, write_header_block};
use crate::parcel::Descriptor;
use crate::progress::ProgressReporter;
use crate::source::BinarySource;
use crate::{Error, Result};

/// Streams descriptors into a container.
///
/// The sink must be readable as well as writable: the trailer digest is
/// computed by reading the written bytes back.
pub struct ArchiveWriter<W> {
    sink: W,
    options: WriteOptions,
    headers: Vec<Header>,
    entries: Vec<Descriptor>,
    names: HashSet<String>,
    label: Option<PathBuf>,
}

/// Outcome of writing a single entry.
struct Written {
    stored_size: u64,
    original_size: u64,
    method: PackingMethod,
}

fn fits_u32(value: u64, what: &str, path: &impl std::fmt::Display) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::invalid_operation(
            "write_entry",
            format!("{} of '{}' exceeds 4 GiB ({} bytes)", what, path, value),
        )
    })
}

impl<W: Read + Write + Seek> ArchiveWriter<W> {
    /// Creates a writer appending at the sink's current position.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            options: WriteOptions::default(),
            headers: Vec::new(),
            entries: Vec::new(),
            names: HashSet::new(),
            label: None,
        }
    }

    /// Names the file behind the sink.
    ///
    /// Sink failures are then reported as [`Error::DiskAccess`] on this path.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.label = Some(path.into());
        self
    }

    /// Replaces the write options.
    pub fn options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a header to the header list.
    ///
    /// # Errors
    ///
    /// See [`Header::validate`].
    pub fn add_header(&mut self, header: Header) -> Result<()> {
        header.validate()?;
        self.headers.push(header);
        Ok(())
    }

    /// Queues an entry. Entries are written in the order they are added.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] for an empty path
    /// - [`Error::Conflict`] if the path repeats an earlier entry (compared
    ///   case-insensitively)
    pub fn add(&mut self, descriptor: Descriptor) -> Result<()> {
        if descriptor.path.is_empty() {
            return Err(Error::invalid_operation("add_entry", "entry path is empty"));
        }
        if !self.names.insert(descriptor.path.to_string().to_lowercase()) {
            return Err(Error::Conflict {
                path: descriptor.path.to_string(),
            });
        }
        self.entries.push(descriptor);
        Ok(())
    }

    /// Queues every descriptor of an iterator.
    pub fn add_all(&mut self, descriptors: impl IntoIterator<Item = Descriptor>) -> Result<()> {
        descriptors.into_iter().try_for_each(|d| self.add(d))
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the container.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `progress` requests cancellation between
    ///   entries; the sink then holds an incomplete container
    /// - [`Error::DiskAccess`] if a source can not be read, or the sink can
    ///   not be written and the writer was given a [`path`][Self::path]
    /// - [`Error::InvalidOperation`] if an entry exceeds the 4 GiB field
    ///   limit
    pub fn finish(mut self, progress: &mut dyn ProgressReporter) -> Result<WriteResult> {
        let label = self.label.take();
        self.write_container(progress).map_err(|e| match (e, label) {
            (Error::Io(e), Some(path)) => Error::disk(path, e),
            (e, _) => e,
        })
    }

    fn write_container(&mut self, progress: &mut dyn ProgressReporter) -> Result<WriteResult> {
        let base = self.sink.stream_position()?;

        let mut records = self
            .entries
            .iter()
            .map(|d| {
                Ok(EntryRecord {
                    path: d.path.clone(),
                    packing_method: d.source.stored_method(),
                    original_size: 0,
                    reserved: 0,
                    timestamp: d.source.timestamp()?,
                    data_size: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut block = Vec::new();
        let block_size = write_header_block(&mut block, &self.headers, &records)?;
        self.sink.write_all(&block)?;

        let table_start = base + header_block_size(&self.headers, &[]) - (1 + RECORD_FIELDS_SIZE);
        let mut field_offsets = Vec::with_capacity(records.len());
        let mut at = table_start;
        for record in &records {
            field_offsets.push(at + record.record_size() - RECORD_FIELDS_SIZE);
            at += record.record_size();
        }

        let mut result = WriteResult::default();
        let mut offset = base + block_size;
        progress.on_total(records.len());

        let entries = std::mem::take(&mut self.entries);
        for (descriptor, record) in entries.iter().zip(records.iter_mut()) {
            if progress.should_cancel() {
                log::debug!("Write cancelled after {} entries", result.entries_written);
                return Err(Error::Cancelled);
            }
            let name = descriptor.path.to_string();
            progress.on_entry_start(&name, descriptor.source.original_size().unwrap_or(0));

            let written = self.write_entry(&descriptor.source)?;
            record.packing_method = written.method;
            record.data_size = fits_u32(written.stored_size, "stored size", &name)?;
            record.original_size = fits_u32(written.original_size, "size", &name)?;

            log::trace!(
                "Wrote '{}' at {:#x}: {} -> {} bytes",
                name,
                offset,
                written.original_size,
                written.stored_size
            );
            result.placements.push(EntryPlacement {
                path: descriptor.path.clone(),
                offset,
                stored_size: written.stored_size,
                original_size: written.original_size,
                compressed: written.method.is_packed(),
                timestamp: record.timestamp,
            });
            result.entries_written += 1;
            result.total_size += written.original_size;
            result.stored_size += written.stored_size;
            offset += written.stored_size;
            progress.on_entry_complete(&name, true);
        }
        let data_end = offset;

        for (record, at) in records.iter().zip(field_offsets) {
            let mut fields = [0u8; RECORD_FIELDS_SIZE as usize];
            for (slot, value) in fields.chunks_exact_mut(4).zip([
                record.packing_method.tag(),
                record.original_size,
                record.reserved,
                record.timestamp,
                record.data_size,
            ]) {
                slot.copy_from_slice(&value.to_le_bytes());
            }
            self.sink.seek(SeekFrom::Start(at))?;
            self.sink.write_all(&fields)?;
        }
        self.sink.seek(SeekFrom::Start(data_end))?;

        result.archive_size = data_end - base;
        if self.options.checksum {
            self.append_trailer(base, data_end)?;
            result.archive_size += crate::format::TRAILER_SIZE;
        }
        self.sink.flush()?;

        log::debug!(
            "Wrote {} entries, {} bytes",
            result.entries_written,
            result.archive_size
        );
        Ok(result)
    }

    #[cfg(feature = "checksum")]
    fn append_trailer(&mut self, start: u64, end: u64) -> Result<()> {
        crate::format::trailer::write_trailer(&mut self.sink, start, end)
    }

    #[cfg(not(feature = "checksum"))]
    fn append_trailer(&mut self, _start: u64, _end: u64) -> Result<()> {
        Err(Error::invalid_operation(
            "write_trailer",
            "the checksum feature is disabled",
        ))
    }

    fn write_entry(&mut self, source: &BinarySource) -> Result<Written> {
        match source {
            BinarySource::Packaged { original_size, .. } => {
                let mut stored = source.open_stored()?;
                let stored_size = std::io::copy(&mut stored, &mut self.sink)
                    .map_err(|e| Error::disk(source.backing_path(), e))?;
                let method = source.stored_method();
                Ok(Written {
                    stored_size,
                    original_size: if method.is_packed() {
                        *original_size
                    } else {
                        stored_size
                    },
                    method,
                })
            }
            BinarySource::Loose {
                compressed: true, ..
            } if self.options.compression => {
                let data = source.read_to_vec()?;
                let packed = lzss::compress(&data);
                let (bytes, method) = if packed.len() < data.len() {
                    (packed.as_slice(), PackingMethod::Packed)
                } else {
                    (data.as_slice(), PackingMethod::Uncompressed)
                };
                self.sink.write_all(bytes)?;
                Ok(Written {
                    stored_size: bytes.len() as u64,
                    original_size: data.len() as u64,
                    method,
                })
            }
            BinarySource::Loose { .. } => {
                let size = source.copy_to(&mut self.sink)?;
                Ok(Written {
                    stored_size: size,
                    original_size: size,
                    method: PackingMethod::Uncompressed,
                })
            }
        }
    }
}

/// Path of the staging file for `destination`.
pub fn staging_path(destination: &Path, suffix: &str) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes a container to `destination` through a staging file.
///
/// The staging file replaces the destination only after the write
/// succeeded; on failure or cancellation it is removed and the destination
/// is left untouched. Sources may read from the destination itself.
///
/// # Errors
///
/// See [`ArchiveWriter::finish`]; [`Error::DiskAccess`] if the staging file
/// can not be created or renamed.
pub fn write_archive_file(
    destination: &Path,
    headers: &[Header],
    descriptors: &[Descriptor],
    options: &WriteOptions,
    progress: &mut dyn ProgressReporter,
) -> Result<WriteResult> {
    let staging = staging_path(destination, &options.staging_suffix);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staging)
        .map_err(|e| Error::disk(&staging, e))?;

    let mut writer = ArchiveWriter::new(file)
        .options(options.clone())
        .path(&staging);
    let written = headers
        .iter()
        .try_for_each(|header| writer.add_header(header.clone()))
        .and_then(|()| writer.add_all(descriptors.iter().cloned()))
        .and_then(|()| writer.finish(progress));

    match written {
        Ok(result) => {
            std::fs::rename(&staging, destination).map_err(|e| Error::disk(destination, e))?;
            log::debug!("Saved '{}'", destination.display());
            Ok(result)
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&staging) {
                log::warn!(
                    "Failed to remove staging file '{}': {}",
                    staging.display(),
                    cleanup
                );
            }
            Err(e)
        }
    }
}
