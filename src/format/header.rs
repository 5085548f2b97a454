//! Header block and entry table structures, decoding and encoding.

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

use crate::archive_path::ArchivePath;
use crate::codec::lzss::CHECKSUM_SIZE;
use crate::{Error, Result};

use super::reader::{CountingReader, read_cstring, read_u32_le, write_cstring};
use super::{MAX_STRING_LENGTH, PRODUCT_TAG, PackingMethod, RECORD_FIELDS_SIZE, TRAILER_SIZE};

/// A free-form key/value header from the header list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header key, e.g. `prefix`.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Checks that the header can be represented in the container.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] for an empty key, which would end the list
    /// - [`Error::PrefixEncoding`] if key or value contains a NUL byte
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_operation(
                "write_header",
                "header name must not be empty",
            ));
        }
        if self.name.contains('\0') || self.value.contains('\0') {
            return Err(Error::PrefixEncoding {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// One record of the entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Relative path of the entry.
    pub path: ArchivePath,
    /// Stored or packed.
    pub packing_method: PackingMethod,
    /// Decoded size; zero on stored entries written by some tools.
    pub original_size: u32,
    /// Reserved field, preserved as read.
    pub reserved: u32,
    /// Modification time, seconds since the Unix epoch.
    pub timestamp: u32,
    /// Bytes the entry occupies in the data section.
    pub data_size: u32,
}

impl EntryRecord {
    /// Decoded size of the entry.
    pub fn decoded_size(&self) -> u64 {
        if self.original_size == 0 && !self.packing_method.is_packed() {
            self.data_size as u64
        } else {
            self.original_size as u64
        }
    }

    /// Encoded size of this record in the entry table.
    pub fn record_size(&self) -> u64 {
        self.path.to_entry_name().len() as u64 + 1 + RECORD_FIELDS_SIZE
    }

    /// Writes the record.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_cstring(w, &self.path.to_entry_name())?;
        for field in [
            self.packing_method.tag(),
            self.original_size,
            self.reserved,
            self.timestamp,
            self.data_size,
        ] {
            w.write_all(&field.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Decoded header block of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Header list in file order.
    pub headers: Vec<Header>,
    /// Entry table in file order.
    pub entries: Vec<EntryRecord>,
    /// Offset of the first entry's data.
    pub data_offset: u64,
    /// Total length of the container.
    pub file_len: u64,
}

impl FileHeader {
    /// Data offset of every entry, in table order.
    pub fn entry_offsets(&self) -> Vec<u64> {
        let mut offset = self.data_offset;
        self.entries
            .iter()
            .map(|entry| {
                let start = offset;
                offset += entry.data_size as u64;
                start
            })
            .collect()
    }

    /// Offset just past the last entry's data.
    pub fn data_end(&self) -> u64 {
        self.data_offset
            + self
                .entries
                .iter()
                .map(|entry| entry.data_size as u64)
                .sum::<u64>()
    }

    /// Returns true if bytes follow the data section.
    pub fn has_trailer(&self) -> bool {
        self.file_len > self.data_end()
    }
}

struct RawRecord {
    offset: u64,
    name: Vec<u8>,
    method: u32,
    original_size: u32,
    reserved: u32,
    timestamp: u32,
    data_size: u32,
}

impl RawRecord {
    fn into_entry(self) -> Result<EntryRecord> {
        let name = match String::from_utf8(self.name) {
            Ok(name) => name,
            Err(e) => {
                let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                log::warn!("Entry name at {:#x} is not UTF-8, using '{}'", self.offset, lossy);
                lossy
            }
        };
        let path = ArchivePath::new(&name)
            .map_err(|e| Error::malformed(self.offset, format!("entry '{}': {}", name, e)))?;
        let packing_method = PackingMethod::from_tag(self.method);
        if let PackingMethod::Unknown(tag) = packing_method {
            log::warn!("Entry '{}' has unknown packing method {:#x}, reading as stored", path, tag);
        }
        Ok(EntryRecord {
            path,
            packing_method,
            original_size: self.original_size,
            reserved: self.reserved,
            timestamp: self.timestamp,
            data_size: self.data_size,
        })
    }
}

fn header_error(e: io::Error, offset: u64, what: &str) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::malformed(offset, format!("{} is truncated", what)),
        io::ErrorKind::InvalidData => Error::malformed(offset, format!("{}: {}", what, e)),
        _ => Error::Io(e),
    }
}

fn read_raw<R: Read>(r: &mut CountingReader<R>) -> Result<RawRecord> {
    let offset = r.position();
    let mut read = || -> io::Result<RawRecord> {
        let name = read_cstring(r, MAX_STRING_LENGTH)?;
        Ok(RawRecord {
            offset,
            name,
            method: read_u32_le(r)?,
            original_size: read_u32_le(r)?,
            reserved: read_u32_le(r)?,
            timestamp: read_u32_le(r)?,
            data_size: read_u32_le(r)?,
        })
    };
    read().map_err(|e| header_error(e, offset, "entry table"))
}

fn read_string<R: Read>(r: &mut CountingReader<R>) -> Result<String> {
    let offset = r.position();
    let bytes =
        read_cstring(r, MAX_STRING_LENGTH).map_err(|e| header_error(e, offset, "header list"))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::malformed(offset, format!("header list: {}", e.utf8_error())))
}

/// Decodes the header block and entry table of a container.
///
/// The reader is left at an unspecified position.
///
/// # Errors
///
/// Returns [`Error::MalformedHeader`] if the header list or entry table is
/// truncated, an entry name is not a valid path, or the entry sizes exceed
/// the file length.
pub fn read_file_header<R: Read + Seek>(r: &mut R) -> Result<FileHeader> {
    let file_len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(0))?;
    let mut reader = CountingReader::new(BufReader::new(&mut *r), 0);

    let mut headers = Vec::new();
    let first = read_raw(&mut reader)?;
    let mut pending = if first.name.is_empty() && first.method == PRODUCT_TAG {
        loop {
            let name = read_string(&mut reader)?;
            if name.is_empty() {
                break;
            }
            let value = read_string(&mut reader)?;
            headers.push(Header { name, value });
        }
        None
    } else {
        log::debug!("Container has no product record, reading without headers");
        Some(first)
    };

    let mut entries = Vec::new();
    loop {
        let record = match pending.take() {
            Some(record) => record,
            None => read_raw(&mut reader)?,
        };
        if record.name.is_empty() {
            break;
        }
        entries.push(record.into_entry()?);
    }

    let header = FileHeader {
        headers,
        entries,
        data_offset: reader.position(),
        file_len,
    };

    let data_end = header.data_end();
    if data_end > file_len {
        return Err(Error::malformed(
            header.data_offset,
            format!(
                "entry data needs {} bytes but the file ends after {}",
                data_end - header.data_offset,
                file_len - header.data_offset
            ),
        ));
    }
    for entry in &header.entries {
        if entry.packing_method.is_packed() && (entry.data_size as usize) < CHECKSUM_SIZE {
            return Err(Error::malformed(
                header.data_offset,
                format!("packed entry '{}' is smaller than its checksum", entry.path),
            ));
        }
    }
    let rest = file_len - data_end;
    if rest != 0 && rest != TRAILER_SIZE {
        log::warn!("{} unexpected bytes after the entry data", rest);
    }

    log::debug!(
        "Read {} headers and {} entries, data at {:#x}",
        header.headers.len(),
        header.entries.len(),
        header.data_offset
    );
    Ok(header)
}

/// Size of the header block that [`write_header_block`] produces.
pub fn header_block_size(headers: &[Header], entries: &[EntryRecord]) -> u64 {
    let product = 1 + RECORD_FIELDS_SIZE;
    let header_list: u64 = headers
        .iter()
        .map(|h| h.name.len() as u64 + 1 + h.value.len() as u64 + 1)
        .sum::<u64>()
        + 1;
    let table: u64 = entries.iter().map(EntryRecord::record_size).sum();
    let sentinel = 1 + RECORD_FIELDS_SIZE;
    product + header_list + table + sentinel
}

/// Encodes the product record, header list, entry table and sentinel.
///
/// Entry records are written in slice order; the caller must write entry
/// data in the same order.
///
/// # Errors
///
/// Headers are validated before anything is written: see
/// [`Header::validate`]. Entries with an empty path are rejected with
/// [`Error::InvalidOperation`].
pub fn write_header_block<W: Write>(
    w: &mut W,
    headers: &[Header],
    entries: &[EntryRecord],
) -> Result<u64> {
    for header in headers {
        header.validate()?;
    }
    if let Some(entry) = entries.iter().find(|entry| entry.path.is_empty()) {
        return Err(Error::invalid_operation(
            "write_header_block",
            format!("entry with empty path (size {})", entry.data_size),
        ));
    }

    write_cstring(w, "")?;
    w.write_all(&PRODUCT_TAG.to_le_bytes())?;
    w.write_all(&[0u8; 16])?;

    for header in headers {
        write_cstring(w, &header.name)?;
        write_cstring(w, &header.value)?;
    }
    w.write_all(&[0])?;

    for entry in entries {
        entry.write(w)?;
    }

    w.write_all(&[0u8; 1 + RECORD_FIELDS_SIZE as usize])?;
    Ok(header_block_size(headers, entries))
}
