//! Error types for PBO archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when reading, editing or writing PBO archives, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`:
//!
//! ```rust,no_run
//! use pbokit::{Error, Result, document::Document};
//!
//! fn open_or_report(path: &str) -> Result<Option<Document>> {
//!     match Document::open(path) {
//!         Ok(document) => Ok(Some(document)),
//!         Err(Error::MalformedHeader { offset, reason }) => {
//!             eprintln!("{path} is damaged at byte {offset:#x}: {reason}");
//!             Ok(None)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Typical Cause |
//! |----------|----------|---------------|
//! | Format | [`MalformedHeader`][Error::MalformedHeader], [`ChecksumMismatch`][Error::ChecksumMismatch] | Corrupt or truncated container |
//! | Tree | [`Conflict`][Error::Conflict], [`InvalidOperation`][Error::InvalidOperation], [`InvalidArchivePath`][Error::InvalidArchivePath] | Naming collisions, illegal requests |
//! | Disk | [`DiskAccess`][Error::DiskAccess], [`Io`][Error::Io] | Loose files, output files |
//! | Content | [`PrefixEncoding`][Error::PrefixEncoding] | Header value sourced from a file holds a NUL byte |

use std::io;
use std::path::PathBuf;

/// The main error type for PBO archive operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the archive stream itself.
    ///
    /// Failures on loose files are reported as [`Error::DiskAccess`] instead,
    /// so that the offending path is always part of the message.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The container header block or entry table is corrupt or truncated.
    ///
    /// This is fatal to the open operation: no partial document is exposed.
    #[error("Malformed header at offset {offset:#x}: {reason}")]
    MalformedHeader {
        /// The byte offset where the problem was detected.
        offset: u64,
        /// A description of the problem.
        reason: String,
    },

    /// Hierarchy creation hit a naming collision that the conflict policy
    /// did not resolve.
    ///
    /// # Recovery
    ///
    /// Retry with [`ConflictResolution::Replace`] or
    /// [`ConflictResolution::Copy`].
    ///
    /// [`ConflictResolution::Replace`]: crate::tree::ConflictResolution::Replace
    /// [`ConflictResolution::Copy`]: crate::tree::ConflictResolution::Copy
    #[error("Conflict: an entry already exists at '{path}'")]
    Conflict {
        /// The colliding path.
        path: String,
    },

    /// A structurally illegal request, such as removing the tree root or
    /// addressing a node that no longer exists.
    #[error("Invalid operation '{operation}': {reason}")]
    InvalidOperation {
        /// The attempted operation.
        operation: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading or writing a loose file on local disk failed.
    #[error("Disk access failed for '{}': {source}", path.display())]
    DiskAccess {
        /// The file that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A header value sourced from file content contains a NUL byte, which
    /// the container cannot represent.
    #[error("Header source '{name}' contains a NUL byte and can not be stored in the archive")]
    PrefixEncoding {
        /// Title of the node whose content was used.
        name: String,
    },

    /// An archive path is invalid.
    ///
    /// Paths must not contain empty segments or NUL bytes.
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// A packed entry or the archive trailer failed integrity verification.
    #[error("Checksum mismatch for {subject}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// What was being verified (an entry path or `archive`).
        subject: String,
        /// The stored checksum.
        expected: u64,
        /// The computed checksum.
        actual: u64,
    },

    /// A whole-file write was cancelled and the partial output discarded.
    ///
    /// Entry-level transfers do not use this variant; they report
    /// cancellation through their result types instead.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Builds an [`Error::InvalidOperation`].
    pub(crate) fn invalid_operation(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            operation,
            reason: reason.into(),
        }
    }

    /// Builds an [`Error::MalformedHeader`].
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Builds an [`Error::DiskAccess`].
    pub(crate) fn disk(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DiskAccess {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error can be recovered from by retrying with a
    /// different conflict policy.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// A specialized Result type for PBO archive operations.
pub type Result<T> = std::result::Result<T, Error>;
