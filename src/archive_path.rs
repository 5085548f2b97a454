//! Segment-based path type used to address nodes and entries.

use crate::{Error, Result};
use std::fmt;

/// Separator used when formatting paths for display.
pub const SEPARATOR: char = '/';

/// Separator used by the container's entry table.
pub const ENTRY_SEPARATOR: char = '\\';

/// Maximum length for a single path string (in bytes).
///
/// Entry names are stored NUL-terminated in the entry table; anything this
/// long is a corrupt table rather than a real asset path.
const MAX_PATH_LENGTH: usize = 32768;

/// An ordered list of path segments.
///
/// The empty path addresses the tree root. Segments are never empty, never
/// contain a separator and never contain a NUL byte. Equality is
/// segment-wise and case-sensitive; case-insensitive sibling uniqueness is
/// enforced by the tree, not by the path.
///
/// # Examples
///
/// ```
/// use pbokit::ArchivePath;
///
/// let path = ArchivePath::new("data/textures/grass.paa").unwrap();
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.file_name(), Some("grass.paa"));
/// assert_eq!(path.to_string(), "data/textures/grass.paa");
///
/// // Backslashes are accepted, the entry table uses them
/// assert_eq!(ArchivePath::new("data\\textures\\grass.paa").unwrap(), path);
///
/// // Empty segments are rejected
/// assert!(ArchivePath::new("data//grass.paa").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(Vec<String>);

impl ArchivePath {
    /// Parses a separator-delimited string.
    ///
    /// Both `/` and `\` split segments. The empty string yields the root path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if the string contains an empty
    /// segment (leading, trailing or doubled separators) or a NUL byte.
    pub fn new(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(Error::InvalidArchivePath(format!(
                "path exceeds maximum length of {} bytes",
                MAX_PATH_LENGTH
            )));
        }
        let segments = s
            .split([SEPARATOR, ENTRY_SEPARATOR])
            .map(str::to_string)
            .collect();
        Self::from_segments(segments)
    }

    /// Builds a path from an explicit segment list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if a segment is empty or holds a
    /// separator or NUL byte.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// The empty path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the root path.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns an iterator over the segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The last segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// The path without its last segment. `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Appends one segment.
    ///
    /// # Errors
    ///
    /// Returns an error if `segment` is not a valid single segment.
    pub fn join(&self, segment: &str) -> Result<Self> {
        validate_segment(segment)?;
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }

    /// Concatenates two paths.
    pub fn concat(&self, other: &ArchivePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Returns true if `prefix` is an ancestor of (or equal to) this path.
    ///
    /// Comparison is segment-wise: `foo/bar` starts with `foo` but not `fo`.
    pub fn starts_with(&self, prefix: &ArchivePath) -> bool {
        prefix.0.len() <= self.0.len() && self.0.iter().zip(&prefix.0).all(|(a, b)| a == b)
    }

    /// Removes `prefix` from the front of this path.
    pub fn strip_prefix(&self, prefix: &ArchivePath) -> Option<Self> {
        if self.starts_with(prefix) {
            Some(Self(self.0[prefix.0.len()..].to_vec()))
        } else {
            None
        }
    }

    /// Formats the path with the entry table separator.
    pub fn to_entry_name(&self) -> String {
        self.0.join(&ENTRY_SEPARATOR.to_string())
    }
}

/// Validates a single segment (also used for node titles).
pub(crate) fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidArchivePath("empty segment".into()));
    }
    if segment.contains('\0') {
        return Err(Error::InvalidArchivePath(format!(
            "segment '{}' contains NUL byte",
            segment.escape_default()
        )));
    }
    if segment.contains([SEPARATOR, ENTRY_SEPARATOR]) {
        return Err(Error::InvalidArchivePath(format!(
            "segment '{}' contains a separator",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}
