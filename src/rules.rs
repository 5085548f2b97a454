//! Regex rules deciding which files are packed on write.

use regex::{Regex, RegexBuilder};

use crate::archive_path::ArchivePath;
use crate::{Error, Result};

/// Include and exclude patterns matched against entry paths.
///
/// A path is selected if any include pattern matches and no exclude
/// pattern does. Patterns are case-insensitive and see the path with `/`
/// separators.
///
/// ```rust
/// use pbokit::ArchivePath;
/// use pbokit::rules::CompressionRules;
///
/// let rules = CompressionRules::new(&[r"\.sqf$"], &[r"^data/"])?;
/// assert!(rules.matches(&ArchivePath::new("scripts/init.SQF")?));
/// assert!(!rules.matches(&ArchivePath::new("data/init.sqf")?));
/// # Ok::<(), pbokit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CompressionRules {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl CompressionRules {
    /// Compiles the patterns.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] naming the first pattern that does not
    /// compile.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Returns true if `path` should be packed.
    pub fn matches(&self, path: &ArchivePath) -> bool {
        let path = path.to_string();
        self.include.iter().any(|rule| rule.is_match(&path))
            && !self.exclude.iter().any(|rule| rule.is_match(&path))
    }

    /// Number of include patterns.
    pub fn include_count(&self) -> usize {
        self.include.len()
    }

    /// Number of exclude patterns.
    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    log::warn!("Compression rule '{}' is invalid", pattern);
                    Error::invalid_operation(
                        "compression_rules",
                        format!("the pattern \"{}\" is invalid: {}", pattern, e),
                    )
                })
        })
        .collect()
}
