//! Front-end entry points: open, pack and unpack.
//!
//! These wrap [`Document`], the parcel builders and the transfer backend
//! into the three operations a command line or shell integration needs.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use pbokit::ops::{self, PackOptions};
//! use pbokit::progress::NoProgress;
//! use pbokit::ConflictResolution;
//!
//! ops::pack(Path::new("addon"), &[], Path::new("addon.pbo"), &PackOptions::default(), &mut NoProgress)?;
//! ops::unpack(
//!     Path::new("addon.pbo"),
//!     &[],
//!     Path::new("out"),
//!     |_| ConflictResolution::Replace,
//!     &mut NoProgress,
//! )?;
//! # Ok::<(), pbokit::Error>(())
//! ```

use std::path::{Component, Path, PathBuf};

use crate::archive_path::ArchivePath;
use crate::backend::{BinaryBackend, TransferResult, UnpackOptions, local_path};
use crate::document::Document;
use crate::format::Header;
use crate::parcel::{Descriptor, check_conflicts, pack_disk, pack_nodes, pack_tree};
use crate::progress::ProgressReporter;
use crate::tree::naming::unique_title;
use crate::tree::{ConflictResolution, NodeKind};
use crate::write::{WriteOptions, WriteResult};
use crate::{Error, Result};

/// Opens a container.
///
/// Shorthand for [`Document::open`].
pub fn open(path: impl AsRef<Path>) -> Result<Document> {
    Document::open(path)
}

/// Options for [`pack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// How the container is written.
    pub write: WriteOptions,
    /// Headers written before any taken from configuration files.
    pub headers: Vec<Header>,
    /// Turn `$prefix$`, `$product$` and `$version$` at the top level into
    /// headers instead of packing them.
    pub configuration_files: bool,
    /// Patterns selecting files to pack (requires the `regex` feature).
    pub compress_include: Vec<String>,
    /// Patterns excluding files from packing.
    pub compress_exclude: Vec<String>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            headers: Vec::new(),
            configuration_files: true,
            compress_include: Vec::new(),
            compress_exclude: Vec::new(),
        }
    }
}

impl PackOptions {
    /// Creates pack options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the write options.
    pub fn write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Enables or disables configuration file handling.
    pub fn configuration_files(mut self, enabled: bool) -> Self {
        self.configuration_files = enabled;
        self
    }

    /// Adds an include pattern for packing.
    pub fn compress(mut self, pattern: impl Into<String>) -> Self {
        self.compress_include.push(pattern.into());
        self
    }

    /// Adds an exclude pattern for packing.
    pub fn dont_compress(mut self, pattern: impl Into<String>) -> Self {
        self.compress_exclude.push(pattern.into());
        self
    }
}

/// Packs files below `root` into a container at `destination`.
///
/// `selected` names files or folders inside `root` (relative or absolute);
/// an empty selection packs everything in `root`. Entry paths are relative
/// to `root`.
///
/// # Errors
///
/// - [`Error::InvalidOperation`] if a selection lies outside `root`, or
///   compression patterns are given without the `regex` feature
/// - [`Error::DiskAccess`] if a file can not be read
/// - [`Error::PrefixEncoding`] if a configuration file holds a NUL byte
/// - [`Error::Cancelled`] if cancelled; nothing is written
pub fn pack(
    root: &Path,
    selected: &[PathBuf],
    destination: &Path,
    options: &PackOptions,
    progress: &mut dyn ProgressReporter,
) -> Result<WriteResult> {
    let selection = resolve_selection(root, selected)?;
    let mut descriptors = pack_disk(&selection)?.into_descriptors();
    for descriptor in &mut descriptors {
        descriptor.path = relative_entry_path(root, descriptor.source.backing_path())?;
    }
    log::debug!(
        "Packing {} files from '{}' into '{}'",
        descriptors.len(),
        root.display(),
        destination.display()
    );

    let mut document = Document::create(destination)?;
    let top = document.root()?;

    // On an empty tree only names differing by case collide; they resolve
    // to numbered copies.
    let conflicts = check_conflicts(document.tree()?, top, &descriptors);
    for (path, _) in conflicts.iter() {
        log::warn!("'{}' differs from another file only by case, packing a copy", path);
    }
    document.create_node_set(top, &descriptors, &conflicts)?;

    if !options.headers.is_empty() {
        let mut transaction = document.begin_headers_transaction()?;
        for header in &options.headers {
            transaction.add(header.name.clone(), header.value.clone());
        }
        transaction.commit()?;
    }
    if options.configuration_files {
        let applied = document.apply_pack_configuration()?;
        if !applied.is_empty() {
            log::debug!("Headers from configuration files: {}", applied.join(", "));
        }
    }
    apply_compression(&mut document, options)?;

    document.save_with_options(&options.write, progress)
}

#[cfg(feature = "regex")]
fn apply_compression(document: &mut Document, options: &PackOptions) -> Result<()> {
    if options.compress_include.is_empty() {
        return Ok(());
    }
    let rules =
        crate::rules::CompressionRules::new(&options.compress_include, &options.compress_exclude)?;
    document.apply_compression_rules(&rules)?;
    Ok(())
}

#[cfg(not(feature = "regex"))]
fn apply_compression(_document: &mut Document, options: &PackOptions) -> Result<()> {
    if options.compress_include.is_empty() && options.compress_exclude.is_empty() {
        return Ok(());
    }
    Err(Error::invalid_operation(
        "pack",
        "compression patterns require the `regex` feature",
    ))
}

fn resolve_selection(root: &Path, selected: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if selected.is_empty() {
        let mut children = std::fs::read_dir(root)
            .map_err(|e| Error::disk(root, e))?
            .map(|entry| entry.map(|e| e.path()).map_err(|e| Error::disk(root, e)))
            .collect::<Result<Vec<_>>>()?;
        children.sort();
        return Ok(children);
    }
    selected
        .iter()
        .map(|path| {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            };
            if path.starts_with(root) && path != root {
                Ok(path)
            } else {
                Err(Error::invalid_operation(
                    "pack",
                    format!("'{}' is not inside '{}'", path.display(), root.display()),
                ))
            }
        })
        .collect()
}

fn relative_entry_path(root: &Path, file: &Path) -> Result<ArchivePath> {
    let relative = file.strip_prefix(root).map_err(|_| {
        Error::invalid_operation(
            "pack",
            format!("'{}' is not inside '{}'", file.display(), root.display()),
        )
    })?;
    let segments = relative
        .components()
        .map(|component| match component {
            Component::Normal(name) => name.to_str().map(str::to_string).ok_or_else(|| {
                Error::InvalidArchivePath(format!("'{}' is not valid UTF-8", file.display()))
            }),
            _ => Err(Error::InvalidArchivePath(format!(
                "'{}' can not be stored",
                relative.display()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    ArchivePath::from_segments(segments)
}

/// Unpacks entries of the container at `archive` into `destination`.
///
/// `selected` names files or folders in the container; an empty selection
/// unpacks everything. Paths below `destination` mirror the selection's
/// path relative to its parent. For every target that already exists, or
/// that an earlier entry of the selection is about to write, `on_conflict`
/// decides: [`ConflictResolution::Skip`] leaves it,
/// [`ConflictResolution::Replace`] overwrites it and
/// [`ConflictResolution::Copy`] writes a numbered sibling.
///
/// Cancellation is checked between entries; files written before it stay
/// and the result is flagged.
///
/// # Errors
///
/// - [`Error::Conflict`] if `on_conflict` answers [`ConflictResolution::Unset`]
/// - [`Error::InvalidOperation`] if a selected path is not in the container
/// - [`Error::InvalidArchivePath`] for entry names that would leave
///   `destination`
/// - [`Error::DiskAccess`] if a file can not be written
pub fn unpack(
    archive: &Path,
    selected: &[ArchivePath],
    destination: &Path,
    mut on_conflict: impl FnMut(&ArchivePath) -> ConflictResolution,
    progress: &mut dyn ProgressReporter,
) -> Result<TransferResult> {
    let document = Document::open(archive)?;
    let tree = document.tree()?;
    let root = tree.root();
    let parcel = if selected.is_empty() {
        pack_nodes(tree, tree.children(root))?
    } else {
        pack_tree(tree, root, selected)?
    };

    let mut descriptors = Vec::with_capacity(parcel.len());
    let mut skipped = 0;
    for descriptor in parcel {
        let target = local_path(destination, &descriptor.path)?;
        if !target.exists() && !is_planned(&descriptor.path, &descriptors) {
            descriptors.push(descriptor);
            continue;
        }
        match on_conflict(&descriptor.path) {
            ConflictResolution::Skip => {
                log::trace!("Skipping existing '{}'", target.display());
                skipped += 1;
            }
            ConflictResolution::Replace => descriptors.push(descriptor),
            ConflictResolution::Copy => {
                let path = copy_path(&target, &descriptor.path, &descriptors)?;
                descriptors.push(Descriptor::new(path, descriptor.source));
            }
            ConflictResolution::Unset => {
                return Err(Error::Conflict {
                    path: target.display().to_string(),
                });
            }
        }
    }

    log::debug!(
        "Unpacking {} entries of '{}' into '{}'",
        descriptors.len(),
        archive.display(),
        destination.display()
    );
    let mut result =
        BinaryBackend::materialize(&descriptors, destination, &UnpackOptions::default(), progress)?;
    result.skipped += skipped;
    Ok(result)
}

fn is_planned(path: &ArchivePath, planned: &[Descriptor]) -> bool {
    let folded = path.to_string().to_lowercase();
    planned
        .iter()
        .any(|d| d.path.to_string().to_lowercase() == folded)
}

/// Numbered sibling path of `target` free both on disk and among the
/// descriptors already planned.
fn copy_path(target: &Path, path: &ArchivePath, planned: &[Descriptor]) -> Result<ArchivePath> {
    let (Some(dir), Some(name)) = (target.parent(), path.file_name()) else {
        return Err(Error::invalid_operation(
            "unpack",
            format!("'{}' has no file name", path),
        ));
    };
    let parent = path.parent().unwrap_or_else(ArchivePath::root);
    let title = unique_title(name, NodeKind::File, |candidate| {
        dir.join(candidate).exists()
            || parent
                .join(candidate)
                .is_ok_and(|p| is_planned(&p, planned))
    });
    parent.join(&title)
}
