//! Selections of entries moving between trees, archives and disk.
//!
//! A [`Parcel`] is an ordered, de-duplicated list of [`Descriptor`]s: each
//! pairs a relative path with a snapshot of the entry's [`BinarySource`].
//! Descriptors are plain data, so a parcel can be handed to a transfer
//! running on another thread while the tree stays with its owner.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive_path::ArchivePath;
use crate::progress::{NoProgress, ProgressReporter};
use crate::source::BinarySource;
use crate::tree::naming::unique_title;
use crate::tree::{ConflictResolution, NodeId, NodeKind, NodeTree};
use crate::{Error, Result};

/// One entry of a parcel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Path relative to the selection's parent.
    pub path: ArchivePath,
    /// Where the bytes are when the descriptor was taken.
    pub source: BinarySource,
}

impl Descriptor {
    /// Creates a descriptor.
    pub fn new(path: ArchivePath, source: BinarySource) -> Self {
        Self { path, source }
    }
}

/// Ordered, de-duplicated descriptor list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parcel {
    descriptors: Vec<Descriptor>,
}

impl Parcel {
    /// Creates an empty parcel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in selection order.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Iterates over the descriptors.
    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.descriptors.iter()
    }

    /// Consumes the parcel.
    pub fn into_descriptors(self) -> Vec<Descriptor> {
        self.descriptors
    }
}

impl From<Vec<Descriptor>> for Parcel {
    fn from(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }
}

impl IntoIterator for Parcel {
    type Item = Descriptor;
    type IntoIter = std::vec::IntoIter<Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}

impl<'a> IntoIterator for &'a Parcel {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Collects the files below the selected nodes.
///
/// Each selection contributes its file descendants depth-first, with paths
/// relative to the selection's parent. A file reached through more than one
/// selection is listed once, under the first selection that reached it.
///
/// # Errors
///
/// [`Error::InvalidOperation`] if a selected node was removed or a file has
/// no content bound.
pub fn pack_nodes(tree: &NodeTree, selection: &[NodeId]) -> Result<Parcel> {
    let mut visited = HashSet::new();
    let mut descriptors = Vec::new();

    for &selected in selection {
        if tree.node(selected).is_none() {
            return Err(Error::invalid_operation(
                "pack_tree",
                format!("node {} does not exist", selected),
            ));
        }
        let base = match tree.parent(selected) {
            Some(parent) => tree.make_path(parent)?,
            None => ArchivePath::root(),
        };

        for file in tree.files(selected) {
            if !visited.insert(file) {
                continue;
            }
            let full = tree.make_path(file)?;
            let source = tree[file].source().cloned().ok_or_else(|| {
                Error::invalid_operation("pack_tree", format!("'{}' has no content", full))
            })?;
            let path = full.strip_prefix(&base).unwrap_or(full);
            descriptors.push(Descriptor { path, source });
        }
    }

    log::debug!(
        "Packed {} descriptors from {} selected nodes",
        descriptors.len(),
        selection.len()
    );
    Ok(Parcel { descriptors })
}

/// Collects the files below the nodes at `paths`, resolved from `root`.
///
/// # Errors
///
/// [`Error::InvalidOperation`] if a path does not resolve; see also
/// [`pack_nodes`].
pub fn pack_tree(tree: &NodeTree, root: NodeId, paths: &[ArchivePath]) -> Result<Parcel> {
    let selection = paths
        .iter()
        .map(|path| {
            tree.get(root, path).ok_or_else(|| {
                Error::invalid_operation("pack_tree", format!("'{}' not found", path))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    pack_nodes(tree, &selection)
}

/// Collects files and folders from local disk as loose descriptors.
///
/// A file contributes its own name; a folder contributes every file below
/// it, prefixed with the folder name. Symbolic links inside folders are not
/// followed. Files selected twice are listed once.
///
/// # Errors
///
/// - [`Error::DiskAccess`] if a path can not be read
/// - [`Error::InvalidArchivePath`] for names that are not valid UTF-8
pub fn pack_disk<P: AsRef<Path>>(paths: &[P]) -> Result<Parcel> {
    let mut visited = HashSet::new();
    let mut descriptors = Vec::new();

    for selected in paths {
        let selected = selected.as_ref();
        let metadata = std::fs::metadata(selected).map_err(|e| Error::disk(selected, e))?;
        let base = selected.parent().unwrap_or(Path::new(""));

        if metadata.is_file() {
            push_disk_file(&mut descriptors, &mut visited, base, selected)?;
            continue;
        }

        for entry in WalkDir::new(selected)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(selected).to_path_buf();
                Error::disk(path, io::Error::from(e))
            })?;
            if entry.file_type().is_file() {
                push_disk_file(&mut descriptors, &mut visited, base, entry.path())?;
            }
        }
    }

    log::debug!("Packed {} descriptors from disk", descriptors.len());
    Ok(Parcel { descriptors })
}

fn push_disk_file(
    descriptors: &mut Vec<Descriptor>,
    visited: &mut HashSet<PathBuf>,
    base: &Path,
    file: &Path,
) -> Result<()> {
    let key = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    if !visited.insert(key) {
        return Ok(());
    }
    let relative = file.strip_prefix(base).unwrap_or(file);
    let segments = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name),
            _ => None,
        })
        .map(|name| {
            name.to_str().map(str::to_string).ok_or_else(|| {
                Error::InvalidArchivePath(format!("'{}' is not valid UTF-8", file.display()))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    descriptors.push(Descriptor {
        path: ArchivePath::from_segments(segments)?,
        source: BinarySource::loose(file),
    });
    Ok(())
}

fn folded(path: &ArchivePath) -> String {
    path.to_string().to_lowercase()
}

/// Gives every descriptor whose path repeats an earlier one (compared
/// case-insensitively) a numbered file name, as [`ConflictResolution::Copy`]
/// would.
///
/// Selections from different folders can share a relative path; laid out in
/// one directory they would overwrite each other.
///
/// # Errors
///
/// [`Error::InvalidArchivePath`] if a repeated path has no file name.
pub fn number_repeats(descriptors: &[Descriptor]) -> Result<Vec<Descriptor>> {
    let listed: HashSet<String> = descriptors.iter().map(|d| folded(&d.path)).collect();
    let mut used = HashSet::new();
    let mut numbered = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let mut path = descriptor.path.clone();
        if !used.insert(folded(&path)) {
            let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                return Err(Error::InvalidArchivePath(format!(
                    "'{}' has no file name",
                    path
                )));
            };
            let title = unique_title(name, NodeKind::File, |candidate| {
                parent.join(candidate).is_ok_and(|p| {
                    let key = folded(&p);
                    listed.contains(&key) || used.contains(&key)
                })
            });
            path = parent.join(&title)?;
            log::debug!("'{}' is listed twice, the repeat becomes '{}'", descriptor.path, path);
            used.insert(folded(&path));
        }
        numbered.push(Descriptor {
            path,
            source: descriptor.source.clone(),
        });
    }
    Ok(numbered)
}

/// Per-path collision decisions for an unpack into a tree.
///
/// Paths not in the map resolve to [`ConflictResolution::Unset`], which is
/// harmless for paths that do not collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictMap {
    entries: BTreeMap<ArchivePath, ConflictResolution>,
}

impl ConflictMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of colliding paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing collides.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decision for `path`.
    pub fn get(&self, path: &ArchivePath) -> ConflictResolution {
        self.entries.get(path).copied().unwrap_or_default()
    }

    /// Overrides the decision for `path`. Returns false if `path` does not
    /// collide.
    pub fn set(&mut self, path: &ArchivePath, resolution: ConflictResolution) -> bool {
        match self.entries.get_mut(path) {
            Some(slot) => {
                *slot = resolution;
                true
            }
            None => false,
        }
    }

    /// Applies one decision to every collision.
    pub fn set_all(&mut self, resolution: ConflictResolution) {
        self.entries.values_mut().for_each(|slot| *slot = resolution);
    }

    /// Colliding paths with their decisions, sorted by path.
    pub fn iter(&self) -> impl Iterator<Item = (&ArchivePath, ConflictResolution)> {
        self.entries.iter().map(|(path, res)| (path, *res))
    }

    /// Resolution lookup usable with [`unpack_tree`].
    pub fn lookup(&self) -> impl Fn(&Descriptor) -> ConflictResolution + '_ {
        move |descriptor| self.get(&descriptor.path)
    }
}

/// Finds descriptors that would collide when unpacked below `parent`.
///
/// A descriptor collides if its path already resolves in the tree or
/// repeats an earlier descriptor's path (compared case-insensitively).
/// Every collision starts as [`ConflictResolution::Copy`].
pub fn check_conflicts(tree: &NodeTree, parent: NodeId, descriptors: &[Descriptor]) -> ConflictMap {
    let mut seen = HashSet::new();
    let mut map = ConflictMap::new();
    for descriptor in descriptors {
        let folded = descriptor.path.to_string().to_lowercase();
        let repeated = !seen.insert(folded);
        if repeated || tree.get(parent, &descriptor.path).is_some() {
            map.entries
                .insert(descriptor.path.clone(), ConflictResolution::Copy);
        }
    }
    if !map.is_empty() {
        log::debug!("{} of {} descriptors collide", map.len(), descriptors.len());
    }
    map
}

/// Outcome of [`merge_into_tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Nodes created, in descriptor order.
    pub created: Vec<NodeId>,
    /// Descriptors skipped by their resolution.
    pub skipped: usize,
    /// True if the merge stopped early on request.
    pub cancelled: bool,
}

/// Creates a file node per descriptor and binds its source.
///
/// `lookup` decides each descriptor's collision policy;
/// [`ConflictResolution::Skip`] leaves out a descriptor whose path already
/// resolves when it is reached. An earlier descriptor of the same list
/// counts, so of two repeats only the second is skipped.
///
/// # Errors
///
/// The first failing [`NodeTree::create_hierarchy`]; nodes created before it
/// stay in the tree.
pub fn unpack_tree(
    tree: &mut NodeTree,
    parent: NodeId,
    descriptors: &[Descriptor],
    lookup: impl Fn(&Descriptor) -> ConflictResolution,
) -> Result<Vec<NodeId>> {
    merge_into_tree(tree, parent, descriptors, lookup, &mut NoProgress).map(|r| r.created)
}

/// [`unpack_tree`] with progress reporting and cancellation.
///
/// Cancellation is checked before each descriptor; the nodes already
/// created stay.
pub fn merge_into_tree(
    tree: &mut NodeTree,
    parent: NodeId,
    descriptors: &[Descriptor],
    lookup: impl Fn(&Descriptor) -> ConflictResolution,
    progress: &mut dyn ProgressReporter,
) -> Result<MergeResult> {
    let mut result = MergeResult::default();
    progress.on_total(descriptors.len());

    for descriptor in descriptors {
        if progress.should_cancel() {
            log::debug!("Merge cancelled after {} entries", result.created.len());
            result.cancelled = true;
            break;
        }
        let name = descriptor.path.to_string();
        let resolution = lookup(descriptor);
        if resolution == ConflictResolution::Skip && tree.get(parent, &descriptor.path).is_some() {
            log::trace!("Skipping '{}'", name);
            result.skipped += 1;
            progress.on_entry_complete(&name, true);
            continue;
        }

        progress.on_entry_start(&name, descriptor.source.original_size().unwrap_or(0));
        let node = tree.create_hierarchy(parent, &descriptor.path, resolution)?;
        tree.set_binary_source(node, Some(descriptor.source.clone()))?;
        result.created.push(node);
        progress.on_entry_complete(&name, true);
    }

    Ok(result)
}
