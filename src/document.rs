//! An opened archive: node tree, header list and staging area.
//!
//! [`Document`] is the unit the front ends work with. It is built by replaying
//! the entry table of a container through
//! [`NodeTree::create_hierarchy`], binds every file node to its bytes inside
//! the container, and writes the whole tree back out on [`Document::save`].
//!
//! ```rust,no_run
//! use pbokit::document::Document;
//! use pbokit::progress::NoProgress;
//!
//! let mut document = Document::open("addon.pbo")?;
//! let mut headers = document.begin_headers_transaction()?;
//! headers.add("prefix", "x\\addon");
//! headers.commit()?;
//! document.save(&mut NoProgress)?;
//! # Ok::<(), pbokit::Error>(())
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive_path::ArchivePath;
use crate::backend::BinaryBackend;
use crate::format::{FileHeader, Header, read_file_header};
use crate::parcel::{ConflictMap, Descriptor, Parcel, check_conflicts, pack_nodes, unpack_tree};
use crate::progress::ProgressReporter;
use crate::source::BinarySource;
use crate::tree::{ConflictResolution, NodeId, NodeTree};
use crate::write::{WriteOptions, WriteResult, write_archive_file};
use crate::{Error, Result};

/// File names whose content becomes a header by [`Document::apply_pack_configuration`].
pub const CONFIGURATION_FILES: [(&str, &str); 3] = [
    ("$prefix$", "prefix"),
    ("$product$", "product"),
    ("$version$", "version"),
];

const SUGGESTED_EXTENSIONS: [&str; 5] = ["sqf", "sqs", "txt", "xml", "csv"];
const SUGGESTED_FILES: [&str; 2] = ["mission.sqm", "description.ext"];

/// Options for opening a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Check the SHA-1 trailer, if the container has one.
    pub verify_checksum: bool,
}

impl ReadOptions {
    /// Creates read options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables trailer verification.
    pub fn verify_checksum(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }
}

struct Loaded {
    path: Arc<PathBuf>,
    tree: NodeTree,
    headers: Vec<Header>,
    backend: BinaryBackend,
}

/// Local copies of nodes made for an interaction outside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionParcel {
    /// Staged files, in descriptor order.
    pub files: Vec<PathBuf>,
    /// Descriptors of the staged files.
    ///
    /// Sources are loose and keep each entry's packing flag, so the parcel
    /// stays valid when this document is saved or unloaded (as long as the
    /// staged files exist).
    pub descriptors: Parcel,
    /// True if staging stopped early on request.
    pub cancelled: bool,
}

/// An archive document.
///
/// A document starts unloaded ([`Document::new`]) or loaded from a file
/// ([`Document::open`]). Every operation on an unloaded document fails with
/// [`Error::InvalidOperation`].
#[derive(Default)]
pub struct Document {
    options: ReadOptions,
    loaded: Option<Loaded>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Document");
        s.field("options", &self.options);
        if let Some(loaded) = &self.loaded {
            s.field("path", &loaded.path)
                .field("headers", &loaded.headers)
                .field("nodes", &loaded.tree.len());
        }
        s.finish_non_exhaustive()
    }
}

impl Document {
    /// Creates an unloaded document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unloaded document that loads with `options`.
    pub fn with_options(options: ReadOptions) -> Self {
        Self {
            options,
            loaded: None,
        }
    }

    /// Opens the container at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::DiskAccess`] if the file can not be read
    /// - [`Error::MalformedHeader`] if the header block is corrupt; no
    ///   document is produced
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ReadOptions::default())
    }

    /// Opens the container at `path` with explicit options.
    pub fn open_with_options(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let mut document = Self::with_options(options);
        document.load(path)?;
        Ok(document)
    }

    /// Starts an empty document that will be saved to `path`.
    ///
    /// Nothing is written until [`Document::save`].
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let title = root_title(path);
        log::debug!("New document '{}'", path.display());
        Ok(Self {
            options: ReadOptions::default(),
            loaded: Some(Loaded {
                path: Arc::new(path.to_path_buf()),
                tree: NodeTree::new(title.clone()),
                headers: Vec::new(),
                backend: BinaryBackend::new(&title)?,
            }),
        })
    }

    /// Loads the container at `path`, replacing the loaded one.
    ///
    /// The previous content stays loaded if reading fails.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::debug!("Loading '{}'", path.display());
        let loaded = read_archive(path, &self.options)?;
        log::debug!(
            "Loaded '{}': {} headers, {} nodes",
            path.display(),
            loaded.headers.len(),
            loaded.tree.len()
        );
        self.loaded = Some(loaded);
        Ok(())
    }

    /// Drops the tree, headers and staging area.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if nothing is loaded.
    pub fn unload(&mut self) -> Result<()> {
        match self.loaded.take() {
            Some(loaded) => {
                log::debug!("Unloaded '{}'", loaded.path.display());
                Ok(())
            }
            None => Err(not_loaded("unload")),
        }
    }

    /// Returns true if a container is loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn state(&self, operation: &'static str) -> Result<&Loaded> {
        self.loaded.as_ref().ok_or_else(|| not_loaded(operation))
    }

    fn state_mut(&mut self, operation: &'static str) -> Result<&mut Loaded> {
        self.loaded.as_mut().ok_or_else(|| not_loaded(operation))
    }

    /// Path of the loaded container.
    pub fn path(&self) -> Result<&Path> {
        Ok(self.state("path")?.path.as_path())
    }

    /// The node tree.
    pub fn tree(&self) -> Result<&NodeTree> {
        Ok(&self.state("tree")?.tree)
    }

    /// The node tree, for editing.
    pub fn tree_mut(&mut self) -> Result<&mut NodeTree> {
        Ok(&mut self.state_mut("tree")?.tree)
    }

    /// Root node of the tree.
    pub fn root(&self) -> Result<NodeId> {
        Ok(self.state("root")?.tree.root())
    }

    /// Header list in file order.
    pub fn headers(&self) -> Result<&[Header]> {
        Ok(&self.state("headers")?.headers)
    }

    /// Starts editing the header list.
    pub fn begin_headers_transaction(&mut self) -> Result<HeadersTransaction<'_>> {
        let headers = &mut self.state_mut("begin_headers_transaction")?.headers;
        let staged = headers.clone();
        Ok(HeadersTransaction { headers, staged })
    }

    /// Writes the document back to its own path.
    ///
    /// See [`Document::save_as`].
    pub fn save(&mut self, progress: &mut dyn ProgressReporter) -> Result<WriteResult> {
        self.save_with_options(&WriteOptions::default(), progress)
    }

    /// [`Document::save`] with explicit write options.
    pub fn save_with_options(
        &mut self,
        options: &WriteOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<WriteResult> {
        let path = self.state("save")?.path.as_path().to_path_buf();
        self.save_as(path, options, progress)
    }

    /// Writes the document to `destination` and makes it the document path.
    ///
    /// Every file node is rebound to its bytes in the new container, so
    /// saving over the opened file is safe.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] if a file node has no content
    /// - [`Error::Cancelled`] if cancelled; the destination is untouched
    /// - any error of [`write_archive_file`]
    pub fn save_as(
        &mut self,
        destination: impl AsRef<Path>,
        options: &WriteOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<WriteResult> {
        let destination = destination.as_ref();
        let loaded = self.state_mut("save")?;
        let root = loaded.tree.root();
        let files = loaded.tree.files(root);

        let descriptors = files
            .iter()
            .map(|&file| {
                let path = loaded.tree.make_path(file)?;
                match loaded.tree[file].source() {
                    Some(source) => Ok(Descriptor::new(path, source.clone())),
                    None => Err(Error::invalid_operation(
                        "save",
                        format!("'{}' has no content", path),
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Saving {} entries to '{}'", descriptors.len(), destination.display());
        let result = write_archive_file(
            destination,
            &loaded.headers,
            &descriptors,
            options,
            progress,
        )?;

        let archive = Arc::new(destination.to_path_buf());
        for (&file, placement) in files.iter().zip(&result.placements) {
            loaded
                .tree
                .set_binary_source(file, Some(placement.to_source(&archive)))?;
        }
        loaded.path = archive;
        Ok(result)
    }

    /// Sets a header from the content of a file node.
    ///
    /// Used for `$prefix$`-style files whose content names the header value.
    ///
    /// # Errors
    ///
    /// - [`Error::PrefixEncoding`] if the content holds a NUL byte or is not
    ///   UTF-8; the header list is unchanged
    /// - [`Error::InvalidOperation`] if the node has no content
    pub fn apply_content_as_header(&mut self, node: NodeId, name: &str) -> Result<()> {
        let loaded = self.state_mut("apply_content_as_header")?;
        let Some(file) = loaded.tree.node(node) else {
            return Err(Error::invalid_operation(
                "apply_content_as_header",
                format!("node {} does not exist", node),
            ));
        };
        let title = file.title().to_string();
        let Some(source) = file.source() else {
            return Err(Error::invalid_operation(
                "apply_content_as_header",
                format!("'{}' has no content", title),
            ));
        };

        let bytes = source.read_to_vec()?;
        if bytes.contains(&0) {
            log::warn!("'{}' holds a NUL byte and can not become a header", title);
            return Err(Error::PrefixEncoding { name: title });
        }
        let value = String::from_utf8(bytes).map_err(|_| Error::PrefixEncoding {
            name: title.clone(),
        })?;

        log::debug!("Header '{}' from '{}'", name, title);
        let mut transaction = HeadersTransaction {
            staged: loaded.headers.clone(),
            headers: &mut loaded.headers,
        };
        transaction.add(name, value);
        transaction.commit()
    }

    /// Moves `$prefix$`, `$product$` and `$version$` into headers.
    ///
    /// Only direct children of the root are considered. Each one found
    /// becomes a header and is removed from the tree. Returns the names of
    /// the headers set.
    pub fn apply_pack_configuration(&mut self) -> Result<Vec<String>> {
        let root = self.root()?;
        let mut applied = Vec::new();
        for (file_name, header) in CONFIGURATION_FILES {
            let tree = self.tree()?;
            let Some(node) = tree.get(root, &ArchivePath::new(file_name)?) else {
                continue;
            };
            if !tree[node].is_file() {
                continue;
            }
            self.apply_content_as_header(node, header)?;
            self.tree_mut()?.remove_from_hierarchy(node)?;
            applied.push(header.to_string());
        }
        Ok(applied)
    }

    /// Include patterns for [`CompressionRules`](crate::rules::CompressionRules)
    /// that reproduce the packing of the loaded container.
    ///
    /// Text-like extensions present anywhere in the tree yield `\.ext$`;
    /// `mission.sqm` and `description.ext` at the root yield `^name$` when
    /// they are packed.
    pub fn suggested_compression_patterns(&self) -> Result<Vec<String>> {
        let tree = self.tree()?;
        let root = tree.root();
        let extensions: std::collections::HashSet<String> = tree
            .files(root)
            .into_iter()
            .filter_map(|file| {
                let title = tree[file].title().to_lowercase();
                title.rsplit_once('.').map(|(_, ext)| ext.to_string())
            })
            .collect();

        let mut patterns: Vec<String> = SUGGESTED_EXTENSIONS
            .iter()
            .filter(|ext| extensions.contains(**ext))
            .map(|ext| format!("\\.{}$", ext))
            .collect();
        for name in SUGGESTED_FILES {
            let packed = ArchivePath::new(name)
                .ok()
                .and_then(|path| tree.get(root, &path))
                .and_then(|node| tree[node].source())
                .is_some_and(BinarySource::is_compressed);
            if packed {
                patterns.push(format!("^{}$", name));
            }
        }
        Ok(patterns)
    }

    /// Stages the selected nodes as local files.
    ///
    /// The files land in the document's private staging directory, laid
    /// out relative to each selection's parent; paths repeated across
    /// selections get numbered names. They live until the document is
    /// unloaded.
    pub fn interaction_prepare(
        &self,
        nodes: &[NodeId],
        progress: &mut dyn ProgressReporter,
    ) -> Result<InteractionParcel> {
        let loaded = self.state("interaction_prepare")?;
        let descriptors = pack_nodes(&loaded.tree, nodes)?;
        let transfer = loaded.backend.stage(descriptors.descriptors(), progress)?;
        Ok(InteractionParcel {
            files: transfer.written,
            descriptors: Parcel::from(transfer.descriptors),
            cancelled: transfer.cancelled,
        })
    }

    /// Finds descriptors that collide below `parent`.
    pub fn check_conflicts(&self, parent: NodeId, descriptors: &[Descriptor]) -> Result<ConflictMap> {
        let loaded = self.state("check_conflicts")?;
        Ok(check_conflicts(&loaded.tree, parent, descriptors))
    }

    /// Creates file nodes for `descriptors` below `parent`, resolving
    /// collisions by `conflicts`.
    pub fn create_node_set(
        &mut self,
        parent: NodeId,
        descriptors: &[Descriptor],
        conflicts: &ConflictMap,
    ) -> Result<Vec<NodeId>> {
        let loaded = self.state_mut("create_node_set")?;
        unpack_tree(&mut loaded.tree, parent, descriptors, conflicts.lookup())
    }

    /// Marks every file matched by `rules` for packing.
    ///
    /// Files already stored unpacked inside the container keep their
    /// packing. Returns the number of files marked.
    #[cfg(feature = "regex")]
    pub fn apply_compression_rules(&mut self, rules: &crate::rules::CompressionRules) -> Result<usize> {
        let tree = &mut self.state_mut("apply_compression_rules")?.tree;
        let mut marked = 0;
        for file in tree.files(tree.root()) {
            let path = tree.make_path(file)?;
            if !rules.matches(&path) {
                continue;
            }
            match tree[file].source() {
                Some(source) if source.is_packaged() && !source.is_compressed() => {
                    log::warn!("'{}' is stored in the container, keeping it unpacked", path);
                }
                Some(_) => {
                    tree.set_compressed(file, true)?;
                    marked += 1;
                }
                None => {}
            }
        }
        log::debug!("Compression rules marked {} files", marked);
        Ok(marked)
    }
}

fn not_loaded(operation: &'static str) -> Error {
    Error::invalid_operation(operation, "no document is loaded")
}

fn root_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_archive(path: &Path, options: &ReadOptions) -> Result<Loaded> {
    let file = File::open(path).map_err(|e| Error::disk(path, e))?;
    let mut reader = BufReader::new(file);
    let header = read_file_header(&mut reader)?;
    if options.verify_checksum {
        verify(&mut reader, &header, path)?;
    }

    let title = root_title(path);
    let archive = Arc::new(path.to_path_buf());
    let mut tree = NodeTree::new(title.clone());
    let root = tree.root();

    for (entry, offset) in header.entries.iter().zip(header.entry_offsets()) {
        let node = tree.create_hierarchy(root, &entry.path, ConflictResolution::Copy)?;
        let loaded_as = tree.make_path(node)?;
        if loaded_as.to_string().to_lowercase() != entry.path.to_string().to_lowercase() {
            log::warn!("Duplicate entry '{}' loaded as '{}'", entry.path, loaded_as);
        }
        let source = BinarySource::Packaged {
            archive: Arc::clone(&archive),
            offset,
            stored_size: entry.data_size as u64,
            original_size: entry.decoded_size(),
            compressed: entry.packing_method.is_packed(),
            timestamp: entry.timestamp,
        };
        tree.set_binary_source(node, Some(source))?;
    }

    Ok(Loaded {
        path: archive,
        tree,
        headers: header.headers,
        backend: BinaryBackend::new(&title)?,
    })
}

#[cfg(feature = "checksum")]
fn verify(reader: &mut BufReader<File>, header: &FileHeader, path: &Path) -> Result<()> {
    crate::format::trailer::verify_trailer(reader, header, &path.display().to_string())
}

#[cfg(not(feature = "checksum"))]
fn verify(_reader: &mut BufReader<File>, header: &FileHeader, path: &Path) -> Result<()> {
    if header.has_trailer() {
        log::warn!(
            "Not verifying the trailer of '{}', built without the checksum feature",
            path.display()
        );
    }
    Ok(())
}

/// Staged edits to a document's header list.
///
/// Dropping the transaction discards the edits.
#[must_use = "header edits do nothing until committed"]
pub struct HeadersTransaction<'a> {
    headers: &'a mut Vec<Header>,
    staged: Vec<Header>,
}

impl HeadersTransaction<'_> {
    /// Headers as they will be after commit.
    pub fn staged(&self) -> &[Header] {
        &self.staged
    }

    /// Appends a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.staged.push(Header::new(name, value));
        self
    }

    /// Removes every header named `name`. Returns the number removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.staged.len();
        self.staged.retain(|header| header.name != name);
        before - self.staged.len()
    }

    /// Removes all headers.
    pub fn clear(&mut self) -> &mut Self {
        self.staged.clear();
        self
    }

    /// Replaces the header list with the staged one.
    ///
    /// # Errors
    ///
    /// See [`Header::validate`]; nothing is applied if any header fails.
    pub fn commit(self) -> Result<()> {
        for header in &self.staged {
            header.validate()?;
        }
        *self.headers = self.staged;
        Ok(())
    }
}
