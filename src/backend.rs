//! Moving entry bytes between archives and local disk.
//!
//! The pull phase ([`BinaryBackend::materialize`]) writes descriptors to a
//! directory and hands back loose descriptors for the written files. The
//! push phase ([`BinaryBackend::merge`]) binds descriptors to nodes of a
//! tree. Both poll for cancellation between entries; what was finished
//! before the request stays.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;

use crate::archive_path::ArchivePath;
use crate::parcel::{Descriptor, MergeResult, merge_into_tree, number_repeats};
use crate::progress::ProgressReporter;
use crate::source::BinarySource;
use crate::tree::{ConflictResolution, NodeId, NodeTree};
use crate::{Error, Result};

/// Suffix of the file an entry is written to before it is renamed into place.
pub const PART_SUFFIX: &str = ".part";

/// Options for writing entries to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Set each file's modification time from the entry timestamp.
    pub restore_timestamps: bool,
    /// Replace files that already exist at the target path.
    pub overwrite: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            restore_timestamps: true,
            overwrite: true,
        }
    }
}

impl UnpackOptions {
    /// Creates unpack options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables timestamp restoration.
    pub fn restore_timestamps(mut self, enabled: bool) -> Self {
        self.restore_timestamps = enabled;
        self
    }

    /// Enables or disables replacing existing files.
    pub fn overwrite(mut self, enabled: bool) -> Self {
        self.overwrite = enabled;
        self
    }
}

/// Outcome of [`BinaryBackend::materialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResult {
    /// Files written, in descriptor order.
    pub written: Vec<PathBuf>,
    /// Loose descriptors for the written files.
    pub descriptors: Vec<Descriptor>,
    /// Descriptors left out because the target existed.
    pub skipped: usize,
    /// Decoded bytes written.
    pub bytes: u64,
    /// True if the transfer stopped early on request.
    pub cancelled: bool,
}

/// Maps an entry path below `root`, refusing anything that would leave it.
pub fn local_path(root: &Path, path: &ArchivePath) -> Result<PathBuf> {
    let mut local = root.to_path_buf();
    for segment in path.components() {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => local.push(name),
            _ => {
                return Err(Error::InvalidArchivePath(format!(
                    "'{}' escapes the destination directory",
                    path
                )));
            }
        }
    }
    Ok(local)
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Transfer engine of a document.
///
/// Owns a private staging directory that entries are materialized to for
/// interactions that need local files (drag and drop, opening with another
/// program). The directory is removed when the backend is dropped.
#[derive(Debug)]
pub struct BinaryBackend {
    staging: tempfile::TempDir,
}

impl BinaryBackend {
    /// Creates a backend with a fresh staging directory.
    ///
    /// # Errors
    ///
    /// [`Error::DiskAccess`] if the directory can not be created.
    pub fn new(name: &str) -> Result<Self> {
        let prefix = format!("pbokit-{}-", name);
        let staging = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir()
            .map_err(|e| Error::disk(std::env::temp_dir().join(&prefix), e))?;
        log::debug!("Staging directory at '{}'", staging.path().display());
        Ok(Self { staging })
    }

    /// The staging directory.
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Materializes descriptors into the staging directory.
    ///
    /// Paths repeated within `descriptors` are staged under numbered names
    /// (see [`number_repeats`]), so every descriptor gets its own file. The
    /// returned descriptors carry the staged paths.
    pub fn stage(
        &self,
        descriptors: &[Descriptor],
        progress: &mut dyn ProgressReporter,
    ) -> Result<TransferResult> {
        let descriptors = number_repeats(descriptors)?;
        Self::materialize(&descriptors, self.staging.path(), &UnpackOptions::default(), progress)
    }

    /// Writes every descriptor's decoded bytes below `destination`.
    ///
    /// Each entry goes to a `.part` file first and is renamed into place
    /// once complete, so a cancelled or failed transfer never leaves a
    /// truncated file under the entry's name.
    ///
    /// # Errors
    ///
    /// The first failing entry aborts the transfer:
    /// - [`Error::InvalidArchivePath`] if a path would escape `destination`
    /// - [`Error::DiskAccess`] if a source can not be read or a target
    ///   written
    pub fn materialize(
        descriptors: &[Descriptor],
        destination: &Path,
        options: &UnpackOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<TransferResult> {
        let mut result = TransferResult::default();
        progress.on_total(descriptors.len());

        for descriptor in descriptors {
            if progress.should_cancel() {
                log::debug!("Transfer cancelled after {} entries", result.written.len());
                result.cancelled = true;
                break;
            }

            let name = descriptor.path.to_string();
            let target = local_path(destination, &descriptor.path)?;
            if !options.overwrite && target.exists() {
                log::trace!("Keeping existing '{}'", target.display());
                result.skipped += 1;
                progress.on_entry_complete(&name, true);
                continue;
            }

            progress.on_entry_start(&name, descriptor.source.original_size().unwrap_or(0));
            let bytes = match write_entry(&descriptor.source, &target) {
                Ok(bytes) => bytes,
                Err(e) => {
                    progress.on_entry_complete(&name, false);
                    return Err(e);
                }
            };

            if options.restore_timestamps {
                restore_mtime(&descriptor.source, &target, progress);
            }

            log::trace!("Materialized '{}' ({} bytes)", name, bytes);
            result.bytes += bytes;
            result.descriptors.push(Descriptor {
                path: descriptor.path.clone(),
                source: BinarySource::Loose {
                    path: target.clone(),
                    compressed: descriptor.source.is_compressed(),
                },
            });
            result.written.push(target);
            progress.on_entry_complete(&name, true);
        }

        log::debug!(
            "Materialized {} entries ({} bytes) to '{}'",
            result.written.len(),
            result.bytes,
            destination.display()
        );
        Ok(result)
    }

    /// Creates nodes below `parent` for the descriptors and binds their
    /// sources.
    ///
    /// # Errors
    ///
    /// The first failing [`NodeTree::create_hierarchy`]; nodes created before
    /// it stay in the tree.
    pub fn merge(
        tree: &mut NodeTree,
        parent: NodeId,
        descriptors: &[Descriptor],
        lookup: impl Fn(&Descriptor) -> ConflictResolution,
        progress: &mut dyn ProgressReporter,
    ) -> Result<MergeResult> {
        merge_into_tree(tree, parent, descriptors, lookup, progress)
    }
}

fn write_entry(source: &BinarySource, target: &Path) -> Result<u64> {
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).map_err(|e| Error::disk(dir, e))?;
    }
    let part = part_path(target);
    let written = copy_to_file(source, &part).and_then(|bytes| {
        fs::rename(&part, target)
            .map(|()| bytes)
            .map_err(|e| Error::disk(target, e))
    });
    if written.is_err() {
        if let Err(cleanup) = fs::remove_file(&part) {
            log::warn!("Failed to remove '{}': {}", part.display(), cleanup);
        }
    }
    written
}

fn copy_to_file(source: &BinarySource, path: &Path) -> Result<u64> {
    let file = File::create(path).map_err(|e| Error::disk(path, e))?;
    let mut out = BufWriter::new(file);
    let bytes = source.copy_to(&mut out)?;
    out.flush().map_err(|e| Error::disk(path, e))?;
    Ok(bytes)
}

fn restore_mtime(source: &BinarySource, target: &Path, progress: &mut dyn ProgressReporter) {
    let timestamp = match source.timestamp() {
        Ok(0) | Err(_) => return,
        Ok(timestamp) => timestamp,
    };
    let mtime = FileTime::from_unix_time(i64::from(timestamp), 0);
    if let Err(e) = filetime::set_file_mtime(target, mtime) {
        let message = format!("Failed to set mtime on '{}': {}", target.display(), e);
        log::warn!("{}", message);
        progress.on_warning(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, progress_fn};

    fn descriptors(dir: &Path, count: usize) -> Vec<Descriptor> {
        (0..count)
            .map(|i| {
                let file = dir.join(format!("src{}.bin", i));
                fs::write(&file, vec![i as u8; 100]).unwrap();
                Descriptor::new(
                    ArchivePath::new(&format!("out/e{}.bin", i)).unwrap(),
                    BinarySource::loose(file),
                )
            })
            .collect()
    }

    #[test]
    fn test_local_path_rejects_escape() {
        let root = Path::new("/dest");
        let ok = local_path(root, &ArchivePath::new("a/b.txt").unwrap()).unwrap();
        assert_eq!(ok, Path::new("/dest/a/b.txt"));
        for bad in ["../x", "a/../../x", "./x"] {
            let err = local_path(root, &ArchivePath::new(bad).unwrap()).unwrap_err();
            assert!(matches!(err, Error::InvalidArchivePath(_)), "{}", bad);
        }
    }

    #[test]
    fn test_materialize_writes_files() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let input = descriptors(src.path(), 3);

        let result =
            BinaryBackend::materialize(&input, dest.path(), &UnpackOptions::default(), &mut NoProgress)
                .unwrap();

        assert!(!result.cancelled);
        assert_eq!(result.written.len(), 3);
        assert_eq!(result.bytes, 300);
        assert_eq!(fs::read(dest.path().join("out/e2.bin")).unwrap(), vec![2u8; 100]);
        assert_eq!(
            result.descriptors[1].source,
            BinarySource::loose(dest.path().join("out/e1.bin"))
        );
    }

    #[test]
    fn test_cancel_after_four_of_ten() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let input = descriptors(src.path(), 10);
        let mut progress = progress_fn(|done, _total| done < 4);

        let result =
            BinaryBackend::materialize(&input, dest.path(), &UnpackOptions::default(), &mut progress)
                .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.written.len(), 4);
        let mut on_disk: Vec<_> = fs::read_dir(dest.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, ["e0.bin", "e1.bin", "e2.bin", "e3.bin"]);
    }

    #[test]
    fn test_missing_source_aborts_without_part_file() {
        let dest = tempfile::tempdir().unwrap();
        let input = vec![Descriptor::new(
            ArchivePath::new("gone.txt").unwrap(),
            BinarySource::loose("/nonexistent/source.txt"),
        )];
        let err =
            BinaryBackend::materialize(&input, dest.path(), &UnpackOptions::default(), &mut NoProgress)
                .unwrap_err();
        assert!(matches!(err, Error::DiskAccess { .. }));
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_keep_existing_when_not_overwriting() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let input = descriptors(src.path(), 1);
        fs::create_dir_all(dest.path().join("out")).unwrap();
        fs::write(dest.path().join("out/e0.bin"), b"mine").unwrap();

        let result = BinaryBackend::materialize(
            &input,
            dest.path(),
            &UnpackOptions::new().overwrite(false),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(fs::read(dest.path().join("out/e0.bin")).unwrap(), b"mine");
    }

    #[test]
    fn test_timestamp_restored() {
        let dest = tempfile::tempdir().unwrap();
        let archive = dest.path().join("fake.pbo");
        fs::write(&archive, b"payload").unwrap();
        let input = vec![Descriptor::new(
            ArchivePath::new("p.txt").unwrap(),
            BinarySource::Packaged {
                archive: std::sync::Arc::new(archive),
                offset: 0,
                stored_size: 7,
                original_size: 7,
                compressed: false,
                timestamp: 1_500_000_000,
            },
        )];
        let out = dest.path().join("out");
        BinaryBackend::materialize(&input, &out, &UnpackOptions::default(), &mut NoProgress)
            .unwrap();

        let metadata = fs::metadata(out.join("p.txt")).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&metadata).unix_seconds(),
            1_500_000_000
        );
    }

    #[test]
    fn test_stage_uses_private_directory() {
        let src = tempfile::tempdir().unwrap();
        let backend = BinaryBackend::new("test").unwrap();
        let result = backend
            .stage(&descriptors(src.path(), 1), &mut NoProgress)
            .unwrap();
        assert!(result.written[0].starts_with(backend.staging_dir()));
    }

    #[test]
    fn test_stage_keeps_repeated_paths_apart() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("x.txt"), b"from x").unwrap();
        fs::write(src.path().join("y.txt"), b"from y").unwrap();
        let input = vec![
            Descriptor::new(
                ArchivePath::new("c.txt").unwrap(),
                BinarySource::loose(src.path().join("x.txt")),
            ),
            Descriptor::new(
                ArchivePath::new("c.txt").unwrap(),
                BinarySource::loose(src.path().join("y.txt")),
            ),
        ];
        let backend = BinaryBackend::new("test").unwrap();
        let result = backend.stage(&input, &mut NoProgress).unwrap();

        assert_eq!(result.written.len(), 2);
        assert_ne!(result.written[0], result.written[1]);
        assert_eq!(fs::read(&result.written[0]).unwrap(), b"from x");
        assert_eq!(fs::read(&result.written[1]).unwrap(), b"from y");
        assert_eq!(result.descriptors[1].path.to_string(), "c(1).txt");
    }
}
