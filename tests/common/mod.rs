//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pbokit::progress::NoProgress;
use pbokit::write::write_archive_file;
use pbokit::{
    ArchivePath, BinarySource, Descriptor, Header, NodeId, NodeTree, TreeEvent, WriteOptions,
    WriteResult,
};

/// Writes `files` below `dir`, creating folders as needed.
///
/// Paths use `/` separators.
pub fn write_files(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, data).unwrap();
    }
}

/// Writes a container at `dir/name` holding `files`.
///
/// The entry data is staged as loose files under `dir/.src`, with each
/// entry flagged for packing when `compressed` is set.
pub fn create_archive_with_result(
    dir: &Path,
    name: &str,
    headers: &[Header],
    files: &[(&str, &[u8])],
    compressed: bool,
    options: &WriteOptions,
) -> pbokit::Result<(PathBuf, WriteResult)> {
    let staging = dir.join(".src");
    write_files(&staging, files);
    let descriptors = files
        .iter()
        .map(|(path, _)| {
            let source = BinarySource::Loose {
                path: staging.join(path),
                compressed,
            };
            Ok(Descriptor::new(ArchivePath::new(path)?, source))
        })
        .collect::<pbokit::Result<Vec<_>>>()?;

    let destination = dir.join(name);
    let result = write_archive_file(&destination, headers, &descriptors, options, &mut NoProgress)?;
    Ok((destination, result))
}

/// Writes a stored container with default options.
pub fn create_archive(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    create_archive_with_result(dir, name, &[], files, false, &WriteOptions::default())
        .unwrap()
        .0
}

/// Creates file nodes for `paths` below the root.
pub fn tree_with(paths: &[&str]) -> (NodeTree, Vec<NodeId>) {
    let mut tree = NodeTree::new("test.pbo");
    let root = tree.root();
    let ids = paths
        .iter()
        .map(|path| {
            tree.create_hierarchy(
                root,
                &ArchivePath::new(path).unwrap(),
                pbokit::ConflictResolution::Unset,
            )
            .unwrap()
        })
        .collect();
    (tree, ids)
}

/// Records every event the tree emits from now on.
pub fn record_events(tree: &mut NodeTree) -> Rc<RefCell<Vec<TreeEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    tree.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

/// Titles of a node's children, in order.
pub fn child_titles(tree: &NodeTree, id: NodeId) -> Vec<String> {
    tree.children(id)
        .iter()
        .map(|&child| tree[child].title().to_string())
        .collect()
}

/// Deterministic bytes that pack well.
pub fn text_payload(len: usize) -> Vec<u8> {
    b"private _unit = player; hint format [\"%1\", _unit];\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Incompressible bytes, seeded so runs are reproducible.
pub fn random_payload(len: usize) -> Vec<u8> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(0x5EED_0B0B_CAFE_1234);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}
