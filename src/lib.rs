//! # pbokit
//!
//! A pure-Rust library for reading, editing and writing PBO archives.
//!
//! A PBO is a flat container of named byte blobs preceded by a header block
//! of free-form key/value headers and an entry table. This crate decodes and
//! encodes that layout exactly, keeps an in-memory folder/file tree of an
//! opened archive with conflict-aware editing and change notifications, and
//! streams entries between archives and local disk without loading whole
//! files into memory.
//!
//! ## Quick Start
//!
//! ### Editing an Archive
//!
//! ```rust,no_run
//! use pbokit::{ArchivePath, ConflictResolution, Result};
//! use pbokit::document::Document;
//! use pbokit::progress::NoProgress;
//!
//! fn main() -> Result<()> {
//!     let mut document = Document::open("addon.pbo")?;
//!     let tree = document.tree_mut()?;
//!     let root = tree.root();
//!
//!     // Rename an entry
//!     if let Some(node) = tree.get(root, &ArchivePath::new("scripts/init.sqf")?) {
//!         tree.begin_transaction(node)?.set_title("main.sqf").commit()?;
//!     }
//!
//!     // Write the tree back, replacing the file
//!     let result = document.save(&mut NoProgress)?;
//!     println!("Wrote {} entries", result.entries_written);
//!     Ok(())
//! }
//! ```
//!
//! ### Packing and Unpacking
//!
//! ```rust,no_run
//! use std::path::Path;
//! use pbokit::{ConflictResolution, Result};
//! use pbokit::ops::{self, PackOptions};
//! use pbokit::progress::NoProgress;
//!
//! fn main() -> Result<()> {
//!     let options = PackOptions::new().header("prefix", "x\\addon");
//!     ops::pack(Path::new("addon"), &[], Path::new("addon.pbo"), &options, &mut NoProgress)?;
//!
//!     let result = ops::unpack(
//!         Path::new("addon.pbo"),
//!         &[],
//!         Path::new("out"),
//!         |_| ConflictResolution::Skip,
//!         &mut NoProgress,
//!     )?;
//!     println!("Unpacked {} files", result.written.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `checksum` | Yes | SHA-1 trailer writing and verification |
//! | `regex` | No | Regex-based compression rules |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. See [`error`] for the variants.
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and
//! installs no logger of its own.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Default buffer size for streaming entry data (64 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

pub mod archive_path;
pub mod backend;
pub mod codec;
pub mod document;
pub mod error;
pub mod format;
pub mod ops;
pub mod parcel;
pub mod progress;
pub mod source;
pub mod tree;
pub mod write;

#[cfg(feature = "regex")]
#[cfg_attr(docsrs, doc(cfg(feature = "regex")))]
pub mod rules;

pub use archive_path::ArchivePath;
pub use error::{Error, Result};

pub use backend::{BinaryBackend, TransferResult, UnpackOptions};
pub use document::{Document, HeadersTransaction, ReadOptions};
pub use format::{Header, PackingMethod};
pub use parcel::{ConflictMap, Descriptor, MergeResult, Parcel};
pub use progress::{AtomicProgress, NoProgress, ProgressReporter, progress_fn};
pub use source::BinarySource;
pub use tree::{
    ConflictResolution, Node, NodeId, NodeKind, NodeTree, SubscriptionId, Transaction, TreeEvent,
};
pub use write::{ArchiveWriter, EntryPlacement, WriteOptions, WriteResult};

#[cfg(feature = "regex")]
pub use rules::CompressionRules;
