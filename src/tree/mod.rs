//! In-memory document model of an archive's folder/file hierarchy.
//!
//! A [`NodeTree`] is an arena of nodes addressed by [`NodeId`]. It has one
//! synthetic root (the container), folders created on demand, and files
//! that may carry a [`BinarySource`]. Siblings are unique by
//! case-insensitive title and kept sorted: folders first, then files.
//!
//! # Example
//!
//! ```rust
//! use pbokit::{ArchivePath, ConflictResolution, NodeTree};
//!
//! let mut tree = NodeTree::new("addon.pbo");
//! let root = tree.root();
//! let path = ArchivePath::new("scripts/init.sqf")?;
//! let file = tree.create_hierarchy(root, &path, ConflictResolution::Unset)?;
//!
//! assert_eq!(tree.make_path(file)?, path);
//! assert!(tree.create_hierarchy(root, &path, ConflictResolution::Unset).is_err());
//!
//! let copy = tree.create_hierarchy(root, &path, ConflictResolution::Copy)?;
//! assert_eq!(tree[copy].title(), "init(1).sqf");
//! # Ok::<(), pbokit::Error>(())
//! ```

mod event;
pub(crate) mod naming;
mod transaction;

use std::fmt;
use std::ops::Index;

use crate::archive_path::{ArchivePath, validate_segment};
use crate::source::BinarySource;
use crate::{Error, Result};

pub use event::{SubscriptionId, TreeEvent};
pub use transaction::Transaction;

use event::Observer;
use naming::{compare_siblings, same_title, unique_title};

/// Identifies a node within its tree.
///
/// Ids are never reused, so an id of a removed node stays dangling rather
/// than pointing at a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The synthetic root.
    Container,
    /// A folder.
    Folder,
    /// A leaf entry.
    File,
}

/// What to do when a created node collides with an existing sibling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConflictResolution {
    /// No decision made: fail with [`Error::Conflict`].
    #[default]
    Unset,
    /// Leave the existing node; callers skip the entry.
    Skip,
    /// Destroy the existing node and create the new one in its place.
    Replace,
    /// Create the new node under a numbered title.
    Copy,
}

/// A node of the tree.
#[derive(Debug)]
pub struct Node {
    title: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    source: Option<BinarySource>,
}

impl Node {
    /// Title (a single path segment).
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Kind of this node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Parent node; `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in sibling order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Bound source, files only.
    pub fn source(&self) -> Option<&BinarySource> {
        self.source.as_ref()
    }

    /// Returns true for file nodes.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Arena-backed ownership tree with change notification.
///
/// Not thread-safe: observers are plain `FnMut` closures. Transfers that
/// run elsewhere work on [`Descriptor`](crate::parcel::Descriptor)
/// snapshots and report back to the thread that owns the tree.
pub struct NodeTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("root", &self.root)
            .field("nodes", &self.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl NodeTree {
    /// Creates a tree holding only the container node.
    pub fn new(root_title: impl Into<String>) -> Self {
        let root = Node {
            title: root_title.into(),
            kind: NodeKind::Container,
            parent: None,
            children: Vec::new(),
            source: None,
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The container node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns true if the tree holds only the root.
    pub fn is_empty(&self) -> bool {
        self.count(self.root) == 0
    }

    /// Looks a node up; `None` if it was removed.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn live(&self, id: NodeId, operation: &'static str) -> Result<&Node> {
        self.node(id).ok_or_else(|| {
            Error::invalid_operation(operation, format!("node {} does not exist", id))
        })
    }

    fn live_mut(&mut self, id: NodeId, operation: &'static str) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                Error::invalid_operation(operation, format!("node {} does not exist", id))
            })
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    /// Children of a node; empty for files and removed nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    /// Number of children.
    pub fn count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    /// Child at `index`.
    pub fn at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// Distance from the root (the root has depth 0).
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.node(id)?;
        Some(self.ancestors(id).count())
    }

    fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Returns true if `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).any(|p| p == ancestor)
    }

    /// Path from the root to `id`; the root maps to the empty path.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if the node was removed.
    pub fn make_path(&self, id: NodeId) -> Result<ArchivePath> {
        self.live(id, "make_path")?;
        let mut segments: Vec<String> = std::iter::once(id)
            .chain(self.ancestors(id))
            .filter(|&n| n != self.root)
            .filter_map(|n| self.node(n).map(|node| node.title.clone()))
            .collect();
        segments.reverse();
        ArchivePath::from_segments(segments)
    }

    fn find_child(&self, parent: NodeId, title: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.node(c).is_some_and(|n| same_title(&n.title, title)))
    }

    /// Resolves `path` below `id`, matching titles case-insensitively.
    ///
    /// The empty path yields `id` itself.
    pub fn get(&self, id: NodeId, path: &ArchivePath) -> Option<NodeId> {
        self.node(id)?;
        path.components()
            .try_fold(id, |current, segment| self.find_child(current, segment))
    }

    /// All file descendants of `id` in encode order.
    ///
    /// Depth-first in sibling order, so a folder's files come before the
    /// files of its parent. A file node yields itself.
    pub fn files(&self, id: NodeId) -> Vec<NodeId> {
        let mut files = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if node.is_file() {
                files.push(current);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        files
    }

    /// Creates `path` below `parent`, returning the terminal file node.
    ///
    /// Missing folders are created along the way. Descending through an
    /// existing file creates a sibling folder under a numbered title
    /// (`e1.txt` becomes `e1.txt(1)`) and leaves the file in place. A
    /// collision on the terminal segment is resolved by `policy`.
    ///
    /// Emits one [`TreeEvent::ChildCreated`] per created node and a single
    /// closing [`TreeEvent::HierarchyChanged`].
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] if the terminal segment collides and `policy` is
    ///   [`ConflictResolution::Unset`] or [`ConflictResolution::Skip`]; the
    ///   tree is not modified
    /// - [`Error::InvalidOperation`] for an empty path or a `parent` that is
    ///   a file or was removed
    pub fn create_hierarchy(
        &mut self,
        parent: NodeId,
        path: &ArchivePath,
        policy: ConflictResolution,
    ) -> Result<NodeId> {
        if self.live(parent, "create_hierarchy")?.is_file() {
            return Err(Error::invalid_operation(
                "create_hierarchy",
                format!("'{}' is a file", self.make_path(parent)?),
            ));
        }
        let segments = path.segments();
        let Some((terminal, folders)) = segments.split_last() else {
            return Err(Error::invalid_operation(
                "create_hierarchy",
                "path must not be empty",
            ));
        };

        // Walk the folders that already exist. Only when all of them do can
        // the terminal segment collide, so conflicts are detected before
        // anything changes.
        let mut current = parent;
        let mut existing = 0;
        for segment in folders {
            match self.find_child(current, segment) {
                Some(child) if self[child].kind == NodeKind::Folder => {
                    current = child;
                    existing += 1;
                }
                _ => break,
            }
        }

        let collision = if existing == folders.len() {
            self.find_child(current, terminal)
        } else {
            None
        };
        if collision.is_some()
            && matches!(policy, ConflictResolution::Unset | ConflictResolution::Skip)
        {
            return Err(Error::Conflict {
                path: self.make_path(parent)?.concat(path).to_string(),
            });
        }

        let mut events = Vec::new();
        for segment in &folders[existing..] {
            let title = match self.find_child(current, segment) {
                Some(_) => self.sibling_copy_title(current, segment, NodeKind::Folder),
                None => segment.clone(),
            };
            current = self.insert_child(current, title, NodeKind::Folder, &mut events);
        }

        let title = match collision {
            Some(existing) if policy == ConflictResolution::Replace => {
                let index = self.detach(existing)?;
                events.push(TreeEvent::ChildRemoved {
                    parent: current,
                    index,
                });
                terminal.clone()
            }
            Some(_) => self.sibling_copy_title(current, terminal, NodeKind::File),
            None => terminal.clone(),
        };
        let file = self.insert_child(current, title, NodeKind::File, &mut events);

        log::trace!("Created '{}' as {}", path, file);
        self.emit_batch(events);
        Ok(file)
    }

    fn sibling_copy_title(&self, parent: NodeId, title: &str, kind: NodeKind) -> String {
        unique_title(title, kind, |candidate| {
            self.find_child(parent, candidate).is_some()
        })
    }

    /// Inserts at the sorted position.
    fn insert_child(
        &mut self,
        parent: NodeId,
        title: String,
        kind: NodeKind,
        events: &mut Vec<TreeEvent>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let index = self.sorted_position(parent, kind, &title);
        self.nodes.push(Some(Node {
            title,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            source: None,
        }));
        if let Some(Some(node)) = self.nodes.get_mut(parent.0) {
            node.children.insert(index, id);
        }
        events.push(TreeEvent::ChildCreated {
            parent,
            node: id,
            index,
        });
        id
    }

    fn sorted_position(&self, parent: NodeId, kind: NodeKind, title: &str) -> usize {
        self.children(parent).partition_point(|&c| {
            self.node(c).is_some_and(|n| {
                compare_siblings((n.kind, &n.title), (kind, title)).is_lt()
            })
        })
    }

    /// Unlinks `id` from its parent and drops its subtree, returning the
    /// former index.
    fn detach(&mut self, id: NodeId) -> Result<usize> {
        let parent = self.live(id, "remove_from_hierarchy")?.parent.ok_or_else(|| {
            Error::invalid_operation("remove_from_hierarchy", "the root can not be removed")
        })?;
        let siblings = &mut self.live_mut(parent, "remove_from_hierarchy")?.children;
        let index = siblings.iter().position(|&c| c == id).ok_or_else(|| {
            Error::invalid_operation(
                "remove_from_hierarchy",
                format!("node {} is not linked to its parent", id),
            )
        })?;
        siblings.remove(index);

        let mut doomed = vec![id];
        while let Some(current) = doomed.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                doomed.extend(node.children);
            }
        }
        Ok(index)
    }

    /// Detaches and destroys `id` with its subtree.
    ///
    /// Emits [`TreeEvent::ChildRemoved`] for the immediate parent only, then
    /// [`TreeEvent::HierarchyChanged`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] for the root or a removed node.
    pub fn remove_from_hierarchy(&mut self, id: NodeId) -> Result<()> {
        let parent = self.parent(id);
        let index = self.detach(id)?;
        if let Some(parent) = parent {
            log::trace!("Removed {} from {}", id, parent);
            self.emit_batch(vec![TreeEvent::ChildRemoved { parent, index }]);
        }
        Ok(())
    }

    /// Starts a rename of `id`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if the node was removed.
    pub fn begin_transaction(&mut self, id: NodeId) -> Result<Transaction<'_>> {
        let title = self.live(id, "begin_transaction")?.title.clone();
        Ok(Transaction::new(self, id, title))
    }

    /// Applies a staged title. Called by [`Transaction::commit`].
    pub(crate) fn rename(&mut self, id: NodeId, title: String) -> Result<()> {
        let node = self.live(id, "rename")?;
        if node.title == title {
            return Ok(());
        }
        let (kind, parent) = (node.kind, node.parent);
        validate_segment(&title).map_err(|e| Error::invalid_operation("rename", e.to_string()))?;

        let Some(parent) = parent else {
            self.live_mut(id, "rename")?.title = title.clone();
            self.emit_batch(vec![TreeEvent::TitleChanged { node: id, title }]);
            return Ok(());
        };

        if let Some(clash) = self.find_child(parent, &title).filter(|&c| c != id) {
            let existing = self.make_path(clash)?;
            return Err(Error::Conflict {
                path: existing.to_string(),
            });
        }

        let siblings = &mut self.live_mut(parent, "rename")?.children;
        let Some(prev_index) = siblings.iter().position(|&c| c == id) else {
            return Err(Error::invalid_operation(
                "rename",
                format!("node {} is not listed under its parent", id),
            ));
        };
        siblings.remove(prev_index);
        let new_index = self.sorted_position(parent, kind, &title);
        self.live_mut(parent, "rename")?.children.insert(new_index, id);
        self.live_mut(id, "rename")?.title = title.clone();

        let mut events = vec![TreeEvent::TitleChanged { node: id, title }];
        if prev_index != new_index {
            events.push(TreeEvent::ChildMoved {
                parent,
                prev_index,
                new_index,
            });
        }
        self.emit_batch(events);
        Ok(())
    }

    /// Binds a source to a file node, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if `id` is not a live file node.
    pub fn set_binary_source(
        &mut self,
        id: NodeId,
        source: Option<BinarySource>,
    ) -> Result<Option<BinarySource>> {
        let node = self.live_mut(id, "set_binary_source")?;
        if !node.is_file() {
            return Err(Error::invalid_operation(
                "set_binary_source",
                format!("'{}' is not a file", node.title),
            ));
        }
        Ok(std::mem::replace(&mut node.source, source))
    }

    /// Requests packing for a file's next write.
    ///
    /// The source is replaced by one carrying the new flag.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if the node is not a file with a source,
    /// or if the source is packaged with a different packing (see
    /// [`BinarySource::with_compression`]).
    pub fn set_compressed(&mut self, id: NodeId, compressed: bool) -> Result<()> {
        let node = self.live_mut(id, "set_compressed")?;
        let Some(source) = node.source.as_ref() else {
            return Err(Error::invalid_operation(
                "set_compressed",
                format!("'{}' has no content", node.title),
            ));
        };
        let replacement = source.with_compression(compressed)?;
        node.source = Some(replacement);
        Ok(())
    }

    /// Registers an observer for [`TreeEvent`]s.
    pub fn subscribe(&mut self, observer: impl FnMut(&TreeEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    fn emit_batch(&mut self, events: Vec<TreeEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events.iter().chain(std::iter::once(&TreeEvent::HierarchyChanged)) {
            for (_, observer) in self.observers.iter_mut() {
                observer(event);
            }
        }
    }
}

impl Index<NodeId> for NodeTree {
    type Output = Node;

    /// # Panics
    ///
    /// Panics if the node was removed; use [`NodeTree::node`] to check.
    fn index(&self, id: NodeId) -> &Node {
        match self.node(id) {
            Some(node) => node,
            None => panic!("node {} does not exist", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn path(s: &str) -> ArchivePath {
        ArchivePath::new(s).unwrap()
    }

    fn record_events(tree: &mut NodeTree) -> Rc<RefCell<Vec<TreeEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        tree.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    fn titles(tree: &NodeTree, id: NodeId) -> Vec<String> {
        tree.children(id)
            .iter()
            .map(|&c| tree[c].title().to_string())
            .collect()
    }

    #[test]
    fn test_new_tree_has_root() {
        let tree = NodeTree::new("a.pbo");
        let root = tree.root();
        assert_eq!(tree[root].kind(), NodeKind::Container);
        assert_eq!(tree[root].title(), "a.pbo");
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.depth(root), Some(0));
        assert!(tree.is_empty());
        assert_eq!(tree.make_path(root).unwrap(), ArchivePath::root());
    }

    #[test]
    fn test_create_hierarchy_builds_sorted_tree() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        tree.create_hierarchy(root, &path("e1.txt"), ConflictResolution::Copy)
            .unwrap();
        tree.create_hierarchy(root, &path("f2/e2.txt"), ConflictResolution::Copy)
            .unwrap();
        tree.create_hierarchy(root, &path("f2/e3.txt"), ConflictResolution::Copy)
            .unwrap();
        tree.create_hierarchy(root, &path("f2/e3.txt"), ConflictResolution::Copy)
            .unwrap();
        tree.create_hierarchy(root, &path("e1.txt/e4.txt"), ConflictResolution::Copy)
            .unwrap();

        assert_eq!(titles(&tree, root), ["e1.txt(1)", "f2", "e1.txt"]);

        let copied = tree.at(root, 0).unwrap();
        assert_eq!(tree[copied].kind(), NodeKind::Folder);
        assert_eq!(tree.depth(copied), Some(1));
        assert_eq!(titles(&tree, copied), ["e4.txt"]);
        assert_eq!(tree.depth(tree.at(copied, 0).unwrap()), Some(2));

        let f2 = tree.at(root, 1).unwrap();
        assert_eq!(titles(&tree, f2), ["e2.txt", "e3.txt", "e3(1).txt"]);
        assert_eq!(tree.parent(tree.at(f2, 2).unwrap()), Some(f2));

        assert_eq!(tree[tree.at(root, 2).unwrap()].kind(), NodeKind::File);
    }

    #[test]
    fn test_default_policy_conflict_leaves_tree_unchanged() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        tree.create_hierarchy(root, &path("e1.txt"), ConflictResolution::Unset)
            .unwrap();
        tree.create_hierarchy(root, &path("f2/e2.txt"), ConflictResolution::Unset)
            .unwrap();
        let e3 = tree
            .create_hierarchy(root, &path("f2/e3.txt"), ConflictResolution::Unset)
            .unwrap();
        let events = record_events(&mut tree);
        let nodes = tree.len();

        for policy in [ConflictResolution::Unset, ConflictResolution::Skip] {
            let err = tree
                .create_hierarchy(root, &path("f2/e3.txt"), policy)
                .unwrap_err();
            assert!(matches!(err, Error::Conflict { ref path } if path == "f2/e3.txt"));
        }

        assert_eq!(titles(&tree, root), ["f2", "e1.txt"]);
        assert_eq!(tree.len(), nodes);
        assert_eq!(tree.get(root, &path("F2/E3.TXT")), Some(e3));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_descending_through_file_creates_folder_copy() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let file = tree
            .create_hierarchy(root, &path("e1.txt"), ConflictResolution::Unset)
            .unwrap();
        let nested = tree
            .create_hierarchy(root, &path("e1.txt/e4.txt"), ConflictResolution::Unset)
            .unwrap();

        assert_eq!(tree.make_path(nested).unwrap(), path("e1.txt(1)/e4.txt"));
        assert_eq!(tree[file].kind(), NodeKind::File);
        assert_eq!(tree.count(root), 2);
    }

    #[test]
    fn test_replace_destroys_old_subtree() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let old = tree
            .create_hierarchy(root, &path("f2/e1"), ConflictResolution::Unset)
            .unwrap();
        let events = record_events(&mut tree);

        let new = tree
            .create_hierarchy(root, &path("f2/e1"), ConflictResolution::Replace)
            .unwrap();
        let f2 = tree.at(root, 0).unwrap();

        assert_eq!(tree.count(f2), 1);
        assert_eq!(tree.at(f2, 0), Some(new));
        assert!(tree.node(old).is_none());
        assert_eq!(
            *events.borrow(),
            [
                TreeEvent::ChildRemoved {
                    parent: f2,
                    index: 0
                },
                TreeEvent::ChildCreated {
                    parent: f2,
                    node: new,
                    index: 0
                },
                TreeEvent::HierarchyChanged,
            ]
        );
    }

    #[test]
    fn test_copy_stays_unique_on_repeat() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        for _ in 0..3 {
            tree.create_hierarchy(root, &path("a.sqf"), ConflictResolution::Copy)
                .unwrap();
        }
        assert_eq!(titles(&tree, root), ["a.sqf", "a(1).sqf", "a(2).sqf"]);
    }

    #[test]
    fn test_folder_creation_emits_once() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let events = record_events(&mut tree);

        tree.create_hierarchy(root, &path("f1/e1"), ConflictResolution::Unset)
            .unwrap();
        tree.create_hierarchy(root, &path("f1/e2"), ConflictResolution::Unset)
            .unwrap();

        let f1 = tree.at(root, 0).unwrap();
        let folder_events: Vec<_> = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, TreeEvent::ChildCreated { parent, .. } if *parent == root))
            .cloned()
            .collect();
        assert_eq!(
            folder_events,
            [TreeEvent::ChildCreated {
                parent: root,
                node: f1,
                index: 0
            }]
        );
    }

    #[test]
    fn test_one_hierarchy_changed_per_call() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        tree.create_hierarchy(root, &path("f1/e2"), ConflictResolution::Unset)
            .unwrap();
        let events = record_events(&mut tree);
        let changed = || {
            events
                .borrow()
                .iter()
                .filter(|e| **e == TreeEvent::HierarchyChanged)
                .count()
        };

        tree.create_hierarchy(root, &path("f1/e1"), ConflictResolution::Unset)
            .unwrap();
        assert_eq!(changed(), 1);
        tree.create_hierarchy(root, &path("f1/e2"), ConflictResolution::Replace)
            .unwrap();
        assert_eq!(changed(), 2);
        tree.create_hierarchy(root, &path("f1/e2"), ConflictResolution::Copy)
            .unwrap();
        assert_eq!(changed(), 3);
        let e1 = tree.get(root, &path("f1/e1")).unwrap();
        tree.remove_from_hierarchy(e1).unwrap();
        assert_eq!(changed(), 4);
    }

    #[test]
    fn test_make_path_and_get() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let e1 = tree
            .create_hierarchy(root, &path("e1"), ConflictResolution::Unset)
            .unwrap();
        let e2 = tree
            .create_hierarchy(root, &path("f2/e2"), ConflictResolution::Unset)
            .unwrap();
        let f2 = tree.at(root, 0).unwrap();

        assert_eq!(tree.make_path(e1).unwrap().segments(), ["e1"]);
        assert_eq!(tree.make_path(e2).unwrap().segments(), ["f2", "e2"]);
        assert_eq!(tree.get(root, &path("f2")), Some(f2));
        assert_eq!(tree.get(f2, &path("e2")), Some(e2));
        assert_eq!(tree.get(root, &path("not-existing")), None);
        assert_eq!(tree.get(e2, &ArchivePath::root()), Some(e2));
    }

    #[test]
    fn test_remove_from_hierarchy() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let e1 = tree
            .create_hierarchy(root, &path("f1/e1"), ConflictResolution::Unset)
            .unwrap();
        let e2 = tree
            .create_hierarchy(root, &path("f1/e2"), ConflictResolution::Unset)
            .unwrap();
        let e3 = tree
            .create_hierarchy(root, &path("f1/e3"), ConflictResolution::Unset)
            .unwrap();
        let f1 = tree.at(root, 0).unwrap();
        let events = record_events(&mut tree);

        tree.remove_from_hierarchy(e3).unwrap();
        tree.remove_from_hierarchy(e2).unwrap();
        assert_eq!(titles(&tree, f1), ["e1"]);
        tree.remove_from_hierarchy(f1).unwrap();

        assert!(tree.is_empty());
        assert!(tree.node(e1).is_none());
        assert_eq!(tree.len(), 1);
        let removed: Vec<_> = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, TreeEvent::ChildRemoved { .. }))
            .cloned()
            .collect();
        assert_eq!(
            removed,
            [
                TreeEvent::ChildRemoved {
                    parent: f1,
                    index: 2
                },
                TreeEvent::ChildRemoved {
                    parent: f1,
                    index: 1
                },
                TreeEvent::ChildRemoved {
                    parent: root,
                    index: 0
                },
            ]
        );
    }

    #[test]
    fn test_remove_root_fails() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        assert!(matches!(
            tree.remove_from_hierarchy(root),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_files_in_encode_order() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        for p in ["z.txt", "b/y.txt", "a/x.txt", "a/c/w.txt"] {
            tree.create_hierarchy(root, &path(p), ConflictResolution::Unset)
                .unwrap();
        }
        let order: Vec<String> = tree
            .files(root)
            .into_iter()
            .map(|id| tree.make_path(id).unwrap().to_string())
            .collect();
        assert_eq!(order, ["a/c/w.txt", "a/x.txt", "b/y.txt", "z.txt"]);
    }

    #[test]
    fn test_source_binding() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let file = tree
            .create_hierarchy(root, &path("f/a.sqf"), ConflictResolution::Unset)
            .unwrap();
        let folder = tree.at(root, 0).unwrap();

        assert!(tree.set_compressed(file, true).is_err());
        assert!(
            tree.set_binary_source(file, Some(BinarySource::loose("/tmp/a.sqf")))
                .unwrap()
                .is_none()
        );
        tree.set_compressed(file, true).unwrap();
        assert!(tree[file].source().unwrap().is_compressed());
        assert!(tree.set_binary_source(folder, None).is_err());
    }

    #[test]
    fn test_rename_with_broken_sibling_link_fails() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let a = tree
            .create_hierarchy(root, &path("a.txt"), ConflictResolution::Unset)
            .unwrap();
        let b = tree
            .create_hierarchy(root, &path("b.txt"), ConflictResolution::Unset)
            .unwrap();
        tree.live_mut(root, "test").unwrap().children.retain(|&c| c != b);

        let err = tree.rename(b, "c.txt".to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert_eq!(tree.children(root), [a]);
        assert_eq!(tree[b].title(), "b.txt");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let sub = tree.subscribe(move |_| *sink.borrow_mut() += 1);

        tree.create_hierarchy(root, &path("a"), ConflictResolution::Unset)
            .unwrap();
        assert_eq!(*count.borrow(), 2);
        assert!(tree.unsubscribe(sub));
        assert!(!tree.unsubscribe(sub));
        tree.create_hierarchy(root, &path("b"), ConflictResolution::Unset)
            .unwrap();
        assert_eq!(*count.borrow(), 2);
    }
}
