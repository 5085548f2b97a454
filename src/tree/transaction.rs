//! Scoped single-node edits.

use super::{NodeId, NodeTree};
use crate::Result;

/// Staged changes to one node, applied by [`Transaction::commit`].
///
/// Dropping a transaction without committing discards the staged changes.
///
/// ```rust
/// use pbokit::{ArchivePath, ConflictResolution, NodeTree};
///
/// let mut tree = NodeTree::new("addon.pbo");
/// let root = tree.root();
/// let node = tree.create_hierarchy(root, &ArchivePath::new("a.sqf")?, ConflictResolution::Unset)?;
///
/// tree.begin_transaction(node)?.set_title("b.sqf").commit()?;
/// assert_eq!(tree[node].title(), "b.sqf");
/// # Ok::<(), pbokit::Error>(())
/// ```
#[must_use = "a transaction does nothing until committed"]
pub struct Transaction<'a> {
    tree: &'a mut NodeTree,
    node: NodeId,
    title: String,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(tree: &'a mut NodeTree, node: NodeId, title: String) -> Self {
        Self { tree, node, title }
    }

    /// The node being edited.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Currently staged title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Stages a new title.
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Applies the staged changes.
    ///
    /// An unchanged title commits silently. A changed one emits
    /// [`TreeEvent::TitleChanged`](super::TreeEvent::TitleChanged), a
    /// [`TreeEvent::ChildMoved`](super::TreeEvent::ChildMoved) if the sort
    /// position changed, and one closing
    /// [`TreeEvent::HierarchyChanged`](super::TreeEvent::HierarchyChanged).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`](crate::Error::InvalidOperation) for an
    ///   empty title or one holding a separator or NUL byte
    /// - [`Error::Conflict`](crate::Error::Conflict) if a sibling already has
    ///   the title (compared case-insensitively)
    pub fn commit(self) -> Result<()> {
        self.tree.rename(self.node, self.title)
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{ConflictResolution, NodeTree, TreeEvent};
    use crate::{ArchivePath, Error};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tree_with(paths: &[&str]) -> (NodeTree, Vec<crate::NodeId>) {
        let mut tree = NodeTree::new("root");
        let root = tree.root();
        let ids = paths
            .iter()
            .map(|p| {
                tree.create_hierarchy(root, &ArchivePath::new(p).unwrap(), ConflictResolution::Unset)
                    .unwrap()
            })
            .collect();
        (tree, ids)
    }

    fn record(tree: &mut NodeTree) -> Rc<RefCell<Vec<TreeEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        tree.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_same_title_is_silent() {
        let (mut tree, ids) = tree_with(&["f1/e1"]);
        let events = record(&mut tree);
        tree.begin_transaction(ids[0])
            .unwrap()
            .set_title("e1")
            .commit()
            .unwrap();
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_title_change_emits() {
        let (mut tree, ids) = tree_with(&["f1/e1"]);
        let events = record(&mut tree);
        tree.begin_transaction(ids[0])
            .unwrap()
            .set_title("new-title")
            .commit()
            .unwrap();
        assert_eq!(
            *events.borrow(),
            [
                TreeEvent::TitleChanged {
                    node: ids[0],
                    title: "new-title".into()
                },
                TreeEvent::HierarchyChanged,
            ]
        );
    }

    #[test]
    fn test_resort_emits_child_moved() {
        let (mut tree, ids) = tree_with(&["f1.txt", "f2.txt"]);
        let root = tree.root();
        let events = record(&mut tree);
        tree.begin_transaction(ids[1])
            .unwrap()
            .set_title("f0.txt")
            .commit()
            .unwrap();

        assert_eq!(tree.at(root, 0), Some(ids[1]));
        assert!(events.borrow().contains(&TreeEvent::ChildMoved {
            parent: root,
            prev_index: 1,
            new_index: 0
        }));
    }

    #[test]
    fn test_root_rename() {
        let (mut tree, _) = tree_with(&["f1.txt"]);
        let root = tree.root();
        let events = record(&mut tree);
        tree.begin_transaction(root)
            .unwrap()
            .set_title("renamed.pbo")
            .commit()
            .unwrap();
        assert_eq!(tree[root].title(), "renamed.pbo");
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_invalid_and_clashing_titles() {
        let (mut tree, ids) = tree_with(&["a.txt", "b.txt"]);
        for bad in ["", "x/y", "x\\y", "nul\0"] {
            let err = tree
                .begin_transaction(ids[0])
                .unwrap()
                .set_title(bad)
                .commit()
                .unwrap_err();
            assert!(matches!(err, Error::InvalidOperation { .. }), "{bad:?}");
        }
        let err = tree
            .begin_transaction(ids[0])
            .unwrap()
            .set_title("B.TXT")
            .commit()
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(tree[ids[0]].title(), "a.txt");
    }

    #[test]
    fn test_case_only_rename_allowed() {
        let (mut tree, ids) = tree_with(&["a.txt"]);
        tree.begin_transaction(ids[0])
            .unwrap()
            .set_title("A.txt")
            .commit()
            .unwrap();
        assert_eq!(tree[ids[0]].title(), "A.txt");
    }

    #[test]
    fn test_dropped_transaction_discards() {
        let (mut tree, ids) = tree_with(&["a.txt"]);
        let txn = tree.begin_transaction(ids[0]).unwrap().set_title("b.txt");
        assert_eq!(txn.title(), "b.txt");
        drop(txn);
        assert_eq!(tree[ids[0]].title(), "a.txt");
    }
}
