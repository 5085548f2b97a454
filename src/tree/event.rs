//! Change notifications.

use super::NodeId;

/// A structural change to a [`NodeTree`](super::NodeTree).
///
/// Events are delivered synchronously, in the order the changes were made,
/// after the mutating call has finished updating the tree. Every mutating
/// call that changes anything ends with exactly one
/// [`TreeEvent::HierarchyChanged`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// `node` was inserted into `parent` at `index`.
    ChildCreated {
        /// The parent node.
        parent: NodeId,
        /// The new node.
        node: NodeId,
        /// Position among the parent's children.
        index: usize,
    },
    /// The child at `index` of `parent` was destroyed with its subtree.
    ChildRemoved {
        /// The parent node.
        parent: NodeId,
        /// Former position of the removed child.
        index: usize,
    },
    /// A child changed position after a rename.
    ChildMoved {
        /// The parent node.
        parent: NodeId,
        /// Position before the rename.
        prev_index: usize,
        /// Position after the rename.
        new_index: usize,
    },
    /// A node was renamed.
    TitleChanged {
        /// The renamed node.
        node: NodeId,
        /// Its new title.
        title: String,
    },
    /// Closes every batch of changes.
    HierarchyChanged,
}

/// Handle returned by [`NodeTree::subscribe`](super::NodeTree::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) type Observer = Box<dyn FnMut(&TreeEvent)>;
