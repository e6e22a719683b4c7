//! # AA-tree
//! Concurrent self-balancing ordered tree with embeddable nodes.
//!
//! AA-tree(Arne Andersson tree) is a simplification of red-black tree: red(horizontal) links can
//! exist only as right links. This reduces rebalancing to 2 local rotations, `skew` and `split`.
//!
//! Tree doesn't store any payload itself. Caller's type embeds [AaNode] and exposes it through
//! [Linked] trait, tree only rewires links stored inside such nodes.
//!
//! # Usage
//! ```
//! use aatree::{AaNode, AaTree, Linked};
//!
//! struct Entry {
//!     key: u64,
//!     name: String,
//!     node: AaNode<Entry>,
//! }
//!
//! unsafe impl Linked for Entry {
//!     fn links(&self) -> &AaNode<Self> {
//!         &self.node
//!     }
//! }
//!
//! let entry = |key: u64, name: &str| {
//!     Box::new(Entry {
//!         key,
//!         name: name.to_string(),
//!         node: AaNode::new(),
//!     })
//! };
//!
//! let tree = AaTree::new(|key: &u64, entry: &Entry| key.cmp(&entry.key));
//! let guard = crossbeam_epoch::pin();
//! assert!(tree.insert(&1, entry(1, "one"), &guard).is_ok());
//! assert!(tree.insert(&2, entry(2, "two"), &guard).is_ok());
//!
//! // key already in tree: node is handed back to caller
//! let rejected = tree.insert(&1, entry(1, "uno"), &guard).unwrap_err();
//! assert_eq!(rejected.name, "uno");
//!
//! assert_eq!(tree.search(&1, &guard).map(|e| e.name.as_str()), Some("one"));
//! assert!(tree.remove(&1, &guard));
//! assert!(tree.search(&1, &guard).is_none());
//! assert_eq!(tree.len(), 1);
//! ```

mod acquire;
mod error;
mod node;
mod rotate;
mod walk;

pub use crate::error::TreeError;
pub use crate::node::{AaNode, Linked, NodeState};
pub use crate::walk::WalkOrder;

use crate::acquire::{Acquisition, Scope};
use crate::node::NodeRef;
use crate::rotate::{skew, split};
use crate::walk::walk_subtree;
use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicUsize};
use std::sync::Arc;
use tracing::{debug, trace};

type Compare<K, T> = Box<dyn Fn(&K, &T) -> Ordering + Send + Sync>;
type Release<T> = Arc<dyn Fn(Box<T>) + Send + Sync>;

/// AA-tree data structure.
///
/// # Ordering
/// Tree ordered by caller supplied comparison function `compare(key, node)`. It should define
/// strict total order which is consistent across calls.
///
/// # Concurrency
/// Tree protected by 2 layers of synchronization:
/// - reader/writer lock: `insert`/`remove` are mutually exclusive with each other and with
/// readers, `search` and `walk` run in parallel.
/// - inside writer, each rebalancing step claims bounded neighborhood of rebalanced node by CAS
/// of node state from `Open` to `Balancing` and retries on conflict. This protocol keeps
/// rebalancing correct without relying on writer exclusivity.
///
/// Root pointer published by single atomic store only after rebalancing of whole path
/// completed, readers never observe partially rebalanced tree.
///
/// # Memory reclamation
/// Tree never allocates or frees nodes: caller passes boxed node into `insert` and tree hands
/// it back to release callback when node removed. Release callback invoked through
/// [crossbeam_epoch] deferred functions, e.g. only when every guard pinned at the moment of
/// removal dropped. References returned by `search` stay valid while guard alive.
pub struct AaTree<K: ?Sized, T: Linked> {
    root: Atomic<T>,
    count: AtomicUsize,
    compare: Compare<K, T>,
    release: Option<Release<T>>,
    lock: RwLock<()>,
}

impl<K: ?Sized, T: Linked> AaTree<K, T> {
    /// Create empty tree which drops removed nodes.
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&K, &T) -> Ordering + Send + Sync + 'static,
    {
        AaTree {
            root: Atomic::null(),
            count: AtomicUsize::new(0),
            compare: Box::new(compare),
            release: None,
            lock: RwLock::new(()),
        }
    }

    /// Create empty tree which passes each removed node to `release` callback.
    ///
    /// Callback invoked exactly once per removed or destroyed node, after node detached from
    /// tree. Callback must not access the tree.
    pub fn with_release<F, R>(compare: F, release: R) -> Self
    where
        F: Fn(&K, &T) -> Ordering + Send + Sync + 'static,
        R: Fn(Box<T>) + Send + Sync + 'static,
    {
        let mut tree = Self::new(compare);
        tree.release = Some(Arc::new(release));
        tree
    }

    /// Insert node if no node with same key already exists.
    ///
    /// # Return
    /// `Ok` if node linked into tree, otherwise node returned back untouched inside `Err`
    /// because key already in tree.
    pub fn insert(&self, key: &K, item: Box<T>, guard: &Guard) -> Result<(), Box<T>> {
        debug_assert!(
            !item.links().is_linked(),
            "Inserted node already linked into tree"
        );

        let _writer = self.lock.write();
        let node = NodeRef::new(Owned::<T>::from(item).into_shared(guard), guard);
        let mut attempts = 0usize;
        loop {
            let root = self.root(guard);
            match self.insert_into(root, NodeRef::nil(guard), key, node) {
                Placement::Linked(new_root) => {
                    if root.is_nil() {
                        // first node has no landing site which can release it
                        node.set_state(NodeState::Open);
                    }
                    self.publish(new_root);
                    return Ok(());
                }
                Placement::Duplicate => {
                    // node never became reachable
                    return Err(unsafe { node.shared().into_owned() }.into_box());
                }
                Placement::Retry => {
                    attempts += 1;
                    trace!(attempts, "leaf placement conflict, restart insert from root");
                }
            }
        }
    }

    /// Search node by key.
    pub fn search<'g>(&'g self, key: &K, guard: &'g Guard) -> Option<&'g T> {
        let _reader = self.lock.read();
        let mut current = self.root(guard);
        while let Some(item) = current.item() {
            current = match (self.compare)(key, item) {
                Ordering::Greater => current.right(),
                Ordering::Less => current.left(),
                Ordering::Equal => return Some(item),
            };
        }
        None
    }

    #[inline]
    pub fn contains(&self, key: &K, guard: &Guard) -> bool {
        self.search(key, guard).is_some()
    }

    /// Visit every node of tree in passed order.
    ///
    /// Walk holds read lock of the tree: writers blocked until walk completes. Visitor must not
    /// call back into the tree, even read-only `search` can deadlock when a writer is queued.
    pub fn walk<'g, F>(&'g self, order: WalkOrder, mut visitor: F, guard: &'g Guard)
    where
        F: FnMut(&'g T),
    {
        let _reader = self.lock.read();
        walk_subtree(self.root(guard), order, &mut visitor);
    }

    /// Count of nodes in tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(atomic::Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every node of tree in bottom-up order and reset tree to empty state.
    ///
    /// Children always released before parent. Tree can be reused after destroy.
    pub fn destroy(&mut self) {
        // exclusive access: nobody can hold references into tree, no need to defer release
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let root = NodeRef::new(
            self.root
                .swap(Shared::null(), atomic::Ordering::AcqRel, guard),
            guard,
        );
        let released = self.release_subtree(root);
        self.count.store(0, atomic::Ordering::Release);
        debug!(released, "tree destroyed");
    }

    /// Check AA-tree invariants of every node:
    /// - node level equals level of it's left child + 1
    /// - node level equals level of it's right child or right child level + 1
    /// - no consecutive horizontal right links
    /// - each child points back to it's parent
    /// - no node claimed by some operation
    /// - count of reachable nodes equals tree length
    pub fn verify(&self, guard: &Guard) -> Result<(), TreeError> {
        let _reader = self.lock.read();
        let root = self.root(guard);
        if !root.parent().is_nil() {
            return Err(TreeError::BrokenParentLink {
                level: root.level(),
            });
        }
        let actual = verify_subtree(root)?;
        let expected = self.len();
        if expected != actual {
            return Err(TreeError::CountMismatch { expected, actual });
        }
        Ok(())
    }

    #[inline]
    fn root<'g>(&self, guard: &'g Guard) -> NodeRef<'g, T> {
        NodeRef::new(self.root.load(atomic::Ordering::Acquire, guard), guard)
    }

    /// Make rebalanced subtree visible to readers.
    #[inline]
    fn publish(&self, root: NodeRef<'_, T>) {
        root.set_parent(NodeRef::nil(root.guard()));
        self.root.store(root.shared(), atomic::Ordering::Release);
    }

    /// Recursive insert. Returns new root of subtree after node inserted and subtree rebalanced.
    fn insert_into<'g>(
        &self,
        current: NodeRef<'g, T>,
        prev: NodeRef<'g, T>,
        key: &K,
        node: NodeRef<'g, T>,
    ) -> Placement<'g, T> {
        let item = match current.item() {
            Some(item) => item,
            None => return self.place(prev, node),
        };

        let go_right = match (self.compare)(key, item) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => return Placement::Duplicate,
        };
        let child = if go_right {
            current.right()
        } else {
            current.left()
        };
        let landing = child.is_nil();

        let subtree = match self.insert_into(child, current, key, node) {
            Placement::Linked(subtree) => subtree,
            conflict => return conflict,
        };
        if go_right {
            current.link_right(subtree);
        } else {
            current.link_left(subtree);
        }
        if landing {
            node.set_state(NodeState::Open);
            current.set_state(NodeState::Open);
        }
        Placement::Linked(self.rebalance_after_insert(current))
    }

    /// Claim new node and it's landing site, then initialize node as leaf.
    fn place<'g>(&self, landing: NodeRef<'g, T>, node: NodeRef<'g, T>) -> Placement<'g, T> {
        if !node.try_transition(NodeState::Open, NodeState::Insert) {
            trace!(state = %node.state(), "inserted node already claimed");
            return Placement::Retry;
        }
        if !landing.is_nil() && !landing.try_transition(NodeState::Open, NodeState::Insert) {
            node.set_state(NodeState::Open);
            trace!(state = %landing.state(), "landing site already claimed");
            return Placement::Retry;
        }

        // init node as late as possible: path with duplicate key never touches it
        node.reset(1);
        self.count.fetch_add(1, atomic::Ordering::AcqRel);
        Placement::Linked(node)
    }

    fn rebalance_after_insert<'g>(&self, current: NodeRef<'g, T>) -> NodeRef<'g, T> {
        let _acquisition = Acquisition::claim(current, Scope::Insert);
        split(skew(current))
    }

    /// Recursive removal. Returns new root of subtree and detached node.
    fn remove_from<'g>(&self, current: NodeRef<'g, T>, key: &K) -> Removal<'g, T> {
        let item = match current.item() {
            Some(item) => item,
            None => return Removal::NotFound,
        };

        match (self.compare)(key, item) {
            Ordering::Greater => match self.remove_from(current.right(), key) {
                Removal::Removed { subtree, detached } => {
                    current.link_right(subtree);
                    Removal::Removed {
                        subtree: self.rebalance_after_remove(current),
                        detached,
                    }
                }
                Removal::NotFound => Removal::NotFound,
            },
            Ordering::Less => match self.remove_from(current.left(), key) {
                Removal::Removed { subtree, detached } => {
                    current.link_left(subtree);
                    Removal::Removed {
                        subtree: self.rebalance_after_remove(current),
                        detached,
                    }
                }
                Removal::NotFound => Removal::NotFound,
            },
            Ordering::Equal => {
                let replacement = self.unlink(current);
                Removal::Removed {
                    subtree: self.rebalance_after_remove(replacement),
                    detached: current,
                }
            }
        }
    }

    /// Detach node from tree. Returns node which takes it's place.
    fn unlink<'g>(&self, old: NodeRef<'g, T>) -> NodeRef<'g, T> {
        let left = old.left();
        let right = old.right();
        let replacement = if left.is_nil() {
            right
        } else if right.is_nil() {
            left
        } else {
            // nearest node from the right: because of AA-tree asymmetry it results in less
            // rotations than nearest from the left
            let mut successor = NodeRef::nil(old.guard());
            let rest = self.steal_leftmost(right, &mut successor);
            successor.link_left(left);
            successor.link_right(rest);
            successor.set_level(old.level());
            successor
        };
        replacement.set_parent(old.parent());

        old.reset(0);
        self.count.fetch_sub(1, atomic::Ordering::AcqRel);
        replacement
    }

    /// Detach leftmost node of subtree, rebalancing subtree on the way back up.
    fn steal_leftmost<'g>(
        &self,
        current: NodeRef<'g, T>,
        leftmost: &mut NodeRef<'g, T>,
    ) -> NodeRef<'g, T> {
        let left = current.left();
        if left.is_nil() {
            *leftmost = current;
            return current.right();
        }

        let rest = self.steal_leftmost(left, leftmost);
        current.link_left(rest);
        self.rebalance_after_remove(current)
    }

    fn rebalance_after_remove<'g>(&self, current: NodeRef<'g, T>) -> NodeRef<'g, T> {
        if current.is_nil() {
            return current;
        }

        let _acquisition = Acquisition::claim(current, Scope::Remove);
        let level = current.level();
        let right = current.right();
        if current.left().level() + 1 >= level && right.level() + 1 >= level {
            return current;
        }

        // removal created a gap in levels, fix it by lowering the node
        let level = level - 1;
        current.set_level(level);
        // horizontal right child follows the node
        if right.level() > level {
            right.set_level(level);
        }

        let current = skew(current);
        current.link_right(skew(current.right()));
        let right = current.right();
        if !right.is_nil() {
            right.link_right(skew(right.right()));
        }
        let current = split(current);
        current.link_right(split(current.right()));
        current
    }

    fn release_subtree(&self, current: NodeRef<'_, T>) -> usize {
        if current.is_nil() {
            return 0;
        }
        let released = self.release_subtree(current.left()) + self.release_subtree(current.right());
        current.reset(0);

        let item = unsafe { current.shared().into_owned() }.into_box();
        match &self.release {
            Some(release) => release(item),
            None => drop(item),
        }
        released + 1
    }
}

impl<K, T> AaTree<K, T>
where
    K: ?Sized,
    T: Linked + Send + 'static,
{
    /// Remove node associated with key.
    ///
    /// # Return
    /// Returns true if node found and detached from tree. Detached node passed to release
    /// callback after every guard which can observe it is dropped.
    pub fn remove(&self, key: &K, guard: &Guard) -> bool {
        let detached = {
            let _writer = self.lock.write();
            match self.remove_from(self.root(guard), key) {
                Removal::NotFound => return false,
                Removal::Removed { subtree, detached } => {
                    self.publish(subtree);
                    detached
                }
            }
        };

        match &self.release {
            Some(release) => {
                let release = Arc::clone(release);
                let item = unsafe { detached.shared().into_owned() };
                guard.defer(move || release(item.into_box()));
            }
            None => unsafe { guard.defer_destroy(detached.shared()) },
        }
        true
    }
}

impl<K: ?Sized, T: Linked> Drop for AaTree<K, T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Result of recursive insert step.
enum Placement<'g, T> {
    /// New node linked, contains new root of subtree.
    Linked(NodeRef<'g, T>),
    /// Key already exists in tree.
    Duplicate,
    /// Node claim failed, insert should be restarted from root.
    Retry,
}

/// Result of recursive remove step.
enum Removal<'g, T> {
    NotFound,
    Removed {
        subtree: NodeRef<'g, T>,
        detached: NodeRef<'g, T>,
    },
}

fn verify_subtree<T: Linked>(node: NodeRef<'_, T>) -> Result<usize, TreeError> {
    if node.is_nil() {
        return Ok(0);
    }

    let level = node.level();
    let state = node.state();
    if !state.is_open() {
        return Err(TreeError::NodeClaimed { level, state });
    }

    let left = node.left();
    let right = node.right();
    if level != left.level() + 1 {
        return Err(TreeError::BadLeftLevel {
            level,
            left: left.level(),
        });
    }
    if level != right.level() && level != right.level() + 1 {
        return Err(TreeError::BadRightLevel {
            level,
            right: right.level(),
        });
    }
    if !right.is_nil() && right.right().level() == level {
        return Err(TreeError::ConsecutiveHorizontal { level });
    }
    for child in [left, right] {
        if !child.is_nil() && child.parent() != node {
            return Err(TreeError::BrokenParentLink {
                level: child.level(),
            });
        }
    }

    Ok(1 + verify_subtree(left)? + verify_subtree(right)?)
}
