mod state;

pub use state::NodeState;

use crossbeam_epoch::{Atomic, Guard, Shared};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Capability of a caller type to be stored inside [AaTree](crate::AaTree).
///
/// Implementor embeds [AaNode] and exposes it through `links`. Tree keeps only linkage inside
/// this node, payload stays in implementor's own fields.
///
/// # Safety
/// `links` must always return the same `AaNode`, owned by `self` and never shared with any other
/// item. Tree follows raw links stored inside nodes and relies on this to keep every pointer valid.
pub unsafe trait Linked: Sized {
    fn links(&self) -> &AaNode<Self>;
}

/// Linkage fields of AA-tree node embedded into caller's structure.
///
/// Every field is a separate atomic cell: `left` and `right` are ownership edges to child
/// subtrees, `parent` is a non-owning back reference. Absent link is represented by null
/// pointer, which is the sentinel node: level 0, always `Open`, never written.
pub struct AaNode<T> {
    left: Atomic<T>,
    right: Atomic<T>,
    parent: Atomic<T>,
    level: AtomicUsize,
    state: AtomicU8,
}

impl<T> AaNode<T> {
    /// Create unlinked node.
    pub fn new() -> Self {
        AaNode {
            left: Atomic::null(),
            right: Atomic::null(),
            parent: Atomic::null(),
            level: AtomicUsize::new(0),
            state: AtomicU8::new(NodeState::Open.into()),
        }
    }

    /// AA-tree rank of node, 0 if node is not linked into any tree.
    #[inline]
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Node currently belongs to some tree.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.level() > 0
    }
}

impl<T> Default for AaNode<T> {
    fn default() -> Self {
        AaNode::new()
    }
}

impl<T> Debug for AaNode<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AaNode")
            .field("level", &self.level())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to tree node(or sentinel) valid while epoch guard is pinned.
///
/// All structural reads and writes of the engine go through this type. Sentinel reads as
/// level 0 in `Open` state with sentinel children and parent.
pub(crate) struct NodeRef<'g, T> {
    ptr: Shared<'g, T>,
    guard: &'g Guard,
}

impl<'g, T> Clone for NodeRef<'g, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, T> Copy for NodeRef<'g, T> {}

impl<'g, T> PartialEq for NodeRef<'g, T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<'g, T: Linked> NodeRef<'g, T> {
    #[inline(always)]
    pub fn new(ptr: Shared<'g, T>, guard: &'g Guard) -> Self {
        NodeRef { ptr, guard }
    }

    #[inline(always)]
    pub fn nil(guard: &'g Guard) -> Self {
        NodeRef {
            ptr: Shared::null(),
            guard,
        }
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.ptr.is_null()
    }

    #[inline(always)]
    pub fn shared(&self) -> Shared<'g, T> {
        self.ptr
    }

    #[inline(always)]
    pub fn guard(&self) -> &'g Guard {
        self.guard
    }

    /// Payload of node, `None` for sentinel.
    #[inline]
    pub fn item(&self) -> Option<&'g T> {
        // non-null pointers always reference live nodes: removed nodes are reclaimed only
        // after every guard pinned during their removal is dropped.
        unsafe { self.ptr.as_ref() }
    }

    #[inline]
    fn links(&self) -> Option<&'g AaNode<T>> {
        self.item().map(|item| item.links())
    }

    #[inline]
    fn writable_links(&self) -> &'g AaNode<T> {
        self.links()
            .unwrap_or_else(|| panic!("Sentinel node is immutable"))
    }

    #[inline]
    pub fn left(&self) -> Self {
        self.links().map_or(*self, |links| {
            NodeRef::new(links.left.load(Ordering::Acquire, self.guard), self.guard)
        })
    }

    #[inline]
    pub fn right(&self) -> Self {
        self.links().map_or(*self, |links| {
            NodeRef::new(links.right.load(Ordering::Acquire, self.guard), self.guard)
        })
    }

    #[inline]
    pub fn parent(&self) -> Self {
        self.links().map_or(*self, |links| {
            NodeRef::new(links.parent.load(Ordering::Acquire, self.guard), self.guard)
        })
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.links().map_or(0, |links| links.level())
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.links().map_or(NodeState::Open, |links| links.state())
    }

    #[inline]
    pub fn set_left(&self, child: NodeRef<'g, T>) {
        assert!(
            self.is_nil() || *self != child,
            "Structural corruption: node linked as its own left child"
        );
        self.writable_links()
            .left
            .store(child.ptr, Ordering::Release);
    }

    #[inline]
    pub fn set_right(&self, child: NodeRef<'g, T>) {
        assert!(
            self.is_nil() || *self != child,
            "Structural corruption: node linked as its own right child"
        );
        self.writable_links()
            .right
            .store(child.ptr, Ordering::Release);
    }

    /// Update back reference. Sentinel has no parent, call on it is ignored.
    #[inline]
    pub fn set_parent(&self, parent: NodeRef<'g, T>) {
        if let Some(links) = self.links() {
            assert!(
                *self != parent,
                "Structural corruption: node linked as its own parent"
            );
            links.parent.store(parent.ptr, Ordering::Release);
        }
    }

    /// Link `child` as left child and update it's back reference.
    #[inline]
    pub fn link_left(&self, child: NodeRef<'g, T>) {
        self.set_left(child);
        child.set_parent(*self);
    }

    /// Link `child` as right child and update it's back reference.
    #[inline]
    pub fn link_right(&self, child: NodeRef<'g, T>) {
        self.set_right(child);
        child.set_parent(*self);
    }

    #[inline]
    pub fn set_level(&self, level: usize) {
        self.writable_links().level.store(level, Ordering::Release);
    }

    /// CAS node state. Sentinel can't be claimed.
    #[inline]
    pub fn try_transition(&self, expected: NodeState, new: NodeState) -> bool {
        self.writable_links()
            .state
            .compare_exchange(
                expected.into(),
                new.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[inline]
    pub fn set_state(&self, state: NodeState) {
        self.writable_links()
            .state
            .store(state.into(), Ordering::Release);
    }

    /// Clear links and assign level. Used to initialize new leaf and to detach removed node.
    pub fn reset(&self, level: usize) {
        let links = self.writable_links();
        links.left.store(Shared::null(), Ordering::Release);
        links.right.store(Shared::null(), Ordering::Release);
        links.parent.store(Shared::null(), Ordering::Release);
        links.level.store(level, Ordering::Release);
    }
}
