use crate::node::{Linked, NodeRef, NodeState};
use std::hint;
use tracing::trace;

/// Typical count of nodes captured by one acquisition.
const NEIGHBORHOOD_HINT: usize = 16;

/// Which rebalancing step acquisition guards. Scope defines how deep into subtree
/// of rebalanced node acquisition reaches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Scope {
    /// Skew + split after leaf insertion: nodes on level of rebalanced node.
    Insert,
    /// Level gap repair: also nodes one level below, because level of rebalanced node
    /// drops and rotations reach them.
    Remove,
}

impl Scope {
    #[inline]
    fn floor(self, level: usize) -> usize {
        match self {
            Scope::Insert => level,
            Scope::Remove => level.saturating_sub(1),
        }
    }
}

/// Set of nodes moved from `Open` to `Balancing` state by single rebalancing step.
///
/// Acquisition contains rebalanced node, it's parent and grandparent and region of subtree
/// reachable through nodes with level not lower than scope floor. Each child met during
/// descent is captured too: even if child is under the floor, rotation can rewrite it's parent
/// link.
///
/// Captured region is wider than the minimal set of nodes touched by skew and split (node,
/// ancestors, children and grandchildren on the rotated path): whole subtree region above the
/// floor is captured. Region stays bounded by height of horizontal runs, and superset never
/// misses a node which rotation rewrites.
///
/// Dropping acquisition returns every captured node to `Open` state. This is the only place
/// where nodes released, both for failed and completed acquisitions.
pub(crate) struct Acquisition<'g, T: Linked> {
    held: Vec<NodeRef<'g, T>>,
}

impl<'g, T: Linked> Acquisition<'g, T> {
    /// Acquire neighborhood of node, retrying until all nodes captured.
    ///
    /// Links re-read on every attempt: tree shape can change between attempts.
    pub fn claim(node: NodeRef<'g, T>, scope: Scope) -> Self {
        let mut attempts = 0usize;
        loop {
            if let Some(acquisition) = Self::try_claim(node, scope) {
                if attempts > 0 {
                    trace!(attempts, ?scope, "neighborhood acquired after conflicts");
                }
                return acquisition;
            }
            attempts += 1;
            hint::spin_loop();
        }
    }

    /// Try to acquire neighborhood of node. All or nothing: if any node already claimed by
    /// other operation, nodes captured so far are released and `None` returned.
    pub fn try_claim(node: NodeRef<'g, T>, scope: Scope) -> Option<Self> {
        debug_assert!(!node.is_nil(), "Sentinel can't be rebalanced");
        let mut acquisition = Acquisition {
            held: Vec::with_capacity(NEIGHBORHOOD_HINT),
        };

        let parent = node.parent();
        let grandparent = parent.parent();
        for ancestor in [node, parent, grandparent] {
            acquisition.capture(ancestor)?;
        }

        let floor = scope.floor(node.level());
        let mut pending = vec![node];
        while let Some(next) = pending.pop() {
            for child in [next.left(), next.right()] {
                let captured = acquisition.capture(child)?;
                if captured && child.level() >= floor {
                    pending.push(child);
                }
            }
        }
        Some(acquisition)
    }

    /// Capture node into acquisition.
    /// Returns `Some(true)` if node is newly captured, `Some(false)` for sentinel or already
    /// captured node and `None` if node is claimed by someone else.
    fn capture(&mut self, node: NodeRef<'g, T>) -> Option<bool> {
        if node.is_nil() || self.held.contains(&node) {
            return Some(false);
        }
        if node.try_transition(NodeState::Open, NodeState::Balancing) {
            self.held.push(node);
            Some(true)
        } else {
            trace!(state = %node.state(), "node claim conflict, rollback acquisition");
            None
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[cfg(test)]
    pub fn contains(&self, node: NodeRef<'g, T>) -> bool {
        self.held.contains(&node)
    }
}

impl<'g, T: Linked> Drop for Acquisition<'g, T> {
    fn drop(&mut self) {
        for node in self.held.drain(..) {
            node.set_state(NodeState::Open);
        }
    }
}
