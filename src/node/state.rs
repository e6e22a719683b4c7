use std::fmt::{Display, Formatter};

/// Concurrency-control tag of a tree node.
///
/// State never describes tree structure: it only tells whether some in-progress
/// operation currently owns the node.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum NodeState {
    /// Unclaimed, safe to read and to claim.
    Open = 0,
    /// Claimed as the landing site of a new leaf (or the new leaf itself).
    Insert = 1,
    /// Claimed by an acquisition which guards a rotation.
    Balancing = 2,
}

impl NodeState {
    #[inline(always)]
    pub fn is_open(&self) -> bool {
        *self == NodeState::Open
    }
}

impl From<NodeState> for u8 {
    #[inline(always)]
    fn from(state: NodeState) -> Self {
        state as u8
    }
}

impl From<u8> for NodeState {
    fn from(word: u8) -> Self {
        match word {
            0 => NodeState::Open,
            1 => NodeState::Insert,
            2 => NodeState::Balancing,
            _ => panic!("Corrupted node state word: {}", word),
        }
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Open => "open",
            NodeState::Insert => "insert",
            NodeState::Balancing => "balancing",
        };
        f.write_str(name)
    }
}
