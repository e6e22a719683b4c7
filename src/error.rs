use crate::node::NodeState;
use thiserror::Error;

/// Invariant violation found by [AaTree::verify](crate::AaTree::verify).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TreeError {
    #[error("bad left level: node level {level}, left child level {left}")]
    BadLeftLevel { level: usize, left: usize },
    #[error("bad right level: node level {level}, right child level {right}")]
    BadRightLevel { level: usize, right: usize },
    #[error("two consecutive horizontal links on level {level}")]
    ConsecutiveHorizontal { level: usize },
    #[error("broken parent link of node on level {level}")]
    BrokenParentLink { level: usize },
    #[error("node on level {level} left in {state} state")]
    NodeClaimed { level: usize, state: NodeState },
    #[error("tree counts {expected} nodes, but {actual} reachable from root")]
    CountMismatch { expected: usize, actual: usize },
}
