use crate::node::{Linked, NodeRef};

/// Order in which [AaTree::walk](crate::AaTree::walk) visits nodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WalkOrder {
    /// Node visited before it's subtrees.
    PreOrder,
    /// Left subtree, node, right subtree: keys visited in ascending order.
    InOrder,
    /// Both subtrees visited before node, so node can be destroyed by visitor.
    PostOrder,
}

pub(crate) fn walk_subtree<'g, T, F>(current: NodeRef<'g, T>, order: WalkOrder, visitor: &mut F)
where
    T: Linked,
    F: FnMut(&'g T),
{
    let item = match current.item() {
        Some(item) => item,
        None => return,
    };
    match order {
        WalkOrder::PreOrder => {
            visitor(item);
            walk_subtree(current.left(), order, visitor);
            walk_subtree(current.right(), order, visitor);
        }
        WalkOrder::InOrder => {
            walk_subtree(current.left(), order, visitor);
            visitor(item);
            walk_subtree(current.right(), order, visitor);
        }
        WalkOrder::PostOrder => {
            walk_subtree(current.left(), order, visitor);
            walk_subtree(current.right(), order, visitor);
            visitor(item);
        }
    }
}
