//! Rebalancing primitives. AA-tree needs only 2 local rotations to keep the tree balanced.
//!
//! Both rotations expect that caller holds acquisition which covers every node they touch.
//! New subtree root keeps parent link of replaced root, caller still must link it into
//! parent's child slot.

use crate::node::{Linked, NodeRef};

/// Remove left horizontal link.
///
/// ```text
///     X          Y
///    /     -->    \
///   Y              X
///    \            /
///     a          a
/// ```
pub(crate) fn skew<'g, T: Linked>(x: NodeRef<'g, T>) -> NodeRef<'g, T> {
    if x.is_nil() {
        return x;
    }
    let y = x.left();
    if y.is_nil() || x.level() != y.level() {
        return x;
    }

    let parent = x.parent();
    x.link_left(y.right());
    y.link_right(x);
    y.set_parent(parent);
    y
}

/// Remove 2 consecutive right horizontal links by promoting middle node.
///
/// ```text
///    X                Y
///     \              / \
///      Y      -->   X   Z
///     / \            \
///    a   Z            a
/// ```
pub(crate) fn split<'g, T: Linked>(x: NodeRef<'g, T>) -> NodeRef<'g, T> {
    if x.is_nil() {
        return x;
    }
    let y = x.right();
    let z = y.right();
    if z.is_nil() || x.level() != z.level() {
        return x;
    }

    let parent = x.parent();
    x.link_right(y.left());
    y.link_left(x);
    y.set_level(y.level() + 1);
    y.set_parent(parent);
    y
}
