//! Pre-order tree traversal with ancestor tracking.

use smallvec::SmallVec;

use crate::{body::Body, node::Node};

/// Ancestors of the node being visited, root-most first. The visited node
/// itself is not on the stack; `last()` is its immediate parent.
pub type AncestorStack = SmallVec<[Node; 8]>;

/// Walks the tree rooted at `root` in pre-order, reporting the ancestor
/// stack at every visited node.
pub fn walk_pre(body: &Body, root: Node, visit: &mut impl FnMut(&Body, Node, &AncestorStack)) {
    let mut ancestors = AncestorStack::new();
    walk_node(body, root, &mut ancestors, visit);
}

fn walk_node(
    body: &Body,
    node: Node,
    ancestors: &mut AncestorStack,
    visit: &mut impl FnMut(&Body, Node, &AncestorStack),
) {
    visit(body, node, ancestors);

    ancestors.push(node);
    body.node(node)
        .for_each_operand(&mut |operand| walk_node(body, operand, ancestors, visit));
    ancestors.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        local::{LocalData, LocalKind},
        node::NodeData,
    };

    #[test]
    fn ancestor_stack_is_rootmost_first() {
        let mut body = Body::new();
        let local = body.make_local(LocalData::new(LocalKind::Ref));

        // *(v0 + 8)
        let leaf = body.make_node(NodeData::LocalUse(local));
        let off = body.make_node(NodeData::IntConst(8));
        let add = body.make_node(NodeData::Add { lhs: leaf, rhs: off });
        let load = body.make_node(NodeData::Indir { addr: add });

        let mut seen = Vec::new();
        walk_pre(&body, load, &mut |_, node, ancestors| {
            seen.push((node, ancestors.to_vec()));
        });

        assert_eq!(
            seen,
            vec![
                (load, vec![]),
                (add, vec![load]),
                (leaf, vec![load, add]),
                (off, vec![load, add]),
            ]
        );
    }

    #[test]
    fn stack_is_empty_again_after_walk() {
        let mut body = Body::new();
        let a = body.make_node(NodeData::IntConst(1));
        let b = body.make_node(NodeData::IntConst(2));
        let add = body.make_node(NodeData::Add { lhs: a, rhs: b });

        let mut depth_at_root = None;
        walk_pre(&body, add, &mut |_, node, ancestors| {
            if node == add {
                depth_at_root = Some(ancestors.len());
            }
        });
        assert_eq!(depth_at_root, Some(0));
    }
}
