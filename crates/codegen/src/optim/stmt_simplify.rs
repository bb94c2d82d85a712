//! In-place re-simplification of single statements.
//!
//! When the object allocator runs after the global tree-simplify pass, the
//! statements it inserts or mutates must be brought back to simplified form
//! immediately; nothing later in the pipeline would do it for them. Only the
//! shapes the rewriter can produce are handled here.

use toccata_ir::{Body, Node, NodeData, Stmt};

/// Simplifies the tree of `stmt` bottom-up and refreshes its effect summary.
pub fn simplify_stmt(body: &mut Body, stmt: Stmt) {
    let root = body.stmt(stmt).root;
    simplify_node(body, root);
    body.refresh_stmt_effects(stmt);
}

fn simplify_node(body: &mut Body, node: Node) {
    let operands: Vec<Node> = {
        let mut operands = Vec::new();
        body.node(node).for_each_operand(&mut |operand| operands.push(operand));
        operands
    };
    for operand in operands {
        simplify_node(body, operand);
    }

    let NodeData::Add { lhs, rhs } = *body.node(node) else {
        return;
    };

    match (body.node(lhs), body.node(rhs)) {
        (&NodeData::IntConst(a), &NodeData::IntConst(b)) => {
            body.replace_node(node, NodeData::IntConst(a.wrapping_add(b)));
        }
        (_, &NodeData::IntConst(0)) => {
            let lhs_data = body.node(lhs).clone();
            body.replace_node(node, lhs_data);
        }
        (&NodeData::IntConst(0), _) => {
            let rhs_data = body.node(rhs).clone();
            body.replace_node(node, rhs_data);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toccata_ir::{writer::dump_stmt, BodyBuilder, LocalKind};

    #[test]
    fn folds_constant_add() {
        let mut builder = BodyBuilder::new();
        builder.append_block();
        let dst = builder.make_local(LocalKind::Int);

        let a = builder.int_const(2);
        let b = builder.int_const(3);
        let add = builder.add(a, b);
        let dst_use = builder.local_use(dst);
        let asg = builder.assign(dst_use, add);
        let stmt = builder.stmt(asg);

        let mut body = builder.finish();
        simplify_stmt(&mut body, stmt);
        assert_eq!(dump_stmt(&body, stmt), "(asg (local v0) (iconst 5))");
    }

    #[test]
    fn drops_zero_addend() {
        let mut builder = BodyBuilder::new();
        builder.append_block();
        let slot = builder.make_local(LocalKind::Struct);
        let dst = builder.make_local(LocalKind::Ref);

        let slot_use = builder.local_use(slot);
        let addr = builder.addr_of(slot_use);
        let zero = builder.int_const(0);
        let add = builder.add(addr, zero);
        let dst_use = builder.local_use(dst);
        let asg = builder.assign(dst_use, add);
        let stmt = builder.stmt(asg);

        let mut body = builder.finish();
        simplify_stmt(&mut body, stmt);
        assert_eq!(
            dump_stmt(&body, stmt),
            "(asg (local v1) (addr (local v0)))"
        );
    }
}
