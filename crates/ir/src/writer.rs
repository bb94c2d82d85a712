//! Textual dump of statements and trees, for debugging and test assertions.

use std::fmt::Write;

use crate::{
    body::{Block, Body, Stmt},
    node::{CallTarget, Node, NodeData},
};

pub fn dump_block(body: &Body, block: Block) -> String {
    let mut out = String::new();
    for &stmt in &body.blocks[block].stmts {
        out.push_str(&dump_stmt(body, stmt));
        out.push('\n');
    }
    out
}

pub fn dump_stmt(body: &Body, stmt: Stmt) -> String {
    dump_node(body, body.stmt(stmt).root)
}

pub fn dump_node(body: &Body, node: Node) -> String {
    let mut out = String::new();
    write_node(body, node, &mut out);
    out
}

fn write_node(body: &Body, node: Node, out: &mut String) {
    match body.node(node) {
        NodeData::LocalUse(local) => write!(out, "(local {local})").unwrap(),
        NodeData::GlobalUse(global) => write!(out, "(global {global})").unwrap(),
        NodeData::IntConst(value) => write!(out, "(iconst {value})").unwrap(),
        NodeData::ClassConst(class) => write!(out, "(classconst {class})").unwrap(),
        NodeData::Eq { lhs, rhs } => write_binary(body, "eq", *lhs, *rhs, out),
        NodeData::Ne { lhs, rhs } => write_binary(body, "ne", *lhs, *rhs, out),
        NodeData::Add { lhs, rhs } => write_binary(body, "add", *lhs, *rhs, out),
        NodeData::Indir { addr } => write_unary(body, "indir", *addr, out),
        NodeData::AddrOf { location } => write_unary(body, "addr", *location, out),
        NodeData::Field { base, offset } => {
            write!(out, "(field +{offset} ").unwrap();
            write_node(body, *base, out);
            out.push(')');
        }
        NodeData::Index { base, index } => write_binary(body, "index", *base, *index, out),
        NodeData::Call { target, args } => {
            match target {
                CallTarget::Helper(helper) => write!(out, "(call {helper}").unwrap(),
                CallTarget::Method(method) => write!(out, "(call {method}").unwrap(),
                CallTarget::DelegateInvoke(method) => write!(out, "(invoke {method}").unwrap(),
            }
            for &arg in args {
                out.push(' ');
                write_node(body, arg, out);
            }
            out.push(')');
        }
        NodeData::AllocObj { class } => write!(out, "(allocobj {class})").unwrap(),
        NodeData::Assign { dst, src } => write_binary(body, "asg", *dst, *src, out),
    }
}

fn write_unary(body: &Body, op: &str, operand: Node, out: &mut String) {
    write!(out, "({op} ").unwrap();
    write_node(body, operand, out);
    out.push(')');
}

fn write_binary(body: &Body, op: &str, lhs: Node, rhs: Node, out: &mut String) {
    write!(out, "({op} ").unwrap();
    write_node(body, lhs, out);
    out.push(' ');
    write_node(body, rhs, out);
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::BodyBuilder, local::LocalKind, oracle::Class};

    #[test]
    fn dumps_canonical_alloc_site() {
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let dst = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(dst, Class(3));

        let body = builder.finish();
        assert_eq!(
            dump_block(&body, block),
            "(asg (local v0) (allocobj class3))\n"
        );
    }

    #[test]
    fn dumps_field_store_through_address() {
        let mut builder = BodyBuilder::new();
        builder.append_block();
        let slot = builder.make_local(LocalKind::Struct);

        let slot_use = builder.local_use(slot);
        let addr = builder.addr_of(slot_use);
        let header = builder.field(addr, 8);
        let ty = builder.class_const(Class(1));
        let asg = builder.assign(header, ty);
        let stmt = builder.stmt(asg);

        let body = builder.finish();
        assert_eq!(
            dump_stmt(&body, stmt),
            "(asg (field +8 (addr (local v0))) (classconst class1))"
        );
    }
}
