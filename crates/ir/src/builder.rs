//! Programmatic construction of procedure bodies.
//!
//! Frontends and tests build bodies through [`BodyBuilder`] instead of
//! touching the arenas directly.

use smallvec::SmallVec;

use crate::{
    body::{Block, Body, Stmt},
    local::{Local, LocalData, LocalKind},
    node::{CallTarget, Global, Node, NodeData},
    oracle::Class,
};

#[derive(Debug, Default)]
pub struct BodyBuilder {
    body: Body,
    current: Option<Block>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn finish(self) -> Body {
        self.body
    }

    pub fn make_local(&mut self, kind: LocalKind) -> Local {
        self.body.make_local(LocalData::new(kind))
    }

    pub fn make_addr_exposed_local(&mut self, kind: LocalKind) -> Local {
        let mut data = LocalData::new(kind);
        data.addr_exposed = true;
        self.body.make_local(data)
    }

    pub fn append_block(&mut self) -> Block {
        let block = self.body.make_block();
        if self.current.is_none() {
            self.current = Some(block);
        }
        block
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    /// Records a control-flow edge. CFG shape is the frontend's business;
    /// the builder only stores what it is told.
    pub fn connect(&mut self, from: Block, to: Block) {
        self.body.blocks[from].succs.push(to);
    }

    /// Appends a statement rooted at `root` to the current block.
    pub fn stmt(&mut self, root: Node) -> Stmt {
        let block = self.current.unwrap();
        self.body.append_stmt(block, root)
    }

    /// Appends the canonical construction site `dst = new class()`.
    pub fn alloc_stmt(&mut self, dst: Local, class: Class) -> Stmt {
        let src = self.alloc_obj(class);
        let dst = self.local_use(dst);
        let root = self.assign(dst, src);
        self.stmt(root)
    }

    pub fn local_use(&mut self, local: Local) -> Node {
        self.body.make_node(NodeData::LocalUse(local))
    }

    pub fn global_use(&mut self, global: Global) -> Node {
        self.body.make_node(NodeData::GlobalUse(global))
    }

    pub fn int_const(&mut self, value: i64) -> Node {
        self.body.make_node(NodeData::IntConst(value))
    }

    pub fn class_const(&mut self, class: Class) -> Node {
        self.body.make_node(NodeData::ClassConst(class))
    }

    pub fn eq(&mut self, lhs: Node, rhs: Node) -> Node {
        self.body.make_node(NodeData::Eq { lhs, rhs })
    }

    pub fn ne(&mut self, lhs: Node, rhs: Node) -> Node {
        self.body.make_node(NodeData::Ne { lhs, rhs })
    }

    pub fn add(&mut self, lhs: Node, rhs: Node) -> Node {
        self.body.make_node(NodeData::Add { lhs, rhs })
    }

    pub fn indir(&mut self, addr: Node) -> Node {
        self.body.make_node(NodeData::Indir { addr })
    }

    pub fn addr_of(&mut self, location: Node) -> Node {
        self.body.make_node(NodeData::AddrOf { location })
    }

    pub fn field(&mut self, base: Node, offset: u32) -> Node {
        self.body.make_node(NodeData::Field { base, offset })
    }

    pub fn index(&mut self, base: Node, index: Node) -> Node {
        self.body.make_node(NodeData::Index { base, index })
    }

    pub fn call(&mut self, target: CallTarget, args: &[Node]) -> Node {
        self.body.make_node(NodeData::Call {
            target,
            args: SmallVec::from_slice(args),
        })
    }

    pub fn alloc_obj(&mut self, class: Class) -> Node {
        self.body.make_node(NodeData::AllocObj { class })
    }

    pub fn assign(&mut self, dst: Node, src: Node) -> Node {
        self.body.make_node(NodeData::Assign { dst, src })
    }
}
