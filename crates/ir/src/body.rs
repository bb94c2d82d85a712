//! Procedure bodies: ordered basic blocks of statement trees.

use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

use crate::{
    local::{Local, LocalData},
    node::{EffectFlags, Node, NodeData},
};

/// An opaque reference to a statement.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stmt(pub u32);
entity_impl!(Stmt, "stmt");

/// An opaque reference to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(pub u32);
entity_impl!(Block, "block");

#[derive(Debug, Clone)]
pub struct StmtData {
    pub root: Node,

    /// Union of the effects of every node in the tree. Refreshed whenever the
    /// tree is mutated.
    pub effects: EffectFlags,
}

#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub stmts: Vec<Stmt>,

    /// Successor edges, supplied by whoever built the control flow.
    pub succs: SmallVec<[Block; 2]>,
}

/// One procedure's body. All arenas are procedure-scoped; a `Body` is built
/// fresh per compilation and dropped when lowering finishes.
#[derive(Debug, Default)]
pub struct Body {
    pub locals: PrimaryMap<Local, LocalData>,
    pub blocks: PrimaryMap<Block, BlockData>,
    nodes: PrimaryMap<Node, NodeData>,
    stmts: PrimaryMap<Stmt, StmtData>,

    /// The frontend materialized at least one object-construction site.
    pub has_new_obj: bool,

    /// The object allocator placed at least one construction on the frame.
    /// Later passes consume this when computing the frame size.
    pub has_stack_alloc: bool,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_local(&mut self, data: LocalData) -> Local {
        self.locals.push(data)
    }

    pub fn local(&self, local: Local) -> &LocalData {
        &self.locals[local]
    }

    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// Blocks in layout order; the first block is the procedure entry.
    pub fn entry_block(&self) -> Option<Block> {
        self.blocks.keys().next()
    }

    pub fn make_node(&mut self, data: NodeData) -> Node {
        if matches!(data, NodeData::AllocObj { .. }) {
            self.has_new_obj = true;
        }
        self.nodes.push(data)
    }

    pub fn node(&self, node: Node) -> &NodeData {
        &self.nodes[node]
    }

    /// Replaces the operator at `node` in place. Parents keep their operand
    /// references; orphaned operands stay in the arena.
    pub fn replace_node(&mut self, node: Node, data: NodeData) {
        debug_assert!(
            !matches!(data, NodeData::AllocObj { .. }),
            "construction sites are made by the frontend, not by rewrites"
        );
        self.nodes[node] = data;
    }

    pub fn stmt(&self, stmt: Stmt) -> &StmtData {
        &self.stmts[stmt]
    }

    /// Appends a statement rooted at `root` to the end of `block`.
    pub fn append_stmt(&mut self, block: Block, root: Node) -> Stmt {
        let stmt = self.make_stmt(root);
        self.blocks[block].stmts.push(stmt);
        stmt
    }

    /// Inserts a statement rooted at `root` immediately before `before`,
    /// which must belong to `block`.
    pub fn insert_stmt_before(&mut self, block: Block, before: Stmt, root: Node) -> Stmt {
        let pos = self.blocks[block]
            .stmts
            .iter()
            .position(|&s| s == before)
            .unwrap_or_else(|| panic!("{before} does not belong to {block}"));
        let stmt = self.make_stmt(root);
        self.blocks[block].stmts.insert(pos, stmt);
        stmt
    }

    /// Union of the effects of every node in the tree rooted at `node`.
    pub fn summarize_effects(&self, node: Node) -> EffectFlags {
        let data = self.node(node);
        let mut effects = data.base_effects();
        data.for_each_operand(&mut |operand| effects |= self.summarize_effects(operand));
        effects
    }

    /// Recomputes the effect summary of `stmt` from its current tree.
    pub fn refresh_stmt_effects(&mut self, stmt: Stmt) {
        let effects = self.summarize_effects(self.stmts[stmt].root);
        self.stmts[stmt].effects = effects;
    }

    fn make_stmt(&mut self, root: Node) -> Stmt {
        let effects = self.summarize_effects(root);
        self.stmts.push(StmtData { root, effects })
    }
}
