//! Predecessor/successor view over a procedure's blocks.

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use crate::body::{Block, Body};

#[derive(Debug, Default, Clone)]
pub struct ControlFlowGraph {
    entry: PackedOption<Block>,
    preds: SecondaryMap<Block, Vec<Block>>,
    succs: SecondaryMap<Block, Vec<Block>>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, body: &Body) {
        self.clear();

        self.entry = body.entry_block().into();

        for block in body.blocks.keys() {
            for &succ in &body.blocks[block].succs {
                self.add_edge(block, succ);
            }
        }
    }

    pub fn entry(&self) -> Option<Block> {
        self.entry.expand()
    }

    pub fn preds_of(&self, block: Block) -> &[Block] {
        &self.preds[block]
    }

    pub fn succs_of(&self, block: Block) -> &[Block] {
        &self.succs[block]
    }

    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.succs[from].push(to);
        self.preds[to].push(from);
    }

    pub fn clear(&mut self) {
        self.entry = None.into();
        self.preds.clear();
        self.succs.clear();
    }

    /// Post order of the blocks reachable from the entry.
    pub fn post_order(&self) -> Vec<Block> {
        let mut order = Vec::new();
        let Some(entry) = self.entry() else {
            return order;
        };

        // Iterative DFS; the second push of a block emits it.
        let mut visited = SecondaryMap::<Block, bool>::default();
        let mut stack = vec![(entry, false)];
        visited[entry] = true;

        while let Some((block, children_done)) = stack.pop() {
            if children_done {
                order.push(block);
                continue;
            }

            stack.push((block, true));
            for &succ in self.succs_of(block) {
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, false));
                }
            }
        }

        order
    }
}
