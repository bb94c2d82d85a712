//! Strongly connected components of a procedure's control flow.
//!
//! The object allocator consults this to refuse frame placement for
//! construction sites inside control-flow cycles, which would otherwise grow
//! the frame on every iteration.

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use toccata_ir::{Block, ControlFlowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SccId(u32);
entity_impl!(SccId);

#[derive(Debug, Clone, Default)]
pub struct SccData {
    pub blocks: Vec<Block>,

    /// A component is a cycle if it spans several blocks or a block loops
    /// back on itself.
    pub is_cycle: bool,
}

#[derive(Debug, Default)]
pub struct CfgSccAnalysis {
    block_to_scc: SecondaryMap<Block, PackedOption<SccId>>,
    sccs: PrimaryMap<SccId, SccData>,
}

impl CfgSccAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.block_to_scc.clear();
        self.sccs.clear();
    }

    /// Computes SCCs for the subgraph reachable from `cfg.entry()`.
    pub fn compute(&mut self, cfg: &ControlFlowGraph) {
        self.clear();

        // Kosaraju: process blocks in reverse post order, then flood each
        // unvisited root backwards along predecessor edges.
        let mut rpo = cfg.post_order();
        rpo.reverse();

        let mut reachable = SecondaryMap::<Block, bool>::default();
        for &block in &rpo {
            reachable[block] = true;
        }

        let mut visited = SecondaryMap::<Block, bool>::default();

        for &root in &rpo {
            if visited[root] {
                continue;
            }

            let scc = self.sccs.push(SccData::default());
            let mut stack = vec![root];
            visited[root] = true;

            while let Some(block) = stack.pop() {
                self.block_to_scc[block] = scc.into();
                self.sccs[scc].blocks.push(block);

                for &pred in cfg.preds_of(block) {
                    if reachable[pred] && !visited[pred] {
                        visited[pred] = true;
                        stack.push(pred);
                    }
                }
            }
        }

        for scc in self.sccs.keys() {
            let multi_block = self.sccs[scc].blocks.len() > 1;
            let self_loop = self.sccs[scc]
                .blocks
                .iter()
                .any(|&block| cfg.succs_of(block).contains(&block));
            self.sccs[scc].is_cycle = multi_block || self_loop;
        }
    }

    pub fn scc_of(&self, block: Block) -> Option<SccId> {
        self.block_to_scc[block].expand()
    }

    pub fn scc_data(&self, scc: SccId) -> &SccData {
        &self.sccs[scc]
    }

    pub fn scc_count(&self) -> usize {
        self.sccs.len()
    }

    /// Whether `block` lies on a control-flow cycle. Blocks the analysis did
    /// not reach get the conservative answer.
    pub fn is_part_of_cycle(&self, block: Block) -> bool {
        match self.scc_of(block) {
            Some(scc) => self.sccs[scc].is_cycle,
            None => true,
        }
    }
}
