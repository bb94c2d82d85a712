//! The object allocation phase.
//!
//! Rewrites every canonical construction site `lcl = new C()` into either a
//! call to the runtime's allocation helper or, when the escape analysis in
//! [`escape`] proves the reference never leaves the procedure, an inline
//! frame slot. The heap path is always legal; every ambiguity falls back to
//! it.

mod escape;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use toccata_ir::{
    walk, Block, Body, CallTarget, Class, HelperOracle, Local, LocalData, LocalKind, Node,
    NodeData, Stmt, TypeOracle,
};

use crate::{bitset::BitSet, cfg_scc::CfgSccAnalysis, optim::stmt_simplify};

/// Largest instance layout eligible for frame placement.
pub const STACK_ALLOC_MAX_SIZE: u32 = 0x2000;

/// Cycle membership of basic blocks, computed ahead of rewriting by an SCC
/// analysis. Injected so the rewriter can be driven by a mock in tests.
pub trait CycleOracle {
    fn is_part_of_cycle(&self, block: Block) -> bool;
}

impl CycleOracle for CfgSccAnalysis {
    fn is_part_of_cycle(&self, block: Block) -> bool {
        CfgSccAnalysis::is_part_of_cycle(self, block)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectAllocConfig {
    pub stack_alloc_enabled: bool,

    /// Whether the phase runs after the one global tree-simplify pass. If so,
    /// every statement it inserts or mutates is re-simplified on the spot.
    pub runs_after_simplify: bool,
}

/// Per-procedure phase state. Built fresh for every procedure and discarded
/// when [`ObjectAllocator::run`] returns.
pub struct ObjectAllocator<'a> {
    types: &'a dyn TypeOracle,
    helpers: &'a dyn HelperOracle,
    config: ObjectAllocConfig,

    escaping: BitSet<Local>,
    analysis_done: bool,

    /// Original destination local of each stack-placed site, mapped to the
    /// frame value slot that now backs it. Later phases use this to redirect
    /// remaining uses.
    stack_locals: FxHashMap<Local, Local>,
}

struct AllocSite {
    alloc_node: Node,
    dst_local: Local,
    class: Class,
}

impl<'a> ObjectAllocator<'a> {
    pub fn new(
        types: &'a dyn TypeOracle,
        helpers: &'a dyn HelperOracle,
        config: ObjectAllocConfig,
    ) -> Self {
        Self {
            types,
            helpers,
            config,
            escaping: BitSet::new(),
            analysis_done: false,
            stack_locals: FxHashMap::default(),
        }
    }

    /// The frame slot that replaced `local`'s heap object, if any.
    pub fn stack_local_for(&self, local: Local) -> Option<Local> {
        self.stack_locals.get(&local).copied()
    }

    /// Runs the phase over `body`. A no-op for procedures without
    /// construction sites; degrades to pure helper-call rewriting when stack
    /// allocation is disabled.
    pub fn run(&mut self, body: &mut Body, cycles: &dyn CycleOracle) {
        if !body.has_new_obj {
            return;
        }

        if self.config.stack_alloc_enabled {
            self.analyze(body);
        }

        self.rewrite_alloc_sites(body, cycles);
    }

    fn analyze(&mut self, body: &Body) {
        debug_assert!(!self.analysis_done);

        let graph = escape::build_conn_graph(body, self.helpers, &mut self.escaping);
        escape::compute_closure(&graph, &mut self.escaping);

        self.analysis_done = true;
    }

    fn can_local_escape(&self, local: Local) -> bool {
        debug_assert!(self.analysis_done, "escape query before analysis finished");
        self.escaping.contains(local)
    }

    /// Stack eligibility of one site: the destination must not escape, the
    /// class must not need finalization, and the layout must fit under
    /// [`STACK_ALLOC_MAX_SIZE`].
    fn can_allocate_on_stack(&self, local: Local, class: Class) -> bool {
        debug_assert!(self.analysis_done, "eligibility query before analysis finished");

        let size = if self.types.is_value_class(class) {
            self.types.class_size(class)
        } else {
            self.types.heap_class_size(class)
        };

        !self.can_local_escape(local)
            && !self.types.has_finalizer(class)
            && size <= STACK_ALLOC_MAX_SIZE
    }

    fn rewrite_alloc_sites(&mut self, body: &mut Body, cycles: &dyn CycleOracle) {
        let blocks: Vec<Block> = body.blocks.keys().collect();
        for block in blocks {
            // Snapshot: rewriting inserts statements into the block.
            let stmts: SmallVec<[Stmt; 8]> = SmallVec::from_slice(&body.blocks[block].stmts);
            for stmt in stmts {
                match canonical_alloc_site(body, stmt) {
                    Some(site) => self.rewrite_site(body, cycles, block, stmt, site),
                    None => debug_assert_no_alloc_obj(body, stmt),
                }
            }
        }
    }

    fn rewrite_site(
        &mut self,
        body: &mut Body,
        cycles: &dyn CycleOracle,
        block: Block,
        stmt: Stmt,
        site: AllocSite,
    ) {
        let AllocSite {
            alloc_node,
            dst_local,
            class,
        } = site;

        let inserted = if self.config.stack_alloc_enabled
            && self.can_allocate_on_stack(dst_local, class)
            && !cycles.is_part_of_cycle(block)
        {
            let inserted = self.rewrite_into_stack_alloc(body, block, stmt, alloc_node, dst_local, class);
            body.has_stack_alloc = true;
            inserted
        } else {
            self.rewrite_into_helper_call(body, alloc_node, class);
            SmallVec::new()
        };

        if self.config.runs_after_simplify {
            for &new_stmt in &inserted {
                stmt_simplify::simplify_stmt(body, new_stmt);
            }
            stmt_simplify::simplify_stmt(body, stmt);
        }

        // The site statement keeps its node but carries a new subtree.
        body.refresh_stmt_effects(stmt);
    }

    /// Replaces the construction with frame storage: a fresh struct-kind
    /// value slot sized by the class layout, zero-filled and stamped with the
    /// runtime type identity before the original statement, whose source
    /// becomes the slot address past the header.
    fn rewrite_into_stack_alloc(
        &mut self,
        body: &mut Body,
        block: Block,
        stmt: Stmt,
        alloc_node: Node,
        dst_local: Local,
        class: Class,
    ) -> SmallVec<[Stmt; 2]> {
        debug_assert!(self.analysis_done);

        // The slot can outlive its block, so it is an ordinary frame local.
        let value_slot = body.make_local(LocalData::with_class(LocalKind::Struct, class));
        self.stack_locals.insert(dst_local, value_slot);

        let mut inserted = SmallVec::new();

        // Zero-fill the whole slot; an integral zero assigned to a struct
        // local initializes every byte of its layout.
        let slot_use = body.make_node(NodeData::LocalUse(value_slot));
        let zero = body.make_node(NodeData::IntConst(0));
        let init = body.make_node(NodeData::Assign {
            dst: slot_use,
            src: zero,
        });
        inserted.push(body.insert_stmt_before(block, stmt, init));

        // Store the runtime type identity at the header offset.
        let header_size = self.types.header_size();
        let slot_use = body.make_node(NodeData::LocalUse(value_slot));
        let slot_addr = body.make_node(NodeData::AddrOf { location: slot_use });
        let header = body.make_node(NodeData::Field {
            base: slot_addr,
            offset: header_size,
        });
        let type_ident = body.make_node(NodeData::ClassConst(class));
        let stamp = body.make_node(NodeData::Assign {
            dst: header,
            src: type_ident,
        });
        inserted.push(body.insert_stmt_before(block, stmt, stamp));

        // The construction result becomes "slot address + header size", so
        // consumers keep seeing a reference-shaped value just past the
        // header. The surrounding assignment is untouched.
        let slot_use = body.make_node(NodeData::LocalUse(value_slot));
        let slot_addr = body.make_node(NodeData::AddrOf { location: slot_use });
        let offset = body.make_node(NodeData::IntConst(header_size as i64));
        body.replace_node(
            alloc_node,
            NodeData::Add {
                lhs: slot_addr,
                rhs: offset,
            },
        );

        inserted
    }

    /// Replaces the construction with a call to the runtime allocation helper
    /// for `class`, passing the class handle as the sole argument.
    fn rewrite_into_helper_call(&self, body: &mut Body, alloc_node: Node, class: Class) {
        let helper = self.types.alloc_helper(class);
        let class_arg = body.make_node(NodeData::ClassConst(class));
        body.replace_node(
            alloc_node,
            NodeData::Call {
                target: CallTarget::Helper(helper),
                args: [class_arg].into_iter().collect(),
            },
        );
    }
}

/// Matches the canonical shape an earlier canonicalization pass guarantees
/// for every construction site: a statement-level assignment of an
/// `AllocObj` into a ref local.
fn canonical_alloc_site(body: &Body, stmt: Stmt) -> Option<AllocSite> {
    let root = body.stmt(stmt).root;
    let NodeData::Assign { dst, src } = *body.node(root) else {
        return None;
    };
    let NodeData::AllocObj { class } = *body.node(src) else {
        return None;
    };
    let NodeData::LocalUse(dst_local) = *body.node(dst) else {
        return None;
    };
    debug_assert_eq!(body.local(dst_local).kind, LocalKind::Ref);

    Some(AllocSite {
        alloc_node: src,
        dst_local,
        class,
    })
}

/// Any construction expression outside the canonical shape is a consistency
/// failure; this phase does not handle the general case.
fn debug_assert_no_alloc_obj(body: &Body, stmt: Stmt) {
    if cfg!(debug_assertions) {
        walk::walk_pre(body, body.stmt(stmt).root, &mut |body, node, _| {
            debug_assert!(
                !matches!(body.node(node), NodeData::AllocObj { .. }),
                "construction site out of canonical form in {stmt}"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toccata_ir::{
        oracle::{ClassInfo, SimpleHelperOracle, SimpleTypeOracle},
        writer::{dump_block, dump_stmt},
        BodyBuilder, ControlFlowGraph, EffectFlags, Global, HelperFunc,
    };

    const HEADER_SIZE: u32 = 8;

    struct NoCycles;

    impl CycleOracle for NoCycles {
        fn is_part_of_cycle(&self, _block: Block) -> bool {
            false
        }
    }

    fn plain_class(size: u32) -> ClassInfo {
        ClassInfo {
            size,
            is_value_class: false,
            has_finalizer: false,
            alloc_helper: HelperFunc(0),
        }
    }

    fn oracle_with(classes: &[(Class, ClassInfo)]) -> SimpleTypeOracle {
        let mut types = SimpleTypeOracle::new(HEADER_SIZE);
        for (class, info) in classes {
            types.define(*class, info.clone());
        }
        types
    }

    fn enabled() -> ObjectAllocConfig {
        ObjectAllocConfig {
            stack_alloc_enabled: true,
            runs_after_simplify: false,
        }
    }

    #[test]
    fn non_escaping_site_goes_on_the_stack() {
        // t = new X(); y = t.field;
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        let y = builder.make_local(LocalKind::Int);
        builder.alloc_stmt(t, Class(0));

        let t_use = builder.local_use(t);
        let off = builder.int_const(16);
        let sum = builder.add(t_use, off);
        let load = builder.indir(sum);
        let y_use = builder.local_use(y);
        let asg = builder.assign(y_use, load);
        builder.stmt(asg);

        let mut body = builder.finish();
        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        assert!(body.has_stack_alloc);
        let slot = allocator.stack_local_for(t).unwrap();
        assert_eq!(body.local(slot).kind, LocalKind::Struct);
        assert_eq!(body.local(slot).class, Some(Class(0)));

        // Zero-fill, type stamp, then the original assignment now carrying
        // the slot address past the header.
        assert_eq!(
            dump_block(&body, block),
            format!(
                "(asg (local {slot}) (iconst 0))\n\
                 (asg (field +8 (addr (local {slot}))) (classconst class0))\n\
                 (asg (local v0) (add (addr (local {slot})) (iconst 8)))\n\
                 (asg (local v1) (indir (add (local v0) (iconst 16))))\n"
            )
        );
    }

    #[test]
    fn escaping_site_goes_on_the_heap() {
        // t = new X(); g0 = t;
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, Class(0));

        let t_use = builder.local_use(t);
        let g_use = builder.global_use(Global(0));
        let asg = builder.assign(g_use, t_use);
        builder.stmt(asg);

        let mut body = builder.finish();
        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        assert!(!body.has_stack_alloc);
        assert_eq!(allocator.stack_local_for(t), None);
        assert_eq!(
            dump_stmt(&body, body.blocks[block].stmts[0]),
            "(asg (local v0) (call helper0 (classconst class0)))"
        );
    }

    #[test]
    fn escape_propagates_through_local_copies() {
        // t = new X(); u = t; g0 = u;
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        let u = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, Class(0));

        let t_use = builder.local_use(t);
        let u_use = builder.local_use(u);
        let asg = builder.assign(u_use, t_use);
        builder.stmt(asg);

        let u_use = builder.local_use(u);
        let g_use = builder.global_use(Global(0));
        let asg = builder.assign(g_use, u_use);
        builder.stmt(asg);

        let mut body = builder.finish();
        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        // t never reaches a global directly, but u does and u may have been
        // assigned from t.
        assert!(!body.has_stack_alloc);
        assert!(dump_stmt(&body, body.blocks[block].stmts[0]).contains("call helper0"));
    }

    #[test]
    fn cycle_member_block_is_never_stack_allocated() {
        // entry -> loop <-> loop body; the site sits inside the loop.
        let mut builder = BodyBuilder::new();
        let entry = builder.append_block();
        let header = builder.append_block();
        let tail = builder.append_block();
        let exit = builder.append_block();
        builder.connect(entry, header);
        builder.connect(header, tail);
        builder.connect(tail, header);
        builder.connect(header, exit);

        let t = builder.make_local(LocalKind::Ref);
        builder.switch_to_block(header);
        builder.alloc_stmt(t, Class(0));

        let mut body = builder.finish();
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&body);
        let mut scc = CfgSccAnalysis::new();
        scc.compute(&cfg);

        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &scc);

        assert!(!body.has_stack_alloc);
        assert!(dump_block(&body, header).contains("call helper0"));
    }

    #[test]
    fn finalizable_class_is_never_stack_allocated() {
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, Class(0));

        let mut body = builder.finish();
        let mut info = plain_class(24);
        info.has_finalizer = true;
        let types = oracle_with(&[(Class(0), info)]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        assert!(!body.has_stack_alloc);
        assert!(dump_block(&body, block).contains("call helper0"));
    }

    #[test]
    fn size_boundary_is_inclusive() {
        let at_limit = Class(0);
        let over_limit = Class(1);

        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        let u = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, at_limit);
        builder.alloc_stmt(u, over_limit);

        let mut body = builder.finish();
        let types = oracle_with(&[
            (at_limit, plain_class(STACK_ALLOC_MAX_SIZE)),
            (over_limit, plain_class(STACK_ALLOC_MAX_SIZE + 1)),
        ]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        assert!(body.has_stack_alloc);
        assert!(allocator.stack_local_for(t).is_some());
        assert_eq!(allocator.stack_local_for(u), None);
        assert!(dump_block(&body, block).contains("call helper0"));
    }

    #[test]
    fn disabled_config_rewrites_every_site_to_the_heap() {
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, Class(0));

        let mut body = builder.finish();
        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let config = ObjectAllocConfig {
            stack_alloc_enabled: false,
            runs_after_simplify: false,
        };
        let mut allocator = ObjectAllocator::new(&types, &helpers, config);
        allocator.run(&mut body, &NoCycles);

        assert!(!body.has_stack_alloc);
        assert_eq!(
            dump_block(&body, block),
            "(asg (local v0) (call helper0 (classconst class0)))\n"
        );
    }

    #[test]
    fn rewrite_refreshes_effect_summaries() {
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        let stmt = builder.alloc_stmt(t, Class(0));

        let mut body = builder.finish();
        // A construction summarizes as a call before the rewrite.
        assert!(body.stmt(stmt).effects.contains(EffectFlags::CALL));

        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        // The stack path replaces the call with address arithmetic; a stale
        // summary would still claim one.
        assert!(body.has_stack_alloc);
        let effects = body.stmt(stmt).effects;
        assert!(effects.contains(EffectFlags::ASG));
        assert!(!effects.contains(EffectFlags::CALL));

        // The inserted zero-fill and type stamp carry their own summaries.
        for &inserted in &body.blocks[block].stmts[..2] {
            assert!(body.stmt(inserted).effects.contains(EffectFlags::ASG));
        }
    }

    #[test]
    fn after_simplify_config_resimplifies_rewritten_statements() {
        // With a zero-sized header the stack rewrite produces
        // `addr + 0`, which must fold away immediately.
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        builder.alloc_stmt(t, Class(0));

        let mut body = builder.finish();
        let mut types = SimpleTypeOracle::new(0);
        types.define(Class(0), plain_class(24));
        let helpers = SimpleHelperOracle::new();
        let config = ObjectAllocConfig {
            stack_alloc_enabled: true,
            runs_after_simplify: true,
        };
        let mut allocator = ObjectAllocator::new(&types, &helpers, config);
        allocator.run(&mut body, &NoCycles);

        let slot = allocator.stack_local_for(t).unwrap();
        let site = *body.blocks[block].stmts.last().unwrap();
        assert_eq!(
            dump_stmt(&body, site),
            format!("(asg (local v0) (addr (local {slot})))")
        );
    }

    #[test]
    fn procedure_without_sites_is_untouched() {
        let mut builder = BodyBuilder::new();
        let block = builder.append_block();
        let t = builder.make_local(LocalKind::Ref);
        let g_use = builder.global_use(Global(0));
        let t_use = builder.local_use(t);
        let asg = builder.assign(g_use, t_use);
        builder.stmt(asg);

        let mut body = builder.finish();
        let before = dump_block(&body, block);

        let types = oracle_with(&[]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);

        assert_eq!(dump_block(&body, block), before);
        assert!(!body.has_stack_alloc);
    }

    #[test]
    #[should_panic(expected = "canonical form")]
    #[cfg(debug_assertions)]
    fn non_canonical_site_is_a_consistency_failure() {
        // new X() used as a call argument instead of a top-level assignment.
        let mut builder = BodyBuilder::new();
        builder.append_block();
        let alloc = builder.alloc_obj(Class(0));
        let call = builder.call(CallTarget::Method(toccata_ir::Method(0)), &[alloc]);
        builder.stmt(call);

        let mut body = builder.finish();
        let types = oracle_with(&[(Class(0), plain_class(24))]);
        let helpers = SimpleHelperOracle::new();
        let mut allocator = ObjectAllocator::new(&types, &helpers, enabled());
        allocator.run(&mut body, &NoCycles);
    }
}
