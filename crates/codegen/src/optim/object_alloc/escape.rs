//! Escape analysis over local reference variables.
//!
//! Three pieces, run in order by the object allocator:
//! a syntactic classifier that judges one use of a local from its ancestor
//! nodes, a single pre-order pass that turns every statement into
//! connectivity-graph edges and escaping roots, and a fixed-point closure
//! that extends the root set along the graph.

use cranelift_entity::SecondaryMap;
use toccata_ir::{walk, Body, CallTarget, HelperOracle, Local, Node, NodeData};

use crate::bitset::BitSet;

/// Directed "may have been assigned directly from" edges between pointer
/// locals. Indexed densely by local id; never holds references into the IR,
/// so it stays valid across later tree mutation.
#[derive(Debug, Default)]
pub struct ConnGraph {
    pointees: SecondaryMap<Local, Option<BitSet<Local>>>,
}

impl ConnGraph {
    /// Gives `local` an empty pointee set. Only pointer-kind locals get one.
    fn init_pointer(&mut self, local: Local) {
        self.pointees[local] = Some(BitSet::new());
    }

    /// Records that `pointer` may have been assigned directly from
    /// `pointee`.
    fn add_edge(&mut self, pointer: Local, pointee: Local) {
        let Some(pointees) = self.pointees[pointer].as_mut() else {
            debug_assert!(false, "{pointer} is not a pointer local");
            return;
        };
        pointees.insert(pointee);
    }

    /// Pointee set of `local`, or `None` for non-pointer locals.
    pub fn pointees_of(&self, local: Local) -> Option<&BitSet<Local>> {
        self.pointees[local].as_ref()
    }
}

/// Builds the connectivity graph of `body` in one linear pass over every
/// statement, seeding `escaping` with the address-exposed locals and every
/// local the classifier flags.
pub fn build_conn_graph(
    body: &Body,
    helpers: &dyn HelperOracle,
    escaping: &mut BitSet<Local>,
) -> ConnGraph {
    let mut graph = ConnGraph::default();

    for (local, data) in body.locals.iter() {
        if data.is_pointer() {
            graph.init_pointer(local);
            if data.addr_exposed {
                escaping.insert(local);
            }
        }
    }

    for block in body.blocks.keys() {
        for &stmt in &body.blocks[block].stmts {
            walk::walk_pre(body, body.stmt(stmt).root, &mut |body, node, ancestors| {
                let NodeData::LocalUse(local) = *body.node(node) else {
                    return;
                };
                if !body.local(local).is_pointer() {
                    return;
                }
                visit_local_use(body, helpers, &mut graph, escaping, node, ancestors, local);
            });
        }
    }

    graph
}

/// One pointer-local use: either becomes a graph edge, or (via the
/// classifier) marks the local escaping. Marking is idempotent.
fn visit_local_use(
    body: &Body,
    helpers: &dyn HelperOracle,
    graph: &mut ConnGraph,
    escaping: &mut BitSet<Local>,
    node: Node,
    ancestors: &[Node],
    local: Local,
) {
    let Some(&parent) = ancestors.last() else {
        // A bare use as a whole statement tells us nothing; stay
        // conservative.
        escaping.insert(local);
        return;
    };

    match *body.node(parent) {
        NodeData::Assign { dst, src } => {
            if dst == node {
                // The definition side. If the source holds another local we
                // handle it when that use is visited.
                return;
            }
            debug_assert_eq!(src, node);

            if let NodeData::LocalUse(pointer) = *body.node(dst) {
                if body.local(pointer).is_pointer() {
                    graph.add_edge(pointer, local);
                    return;
                }
            }

            // Stored into a field, an array element, a global, or through a
            // pointer: the reference is now reachable from outside.
            escaping.insert(local);
        }

        NodeData::Add { .. } => {
            // A derived pointer stored into another pointer local keeps the
            // connection: `p = q + off` is an edge p -> q.
            if let Some(&grandparent) = ancestors.len().checked_sub(2).map(|i| &ancestors[i]) {
                if let NodeData::Assign { dst, src } = *body.node(grandparent) {
                    if src == parent {
                        if let NodeData::LocalUse(pointer) = *body.node(dst) {
                            if body.local(pointer).is_pointer() {
                                graph.add_edge(pointer, local);
                                return;
                            }
                        }
                    }
                }
            }

            if can_escape_via_ancestors(body, helpers, node, ancestors) {
                escaping.insert(local);
            }
        }

        _ => {
            if can_escape_via_ancestors(body, helpers, node, ancestors) {
                escaping.insert(local);
            }
        }
    }
}

/// Decides whether this particular use makes the local's address observable
/// outside the procedure. Ordered rules, first match wins; anything
/// unrecognized escapes.
pub fn can_escape_via_ancestors(
    body: &Body,
    helpers: &dyn HelperOracle,
    use_node: Node,
    ancestors: &[Node],
) -> bool {
    let Some(&parent) = ancestors.last() else {
        return true;
    };
    let grandparent = ancestors.len().checked_sub(2).map(|i| ancestors[i]);

    match body.node(parent) {
        // The value is only compared or read through, never retained.
        NodeData::Eq { .. } | NodeData::Ne { .. } | NodeData::Indir { .. } => false,

        // Struct field addressing through an already-taken address. This
        // deliberately stops at the grandparent; an intervening indirection
        // further up keeps the conservative answer.
        NodeData::Field { .. } => !matches!(
            grandparent.map(|gp| body.node(gp)),
            Some(NodeData::AddrOf { .. })
        ),

        // Offset-then-load. Any other consumer of the sum escapes.
        NodeData::Add { .. } => !matches!(
            grandparent.map(|gp| body.node(gp)),
            Some(NodeData::Indir { .. })
        ),

        NodeData::Call { target, args } => match *target {
            CallTarget::Helper(helper) => !helpers.is_pure(helper),
            // The receiver is dereferenced to dispatch the invoke, not
            // retained by it. Matched per local rather than per use, so a
            // slot passed both as the receiver and as a later argument still
            // stays local.
            CallTarget::DelegateInvoke(_) => {
                let receiver = args.first().map(|&recv| body.node(recv));
                match (body.node(use_node), receiver) {
                    (NodeData::LocalUse(local), Some(NodeData::LocalUse(recv))) => local != recv,
                    _ => true,
                }
            }
            CallTarget::Method(_) => true,
        },

        _ => true,
    }
}

/// Extends `escaping` to the least fixed point closed under the points-to
/// relation: storing a reference inside an already-escaping container makes
/// the referent externally reachable too.
pub fn compute_closure(graph: &ConnGraph, escaping: &mut BitSet<Local>) {
    let mut frontier = escaping.clone();

    while let Some(local) = frontier.first() {
        if let Some(pointees) = graph.pointees_of(local) {
            let newly = BitSet::difference(pointees, escaping);
            escaping.union_with(&newly);
            frontier.union_with(&newly);
        }
        frontier.remove(local);
    }
}
