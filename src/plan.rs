//! Plan module: compile a definition graph into an evaluation plan.

use std::collections::BTreeSet;

use crate::gate::GateId;
use crate::graph::DirectedGraph;
use crate::invariant_ppt::{assert_invariant, PLAN_CUT_GATES};

/// Evaluation order of one definition plus the gates it needs to remember.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalPlan {
    /// Every gate exactly once, Source first when it has no feedback.
    pub order: Vec<GateId>,
    /// Tails of cut edges: their outputs are read from the previous tick.
    pub cut_gates: BTreeSet<GateId>,
    /// Gates that can reach the sink, the sink included.
    pub rooted: BTreeSet<GateId>,
}

impl EvalPlan {
    /// Order the graph from `source` and collect cut and rooted gates.
    pub fn compile(graph: &DirectedGraph<GateId>, source: GateId, sink: GateId) -> Self {
        let order = graph.get_order(&source);
        let cut_gates: BTreeSet<GateId> = order.cut_edges.iter().map(|(from, _)| *from).collect();
        let mut rooted = graph.all_predecessors(&sink);
        rooted.insert(sink);

        assert_invariant(
            PLAN_CUT_GATES,
            cut_gates.iter().all(|uid| graph.contains_vertex(uid)),
            "Cut gates are vertices of the definition graph",
            Some("EvalPlan::compile"),
        );
        tracing::trace!(
            gates = order.order.len(),
            cut = cut_gates.len(),
            rooted = rooted.len(),
            "compiled evaluation plan"
        );

        Self {
            order: order.order,
            cut_gates,
            rooted,
        }
    }

    pub fn is_cut(&self, uid: &GateId) -> bool {
        self.cut_gates.contains(uid)
    }

    pub fn is_rooted(&self, uid: &GateId) -> bool {
        self.rooted.contains(uid)
    }
}
