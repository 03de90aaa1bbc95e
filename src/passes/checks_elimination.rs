//! Redundant check elimination.
//!
//! A `ZeroCheck x` is dropped when another `ZeroCheck x` dominates it;
//! a `BoundsCheck x, i` is dropped when another `BoundsCheck` of the
//! same value and index dominates it. Dominance queries need the
//! dominator tree, so that analysis runs first. If the doomed check has
//! users of its own they are rewired to the dominating check before
//! removal.

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::InstId;
use crate::ir::opcode::Opcode;

use super::domtree::DomTree;
use super::visitor::InstVisitor;
use super::{run_dependency, Pass, PassError, PassKind};

#[derive(Default)]
pub struct ChecksElimination;

impl Pass for ChecksElimination {
    const NAME: &'static str = "ChecksElimination";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        run_dependency::<DomTree>(graph)?;

        let mut visitor: InstVisitor<ChecksElimination> = InstVisitor::new();
        visitor.set(Opcode::ZeroCheck, eliminate_zero_check);
        visitor.set(Opcode::BoundsCheck, eliminate_bounds_check);
        visitor.visit_graph(self, graph);

        graph.invalidate(AnalysisSet::LIVENESS);
        Ok(())
    }
}

fn eliminate_zero_check(_state: &mut ChecksElimination, graph: &mut Graph, inst: InstId) {
    let input = graph.inst(inst).input(0);
    for user in graph.inst(input).users().to_vec() {
        if user != inst
            && graph.inst(user).opcode() == Opcode::ZeroCheck
            && graph.inst_dominates(user, inst)
        {
            drop_check(graph, inst, user);
            return;
        }
    }
}

fn eliminate_bounds_check(_state: &mut ChecksElimination, graph: &mut Graph, inst: InstId) {
    let input = graph.inst(inst).input(0);
    let index = graph.inst(inst).input(1);
    for user in graph.inst(input).users().to_vec() {
        if user != inst
            && graph.inst(user).opcode() == Opcode::BoundsCheck
            && graph.inst(user).input(1) == index
            && graph.inst_dominates(user, inst)
        {
            drop_check(graph, inst, user);
            return;
        }
    }
}

fn drop_check(graph: &mut Graph, doomed: InstId, survivor: InstId) {
    if graph.inst(doomed).users_num() > 0 {
        graph.replace_users(doomed, survivor);
    }
    graph.remove_inst(doomed);
}
