//! Linear block ordering.
//!
//! Produces a contiguous, loop-respecting schedule: walking the RPO,
//! an unvisited natural-loop header emits its whole loop body (reversed
//! body order, recursing into inner loops as their headers come up);
//! any other block is emitted directly. When an emitted block is the
//! true successor of the previously emitted one, the predecessor's
//! successors are swapped and its terminal conditional jump inverted,
//! so the schedule falls through.

use crate::ir::block::LoopId;
use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::BlockId;
use crate::ir::marker::Marker;

use super::loop_analysis::LoopAnalysis;
use super::{run_dependency, Pass, PassError, PassKind};

#[derive(Default)]
pub struct LinearOrder {
    linear: Vec<BlockId>,
}

impl Pass for LinearOrder {
    const NAME: &'static str = "LinearOrder";
    const KIND: PassKind = PassKind::Analysis;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        if graph.analysis_valid(AnalysisSet::LINEAR_ORDER) {
            return Ok(());
        }
        run_dependency::<LoopAnalysis>(graph)?;

        let marker = graph.new_marker();
        self.process_bbs(graph, marker);
        graph.release_marker(marker);

        graph.set_linear_order(std::mem::take(&mut self.linear));
        graph.mark_analysis_valid(AnalysisSet::LINEAR_ORDER);
        Ok(())
    }
}

impl LinearOrder {
    fn process_bbs(&mut self, graph: &mut Graph, marker: Marker) {
        for bb in graph.rpo_bbs().to_vec() {
            if graph.block(bb).is_marked(marker) {
                continue;
            }
            let lp = graph.block(bb).loop_id().expect("loop tree not built");
            if graph.is_loop_header(bb) && !graph.loop_at(lp).is_irreducible() {
                self.process_loop(graph, lp, marker);
            } else {
                self.emit(graph, bb, marker);
            }
        }
    }

    /// Emit the loop body contiguously; the body vector ends with the
    /// header, so the reversed walk leads with it.
    fn process_loop(&mut self, graph: &mut Graph, lp: LoopId, marker: Marker) {
        for bb in graph.loop_at(lp).body().to_vec().into_iter().rev() {
            if graph.block(bb).is_marked(marker) {
                continue;
            }
            let bb_loop = graph.block(bb).loop_id().expect("loop tree not built");
            if graph.is_loop_header(bb) && bb_loop != lp {
                self.process_loop(graph, bb_loop, marker);
            } else {
                self.emit(graph, bb, marker);
            }
        }
    }

    fn emit(&mut self, graph: &mut Graph, bb: BlockId, marker: Marker) {
        graph.block_mut(bb).set_marker(marker);
        self.swap_successors(graph, bb);
        self.linear.push(bb);
    }

    /// Arrange fall-through from the previously emitted block into `bb`.
    fn swap_successors(&mut self, graph: &mut Graph, bb: BlockId) {
        let pred = match self.linear.last() {
            Some(&p) => p,
            None => return,
        };
        if graph.block(pred).true_succ() != Some(bb) {
            return;
        }
        graph.block_mut(pred).swap_succs();
        if let Some(last) = graph.block(pred).last_inst() {
            let op = graph.inst(last).opcode();
            if op.is_jump() {
                graph.set_opcode(last, op.inverse_jump());
            }
        }
    }
}
