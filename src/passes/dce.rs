//! Dead-code elimination.
//!
//! A single forward sweep removes every instruction with an empty user
//! list and no observable side effect. Jumps, calls, moves, compares
//! and both return forms stay regardless of use counts.

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::InstId;
use crate::ir::opcode::Opcode;

use super::{Pass, PassError, PassKind};

#[derive(Default)]
pub struct Dce;

impl Pass for Dce {
    const NAME: &'static str = "Dce";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        let mut removed = false;
        for bb in graph.block_ids() {
            for inst in graph.inst_ids(bb) {
                if graph.inst(inst).users_num() == 0 && is_removable(graph, inst) {
                    graph.remove_inst(inst);
                    removed = true;
                }
            }
        }
        if removed {
            graph.invalidate(AnalysisSet::LIVENESS);
        }
        Ok(())
    }
}

fn is_removable(graph: &Graph, inst: InstId) -> bool {
    let inst = graph.inst(inst);
    !inst.is_jump()
        && !matches!(
            inst.opcode(),
            Opcode::Call | Opcode::Mov | Opcode::Cmp | Opcode::Return | Opcode::RetVoid
        )
}
