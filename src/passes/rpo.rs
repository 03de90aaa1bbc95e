//! Reverse post-order traversal.
//!
//! An iterative DFS from the entry block, visiting true successors
//! before false ones. Finished nodes accumulate in postorder; reversing
//! gives the RPO, which is cached on the graph. The `postorder` helper
//! also serves the dominator tree: pre-marking a block with the visited
//! marker makes the walk treat it as a wall.

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::BlockId;
use crate::ir::marker::Marker;

use super::{Pass, PassError, PassKind};

#[derive(Default)]
pub struct Rpo;

impl Pass for Rpo {
    const NAME: &'static str = "Rpo";
    const KIND: PassKind = PassKind::Analysis;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        if graph.analysis_valid(AnalysisSet::RPO) {
            return Ok(());
        }
        if graph.is_empty() {
            return Err(PassError::EmptyGraph);
        }
        let visited = graph.new_marker();
        let mut order = postorder(graph, visited);
        graph.release_marker(visited);
        order.reverse();
        graph.set_rpo(order);
        graph.mark_analysis_valid(AnalysisSet::RPO);
        Ok(())
    }
}

/// DFS postorder from the entry block. Blocks already carrying `visited`
/// are not entered (nor is the entry itself if pre-marked).
pub(crate) fn postorder(graph: &mut Graph, visited: Marker) -> Vec<BlockId> {
    let mut out = Vec::with_capacity(graph.len());
    let entry = match graph.entry() {
        Some(e) => e,
        None => return out,
    };
    if graph.block(entry).is_marked(visited) {
        return out;
    }

    // (block, next successor slot to try): 0 = true, 1 = false.
    let mut stack: Vec<(BlockId, u8)> = vec![(entry, 0)];
    graph.block_mut(entry).set_marker(visited);

    while let Some(top) = stack.len().checked_sub(1) {
        let (bb, mut slot) = stack[top];
        let mut descend = None;
        while slot < 2 {
            let succ = if slot == 0 {
                graph.block(bb).true_succ()
            } else {
                graph.block(bb).false_succ()
            };
            slot += 1;
            if let Some(s) = succ {
                if !graph.block(s).is_marked(visited) {
                    descend = Some(s);
                    break;
                }
            }
        }
        stack[top].1 = slot;
        match descend {
            Some(s) => {
                graph.block_mut(s).set_marker(visited);
                stack.push((s, 0));
            }
            None => {
                out.push(bb);
                stack.pop();
            }
        }
    }
    out
}
