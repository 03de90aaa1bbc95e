//! Dominator tree.
//!
//! For every block `B`, the dominator list is the set of blocks that
//! every entry-to-`B` path passes through, and the idom is the closest
//! of them. Computed by candidate blocking: wall off one block `D` with
//! a marker, rerun reachability from the entry, and everything that
//! became unreachable is dominated by `D` (including `D` itself).
//!
//! Candidates are walked in RPO, which is top-down along any dominator
//! chain, so each block's dominator list ends with the block itself and
//! the idom sits just before it.

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::BlockId;

use super::rpo::{postorder, Rpo};
use super::{run_dependency, Pass, PassError, PassKind};

#[derive(Default)]
pub struct DomTree;

impl Pass for DomTree {
    const NAME: &'static str = "DomTree";
    const KIND: PassKind = PassKind::Analysis;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        if graph.analysis_valid(AnalysisSet::DOM_TREE) {
            return Ok(());
        }
        run_dependency::<Rpo>(graph)?;

        // Stale lists from a previous run would accumulate duplicates.
        for bb in graph.block_ids() {
            graph.block_mut(bb).dominators.clear();
            graph.block_mut(bb).idom = None;
        }

        let all = graph.rpo_bbs().to_vec();
        for &candidate in &all {
            let marker = graph.new_marker();
            graph.block_mut(candidate).set_marker(marker);
            let reached = postorder(graph, marker);
            graph.release_marker(marker);

            for &bb in &all {
                if !reached.contains(&bb) {
                    graph.block_mut(bb).add_dominator(candidate);
                }
            }
        }

        for &bb in &all {
            graph.block_mut(bb).count_idom();
            debug_assert_eq!(
                graph.block(bb).dominators().last(),
                Some(&bb),
                "dominator list must end with the block itself"
            );
        }

        graph.mark_analysis_valid(AnalysisSet::DOM_TREE);
        Ok(())
    }
}

/// Every block dominated by `candidate`, for debugging.
pub fn dominated_by(graph: &Graph, candidate: BlockId) -> Vec<BlockId> {
    graph
        .block_ids()
        .into_iter()
        .filter(|&bb| graph.block(bb).dominators().contains(&candidate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;

    fn loop_graph() -> (Graph, [BlockId; 6]) {
        let mut g = Graph::new("domtree_test");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        let b3 = g.create_block("bb3");
        let b4 = g.create_block("bb4");
        let b5 = g.create_block("bb5");
        let b6 = g.create_block("bb6");
        g.insert_bb(b1);
        g.insert_bb(b2);
        g.insert_bb_after(b2, b3, true);
        g.insert_bb_after(b2, b4, false);
        g.insert_bb_after(b4, b5, true);
        g.insert_bb_after(b5, b6, false);
        g.add_edge(b5, b2);
        g.add_edge(b3, b6);
        (g, [b1, b2, b3, b4, b5, b6])
    }

    #[test]
    fn dominator_lists_of_the_loop_graph() {
        let (mut g, [b1, b2, b3, b4, b5, b6]) = loop_graph();
        assert!(g.run_pass::<DomTree>());

        assert_eq!(g.block(b1).dominators(), &[b1]);
        assert_eq!(g.block(b2).dominators(), &[b1, b2]);
        assert_eq!(g.block(b3).dominators(), &[b1, b2, b3]);
        assert_eq!(g.block(b4).dominators(), &[b1, b2, b4]);
        assert_eq!(g.block(b5).dominators(), &[b1, b2, b4, b5]);
        assert_eq!(g.block(b6).dominators(), &[b1, b2, b6]);
    }

    #[test]
    fn idoms_of_the_loop_graph() {
        let (mut g, [b1, b2, b3, b4, b5, b6]) = loop_graph();
        assert!(g.run_pass::<DomTree>());

        assert_eq!(g.block(b1).idom(), Some(b1));
        assert_eq!(g.block(b2).idom(), Some(b1));
        assert_eq!(g.block(b3).idom(), Some(b2));
        assert_eq!(g.block(b4).idom(), Some(b2));
        assert_eq!(g.block(b5).idom(), Some(b4));
        assert_eq!(g.block(b6).idom(), Some(b2));
    }

    #[test]
    fn every_block_dominates_itself_and_is_dominated_by_entry() {
        let (mut g, blocks) = loop_graph();
        assert!(g.run_pass::<DomTree>());
        for bb in blocks {
            assert!(g.block_dominates(bb, bb));
            assert!(g.block_dominates(blocks[0], bb));
        }
    }

    #[test]
    fn rpo_cache_is_intact_after_the_blocked_walks() {
        let (mut g, [b1, b2, b3, b4, b5, b6]) = loop_graph();
        assert!(g.run_pass::<DomTree>());
        assert_eq!(g.rpo_bbs(), &[b1, b2, b4, b5, b3, b6]);
    }

    #[test]
    fn invalidation_clears_dominators() {
        let (mut g, [b1, b2, ..]) = loop_graph();
        assert!(g.run_pass::<DomTree>());
        g.invalidate(crate::ir::graph::AnalysisSet::DOM_TREE);
        assert!(g.block(b2).dominators().is_empty());
        assert_eq!(g.block(b2).idom(), None);
        assert!(g.run_pass::<DomTree>());
        assert_eq!(g.block(b2).dominators(), &[b1, b2]);
    }
}
