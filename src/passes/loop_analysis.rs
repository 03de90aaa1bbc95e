//! Natural and irreducible loop detection, and the loop tree.
//!
//! Phase 1 walks the CFG depth-first with two markers. A block is grey
//! while its subtree is being explored and black once entered at all;
//! meeting a grey successor means a back edge. The edge target is the
//! loop header and the source its latch; the loop is natural when the
//! header dominates the latch, irreducible otherwise.
//!
//! Phase 2 visits headers in reverse RPO. An irreducible loop's body is
//! just header plus latches. A natural loop's body is collected by
//! walking predecessors upward from every latch until the (marked)
//! header stops the walk; a block that already belongs to an inner loop
//! links that loop underneath this one instead of being re-entered.
//!
//! Finally a synthetic root loop adopts every loop-free block and every
//! outermost loop.

use crate::ir::block::LoopId;
use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::BlockId;
use crate::ir::marker::Marker;

use super::domtree::DomTree;
use super::rpo::Rpo;
use super::{run_dependency, Pass, PassError, PassKind};

/// Initial capacity of a loop body.
pub const LOOP_BLOCKS_NUM: usize = 10;
/// Initial capacity of a latch vector.
pub const LOOP_LATCHES_NUM: usize = 3;
/// Initial capacity of an inner-loop vector.
pub const LOOP_INNERS_NUM: usize = 3;

#[derive(Debug)]
pub struct Loop {
    header: Option<BlockId>,
    body: Vec<BlockId>,
    latches: Vec<BlockId>,
    outer: Option<LoopId>,
    inners: Vec<LoopId>,
    irreducible: bool,
}

impl Loop {
    pub(crate) fn new(header: Option<BlockId>, irreducible: bool) -> Self {
        Self {
            header,
            body: Vec::with_capacity(LOOP_BLOCKS_NUM),
            latches: Vec::with_capacity(LOOP_LATCHES_NUM),
            outer: None,
            inners: Vec::with_capacity(LOOP_INNERS_NUM),
            irreducible,
        }
    }

    /// `None` only for the synthetic root loop.
    pub fn header(&self) -> Option<BlockId> {
        self.header
    }

    pub fn body(&self) -> &[BlockId] {
        &self.body
    }

    pub fn latches(&self) -> &[BlockId] {
        &self.latches
    }

    pub fn outer(&self) -> Option<LoopId> {
        self.outer
    }

    pub fn inners(&self) -> &[LoopId] {
        &self.inners
    }

    pub fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    pub fn is_root(&self) -> bool {
        self.header.is_none()
    }

    pub fn contains(&self, bb: BlockId) -> bool {
        self.body.contains(&bb)
    }

    pub(crate) fn add_block(&mut self, bb: BlockId) {
        self.body.push(bb);
    }

    pub(crate) fn add_latch(&mut self, latch: BlockId) {
        self.latches.push(latch);
    }

    pub(crate) fn add_inner(&mut self, inner: LoopId) {
        self.inners.push(inner);
    }

    pub(crate) fn set_outer(&mut self, outer: LoopId) {
        self.outer = Some(outer);
    }
}

#[derive(Default)]
pub struct LoopAnalysis;

impl Pass for LoopAnalysis {
    const NAME: &'static str = "LoopAnalysis";
    const KIND: PassKind = PassKind::Analysis;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        if graph.analysis_valid(AnalysisSet::LOOPS) {
            return Ok(());
        }
        run_dependency::<Rpo>(graph)?;
        run_dependency::<DomTree>(graph)?;

        // Drop any stale loop state before rebuilding.
        graph.invalidate(AnalysisSet::LOOPS);

        let grey = graph.new_marker();
        let black = graph.new_marker();
        find_loops(graph, grey, black);
        graph.release_marker(grey);
        graph.release_marker(black);

        populate_loops(graph);
        build_loop_tree(graph);

        graph.mark_analysis_valid(AnalysisSet::LOOPS);
        Ok(())
    }
}

/// Phase 1: detect back edges and record one loop per header.
fn find_loops(graph: &mut Graph, grey: Marker, black: Marker) {
    let entry = graph.entry().expect("loop analysis on an empty graph");
    let mut stack: Vec<(BlockId, u8)> = vec![(entry, 0)];
    graph.block_mut(entry).set_marker(grey);
    graph.block_mut(entry).set_marker(black);

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
            let succ = match succ {
                Some(s) => s,
                None => continue,
            };
            if graph.block(succ).is_marked(grey) {
                record_back_edge(graph, succ, bb);
            } else if !graph.block(succ).is_marked(black) {
                descend = Some(succ);
                break;
            }
            // A black, non-grey successor is a cross edge.
        }
        stack[top].1 = slot;
        match descend {
            Some(s) => {
                graph.block_mut(s).set_marker(grey);
                graph.block_mut(s).set_marker(black);
                stack.push((s, 0));
            }
            None => {
                graph.block_mut(bb).reset_marker(grey);
                stack.pop();
            }
        }
    }
}

fn record_back_edge(graph: &mut Graph, header: BlockId, latch: BlockId) {
    if let Some(lp) = graph.block(header).loop_id() {
        graph.loop_at_mut(lp).add_latch(latch);
        return;
    }
    let irreducible = !graph.block_dominates(header, latch);
    let mut lp = Loop::new(Some(header), irreducible);
    lp.add_latch(latch);
    let id = graph.new_loop(lp);
    graph.block_mut(header).loop_id = Some(id);
}

/// Phase 2: fill loop bodies, innermost headers first (reverse RPO).
fn populate_loops(graph: &mut Graph) {
    let rpo = graph.rpo_bbs().to_vec();
    for &bb in rpo.iter().rev() {
        let lp = match graph.block(bb).loop_id() {
            Some(lp) => lp,
            None => continue,
        };
        if graph.loop_at(lp).header() != Some(bb) {
            continue;
        }

        if graph.loop_at(lp).is_irreducible() {
            for latch in graph.loop_at(lp).latches().to_vec() {
                if graph.block(latch).loop_id() != Some(lp) {
                    graph.loop_at_mut(lp).add_block(latch);
                    graph.block_mut(latch).loop_id = Some(lp);
                }
            }
            graph.loop_at_mut(lp).add_block(bb);
        } else {
            let marker = graph.new_marker();
            graph.block_mut(bb).set_marker(marker);
            for latch in graph.loop_at(lp).latches().to_vec() {
                fill_loop(graph, lp, latch, marker);
            }
            graph.loop_at_mut(lp).add_block(bb);
            graph.release_marker(marker);
        }
    }
}

/// Walk predecessors upward from `start`, claiming blocks for `lp` and
/// linking already-claimed inner loops beneath it.
fn fill_loop(graph: &mut Graph, lp: LoopId, start: BlockId, marker: Marker) {
    let mut stack = vec![start];
    while let Some(bb) = stack.pop() {
        if graph.block(bb).is_marked(marker) {
            continue;
        }
        graph.block_mut(bb).set_marker(marker);

        match graph.block(bb).loop_id() {
            Some(inner) => {
                if graph.loop_at(inner).outer().is_none() && inner != lp {
                    graph.loop_at_mut(inner).set_outer(lp);
                    graph.loop_at_mut(lp).add_inner(inner);
                }
                if graph.loop_at(inner).header() == Some(bb) {
                    graph.loop_at_mut(lp).add_block(bb);
                }
            }
            None => {
                graph.block_mut(bb).loop_id = Some(lp);
                graph.loop_at_mut(lp).add_block(bb);
            }
        }

        // Reversed so predecessors pop in their stored order.
        for &pred in graph.block(bb).preds().iter().rev() {
            stack.push(pred);
        }
    }
}

fn build_loop_tree(graph: &mut Graph) {
    let root = graph.new_loop(Loop::new(None, false));
    for bb in graph.block_ids() {
        match graph.block(bb).loop_id() {
            None => {
                graph.block_mut(bb).loop_id = Some(root);
                graph.loop_at_mut(root).add_block(bb);
            }
            Some(lp) if lp != root && graph.loop_at(lp).outer().is_none() => {
                graph.loop_at_mut(root).add_inner(lp);
                for body_bb in graph.loop_at(lp).body().to_vec() {
                    if let Some(inner) = graph.block(body_bb).loop_id() {
                        if graph.loop_at(inner).outer().is_none() {
                            graph.loop_at_mut(inner).set_outer(root);
                        }
                    }
                }
            }
            Some(_) => {}
        }
    }
    graph.set_root_loop(root);
}
