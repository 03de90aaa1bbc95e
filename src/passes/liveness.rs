//! Liveness analysis: linear/live numbering and live intervals.
//!
//! Numbering walks the linear order. Linear numbers advance by one per
//! instruction (phis included). Live numbers advance by two: a block
//! opens at a fresh even number shared by all of its phis, every
//! main-list instruction takes the next even number, and the block's
//! live range closes one step past its last instruction. Odd numbers
//! stay free for spill/fill positions.
//!
//! Intervals are built walking the linear order backwards. A block
//! seeds its live set from its successors' sets plus the phi inputs
//! routed through it, extends everything live across the whole block,
//! then scans instructions bottom-up: a definition clips its interval
//! start to its own live number, operands extend from the block start to
//! the use. Natural-loop headers keep their live-through values alive to
//! the end of the loop. Jumps end up with the empty interval so the
//! allocator skips them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::{BlockId, InstId};

use super::linear_order::LinearOrder;
use super::{run_dependency, Pass, PassError, PassKind};

const LINEAR_NUMBER_STEP: u32 = 1;
const LIVE_NUMBER_STEP: u32 = 2;

/// Where a value lives after register allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Unassigned,
    Reg(u32),
    Slot(u32),
}

/// The closed range of live numbers during which a value is live, plus
/// the allocator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    start: u32,
    end: u32,
    location: Location,
    needs_spill_fill: bool,
}

impl LiveInterval {
    pub(crate) fn new(start: u32, end: u32) -> Self {
        Self { start, end, location: Location::Unassigned, needs_spill_fill: false }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Jumps carry the empty interval and are skipped by allocation.
    pub fn is_empty(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn needs_spill_fill(&self) -> bool {
        self.needs_spill_fill
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub(crate) fn set_needs_spill_fill(&mut self) {
        self.needs_spill_fill = true;
    }
}

#[derive(Default)]
pub struct Liveness {
    linear: Vec<BlockId>,
    intervals: FxHashMap<InstId, LiveInterval>,
    live_sets: FxHashMap<BlockId, FxHashSet<InstId>>,
}

impl Pass for Liveness {
    const NAME: &'static str = "LivenessAnalysis";
    const KIND: PassKind = PassKind::Analysis;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        if graph.analysis_valid(AnalysisSet::LIVENESS) {
            return Ok(());
        }
        run_dependency::<LinearOrder>(graph)?;
        self.linear = graph.linear_order_bbs().to_vec();

        self.number_insts(graph);
        self.build_intervals(graph);
        self.clear_jump_intervals(graph);

        graph.set_live_intervals(std::mem::take(&mut self.intervals));
        graph.mark_analysis_valid(AnalysisSet::LIVENESS);
        Ok(())
    }
}

impl Liveness {
    fn number_insts(&mut self, graph: &mut Graph) {
        let mut linear_num = 0;
        let mut live_num = 0;

        for &bb in &self.linear {
            let block_start = live_num;
            for phi in graph.phi_ids(bb) {
                graph.inst_mut(phi).linear_num = linear_num;
                graph.inst_mut(phi).live_num = block_start;
                linear_num += LINEAR_NUMBER_STEP;
            }
            for inst in graph.inst_ids(bb) {
                live_num += LIVE_NUMBER_STEP;
                graph.inst_mut(inst).linear_num = linear_num;
                graph.inst_mut(inst).live_num = live_num;
                linear_num += LINEAR_NUMBER_STEP;
            }
            live_num += LIVE_NUMBER_STEP;
            graph.block_mut(bb).live_start = block_start;
            graph.block_mut(bb).live_end = live_num;
        }
    }

    /// Widen (or create) an interval to cover `[start, end]`.
    fn extend_interval(&mut self, inst: InstId, start: u32, end: u32) {
        self.intervals
            .entry(inst)
            .and_modify(|interval| {
                interval.start = interval.start.min(start);
                interval.end = interval.end.max(end);
            })
            .or_insert_with(|| LiveInterval::new(start, end));
    }

    fn build_intervals(&mut self, graph: &mut Graph) {
        let order: Vec<BlockId> = self.linear.iter().rev().copied().collect();
        for bb in order {
            let mut live = self.initial_live_set(graph, bb);
            let (block_start, block_end) = graph.block(bb).live_range();

            let live_in: Vec<InstId> = live.iter().copied().collect();
            for inst in live_in {
                self.extend_interval(inst, block_start, block_end);
            }

            self.process_block_insts(graph, bb, &mut live);

            for phi in graph.phi_ids(bb) {
                live.remove(&phi);
            }

            if graph.is_loop_header(bb) {
                let lp = graph.block(bb).loop_id().unwrap();
                if !graph.loop_at(lp).is_irreducible() {
                    self.process_loop(graph, bb, &live);
                }
            }

            self.live_sets.insert(bb, live);
        }
    }

    /// Union of the successors' live-in sets plus, for each successor
    /// phi, the input routed through this block. A successor not yet
    /// processed (a back edge) contributes nothing; the loop-header
    /// extension covers those values.
    fn initial_live_set(&mut self, graph: &Graph, bb: BlockId) -> FxHashSet<InstId> {
        let mut live = FxHashSet::default();
        let succs: Vec<BlockId> = graph.block(bb).succs().collect();
        for succ in succs {
            if let Some(set) = self.live_sets.get(&succ) {
                live.extend(set.iter().copied());
            }
            for phi in graph.phi_ids(succ) {
                for &(value, pred) in graph.inst(phi).phi_inputs() {
                    if pred == bb {
                        live.insert(value);
                    }
                }
            }
        }
        live
    }

    /// Bottom-up scan of the main list: clip definition starts, extend
    /// operand intervals to their use.
    fn process_block_insts(&mut self, graph: &Graph, bb: BlockId, live: &mut FxHashSet<InstId>) {
        let (block_start, _) = graph.block(bb).live_range();
        let mut cur = graph.block(bb).last_inst();
        while let Some(inst) = cur {
            let live_num = graph.inst(inst).live_num();
            match self.intervals.get_mut(&inst) {
                Some(interval) => interval.start = live_num,
                None => {
                    self.intervals
                        .insert(inst, LiveInterval::new(live_num, live_num + LIVE_NUMBER_STEP));
                }
            }
            for input in graph.inst(inst).inputs() {
                live.insert(input);
                self.extend_interval(input, block_start, live_num);
            }
            live.remove(&inst);
            cur = graph.inst(inst).prev();
        }
    }

    /// Everything live through a natural-loop header stays live to the
    /// end of the loop's last block in the schedule.
    fn process_loop(&mut self, graph: &Graph, header: BlockId, live: &FxHashSet<InstId>) {
        let lp = graph.block(header).loop_id().unwrap();
        let (start, _) = graph.block(header).live_range();
        let end = graph
            .loop_at(lp)
            .body()
            .iter()
            .map(|&bb| graph.block(bb).live_range().1)
            .max()
            .expect("loop body cannot be empty");
        for &inst in live {
            self.extend_interval(inst, start, end);
        }
    }

    fn clear_jump_intervals(&mut self, graph: &Graph) {
        for &bb in &self.linear {
            for inst in graph.inst_ids(bb) {
                if graph.inst(inst).is_jump() {
                    self.intervals.insert(inst, LiveInterval::new(0, 0));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;
    use crate::ir::opcode::{DataType, Opcode};

    fn interval(g: &Graph, inst: InstId) -> (u32, u32) {
        let iv = g.live_intervals().get(&inst).expect("missing interval");
        (iv.start(), iv.end())
    }

    /// Diamond with a phi join:
    ///
    /// ```text
    ///            [1]
    ///             |
    ///             v
    ///        /---[2]---\
    ///        |         |
    ///        v         v
    ///       [3]------>[4]
    /// ```
    #[test]
    fn intervals_of_a_diamond_with_phi() {
        let mut g = Graph::new("liveness_diamond");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        let b3 = g.create_block("bb3");
        let b4 = g.create_block("bb4");
        g.insert_bb(b1);
        g.insert_bb(b2);
        g.insert_bb(b3);
        g.insert_bb(b4);
        g.add_edge(b2, b4);

        let v0 = g.create_param(DataType::I32, "a0");
        let v1 = g.create_const(0u64);
        g.push_back_inst(b1, v0);
        g.push_back_inst(b1, v1);

        let v2 = g.create_mov(0, v0);
        let v3 = g.create_mov(1, v1);
        let v4 = g.create_binary(Opcode::Cmp, v2, v3);
        let v5 = g.create_jump(Opcode::Ja, b4);
        g.push_back_inst(b2, v2);
        g.push_back_inst(b2, v3);
        g.push_back_inst(b2, v4);
        g.push_back_inst(b2, v5);

        let v6 = g.create_binary(Opcode::Add, v4, v2);
        let v7 = g.create_jump(Opcode::Jmp, b4);
        g.push_back_inst(b3, v6);
        g.push_back_inst(b3, v7);

        let v8 = g.create_phi();
        g.push_back_phi(b4, v8);
        g.add_phi_input(v8, v3, b2);
        g.add_phi_input(v8, v6, b3);
        let v9 = g.create_unary(Opcode::Return, v8);
        g.push_back_inst(b4, v9);

        assert!(g.run_pass::<Liveness>());

        // Block live ranges.
        assert_eq!(g.block(b1).live_range(), (0, 6));
        assert_eq!(g.block(b2).live_range(), (6, 16));
        assert_eq!(g.block(b3).live_range(), (16, 22));
        assert_eq!(g.block(b4).live_range(), (22, 26));

        // Live numbers: phis share the block start.
        assert_eq!(g.inst(v0).live_num(), 2);
        assert_eq!(g.inst(v4).live_num(), 12);
        assert_eq!(g.inst(v8).live_num(), 22);
        assert_eq!(g.inst(v9).live_num(), 24);

        // Linear numbers advance by one, phis included.
        assert_eq!(g.inst(v0).linear_num(), 0);
        assert_eq!(g.inst(v5).linear_num(), 5);
        assert_eq!(g.inst(v8).linear_num(), 8);
        assert_eq!(g.inst(v9).linear_num(), 9);

        assert_eq!(interval(&g, v0), (2, 8));
        assert_eq!(interval(&g, v1), (4, 10));
        assert_eq!(interval(&g, v2), (8, 18));
        assert_eq!(interval(&g, v3), (10, 16));
        assert_eq!(interval(&g, v4), (12, 18));
        assert_eq!(interval(&g, v6), (18, 22));
        assert_eq!(interval(&g, v8), (22, 24));
        assert_eq!(interval(&g, v9), (24, 26));

        // Jumps collapse to the empty interval.
        assert_eq!(interval(&g, v5), (0, 0));
        assert_eq!(interval(&g, v7), (0, 0));
        assert!(g.live_intervals()[&v5].is_empty());
    }

    /// Every use must sit inside its operand's interval.
    #[test]
    fn uses_are_covered_by_operand_intervals() {
        let mut g = Graph::new("liveness_loop");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        let b3 = g.create_block("bb3");
        let b4 = g.create_block("bb4");
        g.insert_bb(b1);
        g.insert_bb(b2);
        g.insert_bb(b3);
        g.add_edge(b3, b2);
        g.insert_bb_after(b2, b4, false);

        let a = g.create_param(DataType::I64, "a");
        let one = g.create_const(1i64);
        g.push_back_inst(b1, a);
        g.push_back_inst(b1, one);

        let phi = g.create_phi();
        g.push_back_phi(b2, phi);
        g.add_phi_input(phi, a, b1);
        let cmp = g.create_binary(Opcode::Cmp, phi, one);
        let ja = g.create_jump(Opcode::Ja, b4);
        g.push_back_inst(b2, cmp);
        g.push_back_inst(b2, ja);

        let next = g.create_binary(Opcode::Add, phi, one);
        let jmp = g.create_jump(Opcode::Jmp, b2);
        g.push_back_inst(b3, next);
        g.push_back_inst(b3, jmp);
        g.add_phi_input(phi, next, b3);

        let ret = g.create_unary(Opcode::Return, phi);
        g.push_back_inst(b4, ret);

        assert!(g.run_pass::<Liveness>());

        for bb in g.block_ids() {
            for inst in g.inst_ids(bb) {
                if g.inst(inst).is_jump() {
                    continue;
                }
                let use_num = g.inst(inst).live_num();
                for input in g.inst(inst).inputs() {
                    let iv = g.live_intervals()[&input];
                    assert!(
                        iv.start() <= use_num && use_num <= iv.end(),
                        "{} used at {} outside [{}, {}]",
                        input,
                        use_num,
                        iv.start(),
                        iv.end()
                    );
                }
            }
        }

        // The loop keeps `one` and the phi alive across its whole body.
        let lp = g.block(b2).loop_id().unwrap();
        let loop_end = g
            .loop_at(lp)
            .body()
            .iter()
            .map(|&bb| g.block(bb).live_range().1)
            .max()
            .unwrap();
        assert!(g.live_intervals()[&one].end() >= loop_end);
        assert!(g.live_intervals()[&phi].end() >= loop_end);
    }
}
