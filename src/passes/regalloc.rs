//! Linear-scan register allocation over live intervals.
//!
//! Intervals are visited in ascending start order. Expired actives give
//! their register back; when every register is taken the active interval
//! ending last is the spill candidate: if it outlives the current one it
//! hands its register over and goes to a fresh stack slot, otherwise the
//! current interval takes the slot. Assignments land in the intervals
//! themselves (`Location::Reg`/`Location::Slot` plus the spill/fill
//! flag).

use crate::ir::graph::Graph;
use crate::ir::inst::InstId;

use super::liveness::{Liveness, Location};
use super::{run_dependency, Pass, PassError, PassKind};

/// Default number of physical registers.
pub const REG_NUM: usize = 2;

pub struct RegAlloc {
    reg_num: usize,
    regs_used: Vec<bool>,
    /// Active intervals ordered by (end, id).
    active: Vec<InstId>,
    next_slot: u32,
}

impl Default for RegAlloc {
    fn default() -> Self {
        Self::with_regs(REG_NUM)
    }
}

impl RegAlloc {
    pub fn with_regs(reg_num: usize) -> Self {
        assert!(reg_num > 0, "allocator needs at least one register");
        Self { reg_num, regs_used: vec![false; reg_num], active: Vec::new(), next_slot: 0 }
    }
}

impl Pass for RegAlloc {
    const NAME: &'static str = "RegisterAllocation";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        run_dependency::<Liveness>(graph)?;

        // Empty intervals (jumps) never reach the allocator. Sorting by
        // (start, id) keeps the scan deterministic.
        let mut queue: Vec<InstId> = graph
            .live_intervals()
            .iter()
            .filter(|(_, interval)| !interval.is_empty())
            .map(|(&inst, _)| inst)
            .collect();
        queue.sort_by_key(|&inst| (graph.live_intervals()[&inst].start(), inst));

        for inst in queue {
            self.expire_old_intervals(graph, inst);
            if self.active.len() == self.reg_num {
                self.spill_at_interval(graph, inst);
            } else {
                let reg = self.take_reg();
                graph.live_intervals_mut().get_mut(&inst).unwrap().set_location(Location::Reg(reg));
                self.insert_active(graph, inst);
            }
        }
        Ok(())
    }
}

impl RegAlloc {
    fn take_reg(&mut self) -> u32 {
        for (i, used) in self.regs_used.iter_mut().enumerate() {
            if !*used {
                *used = true;
                return i as u32;
            }
        }
        unreachable!("no free register despite a free active slot");
    }

    fn release_reg(&mut self, reg: u32) {
        assert!((reg as usize) < self.reg_num, "bad register number");
        self.regs_used[reg as usize] = false;
    }

    fn insert_active(&mut self, graph: &Graph, inst: InstId) {
        let key = (graph.live_intervals()[&inst].end(), inst);
        let pos = self
            .active
            .partition_point(|&a| (graph.live_intervals()[&a].end(), a) <= key);
        self.active.insert(pos, inst);
    }

    /// Release every active interval that ends at or before the start of
    /// `current`.
    fn expire_old_intervals(&mut self, graph: &Graph, current: InstId) {
        let start = graph.live_intervals()[&current].start();
        while let Some(&first) = self.active.first() {
            let interval = graph.live_intervals()[&first];
            if interval.end() > start {
                break;
            }
            match interval.location() {
                Location::Reg(reg) => self.release_reg(reg),
                _ => unreachable!("active interval without a register"),
            }
            self.active.remove(0);
        }
    }

    fn spill_at_interval(&mut self, graph: &mut Graph, current: InstId) {
        let candidate = *self.active.last().expect("spill with no active intervals");
        let cand_end = graph.live_intervals()[&candidate].end();
        let cur_end = graph.live_intervals()[&current].end();
        if cand_end > cur_end {
            let reg = match graph.live_intervals()[&candidate].location() {
                Location::Reg(reg) => reg,
                _ => unreachable!("active interval without a register"),
            };
            {
                let intervals = graph.live_intervals_mut();
                intervals.get_mut(&current).unwrap().set_location(Location::Reg(reg));
                let spilled = intervals.get_mut(&candidate).unwrap();
                spilled.set_location(Location::Slot(self.next_slot));
                spilled.set_needs_spill_fill();
            }
            self.next_slot += 1;
            self.active.pop();
            self.insert_active(graph, current);
        } else {
            let interval = graph.live_intervals_mut().get_mut(&current).unwrap();
            interval.set_location(Location::Slot(self.next_slot));
            interval.set_needs_spill_fill();
            self.next_slot += 1;
        }
    }
}
