//! Opcode-dispatched instruction visiting.
//!
//! A visitor is a table with one handler slot per opcode, defaulting to
//! a no-op. `visit_graph` walks every block's main list in graph order
//! and dispatches each instruction through the table. Handlers may
//! rewrite the graph freely: dispatch runs over a snapshot of the list,
//! and an instruction that was removed (or re-opcoded) since the
//! snapshot is skipped. Phis are not visited; passes that need them
//! iterate phi lists explicitly.

use crate::ir::graph::Graph;
use crate::ir::inst::InstId;
use crate::ir::opcode::{Opcode, OPCODE_COUNT};

pub type VisitFn<V> = fn(&mut V, &mut Graph, InstId);

fn visit_default<V>(_state: &mut V, _graph: &mut Graph, _inst: InstId) {}

pub struct InstVisitor<V> {
    handlers: [VisitFn<V>; OPCODE_COUNT],
}

impl<V> Default for InstVisitor<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InstVisitor<V> {
    pub fn new() -> Self {
        Self { handlers: [visit_default::<V> as VisitFn<V>; OPCODE_COUNT] }
    }

    pub fn set(&mut self, opcode: Opcode, handler: VisitFn<V>) {
        self.handlers[u8::from(opcode) as usize] = handler;
    }

    /// Register one handler for a contiguous opcode range (inclusive).
    pub fn set_range(&mut self, first: Opcode, last: Opcode, handler: VisitFn<V>) {
        for byte in u8::from(first)..=u8::from(last) {
            self.handlers[byte as usize] = handler;
        }
    }

    pub fn visit_graph(&self, state: &mut V, graph: &mut Graph) {
        for bb in graph.block_ids() {
            for inst in graph.inst_ids(bb) {
                // The handler for an earlier instruction may have
                // removed or rewritten this one.
                if graph.inst(inst).block() != Some(bb) {
                    continue;
                }
                let opcode = graph.inst(inst).opcode();
                (self.handlers[u8::from(opcode) as usize])(state, graph, inst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;
    use crate::ir::opcode::DataType;

    #[derive(Default)]
    struct Counter {
        adds: usize,
        consts: usize,
    }

    #[test]
    fn dispatch_hits_only_registered_slots() {
        let mut g = Graph::new("visit");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let a = g.create_param(DataType::I32, "a");
        let c = g.create_const(1i32);
        let add = g.create_binary(Opcode::Add, a, c);
        let sub = g.create_binary(Opcode::Sub, a, c);
        g.push_back_inst(b1, a);
        g.push_back_inst(b1, c);
        g.push_back_inst(b1, add);
        g.push_back_inst(b1, sub);

        let mut visitor: InstVisitor<Counter> = InstVisitor::new();
        visitor.set(Opcode::Add, |state, _, _| state.adds += 1);
        visitor.set(Opcode::Const, |state, _, _| state.consts += 1);

        let mut counter = Counter::default();
        visitor.visit_graph(&mut counter, &mut g);
        assert_eq!(counter.adds, 1);
        assert_eq!(counter.consts, 1);
    }

    #[test]
    fn handlers_may_remove_instructions() {
        let mut g = Graph::new("visit_remove");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let a = g.create_param(DataType::I32, "a");
        let neg = g.create_unary(Opcode::Neg, a);
        let not = g.create_unary(Opcode::Not, a);
        g.push_back_inst(b1, a);
        g.push_back_inst(b1, neg);
        g.push_back_inst(b1, not);

        struct State;
        let mut visitor: InstVisitor<State> = InstVisitor::new();
        // The Neg handler also removes the trailing Not; the snapshot
        // guard must skip it.
        visitor.set(Opcode::Neg, |_, g, inst| {
            let next = g.inst(inst).next().unwrap();
            g.remove_inst(next);
            g.remove_inst(inst);
        });
        visitor.set(Opcode::Not, |_, _, _| panic!("removed inst must not be visited"));

        visitor.visit_graph(&mut State, &mut g);
        assert_eq!(g.inst_ids(b1), vec![a]);
    }
}
