//! Peephole rewrites on `Mul`, `Or`, and `AShr`.
//!
//! Commutative patterns first canonicalize by swapping a constant into
//! the right-hand slot. Rewrites only redirect users; the matched
//! instruction stays behind for DCE.
//!
//! - `Mul v, 0  -> 0`; `Mul v, 1 -> v`; `Mul v, -1 -> Neg v`;
//!   `Mul v, 2^k -> Shl v, k`
//! - `Or v, v -> v`; `Or v, 0 -> v`; `Or v, allones -> 1`;
//!   `Or (Not a), (Not b) -> And a, b`
//! - `AShr v, 0 -> v`

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::InstId;
use crate::ir::opcode::Opcode;

use super::visitor::InstVisitor;
use super::{Pass, PassError, PassKind};

#[derive(Default)]
pub struct Peepholes;

impl Pass for Peepholes {
    const NAME: &'static str = "Peepholes";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        let mut visitor: InstVisitor<Peepholes> = InstVisitor::new();
        visitor.set(Opcode::Mul, peephole_mul);
        visitor.set(Opcode::Or, peephole_or);
        visitor.set(Opcode::AShr, peephole_ashr);
        visitor.visit_graph(self, graph);
        graph.invalidate(AnalysisSet::LIVENESS);
        Ok(())
    }
}

/// Swap a constant left operand to the right. Returns the operands in
/// their final order, or `None` when the right-hand side is still not a
/// constant.
fn canonicalize_const_rhs(graph: &mut Graph, inst: InstId) -> Option<(InstId, InstId)> {
    if graph.inst(graph.inst(inst).input(0)).is_const() {
        graph.swap_inputs(inst);
    }
    let left = graph.inst(inst).input(0);
    let right = graph.inst(inst).input(1);
    if graph.inst(right).is_const() {
        Some((left, right))
    } else {
        None
    }
}

fn peephole_mul(_state: &mut Peepholes, graph: &mut Graph, inst: InstId) {
    let (left, right) = match canonicalize_const_rhs(graph, inst) {
        Some(operands) => operands,
        None => return,
    };
    let (ty, bits) = graph.inst(right).const_value().unwrap();
    if !ty.is_integer() {
        return;
    }

    if bits == 0 {
        // Mul v, 0 -> 0
        graph.replace_users(inst, right);
    } else if bits == 1 {
        // Mul v, 1 -> v
        graph.replace_users(inst, left);
    } else if bits == u64::MAX {
        // Mul v, -1 -> Neg v (i32 constants are stored sign-extended)
        let neg = graph.create_unary(Opcode::Neg, left);
        graph.insert_after(inst, neg);
        graph.replace_users(inst, neg);
    } else if bits.count_ones() == 1 {
        // Mul v, 2^k -> Shl v, k
        let power = bits.trailing_zeros() as u64;
        let shift = graph.find_constant_typed(ty, power);
        let shl = graph.create_binary(Opcode::Shl, left, shift);
        graph.insert_after(inst, shl);
        graph.replace_users(inst, shl);
    }
}

fn peephole_or(_state: &mut Peepholes, graph: &mut Graph, inst: InstId) {
    let left = graph.inst(inst).input(0);
    let right = graph.inst(inst).input(1);

    if left == right {
        // Or v, v -> v
        graph.replace_users(inst, left);
        return;
    }

    if graph.inst(left).opcode() == Opcode::Not && graph.inst(right).opcode() == Opcode::Not {
        // Or (Not a), (Not b) -> And a, b
        let a = graph.inst(left).input(0);
        let b = graph.inst(right).input(0);
        let and = graph.create_binary(Opcode::And, a, b);
        graph.insert_after(inst, and);
        graph.replace_users(inst, and);
        return;
    }

    let (left, right) = match canonicalize_const_rhs(graph, inst) {
        Some(operands) => operands,
        None => return,
    };
    let (ty, bits) = graph.inst(right).const_value().unwrap();
    if !ty.is_integer() {
        return;
    }

    if bits == 0 {
        // Or v, 0 -> v
        graph.replace_users(inst, left);
    } else if bits == u64::MAX {
        // Or v, allones -> 1 ("any non-zero")
        let one = graph.find_constant_typed(ty, 1);
        graph.replace_users(inst, one);
    }
}

fn peephole_ashr(_state: &mut Peepholes, graph: &mut Graph, inst: InstId) {
    let (left, right) = match canonicalize_const_rhs(graph, inst) {
        Some(operands) => operands,
        None => return,
    };
    let (ty, bits) = graph.inst(right).const_value().unwrap();
    if !ty.is_integer() {
        return;
    }
    if bits == 0 {
        // AShr v, 0 -> v
        graph.replace_users(inst, left);
    }
}
