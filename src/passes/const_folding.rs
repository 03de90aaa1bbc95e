//! Constant folding.
//!
//! Binary and unary arithmetic over constant operands is evaluated at
//! compile time and the result interned through the constant pool; the
//! folded instruction keeps its place and loses its users, so DCE
//! sweeps it up afterwards. Integer semantics are two's-complement
//! wrapping; shifts mask the amount to the operand width; a zero
//! divisor leaves the instruction alone. Float arithmetic is IEEE on
//! the decoded bit patterns. Opcode/type combinations that cannot be
//! typed (a float shift, say) are unreachable.

use crate::ir::graph::{AnalysisSet, Graph};
use crate::ir::inst::InstId;
use crate::ir::opcode::{DataType, Opcode};

use super::visitor::InstVisitor;
use super::{Pass, PassError, PassKind};

#[derive(Default)]
pub struct ConstFolding;

impl Pass for ConstFolding {
    const NAME: &'static str = "ConstFolding";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        let mut visitor: InstVisitor<ConstFolding> = InstVisitor::new();
        // Everything from Add to Xor folds; Cmp does not produce a
        // foldable value here.
        visitor.set_range(Opcode::Add, Opcode::Xor, fold_binary);
        visitor.set(Opcode::Not, fold_unary);
        visitor.set(Opcode::Neg, fold_unary);
        visitor.visit_graph(self, graph);
        graph.invalidate(AnalysisSet::LIVENESS);
        Ok(())
    }
}

fn fold_binary(_state: &mut ConstFolding, graph: &mut Graph, inst: InstId) {
    let left = graph.inst(inst).input(0);
    let right = graph.inst(inst).input(1);
    let (lc, rc) = match (graph.inst(left).const_value(), graph.inst(right).const_value()) {
        (Some(l), Some(r)) => (l, r),
        _ => return,
    };
    let (lty, lbits) = lc;
    let (rty, rbits) = rc;
    assert_eq!(lty, rty, "folding constants of different types");

    let opcode = graph.inst(inst).opcode();
    if let Some(bits) = eval_binary(opcode, lty, lbits, rbits) {
        let folded = graph.find_constant_typed(lty, bits);
        graph.replace_users(inst, folded);
    }
}

fn fold_unary(_state: &mut ConstFolding, graph: &mut Graph, inst: InstId) {
    let input = graph.inst(inst).input(0);
    let (ty, bits) = match graph.inst(input).const_value() {
        Some(c) => c,
        None => return,
    };
    let opcode = graph.inst(inst).opcode();
    let bits = eval_unary(opcode, ty, bits);
    let folded = graph.find_constant_typed(ty, bits);
    graph.replace_users(inst, folded);
}

fn eval_binary(opcode: Opcode, ty: DataType, a: u64, b: u64) -> Option<u64> {
    match ty {
        DataType::I32 => eval_binary_i32(opcode, a as u32 as i32, b as u32 as i32),
        DataType::I64 => eval_binary_i64(opcode, a as i64, b as i64),
        DataType::F32 => {
            let a = f32::from_bits(a as u32);
            let b = f32::from_bits(b as u32);
            let result = eval_binary_float(opcode, a as f64, b as f64) as f32;
            Some(result.to_bits() as u64)
        }
        DataType::F64 => {
            let a = f64::from_bits(a);
            let b = f64::from_bits(b);
            Some(eval_binary_float(opcode, a, b).to_bits())
        }
        DataType::NoType => unreachable!("folding an untyped constant"),
    }
}

fn eval_binary_i32(opcode: Opcode, a: i32, b: i32) -> Option<u64> {
    let result = match opcode {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        Opcode::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        Opcode::Shl => a.wrapping_shl(b as u32),
        Opcode::Shr => ((a as u32).wrapping_shr(b as u32)) as i32,
        Opcode::AShr => a.wrapping_shr(b as u32),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        _ => unreachable!("{} is not a foldable binary opcode", opcode.name()),
    };
    Some(result as i64 as u64)
}

fn eval_binary_i64(opcode: Opcode, a: i64, b: i64) -> Option<u64> {
    let result = match opcode {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        Opcode::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        Opcode::Shl => a.wrapping_shl(b as u32),
        Opcode::Shr => ((a as u64).wrapping_shr(b as u32)) as i64,
        Opcode::AShr => a.wrapping_shr(b as u32),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        _ => unreachable!("{} is not a foldable binary opcode", opcode.name()),
    };
    Some(result as u64)
}

fn eval_binary_float(opcode: Opcode, a: f64, b: f64) -> f64 {
    match opcode {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => a / b,
        _ => unreachable!("{} is not defined on floats", opcode.name()),
    }
}

fn eval_unary(opcode: Opcode, ty: DataType, bits: u64) -> u64 {
    match (opcode, ty) {
        (Opcode::Not, DataType::I32) => !(bits as u32 as i32) as i64 as u64,
        (Opcode::Not, DataType::I64) => !(bits as i64) as u64,
        (Opcode::Neg, DataType::I32) => (bits as u32 as i32).wrapping_neg() as i64 as u64,
        (Opcode::Neg, DataType::I64) => (bits as i64).wrapping_neg() as u64,
        (Opcode::Neg, DataType::F32) => (-f32::from_bits(bits as u32)).to_bits() as u64,
        (Opcode::Neg, DataType::F64) => (-f64::from_bits(bits)).to_bits(),
        _ => unreachable!("{} is not foldable on {:?}", opcode.name(), ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::dce::Dce;

    /// `v15 = Mul(2, 5)` feeding a compare folds into a fresh pooled
    /// `Const i64 10`, and DCE removes the multiply.
    #[test]
    fn mul_of_constants_folds_through_the_pool() {
        let mut g = Graph::new("fold_mul");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        g.insert_bb(b1);
        g.insert_bb(b2);

        let v0 = g.create_param(DataType::I32, "a0");
        let v1 = g.create_const(0i64);
        let v200 = g.create_const(2i64);
        let v300 = g.create_const(5i64);
        g.push_back_inst(b1, v0);
        g.push_back_inst(b1, v1);
        g.push_back_inst(b1, v200);
        g.push_back_inst(b1, v300);

        let v15 = g.create_binary(Opcode::Mul, v200, v300);
        let v2 = g.create_binary(Opcode::Cmp, v0, v15);
        g.push_back_inst(b2, v15);
        g.push_back_inst(b2, v2);

        assert!(g.run_pass::<ConstFolding>());

        let folded = g.inst(v2).input(1);
        assert_ne!(folded, v15);
        assert_eq!(g.inst(folded).const_value(), Some((DataType::I64, 10)));
        assert_eq!(g.inst(folded).block(), Some(b1));
        assert_eq!(g.find_constant(10i64), folded);
        assert!(g.inst(v15).users().is_empty());

        assert!(g.run_pass::<Dce>());
        assert_eq!(g.inst_ids(b2), vec![v2]);
    }

    #[test]
    fn folding_is_idempotent() {
        let mut g = Graph::new("fold_twice");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let v1 = g.create_const(2i64);
        let v2 = g.create_const(5i64);
        g.push_back_inst(b1, v1);
        g.push_back_inst(b1, v2);
        let mul = g.create_binary(Opcode::Mul, v1, v2);
        let ret = g.create_unary(Opcode::Return, mul);
        g.push_back_inst(b1, mul);
        g.push_back_inst(b1, ret);

        assert!(g.run_pass::<ConstFolding>());
        let after_first = g.inst(ret).input(0);
        let consts_after_first = g.constants().len();

        assert!(g.run_pass::<ConstFolding>());
        assert_eq!(g.inst(ret).input(0), after_first);
        assert_eq!(g.constants().len(), consts_after_first);
    }

    #[test]
    fn wrapping_and_signed_semantics() {
        assert_eq!(eval_binary(Opcode::Add, DataType::I32, (-1i32 as i64) as u64, 1), Some(0));
        assert_eq!(
            eval_binary(Opcode::Mul, DataType::I32, i32::MAX as u64, 2),
            Some((i32::MAX.wrapping_mul(2)) as i64 as u64)
        );
        // Arithmetic shift keeps the sign; logical shift does not.
        assert_eq!(
            eval_binary(Opcode::AShr, DataType::I32, (-8i32 as i64) as u64, 1),
            Some((-4i32) as i64 as u64)
        );
        assert_eq!(
            eval_binary(Opcode::Shr, DataType::I32, (-8i32 as i64) as u64, 1),
            Some(((-8i32 as u32) >> 1) as i32 as i64 as u64)
        );
        // Shift amounts wrap at the operand width.
        assert_eq!(eval_binary(Opcode::Shl, DataType::I64, 1, 65), Some(2));
    }

    #[test]
    fn zero_divisor_is_left_alone() {
        let mut g = Graph::new("fold_div0");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let v1 = g.create_const(4i32);
        let v2 = g.create_const(0i32);
        g.push_back_inst(b1, v1);
        g.push_back_inst(b1, v2);
        let div = g.create_binary(Opcode::Div, v1, v2);
        let ret = g.create_unary(Opcode::Return, div);
        g.push_back_inst(b1, div);
        g.push_back_inst(b1, ret);

        assert!(g.run_pass::<ConstFolding>());
        assert_eq!(g.inst(ret).input(0), div);
    }

    #[test]
    fn unary_folds() {
        let mut g = Graph::new("fold_unary");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let v1 = g.create_const(6i32);
        g.push_back_inst(b1, v1);
        let neg = g.create_unary(Opcode::Neg, v1);
        let ret = g.create_unary(Opcode::Return, neg);
        g.push_back_inst(b1, neg);
        g.push_back_inst(b1, ret);

        assert!(g.run_pass::<ConstFolding>());
        let folded = g.inst(ret).input(0);
        assert_eq!(g.inst(folded).const_value(), Some((DataType::I32, (-6i64) as u64)));
    }

    #[test]
    fn float_folds_on_bit_patterns() {
        let mut g = Graph::new("fold_float");
        let b1 = g.create_block("bb1");
        g.insert_bb(b1);
        let v1 = g.create_const(2.5f64);
        let v2 = g.create_const(0.5f64);
        g.push_back_inst(b1, v1);
        g.push_back_inst(b1, v2);
        let add = g.create_binary(Opcode::Add, v1, v2);
        let ret = g.create_unary(Opcode::Return, add);
        g.push_back_inst(b1, add);
        g.push_back_inst(b1, ret);

        assert!(g.run_pass::<ConstFolding>());
        let folded = g.inst(ret).input(0);
        assert_eq!(g.inst(folded).const_value(), Some((DataType::F64, 3.0f64.to_bits())));
    }
}
