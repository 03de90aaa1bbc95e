//! Method inlining.
//!
//! For every `Call`, the caller block is split right after the call;
//! the callee's body blocks are then copied into the caller arena with
//! fresh ids (`cur_inst_id` upward), its params replaced by the call
//! arguments, its constants merged through the caller's pool, and its
//! returns fused into the call's users — directly for a single return,
//! through a phi in the split-off block for several. The caller block
//! flows into the copied body, and the copied final block flows into
//! the split-off tail. The callee graph itself, reached through the
//! call's shared handle, is left untouched.
//!
//! The supported callee shape has an entry block holding only params
//! and pooled constants (plus an optional jump); anything else there is
//! a fatal precondition failure.

use rustc_hash::FxHashMap;

use crate::ir::graph::Graph;
use crate::ir::inst::{BlockId, InstId, InstKind};
use crate::ir::opcode::Opcode;

use super::{Pass, PassError, PassKind};

#[derive(Default)]
pub struct Inlining;

impl Pass for Inlining {
    const NAME: &'static str = "Inlining";
    const KIND: PassKind = PassKind::Optimization;

    fn run(&mut self, graph: &mut Graph) -> Result<(), PassError> {
        let mut calls = Vec::new();
        for bb in graph.block_ids() {
            for inst in graph.inst_ids(bb) {
                if graph.inst(inst).opcode() == Opcode::Call {
                    calls.push(inst);
                }
            }
        }
        for call in &calls {
            inline_call(graph, *call);
        }
        if !calls.is_empty() {
            graph.invalidate_all();
        }
        Ok(())
    }
}

fn inline_call(graph: &mut Graph, call: InstId) {
    let callee = graph.inst(call).callee().expect("inlining a non-call").clone();
    assert!(callee.len() >= 2, "callee needs an entry block and a body");

    let caller_bb = graph.inst(call).block().expect("call is not in a block");
    let next_bb = graph.split_block_after(call, true);

    let callee_blocks = callee.blocks_in_order().to_vec();
    let callee_entry = callee_blocks[0];
    let body_blocks = &callee_blocks[1..];

    // Callee params map to the call arguments, callee constants to the
    // caller's pool.
    let mut inst_map: FxHashMap<InstId, InstId> = FxHashMap::default();
    let args = graph.inst(call).inputs();
    let params = entry_params(&callee, callee_entry);
    assert_eq!(params.len(), args.len(), "call arity differs from callee params");
    for (param, arg) in params.iter().zip(&args) {
        inst_map.insert(*param, *arg);
    }
    for &c in callee.constants() {
        let (ty, bits) = callee.inst(c).const_value().unwrap();
        let merged = graph.find_constant_typed(ty, bits);
        inst_map.insert(c, merged);
    }

    // Fresh caller blocks for the callee body.
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    for &bb in body_blocks {
        let copy = graph.create_block(callee.block(bb).name().to_string());
        graph.add_bb(copy);
        block_map.insert(bb, copy);
    }

    // Pre-assign ids so forward references (phis, cross-block uses)
    // resolve while copying. Returns are not copied; they are recorded
    // for fusion instead.
    let mut copied: Vec<InstId> = Vec::new();
    let mut returns: Vec<(Option<InstId>, BlockId)> = Vec::new();
    let mut next_id = graph.cur_inst_id();
    for &bb in body_blocks {
        for phi in callee.phi_ids(bb) {
            inst_map.insert(phi, InstId(next_id));
            copied.push(phi);
            next_id += 1;
        }
        for inst in callee.inst_ids(bb) {
            match callee.inst(inst).opcode() {
                Opcode::Return => {
                    returns.push((Some(callee.inst(inst).input(0)), block_map[&bb]));
                }
                Opcode::RetVoid => returns.push((None, block_map[&bb])),
                _ => {
                    inst_map.insert(inst, InstId(next_id));
                    copied.push(inst);
                    next_id += 1;
                }
            }
        }
    }

    // Allocate the copies and place them, then wire up the user lists.
    for &orig in &copied {
        let kind = remap_kind(&callee, orig, &inst_map, &block_map);
        let copy = graph.alloc_inst(callee.inst(orig).opcode(), kind);
        debug_assert_eq!(copy, inst_map[&orig]);
        let target = block_map[&callee.inst(orig).block().unwrap()];
        if callee.inst(orig).is_phi() {
            graph.push_back_phi(target, copy);
        } else {
            graph.push_back_inst(target, copy);
        }
    }
    for &orig in &copied {
        let copy = inst_map[&orig];
        for input in graph.inst(copy).inputs() {
            graph.inst_mut(input).add_user(copy);
        }
    }

    // Fuse the return values into the call's users.
    let values: Vec<(InstId, BlockId)> = returns
        .iter()
        .filter_map(|&(v, bb)| v.map(|v| (inst_map[&v], bb)))
        .collect();
    match values.as_slice() {
        [] => {}
        [(value, _)] => graph.replace_users(call, *value),
        many => {
            let phi = graph.create_phi();
            graph.push_back_phi(next_bb, phi);
            for &(value, bb) in many {
                graph.add_phi_input_unchecked(phi, value, bb);
            }
            graph.replace_users(call, phi);
        }
    }
    graph.remove_inst(call);

    // Internal callee edges, remapped.
    for &bb in body_blocks {
        let copy = block_map[&bb];
        for &pred in callee.block(bb).preds() {
            if pred != callee_entry {
                graph.block_mut(copy).add_pred(block_map[&pred]);
            }
        }
        if let Some(t) = callee.block(bb).true_succ() {
            graph.block_mut(copy).true_succ = Some(block_map[&t]);
        }
        if let Some(f) = callee.block(bb).false_succ() {
            graph.block_mut(copy).false_succ = Some(block_map[&f]);
        }
    }

    // The callee's second block takes the call's place in the flow, and
    // the copied final block continues into the split-off tail.
    let body_entry = callee
        .block(callee_entry)
        .true_succ()
        .expect("callee entry does not reach its body");
    let body_entry = block_map[&body_entry];
    graph.block_mut(caller_bb).replace_succ(next_bb, body_entry);
    graph.block_mut(next_bb).remove_pred(caller_bb);
    graph.block_mut(body_entry).add_pred(caller_bb);

    let last = block_map[callee_blocks.last().unwrap()];
    graph.block_mut(last).add_succ(next_bb);
    graph.block_mut(next_bb).add_pred(last);
}

/// The run of leading `Param` instructions in the callee entry; the
/// rest of the entry must be pooled constants or a jump.
fn entry_params(callee: &Graph, entry: BlockId) -> Vec<InstId> {
    let mut params = Vec::new();
    let mut cur = callee.block(entry).first_inst();
    while let Some(inst) = cur {
        if callee.inst(inst).opcode() != Opcode::Param {
            break;
        }
        params.push(inst);
        cur = callee.inst(inst).next();
    }
    let mut rest = cur;
    while let Some(inst) = rest {
        assert!(
            matches!(callee.inst(inst).opcode(), Opcode::Const | Opcode::Jmp),
            "unsupported instruction {} in callee entry block",
            inst
        );
        rest = callee.inst(inst).next();
    }
    params
}

fn remap_kind(
    callee: &Graph,
    inst: InstId,
    inst_map: &FxHashMap<InstId, InstId>,
    block_map: &FxHashMap<BlockId, BlockId>,
) -> InstKind {
    let m = |id: &InstId| *inst_map.get(id).expect("operand escapes the callee body");
    match callee.inst(inst).kind() {
        InstKind::Binary { inputs } => InstKind::Binary { inputs: [m(&inputs[0]), m(&inputs[1])] },
        InstKind::Unary { input } => InstKind::Unary { input: m(input) },
        InstKind::Cast { input, to } => InstKind::Cast { input: m(input), to: *to },
        InstKind::Mov { input, reg } => InstKind::Mov { input: m(input), reg: *reg },
        InstKind::Jump { target } => InstKind::Jump { target: block_map[target] },
        InstKind::Call { callee: inner, args } => InstKind::Call {
            callee: inner.clone(),
            args: args.iter().map(|a| m(a)).collect(),
        },
        InstKind::Phi { inputs } => InstKind::Phi {
            inputs: inputs.iter().map(|(v, bb)| (m(v), block_map[bb])).collect(),
        },
        InstKind::Const { .. } | InstKind::Param { .. } | InstKind::RetVoid => {
            unreachable!("constants, params and returns are never copied")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::opcode::DataType;
    use std::rc::Rc;

    /// Callee with two returns:
    ///
    /// ```text
    ///            [1]  params/consts
    ///             |
    ///             v
    ///        /---[2]---\
    ///        |         |
    ///        v         v
    ///       [3]       [4]
    ///        |         |
    ///        \-->[5]<--/
    /// ```
    fn two_return_callee() -> Rc<Graph> {
        let mut g = Graph::new("callee");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        let b3 = g.create_block("bb3");
        let b4 = g.create_block("bb4");
        let b5 = g.create_block("bb5");
        g.insert_bb(b1);
        g.insert_bb(b2);
        g.insert_bb_after(b2, b3, true);
        g.insert_bb_after(b2, b4, false);
        g.insert_bb_after(b3, b5, true);
        g.add_edge(b4, b5);

        let x = g.create_param(DataType::I64, "x");
        g.push_back_inst(b1, x);
        let zero = g.find_constant(0i64);

        let cmp = g.create_binary(Opcode::Cmp, x, zero);
        let ja = g.create_jump(Opcode::Ja, b4);
        g.push_back_inst(b2, cmp);
        g.push_back_inst(b2, ja);

        let add = g.create_binary(Opcode::Add, zero, x);
        let ret1 = g.create_unary(Opcode::Return, add);
        g.push_back_inst(b3, add);
        g.push_back_inst(b3, ret1);

        let sub = g.create_binary(Opcode::Sub, zero, x);
        let ret2 = g.create_unary(Opcode::Return, sub);
        g.push_back_inst(b4, sub);
        g.push_back_inst(b4, ret2);

        Rc::new(g)
    }

    #[test]
    fn inlines_a_two_return_callee() {
        let callee = two_return_callee();

        let mut g = Graph::new("caller");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        let b3 = g.create_block("bb3");
        g.insert_bb(b1);
        g.insert_bb(b2);
        g.insert_bb(b3);

        let a = g.create_param(DataType::I64, "a");
        g.push_back_inst(b1, a);
        let two = g.find_constant(2i64);

        let mul = g.create_binary(Opcode::Mul, a, two);
        let call = g.create_call(callee.clone(), &[mul]);
        g.push_back_inst(b2, mul);
        g.push_back_inst(b2, call);

        let ret = g.create_unary(Opcode::Return, call);
        g.push_back_inst(b3, ret);

        assert!(g.run_pass::<Inlining>());

        // 3 original blocks + the split tail + 4 copied body blocks.
        assert_eq!(g.len(), 8);

        // The call is gone and its block flows into the copied body.
        assert_eq!(g.inst_ids(b2), vec![mul]);
        let body_entry = g.block(b2).true_succ().unwrap();
        let body_insts = g.inst_ids(body_entry);
        assert_eq!(g.inst(body_insts[0]).opcode(), Opcode::Cmp);
        // The callee's param was replaced by the call argument.
        assert_eq!(g.inst(body_insts[0]).input(0), mul);
        // The callee's constant merged into the caller pool.
        let zero = g.inst(body_insts[0]).input(1);
        assert_eq!(g.inst(zero).const_value(), Some((DataType::I64, 0)));
        assert_eq!(g.inst(zero).block(), Some(b1));

        // Two returns fuse through a phi in the split-off tail.
        let next_bb = g.block_ids()[3];
        let phis = g.phi_ids(next_bb);
        assert_eq!(phis.len(), 1);
        let phi = phis[0];
        assert_eq!(g.inst(phi).phi_inputs().len(), 2);
        assert_eq!(g.inst(ret).input(0), phi);
        let (add_copy, _) = g.inst(phi).phi_inputs()[0];
        let (sub_copy, _) = g.inst(phi).phi_inputs()[1];
        assert_eq!(g.inst(add_copy).opcode(), Opcode::Add);
        assert_eq!(g.inst(sub_copy).opcode(), Opcode::Sub);

        // The copied final block continues into the tail, and the tail
        // still reaches the original successor.
        let last_copy = *g.block_ids().last().unwrap();
        assert_eq!(g.block(last_copy).true_succ(), Some(next_bb));
        assert!(g.block(next_bb).preds().contains(&last_copy));
        assert_eq!(g.block(next_bb).true_succ(), Some(b3));

        // Copied instructions were renumbered past the caller's ids.
        assert!(add_copy > call && sub_copy > call);

        // The callee graph is untouched.
        assert_eq!(callee.len(), 5);
    }

    #[test]
    fn single_return_substitutes_directly() {
        // callee: entry [x, const 3]; body: add = x + 3; return add.
        let mut callee = Graph::new("callee1");
        let cb1 = callee.create_block("bb1");
        let cb2 = callee.create_block("bb2");
        callee.insert_bb(cb1);
        callee.insert_bb(cb2);
        let x = callee.create_param(DataType::I64, "x");
        callee.push_back_inst(cb1, x);
        let three = callee.find_constant(3i64);
        let add = callee.create_binary(Opcode::Add, x, three);
        let ret = callee.create_unary(Opcode::Return, add);
        callee.push_back_inst(cb2, add);
        callee.push_back_inst(cb2, ret);
        let callee = Rc::new(callee);

        let mut g = Graph::new("caller1");
        let b1 = g.create_block("bb1");
        let b2 = g.create_block("bb2");
        g.insert_bb(b1);
        g.insert_bb(b2);
        let a = g.create_param(DataType::I64, "a");
        g.push_back_inst(b1, a);
        let call = g.create_call(callee.clone(), &[a]);
        let ret_caller = g.create_unary(Opcode::Return, call);
        g.push_back_inst(b2, call);
        g.push_back_inst(b2, ret_caller);

        assert!(g.run_pass::<Inlining>());

        // caller 2 + split 1 + copied body 1.
        assert_eq!(g.len(), 4);
        let add_copy = g.inst(ret_caller).input(0);
        assert_eq!(g.inst(add_copy).opcode(), Opcode::Add);
        assert_eq!(g.inst(add_copy).input(0), a);
        let three_merged = g.inst(add_copy).input(1);
        assert_eq!(g.inst(three_merged).const_value(), Some((DataType::I64, 3)));
        assert_eq!(g.inst(three_merged).block(), Some(b1));
        // No phi was needed.
        let next_bb = g.block(b2).true_succ().map(|body| g.block(body).true_succ().unwrap());
        assert!(g.phi_ids(next_bb.unwrap()).is_empty());
    }
}
