//! The graph: arena storage for instructions and blocks, CFG surgery,
//! the constant pool, use-def maintenance, analysis caches, and pass
//! dispatch.
//!
//! All cross-references are typed indices into the graph's arenas.
//! Removal never frees an arena slot (ids stay strictly increasing in
//! creation order); a removed instruction is simply unlinked from its
//! block and from its operands' user lists, and removed blocks drop out
//! of the block order.

use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use super::block::{Block, LoopId};
use super::inst::{BlockId, Inst, InstId, InstKind};
use super::marker::{Marker, MarkerManager};
use super::opcode::{ConstValue, DataType, Opcode};
use crate::passes::liveness::LiveInterval;
use crate::passes::loop_analysis::Loop;
use crate::passes::{Pass, PassLog};

/// Initial capacity of the block vector.
pub const GRAPH_BB_NUM: usize = 50;
/// Initial capacity of the instruction arena.
pub const GRAPH_INST_NUM: usize = 50;

bitflags! {
    /// Which cached analyses are currently valid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnalysisSet: u8 {
        const RPO = 1 << 0;
        const DOM_TREE = 1 << 1;
        const LOOPS = 1 << 2;
        const LINEAR_ORDER = 1 << 3;
        const LIVENESS = 1 << 4;
    }
}

pub struct Graph {
    name: String,

    insts: Vec<Inst>,
    blocks: Vec<Block>,
    /// Live blocks in insertion order; the first entry is the entry
    /// block.
    order: Vec<BlockId>,
    /// The constant pool: every pooled `Const` in the entry block.
    consts: Vec<InstId>,

    rpo: Vec<BlockId>,
    linear: Vec<BlockId>,
    live_intervals: FxHashMap<InstId, LiveInterval>,
    loops: Vec<Loop>,
    root_loop: Option<LoopId>,
    valid: AnalysisSet,

    markers: MarkerManager,
    pass_log: PassLog,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("blocks", &self.order.len())
            .field("insts", &self.insts.len())
            .finish()
    }
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            insts: Vec::with_capacity(GRAPH_INST_NUM),
            blocks: Vec::with_capacity(GRAPH_BB_NUM),
            order: Vec::with_capacity(GRAPH_BB_NUM),
            consts: Vec::new(),
            rpo: Vec::with_capacity(GRAPH_BB_NUM),
            linear: Vec::new(),
            live_intervals: FxHashMap::default(),
            loops: Vec::new(),
            root_loop: None,
            valid: AnalysisSet::empty(),
            markers: MarkerManager::new(),
            pass_log: PassLog::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Upper bound on every instruction id in this graph.
    pub fn cur_inst_id(&self) -> u32 {
        self.insts.len() as u32
    }

    pub fn block(&self, bb: BlockId) -> &Block {
        &self.blocks[bb.index()]
    }

    pub fn block_mut(&mut self, bb: BlockId) -> &mut Block {
        &mut self.blocks[bb.index()]
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.order.first().copied()
    }

    pub fn last_bb(&self) -> Option<BlockId> {
        self.order.last().copied()
    }

    /// Live blocks in insertion order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.order.clone()
    }

    pub fn blocks_in_order(&self) -> &[BlockId] {
        &self.order
    }

    /// Snapshot of a block's main instruction list.
    pub fn inst_ids(&self, bb: BlockId) -> Vec<InstId> {
        let mut out = Vec::new();
        let mut cur = self.block(bb).first_inst;
        while let Some(id) = cur {
            out.push(id);
            cur = self.inst(id).next;
        }
        out
    }

    /// Snapshot of a block's phi list.
    pub fn phi_ids(&self, bb: BlockId) -> Vec<InstId> {
        let mut out = Vec::new();
        let mut cur = self.block(bb).first_phi;
        while let Some(id) = cur {
            out.push(id);
            cur = self.inst(id).next;
        }
        out
    }

    // ---- block construction and CFG surgery ----

    /// Allocate a detached block. It joins the CFG through `insert_bb`,
    /// `insert_bb_after`, or `add_bb`.
    pub fn create_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(name));
        id
    }

    /// Append `bb` and link it as the true successor of the current last
    /// block (no linking for the very first block).
    pub fn insert_bb(&mut self, bb: BlockId) {
        if let Some(last) = self.order.last().copied() {
            self.block_mut(last).add_succ(bb);
            self.block_mut(bb).add_pred(last);
        }
        self.order.push(bb);
    }

    /// Insert `bb` on the chosen outgoing edge of `prev`: `prev`'s old
    /// successor in that slot becomes a successor of `bb`.
    pub fn insert_bb_after(&mut self, prev: BlockId, bb: BlockId, is_true_succ: bool) {
        let old = if is_true_succ {
            let old = self.block(prev).true_succ;
            self.block_mut(prev).true_succ = Some(bb);
            old
        } else {
            let old = self.block(prev).false_succ;
            self.block_mut(prev).false_succ = Some(bb);
            old
        };
        self.block_mut(bb).add_pred(prev);
        if let Some(succ) = old {
            self.block_mut(succ).add_pred(bb);
            self.block_mut(bb).add_succ(succ);
        }
        self.order.push(bb);
    }

    /// Append `bb` to the block order without touching any edges.
    pub fn add_bb(&mut self, bb: BlockId) {
        self.order.push(bb);
    }

    pub fn add_edge(&mut self, src: BlockId, dst: BlockId) {
        self.block_mut(src).add_succ(dst);
        self.block_mut(dst).add_pred(src);
    }

    /// Detach `bb` from the CFG and destroy its instructions.
    pub fn remove_bb(&mut self, bb: BlockId) {
        for phi in self.phi_ids(bb) {
            self.remove_inst(phi);
        }
        for inst in self.inst_ids(bb) {
            self.remove_inst(inst);
        }
        for pred in self.block(bb).preds.clone() {
            self.block_mut(pred).remove_succ(bb);
        }
        let succs: Vec<_> = self.block(bb).succs().collect();
        for succ in succs {
            self.block_mut(succ).remove_pred(bb);
        }
        self.block_mut(bb).true_succ = None;
        self.block_mut(bb).false_succ = None;
        let pos = self
            .order
            .iter()
            .position(|&b| b == bb)
            .expect("removing a non-existing bb");
        self.order.remove(pos);
    }

    /// Swap `old` for `new` in the block order, transferring edges.
    pub fn replace_bb(&mut self, old: BlockId, new: BlockId) {
        let pos = self
            .order
            .iter()
            .position(|&b| b == old)
            .expect("replacing a non-existing bb");
        for pred in self.block(old).preds.clone() {
            self.block_mut(pred).replace_succ(old, new);
            self.block_mut(new).add_pred(pred);
        }
        let succs: Vec<_> = self.block(old).succs().collect();
        for succ in succs {
            self.block_mut(succ).replace_pred(old, new);
            self.block_mut(new).add_succ(succ);
        }
        self.block_mut(old).preds.clear();
        self.block_mut(old).true_succ = None;
        self.block_mut(old).false_succ = None;
        self.order[pos] = new;
    }

    // ---- instruction construction ----

    pub(crate) fn alloc_inst(&mut self, opcode: Opcode, kind: InstKind) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(Inst::new(opcode, kind));
        id
    }

    fn link_input_users(&mut self, id: InstId) {
        for input in self.inst(id).inputs() {
            self.inst_mut(input).add_user(id);
        }
    }

    pub fn create_binary(&mut self, opcode: Opcode, left: InstId, right: InstId) -> InstId {
        assert!(opcode.is_binary(), "{} is not a binary opcode", opcode.name());
        let id = self.alloc_inst(opcode, InstKind::Binary { inputs: [left, right] });
        self.link_input_users(id);
        id
    }

    pub fn create_unary(&mut self, opcode: Opcode, input: InstId) -> InstId {
        assert!(opcode.is_unary(), "{} is not a unary opcode", opcode.name());
        let id = self.alloc_inst(opcode, InstKind::Unary { input });
        self.link_input_users(id);
        id
    }

    /// Allocate an unpooled constant. Use `find_constant` for pooled
    /// lookup.
    pub fn create_const<T: ConstValue>(&mut self, value: T) -> InstId {
        self.create_const_typed(T::DATA_TYPE, value.to_bits())
    }

    pub(crate) fn create_const_typed(&mut self, ty: DataType, bits: u64) -> InstId {
        self.alloc_inst(Opcode::Const, InstKind::Const { ty, bits })
    }

    pub fn create_param(&mut self, ty: DataType, name: impl Into<String>) -> InstId {
        self.alloc_inst(Opcode::Param, InstKind::Param { ty, name: name.into() })
    }

    pub fn create_jump(&mut self, opcode: Opcode, target: BlockId) -> InstId {
        assert!(opcode.is_jump(), "{} is not a jump opcode", opcode.name());
        self.alloc_inst(opcode, InstKind::Jump { target })
    }

    pub fn create_call(&mut self, callee: Rc<Graph>, args: &[InstId]) -> InstId {
        let id = self.alloc_inst(Opcode::Call, InstKind::Call { callee, args: args.to_vec() });
        self.link_input_users(id);
        id
    }

    pub fn create_cast(&mut self, input: InstId, to: DataType) -> InstId {
        let id = self.alloc_inst(Opcode::Cast, InstKind::Cast { input, to });
        self.link_input_users(id);
        id
    }

    pub fn create_mov(&mut self, reg: u32, input: InstId) -> InstId {
        let id = self.alloc_inst(Opcode::Mov, InstKind::Mov { input, reg });
        self.link_input_users(id);
        id
    }

    pub fn create_phi(&mut self) -> InstId {
        self.alloc_inst(Opcode::Phi, InstKind::Phi { inputs: Vec::new() })
    }

    pub fn create_zero_check(&mut self, input: InstId) -> InstId {
        let id = self.alloc_inst(Opcode::ZeroCheck, InstKind::Unary { input });
        self.link_input_users(id);
        id
    }

    pub fn create_bounds_check(&mut self, input: InstId, index: InstId) -> InstId {
        let id = self.alloc_inst(Opcode::BoundsCheck, InstKind::Binary { inputs: [input, index] });
        self.link_input_users(id);
        id
    }

    pub fn create_ret_void(&mut self) -> InstId {
        self.alloc_inst(Opcode::RetVoid, InstKind::RetVoid)
    }

    // ---- the constant pool ----

    /// Find-or-insert a pooled constant. Misses are created in the entry
    /// block, after the last pooled constant (or after the leading
    /// params when the pool is empty).
    pub fn find_constant<T: ConstValue>(&mut self, value: T) -> InstId {
        self.find_constant_typed(T::DATA_TYPE, value.to_bits())
    }

    pub fn find_constant_typed(&mut self, ty: DataType, bits: u64) -> InstId {
        for &c in &self.consts {
            if self.inst(c).const_value() == Some((ty, bits)) {
                return c;
            }
        }
        let anchor = self.consts.last().copied();
        let c = self.create_const_typed(ty, bits);
        match anchor {
            Some(a) => self.insert_after(a, c),
            None => {
                let entry = self.entry().expect("graph without blocks has no constant pool");
                let mut last_param = None;
                let mut cur = self.block(entry).first_inst;
                while let Some(i) = cur {
                    if self.inst(i).opcode == Opcode::Param {
                        last_param = Some(i);
                        cur = self.inst(i).next;
                    } else {
                        break;
                    }
                }
                match last_param {
                    Some(p) => self.insert_after(p, c),
                    None => self.push_front_inst(entry, c),
                }
            }
        }
        c
    }

    pub fn constants(&self) -> &[InstId] {
        &self.consts
    }

    fn register_const(&mut self, id: InstId) {
        if self.inst(id).is_const()
            && self.inst(id).block == self.entry()
            && !self.consts.contains(&id)
        {
            self.consts.push(id);
        }
    }

    // ---- intrusive list surgery ----

    fn assert_detached(&self, id: InstId) {
        let inst = self.inst(id);
        assert!(
            inst.block.is_none() && inst.prev.is_none() && inst.next.is_none(),
            "inserting {} twice",
            id
        );
    }

    pub fn push_back_inst(&mut self, bb: BlockId, id: InstId) {
        assert!(!self.inst(id).is_phi(), "phis go through push_back_phi");
        self.assert_detached(id);
        let last = self.block(bb).last_inst;
        self.inst_mut(id).block = Some(bb);
        self.inst_mut(id).prev = last;
        match last {
            Some(l) => self.inst_mut(l).next = Some(id),
            None => self.block_mut(bb).first_inst = Some(id),
        }
        self.block_mut(bb).last_inst = Some(id);
        self.block_mut(bb).len += 1;
        self.register_const(id);
    }

    pub fn push_front_inst(&mut self, bb: BlockId, id: InstId) {
        assert!(!self.inst(id).is_phi(), "phis go through push_front_phi");
        self.assert_detached(id);
        let first = self.block(bb).first_inst;
        self.inst_mut(id).block = Some(bb);
        self.inst_mut(id).next = first;
        match first {
            Some(f) => self.inst_mut(f).prev = Some(id),
            None => self.block_mut(bb).last_inst = Some(id),
        }
        self.block_mut(bb).first_inst = Some(id);
        self.block_mut(bb).len += 1;
        self.register_const(id);
    }

    /// Insert `id` into the main list right after `prev`.
    pub fn insert_after(&mut self, prev: InstId, id: InstId) {
        self.assert_detached(id);
        let bb = self.inst(prev).block.expect("insert_after a detached inst");
        let next = self.inst(prev).next;
        self.inst_mut(id).block = Some(bb);
        self.inst_mut(id).prev = Some(prev);
        self.inst_mut(id).next = next;
        self.inst_mut(prev).next = Some(id);
        match next {
            Some(n) => self.inst_mut(n).prev = Some(id),
            None => self.block_mut(bb).last_inst = Some(id),
        }
        self.block_mut(bb).len += 1;
        self.register_const(id);
    }

    pub fn push_back_phi(&mut self, bb: BlockId, id: InstId) {
        assert!(self.inst(id).is_phi(), "push_back_phi takes a phi");
        self.assert_detached(id);
        let last = self.block(bb).last_phi;
        self.inst_mut(id).block = Some(bb);
        self.inst_mut(id).prev = last;
        match last {
            Some(l) => self.inst_mut(l).next = Some(id),
            None => self.block_mut(bb).first_phi = Some(id),
        }
        self.block_mut(bb).last_phi = Some(id);
        self.block_mut(bb).len += 1;
    }

    pub fn push_front_phi(&mut self, bb: BlockId, id: InstId) {
        assert!(self.inst(id).is_phi(), "push_front_phi takes a phi");
        self.assert_detached(id);
        let first = self.block(bb).first_phi;
        self.inst_mut(id).block = Some(bb);
        self.inst_mut(id).next = first;
        match first {
            Some(f) => self.inst_mut(f).prev = Some(id),
            None => self.block_mut(bb).last_phi = Some(id),
        }
        self.block_mut(bb).first_phi = Some(id);
        self.block_mut(bb).len += 1;
    }

    pub fn pop_front_inst(&mut self, bb: BlockId) {
        let first = self.block(bb).first_inst.expect("pop_front on an empty block");
        self.remove_inst(first);
    }

    pub fn pop_back_inst(&mut self, bb: BlockId) {
        let last = self.block(bb).last_inst.expect("pop_back on an empty block");
        self.remove_inst(last);
    }

    /// Unlink `id` from its block and from its operands' user lists, and
    /// drop its live interval. The arena slot stays behind.
    pub fn remove_inst(&mut self, id: InstId) {
        let bb = self.inst(id).block.expect("removing a detached inst");
        let (prev, next) = (self.inst(id).prev, self.inst(id).next);
        let is_phi = self.inst(id).is_phi();
        match prev {
            Some(p) => self.inst_mut(p).next = next,
            None => {
                if is_phi {
                    self.block_mut(bb).first_phi = next;
                } else {
                    self.block_mut(bb).first_inst = next;
                }
            }
        }
        match next {
            Some(n) => self.inst_mut(n).prev = prev,
            None => {
                if is_phi {
                    self.block_mut(bb).last_phi = prev;
                } else {
                    self.block_mut(bb).last_inst = prev;
                }
            }
        }
        self.inst_mut(id).block = None;
        self.inst_mut(id).prev = None;
        self.inst_mut(id).next = None;
        self.block_mut(bb).len -= 1;

        for input in self.inst(id).inputs() {
            self.inst_mut(input).remove_user(id);
        }
        self.live_intervals.remove(&id);
        if let Some(pos) = self.consts.iter().position(|&c| c == id) {
            self.consts.remove(pos);
        }
    }

    /// Create a fresh block that adopts every instruction strictly after
    /// `inst`, takes over the original block's successors, and becomes
    /// its designated successor. Phis are not moved.
    pub fn split_block_after(&mut self, inst: InstId, make_true_succ: bool) -> BlockId {
        let old = self.inst(inst).block.expect("splitting after a detached inst");
        let name = format!("{}.split", self.block(old).name);
        let new = self.create_block(name);
        self.add_bb(new);

        // Move the tail of the main list.
        if let Some(first_moved) = self.inst(inst).next {
            let old_last = self.block(old).last_inst;
            self.block_mut(new).first_inst = Some(first_moved);
            self.block_mut(new).last_inst = old_last;
            self.inst_mut(first_moved).prev = None;
            self.inst_mut(inst).next = None;
            self.block_mut(old).last_inst = Some(inst);

            let mut moved = 0;
            let mut cur = Some(first_moved);
            while let Some(id) = cur {
                self.inst_mut(id).block = Some(new);
                moved += 1;
                cur = self.inst(id).next;
            }
            self.block_mut(old).len -= moved;
            self.block_mut(new).len += moved;
        }

        // The new block takes over the successors.
        let (ts, fs) = (self.block(old).true_succ, self.block(old).false_succ);
        self.block_mut(new).true_succ = ts;
        self.block_mut(new).false_succ = fs;
        self.block_mut(old).true_succ = None;
        self.block_mut(old).false_succ = None;
        for succ in ts.into_iter().chain(fs) {
            self.block_mut(succ).replace_pred(old, new);
        }

        if make_true_succ {
            self.block_mut(old).true_succ = Some(new);
        } else {
            self.block_mut(old).false_succ = Some(new);
        }
        self.block_mut(new).add_pred(old);
        new
    }

    // ---- use-def mutation ----

    /// Overwrite operand slot `num`, keeping both user lists coherent.
    pub fn set_input(&mut self, id: InstId, num: usize, new: InstId) {
        let old = self.inst(id).input(num);
        self.replace_slot(id, num, old, new);
    }

    /// Replace the first operand slot holding `old` with `new`.
    pub fn replace_input(&mut self, id: InstId, old: InstId, new: InstId) {
        let num = (0..self.inst(id).num_inputs())
            .find(|&n| self.inst(id).input(n) == old)
            .expect("replacing a non-existing input");
        self.replace_slot(id, num, old, new);
    }

    fn replace_slot(&mut self, id: InstId, num: usize, old: InstId, new: InstId) {
        match &mut self.inst_mut(id).kind {
            InstKind::Binary { inputs } => inputs[num] = new,
            InstKind::Unary { input } | InstKind::Cast { input, .. } | InstKind::Mov { input, .. } => {
                *input = new
            }
            InstKind::Call { args, .. } => args[num] = new,
            InstKind::Phi { inputs } => inputs[num].0 = new,
            _ => panic!("instruction has no inputs"),
        }
        self.inst_mut(old).remove_user(id);
        self.inst_mut(new).add_user(id);
    }

    /// Rewrite every user of `old` to reference `new` instead, emptying
    /// `old`'s user list.
    pub fn replace_users(&mut self, old: InstId, new: InstId) {
        assert_ne!(old, new, "replacing users with the instruction itself");
        let users = std::mem::take(&mut self.inst_mut(old).users);
        for &user in &users {
            let rewritten = self.inst_mut(user).rewrite_input(old, new);
            for _ in 0..rewritten {
                self.inst_mut(new).add_user(user);
            }
        }
    }

    /// Append a `(value, pred)` pair to a phi. Once the phi sits in a
    /// block, `pred` must be one of that block's predecessors.
    pub fn add_phi_input(&mut self, phi: InstId, value: InstId, pred: BlockId) {
        if let Some(bb) = self.inst(phi).block {
            assert!(
                self.block(bb).preds.contains(&pred),
                "phi input block {} is not a predecessor",
                pred
            );
        }
        self.add_phi_input_unchecked(phi, value, pred);
    }

    pub(crate) fn add_phi_input_unchecked(&mut self, phi: InstId, value: InstId, pred: BlockId) {
        match &mut self.inst_mut(phi).kind {
            InstKind::Phi { inputs } => inputs.push((value, pred)),
            _ => panic!("add_phi_input on a non-phi"),
        }
        self.inst_mut(value).add_user(phi);
    }

    /// Repoint a phi's source block in slot `num`.
    pub fn replace_phi_block(&mut self, phi: InstId, num: usize, new_bb: BlockId) {
        match &mut self.inst_mut(phi).kind {
            InstKind::Phi { inputs } => {
                assert!(num < inputs.len(), "input {} out of range for phi", num);
                inputs[num].1 = new_bb;
            }
            _ => panic!("replace_phi_block on a non-phi"),
        }
    }

    /// Append an argument to a call.
    pub fn insert_arg(&mut self, call: InstId, arg: InstId) {
        match &mut self.inst_mut(call).kind {
            InstKind::Call { args, .. } => args.push(arg),
            _ => panic!("insert_arg on a non-call"),
        }
        self.inst_mut(arg).add_user(call);
    }

    /// Swap a binary instruction's operands.
    pub fn swap_inputs(&mut self, id: InstId) {
        match &mut self.inst_mut(id).kind {
            InstKind::Binary { inputs } => inputs.swap(0, 1),
            _ => panic!("swap_inputs on a non-binary inst"),
        }
    }

    pub(crate) fn set_opcode(&mut self, id: InstId, opcode: Opcode) {
        self.inst_mut(id).opcode = opcode;
    }

    pub fn set_mov_reg(&mut self, id: InstId, new_reg: u32) {
        match &mut self.inst_mut(id).kind {
            InstKind::Mov { reg, .. } => *reg = new_reg,
            _ => panic!("set_mov_reg on a non-mov"),
        }
    }

    // ---- types and dominance ----

    /// The value type of an instruction, computed from its payload or
    /// propagated from its inputs.
    pub fn inst_type(&self, id: InstId) -> DataType {
        let inst = self.inst(id);
        match &inst.kind {
            InstKind::Const { ty, .. } | InstKind::Param { ty, .. } => *ty,
            InstKind::Cast { to, .. } => *to,
            InstKind::Binary { inputs } => {
                let left = self.inst_type(inputs[0]);
                if left != DataType::NoType {
                    left
                } else {
                    self.inst_type(inputs[1])
                }
            }
            InstKind::Unary { input } | InstKind::Mov { input, .. } => self.inst_type(*input),
            InstKind::Call { args, .. } => args
                .iter()
                .map(|&a| self.inst_type(a))
                .find(|&t| t != DataType::NoType)
                .unwrap_or(DataType::NoType),
            InstKind::Phi { inputs } => inputs
                .iter()
                .filter(|&&(v, _)| v != id)
                .map(|&(v, _)| self.inst_type(v))
                .find(|&t| t != DataType::NoType)
                .unwrap_or(DataType::NoType),
            InstKind::Jump { .. } | InstKind::RetVoid => DataType::NoType,
        }
    }

    /// Whether `a` dominates `b` (valid after the DomTree pass).
    pub fn block_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || self.block(b).dominators.contains(&a)
    }

    /// Whether `a` dominates `b`: a forward walk inside a shared block,
    /// block dominance otherwise.
    pub fn inst_dominates(&self, a: InstId, b: InstId) -> bool {
        if a == b {
            return true;
        }
        let ba = self.inst(a).block.expect("dominance query on a detached inst");
        let bb = self.inst(b).block.expect("dominance query on a detached inst");
        if ba == bb {
            let mut cur = self.inst(a).next;
            while let Some(id) = cur {
                if id == b {
                    return true;
                }
                cur = self.inst(id).next;
            }
            false
        } else {
            self.block_dominates(ba, bb)
        }
    }

    // ---- analysis caches ----

    pub fn analysis_valid(&self, which: AnalysisSet) -> bool {
        self.valid.contains(which)
    }

    pub(crate) fn mark_analysis_valid(&mut self, which: AnalysisSet) {
        self.valid.insert(which);
    }

    /// Drop the named analyses: clears both the validity bits and the
    /// cached data, so a later `run_pass` rebuilds from scratch.
    pub fn invalidate(&mut self, which: AnalysisSet) {
        if which.contains(AnalysisSet::RPO) {
            self.rpo.clear();
        }
        if which.contains(AnalysisSet::DOM_TREE) {
            for bb in 0..self.blocks.len() {
                self.blocks[bb].dominators.clear();
                self.blocks[bb].idom = None;
            }
        }
        if which.contains(AnalysisSet::LOOPS) {
            self.loops.clear();
            self.root_loop = None;
            for bb in 0..self.blocks.len() {
                self.blocks[bb].loop_id = None;
            }
        }
        if which.contains(AnalysisSet::LINEAR_ORDER) {
            self.linear.clear();
        }
        if which.contains(AnalysisSet::LIVENESS) {
            self.live_intervals.clear();
            for bb in 0..self.blocks.len() {
                self.blocks[bb].live_start = 0;
                self.blocks[bb].live_end = 0;
            }
        }
        self.valid.remove(which);
    }

    pub fn invalidate_all(&mut self) {
        self.invalidate(AnalysisSet::all());
    }

    pub fn rpo_bbs(&self) -> &[BlockId] {
        &self.rpo
    }

    pub(crate) fn set_rpo(&mut self, rpo: Vec<BlockId>) {
        self.rpo = rpo;
    }

    pub fn linear_order_bbs(&self) -> &[BlockId] {
        &self.linear
    }

    pub(crate) fn set_linear_order(&mut self, linear: Vec<BlockId>) {
        self.linear = linear;
    }

    pub fn live_intervals(&self) -> &FxHashMap<InstId, LiveInterval> {
        &self.live_intervals
    }

    pub(crate) fn live_intervals_mut(&mut self) -> &mut FxHashMap<InstId, LiveInterval> {
        &mut self.live_intervals
    }

    pub(crate) fn set_live_intervals(&mut self, intervals: FxHashMap<InstId, LiveInterval>) {
        self.live_intervals = intervals;
    }

    // ---- loops ----

    pub(crate) fn new_loop(&mut self, lp: Loop) -> LoopId {
        let id = LoopId(self.loops.len() as u32);
        self.loops.push(lp);
        id
    }

    pub fn loop_at(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    pub(crate) fn loop_at_mut(&mut self, id: LoopId) -> &mut Loop {
        &mut self.loops[id.index()]
    }

    pub fn root_loop(&self) -> Option<LoopId> {
        self.root_loop
    }

    pub(crate) fn set_root_loop(&mut self, root: LoopId) {
        self.root_loop = Some(root);
    }

    /// Whether `bb` is the header of the loop it belongs to.
    pub fn is_loop_header(&self, bb: BlockId) -> bool {
        match self.block(bb).loop_id {
            Some(l) => self.loop_at(l).header() == Some(bb),
            None => false,
        }
    }

    // ---- markers ----

    pub fn new_marker(&mut self) -> Marker {
        self.markers.new_marker()
    }

    pub fn release_marker(&mut self, marker: Marker) {
        self.markers.release_marker(marker);
    }

    // ---- pass dispatch ----

    /// Run pass `P`, reporting failures to the error sink. A `true`
    /// return guarantees `P`'s postconditions.
    pub fn run_pass<P: Pass + Default>(&mut self) -> bool {
        self.run_pass_with(P::default())
    }

    /// Run an already-configured pass instance.
    pub fn run_pass_with<P: Pass>(&mut self, mut pass: P) -> bool {
        match pass.run(self) {
            Ok(()) => {
                log::debug!("pass {} finished on graph {}", P::NAME, self.name);
                self.pass_log.record(P::NAME, P::KIND);
                true
            }
            Err(err) => {
                log::error!("pass {} failed on graph {}: {}", P::NAME, self.name, err);
                false
            }
        }
    }

    pub fn pass_log(&self) -> &PassLog {
        &self.pass_log
    }
}
