//! Debug dump of a graph in textual form.
//!
//! ```text
//! Graph for proc <name>
//! BB <name>[<id>/<graph_size>]
//! preds : bb0 bb1
//! <phi lines>
//! <instr lines>
//! succs : true bb2, false bb3
//! ```

use std::fmt::Write;

use super::graph::Graph;
use super::inst::{InstId, InstKind};
use super::opcode::DataType;

impl Graph {
    pub fn dump(&self, out: &mut impl Write) -> std::fmt::Result {
        writeln!(out, "Graph for proc {}", self.name())?;
        for bb in self.blocks_in_order() {
            self.dump_bb(*bb, out)?;
        }
        Ok(())
    }

    pub fn dump_to_string(&self) -> String {
        let mut s = String::new();
        self.dump(&mut s).expect("writing to a String cannot fail");
        s
    }

    fn dump_bb(&self, bb: super::inst::BlockId, out: &mut impl Write) -> std::fmt::Result {
        let block = self.block(bb);
        writeln!(out, "BB {}[{}/{}]", block.name(), bb.index(), self.len())?;
        write!(out, "preds :")?;
        for pred in block.preds() {
            write!(out, " {}", pred)?;
        }
        writeln!(out)?;

        for phi in self.phi_ids(bb) {
            self.dump_inst(phi, out)?;
        }
        for inst in self.inst_ids(bb) {
            self.dump_inst(inst, out)?;
        }

        write!(out, "succs :")?;
        if let Some(t) = block.true_succ() {
            write!(out, " true {}", t)?;
        }
        if let Some(f) = block.false_succ() {
            write!(out, ", false {}", f)?;
        }
        writeln!(out)?;
        writeln!(out)
    }

    pub fn dump_inst(&self, id: InstId, out: &mut impl Write) -> std::fmt::Result {
        let inst = self.inst(id);
        let op = inst.opcode().name();
        write!(out, "\t{}. {}", id, op)?;
        match inst.kind() {
            InstKind::Binary { inputs } => {
                write!(out, " {} {}, {}", self.inst_type(id).name(), inputs[0], inputs[1])?;
            }
            InstKind::Unary { input } => {
                write!(out, " {} {}", self.inst_type(id).name(), input)?;
            }
            InstKind::Const { ty, bits } => {
                write!(out, " {} ", ty.name())?;
                match ty {
                    DataType::I32 => write!(out, "{}", *bits as i32)?,
                    DataType::I64 => write!(out, "{}", *bits as i64)?,
                    DataType::F32 => write!(out, "{}", f32::from_bits(*bits as u32))?,
                    DataType::F64 => write!(out, "{}", f64::from_bits(*bits))?,
                    DataType::NoType => write!(out, "{}", bits)?,
                }
            }
            InstKind::Param { ty, name } => {
                write!(out, " {} {}", ty.name(), name)?;
            }
            InstKind::Jump { target } => {
                write!(out, " {}", target)?;
            }
            InstKind::Call { callee, args } => {
                write!(out, " {}(", callee.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(out, " ")?;
                    }
                    write!(out, "{}", arg)?;
                }
                write!(out, ")")?;
            }
            InstKind::Cast { input, to } => {
                write!(out, " {} to {}", input, to.name())?;
            }
            InstKind::Mov { input, reg } => {
                write!(out, " {} r{}, {}", self.inst_type(id).name(), reg, input)?;
            }
            InstKind::Phi { inputs } => {
                for (v, bb) in inputs {
                    write!(out, " ({}, {})", v, bb)?;
                }
            }
            InstKind::RetVoid => {}
        }
        self.dump_users(id, out)?;
        writeln!(out)
    }

    fn dump_users(&self, id: InstId, out: &mut impl Write) -> std::fmt::Result {
        let users = self.inst(id).users();
        if users.is_empty() {
            return Ok(());
        }
        write!(out, " -> (")?;
        for (i, user) in users.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}", user)?;
        }
        write!(out, ")")
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::graph::Graph;
    use crate::ir::opcode::{DataType, Opcode};

    #[test]
    fn dump_exposes_blocks_preds_and_succs() {
        let mut g = Graph::new("sample");
        let b1 = g.create_block("start");
        let b2 = g.create_block("body");
        g.insert_bb(b1);
        g.insert_bb(b2);
        let a = g.create_param(DataType::I32, "a0");
        let c = g.create_const(4i32);
        g.push_back_inst(b1, a);
        g.push_back_inst(b1, c);
        let add = g.create_binary(Opcode::Add, a, c);
        g.push_back_inst(b2, add);

        let text = g.dump_to_string();
        assert!(text.starts_with("Graph for proc sample"));
        assert!(text.contains("BB start[0/2]"));
        assert!(text.contains("succs : true bb1"));
        assert!(text.contains("preds : bb0"));
        assert!(text.contains("\tv0. Param i32 a0 -> (v2)"));
        assert!(text.contains("\tv1. Const i32 4 -> (v2)"));
        assert!(text.contains("\tv2. Add i32 v0, v1"));
    }
}
