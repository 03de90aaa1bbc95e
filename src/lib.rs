//! SSA middle-end: an optimizing compiler's intermediate representation
//! together with the analyses and optimizations that operate on it.
//!
//! Client code builds a control-flow graph of typed instructions
//! through [`ir::Graph`], runs passes with `graph.run_pass::<P>()`, and
//! reads the transformed IR and the derived analyses back off the
//! graph:
//!
//! ```
//! use ssair::ir::{DataType, Graph, Opcode};
//! use ssair::passes::{ConstFolding, Dce, Rpo};
//!
//! let mut g = Graph::new("sum");
//! let entry = g.create_block("entry");
//! let body = g.create_block("body");
//! g.insert_bb(entry);
//! g.insert_bb(body);
//!
//! let a = g.create_param(DataType::I32, "a");
//! g.push_back_inst(entry, a);
//! let two = g.find_constant(2i32);
//! let three = g.find_constant(3i32);
//!
//! let sum = g.create_binary(Opcode::Add, two, three);
//! let cmp = g.create_binary(Opcode::Cmp, a, sum);
//! g.push_back_inst(body, sum);
//! g.push_back_inst(body, cmp);
//!
//! assert!(g.run_pass::<ConstFolding>());
//! assert!(g.run_pass::<Dce>());
//! assert!(g.run_pass::<Rpo>());
//! let five = g.find_constant(5i32);
//! assert_eq!(g.inst(cmp).input(1), five);
//! assert_eq!(g.rpo_bbs(), &[entry, body]);
//! ```

pub mod ir;
pub mod passes;
