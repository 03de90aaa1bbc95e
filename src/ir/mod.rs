//! The SSA intermediate representation: typed instructions with use-def
//! chains, basic blocks with up to two successors, and the graph that
//! owns them.

pub mod block;
pub mod dump;
pub mod graph;
pub mod inst;
pub mod marker;
pub mod opcode;

pub use block::{Block, LoopId};
pub use graph::{AnalysisSet, Graph};
pub use inst::{BlockId, Inst, InstId, InstKind};
pub use marker::{Marker, MarkerManager, MarkerSet};
pub use opcode::{ConstValue, DataType, Opcode, OPCODE_COUNT};
