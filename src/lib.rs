#[macro_use]
pub mod util;

pub mod builder;
pub mod concrete;
pub mod engine;
pub mod expression;
pub mod inst;
pub mod operand;
pub mod processor;
pub mod register;
pub mod session;
pub mod solver;

pub use builder::{InstructionBuilder, Mnemonic, OperandShape};
pub use concrete::{ConcreteState, Snapshot};
pub use engine::{AnalysisError, Location, SymbolicElement, SymbolicEngine, TaintEngine};
pub use inst::{Inst, Trace, TraceRecord};
pub use operand::{Operand, OperandKind};
pub use processor::{AnalysisProcessor, Statistics};
pub use register::Register;
pub use session::{Checkpoint, InstructionEvent, Session, SessionOptions, TaintSource};
