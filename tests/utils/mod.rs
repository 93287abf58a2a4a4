#![allow(dead_code)]

use std::sync::Once;
use symtaint::{
    AnalysisError, Checkpoint, Inst, InstructionBuilder, Mnemonic, Operand, Register, Session,
    SessionOptions, Snapshot, TaintSource,
};

static INIT_LOGGER: Once = Once::new();

pub const THREAD: u32 = 1;
pub const ADDRESS: u64 = 0x40_1000;

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn session_with_tainted(registers: &[Register]) -> Session {
    Session::new(SessionOptions {
        taint_sources: registers
            .iter()
            .map(|r| TaintSource::Register {
                thread: THREAD,
                register: *r,
            })
            .collect(),
        ..SessionOptions::default()
    })
}

pub fn builder(mnemonic: Mnemonic, disassembly: &str, operands: Vec<Operand>) -> InstructionBuilder {
    InstructionBuilder::new(mnemonic)
        .address(ADDRESS)
        .disassembly(disassembly)
        .operands(operands)
        .instruction_size(4)
}

pub fn reg(register: Register) -> Operand {
    Operand::register(register, 8)
}

pub fn flags(of: bool) -> Snapshot {
    Snapshot::new().with_flag(Register::Of, of)
}

/// Engine state without the counters, which record discarded instructions.
pub fn engine_state(checkpoint: &Checkpoint) -> Checkpoint {
    Checkpoint {
        statistics: Default::default(),
        ..checkpoint.clone()
    }
}

/// Models `builder` against the engines of `session` without recording it.
pub fn process(
    session: &Session,
    builder: &InstructionBuilder,
    concrete: &Snapshot,
) -> Result<Inst, AnalysisError> {
    session.with_processor(THREAD, concrete, |ap| builder.process(ap))
}
