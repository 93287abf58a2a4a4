pub mod journal;
pub mod symbolic;
pub mod taint;

pub use journal::*;
pub use symbolic::*;
pub use taint::*;

use crate::{builder::Mnemonic, expression::Sort, register::Register};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ThreadId = u32;
pub type Version = u64;
pub type ElementId = u64;

/// Storage an instruction can read or write: a register of one thread, or
/// one byte of the process-wide memory.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Location {
    Register { thread: ThreadId, register: Register },
    Memory(u64),
}

impl Location {
    pub fn register(thread: ThreadId, register: Register) -> Self {
        Location::Register { thread, register }
    }

    pub fn bit_size(&self) -> u32 {
        match self {
            Location::Register { register, .. } => register.bit_size(),
            Location::Memory(_) => 8,
        }
    }

    /// Every byte of `size` bytes starting at `address`.
    pub fn memory_range(address: u64, size: u32) -> impl Iterator<Item = Location> {
        (0..size as u64).map(move |offset| Location::Memory(address.wrapping_add(offset)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::Register { thread, register } => write!(f, "{}@t{}", register, thread),
            Location::Memory(address) => write!(f, "[{:#x}]", address),
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AnalysisError {
    #[error("{mnemonic} has no encoding with operand shape of \"{disassembly}\"")]
    UnsupportedOperandShape {
        mnemonic: Mnemonic,
        disassembly: String,
    },

    #[error("instruction builder is not configured: missing {0}")]
    IncompleteBuilderConfiguration(&'static str),

    #[error("expression has sort {actual}, expected {expected}")]
    ExpressionWidthMismatch { expected: Sort, actual: Sort },

    #[error("operand value {0:#x} does not name an architectural register")]
    UnknownRegister(u64),

    #[error("unknown register name {0:?}")]
    UnknownRegisterName(String),
}
