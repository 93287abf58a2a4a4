use crate::{engine::AnalysisError, expression::Sort, register::Register};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest memory access or immediate the engines model, in bytes.
pub const MAX_ACCESS_SIZE: u32 = 8;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    Register,
    Memory,
    Immediate,
}

/// One decoded operand of an instruction occurrence.
///
/// `value` holds the register id, the effective address or the immediate,
/// depending on `kind`. `size` is in bytes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    kind: OperandKind,
    value: u64,
    size: u32,
}

impl Operand {
    pub fn new(kind: OperandKind, value: u64, size: u32) -> Self {
        Self { kind, value, size }
    }

    pub fn register(register: Register, size: u32) -> Self {
        Self::new(OperandKind::Register, register.id(), size)
    }

    pub fn memory(address: u64, size: u32) -> Self {
        Self::new(OperandKind::Memory, address, size)
    }

    pub fn immediate(value: u64, size: u32) -> Self {
        Self::new(OperandKind::Immediate, value, size)
    }

    pub fn kind(&self) -> OperandKind {
        self.kind
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn bit_size(&self) -> u32 {
        self.size.saturating_mul(8)
    }

    /// Rejects sizes no general purpose register, memory access or
    /// immediate of the modeled instructions can have.
    pub fn check_size(&self) -> Result<(), AnalysisError> {
        let valid = match self.kind {
            OperandKind::Register => matches!(self.size, 1 | 2 | 4 | 8),
            OperandKind::Memory | OperandKind::Immediate => {
                (1..=MAX_ACCESS_SIZE).contains(&self.size)
            }
        };

        if valid {
            Ok(())
        } else {
            Err(AnalysisError::ExpressionWidthMismatch {
                expected: Sort::BitVec(MAX_ACCESS_SIZE * 8),
                actual: Sort::BitVec(self.bit_size()),
            })
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            OperandKind::Register => match Register::from_id(self.value) {
                Some(r) => write!(f, "{}:{}", r, self.size),
                None => write!(f, "reg#{}:{}", self.value, self.size),
            },
            OperandKind::Memory => write!(f, "[{:#x}]:{}", self.value, self.size),
            OperandKind::Immediate => write!(f, "{:#x}:{}", self.value, self.size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_checked_per_kind() {
        assert!(Operand::register(Register::Rax, 4).check_size().is_ok());
        assert!(Operand::register(Register::Rax, 3).check_size().is_err());
        assert!(Operand::memory(0x1000, 8).check_size().is_ok());
        assert!(Operand::memory(0x1000, 1_000_000).check_size().is_err());
        assert!(Operand::immediate(1, 0).check_size().is_err());

        assert_eq!(
            Operand::register(Register::Rax, 0x2000_0000).check_size(),
            Err(AnalysisError::ExpressionWidthMismatch {
                expected: Sort::BitVec(64),
                actual: Sort::BitVec(u32::MAX),
            })
        );
    }
}
