use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub const NUMBER_OF_REGISTERS: usize = 25;

/// Registers holding the first six integer arguments of a call (System V AMD64).
pub const ARGUMENT_REGISTERS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

/// Architectural registers and status flags tracked by the engines.
///
/// The discriminant is the id the decoder reports in a register operand's
/// value. Flags are modeled as 1-bit registers.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    Rax = 0,
    Rbx = 1,
    Rcx = 2,
    Rdx = 3,
    Rdi = 4,
    Rsi = 5,
    Rbp = 6,
    Rsp = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
    Cf = 16,
    Pf = 17,
    Af = 18,
    Zf = 19,
    Sf = 20,
    Tf = 21,
    If = 22,
    Df = 23,
    Of = 24,
}

impl Register {
    pub fn from_id(id: u64) -> Option<Register> {
        Register::iter().find(|r| r.id() == id)
    }

    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn is_flag(self) -> bool {
        self.id() >= Register::Cf.id()
    }

    /// Width of the full architectural register in bits.
    pub fn bit_size(self) -> u32 {
        if self.is_flag() {
            1
        } else {
            64
        }
    }

    pub fn flags() -> impl Iterator<Item = Register> {
        Register::iter().filter(|r| r.is_flag())
    }
}
