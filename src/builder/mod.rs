//! Per-mnemonic semantic models.
//!
//! Every mnemonic owns a table with one handler per operand shape. A handler
//! builds the expressions of all write effects, records them as symbolic
//! elements and spreads taint. Shapes the instruction set has no encoding
//! for are wired to [`unsupported`].

pub mod alu;
pub mod cmov;
pub mod mov;
pub mod stack;

use crate::{
    engine::AnalysisError,
    expression::{self, ExprRef, Sort},
    inst::Inst,
    operand::{Operand, OperandKind},
    processor::AnalysisProcessor,
};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

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
    PartialEq,
    Serialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mnemonic {
    Cmovo,
    Cmovno,
    Cmovb,
    Cmovae,
    Cmove,
    Cmovne,
    Cmovbe,
    Cmova,
    Cmovs,
    Cmovns,
    Cmovp,
    Cmovnp,
    Cmovl,
    Cmovge,
    Cmovle,
    Cmovg,
    Mov,
    Add,
    Sub,
    Cmp,
    And,
    Or,
    Xor,
    Push,
    Pop,
    /// Any instruction without a semantic model. It is kept in the trace
    /// without elements.
    Unmodeled,
}

impl<'de> Deserialize<'de> for Mnemonic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;

        Ok(Mnemonic::from_str(&name).unwrap_or(Mnemonic::Unmodeled))
    }
}

impl Mnemonic {
    pub fn handlers(self) -> &'static ShapeHandlers {
        use Mnemonic::*;

        match self {
            Cmovo | Cmovno | Cmovb | Cmovae | Cmove | Cmovne | Cmovbe | Cmova | Cmovs
            | Cmovns | Cmovp | Cmovnp | Cmovl | Cmovge | Cmovle | Cmovg => &cmov::HANDLERS,
            Mov => &mov::HANDLERS,
            Add | Sub | Cmp | And | Or | Xor => &alu::HANDLERS,
            Push => &stack::PUSH_HANDLERS,
            Pop => &stack::POP_HANDLERS,
            Unmodeled => &NO_HANDLERS,
        }
    }
}

/// Kinds of the (destination, source) operand pair.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum OperandShape {
    RegImm,
    RegReg,
    RegMem,
    MemImm,
    MemReg,
}

impl OperandShape {
    pub fn of(operands: &[Operand]) -> Option<OperandShape> {
        use OperandKind::*;

        match operands {
            [dst, src] => match (dst.kind(), src.kind()) {
                (Register, Immediate) => Some(OperandShape::RegImm),
                (Register, Register) => Some(OperandShape::RegReg),
                (Register, Memory) => Some(OperandShape::RegMem),
                (Memory, Immediate) => Some(OperandShape::MemImm),
                (Memory, Register) => Some(OperandShape::MemReg),
                _ => None,
            },
            _ => None,
        }
    }
}

pub type ShapeHandler = fn(
    &InstructionBuilder,
    &mut AnalysisProcessor<'_>,
    &mut Inst,
) -> Result<(), AnalysisError>;

pub struct ShapeHandlers {
    pub reg_imm: ShapeHandler,
    pub reg_reg: ShapeHandler,
    pub reg_mem: ShapeHandler,
    pub mem_imm: ShapeHandler,
    pub mem_reg: ShapeHandler,
}

impl ShapeHandlers {
    pub fn get(&self, shape: OperandShape) -> ShapeHandler {
        match shape {
            OperandShape::RegImm => self.reg_imm,
            OperandShape::RegReg => self.reg_reg,
            OperandShape::RegMem => self.reg_mem,
            OperandShape::MemImm => self.mem_imm,
            OperandShape::MemReg => self.mem_reg,
        }
    }
}

static NO_HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm: unsupported,
    reg_reg: unsupported,
    reg_mem: unsupported,
    mem_imm: unsupported,
    mem_reg: unsupported,
};

pub fn unsupported(
    builder: &InstructionBuilder,
    _: &mut AnalysisProcessor<'_>,
    _: &mut Inst,
) -> Result<(), AnalysisError> {
    Err(builder.unsupported())
}

/// Sign-extends an encoded immediate to `bits`.
pub(crate) fn immediate(operand: &Operand, bits: u32) -> Result<ExprRef, AnalysisError> {
    let from = operand.bit_size();

    if from == 0 || from > bits || from > 64 {
        return Err(AnalysisError::ExpressionWidthMismatch {
            expected: Sort::BitVec(bits),
            actual: Sort::BitVec(from),
        });
    }

    let value = if from == 64 {
        operand.value()
    } else {
        let value = operand.value() & ((1_u64 << from) - 1);

        if value >> (from - 1) == 1 {
            value | (u64::MAX << from)
        } else {
            value
        }
    };

    Ok(expression::bv(value, bits))
}

/// Configuration of one instruction occurrence, handed over by the decoder.
#[derive(Clone, Debug)]
pub struct InstructionBuilder {
    mnemonic: Mnemonic,
    address: Option<u64>,
    disassembly: Option<String>,
    operands: Option<Vec<Operand>>,
    size: Option<u64>,
}

impl InstructionBuilder {
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            address: None,
            disassembly: None,
            operands: None,
            size: None,
        }
    }

    pub fn address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    pub fn disassembly(mut self, disassembly: &str) -> Self {
        self.disassembly = Some(disassembly.to_owned());
        self
    }

    pub fn operands(mut self, operands: Vec<Operand>) -> Self {
        self.operands = Some(operands);
        self
    }

    /// Length of the encoded instruction in bytes.
    pub fn instruction_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    pub fn instruction_address(&self) -> Option<u64> {
        self.address
    }

    pub fn disassembly_text(&self) -> &str {
        self.disassembly.as_deref().unwrap_or_default()
    }

    pub fn operand(&self, index: usize) -> Result<&Operand, AnalysisError> {
        self.operands
            .as_ref()
            .and_then(|o| o.get(index))
            .ok_or_else(|| self.unsupported())
    }

    pub fn shape(&self) -> Option<OperandShape> {
        self.operands.as_deref().and_then(OperandShape::of)
    }

    pub(crate) fn unsupported(&self) -> AnalysisError {
        AnalysisError::UnsupportedOperandShape {
            mnemonic: self.mnemonic,
            disassembly: self.disassembly_text().to_owned(),
        }
    }

    pub fn check_setup(&self) -> Result<(), AnalysisError> {
        if self.address.is_none() {
            return Err(AnalysisError::IncompleteBuilderConfiguration("address"));
        }
        if self.disassembly.is_none() {
            return Err(AnalysisError::IncompleteBuilderConfiguration("disassembly"));
        }
        let operands = self
            .operands
            .as_ref()
            .ok_or(AnalysisError::IncompleteBuilderConfiguration("operands"))?;

        if self.mnemonic == Mnemonic::Unmodeled {
            return Ok(());
        }

        operands.iter().try_for_each(Operand::check_size)
    }

    /// Runs the handler registered for `shape`, which has to be the shape of
    /// the configured operands.
    pub fn handle(
        &self,
        shape: OperandShape,
        ap: &mut AnalysisProcessor,
        inst: &mut Inst,
    ) -> Result<(), AnalysisError> {
        if self.shape() != Some(shape) {
            return Err(self.unsupported());
        }

        (self.mnemonic.handlers().get(shape))(self, ap, inst)
    }

    fn dispatch(&self, ap: &mut AnalysisProcessor, inst: &mut Inst) -> Result<(), AnalysisError> {
        let shape = self.shape().ok_or_else(|| self.unsupported())?;

        debug!("{} {}: {}", self.mnemonic, shape, self.disassembly_text());

        self.handle(shape, ap, inst)
    }

    /// Models the instruction against the engines behind `ap`.
    ///
    /// Either every write effect is recorded and the new [`Inst`] returned,
    /// or the engines are left exactly as they were.
    pub fn process(&self, ap: &mut AnalysisProcessor) -> Result<Inst, AnalysisError> {
        self.check_setup()?;

        let address = self.address.unwrap_or_default();
        let mut inst = Inst::new(ap.thread_id(), address, self.disassembly_text());

        if self.mnemonic == Mnemonic::Unmodeled {
            debug!("not modeled: {}", self.disassembly_text());

            ap.statistics_mut().unmodeled += 1;
        } else {
            ap.transaction(|ap| self.dispatch(ap, &mut inst))?;

            ap.inc_number_of_expressions(inst.number_of_elements());
        }

        ap.statistics_mut().instructions += 1;

        inst.set_next_address(self.size.map(|size| address.wrapping_add(size)));

        Ok(inst)
    }
}
