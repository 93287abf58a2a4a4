//! Two-operand arithmetic and logic with their status flag side effects.
//!
//! ADD, SUB and CMP write CF, OF, SF, ZF, AF and PF. AND, OR and XOR clear CF
//! and OF, write SF, ZF and PF, and leave AF alone. CMP only writes flags.

use super::{immediate, InstructionBuilder, Mnemonic, OperandShape, ShapeHandlers};
use crate::{
    engine::AnalysisError,
    expression::{
        bool_to_flag, bv, bvadd, bvand, bvfalse, bvnot, bvor, bvsub, bvxor, compare, equal,
        extract, CompareOp, ExprRef,
    },
    inst::Inst,
    operand::{Operand, OperandKind},
    processor::AnalysisProcessor,
    register::Register,
};

pub static HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm,
    reg_reg,
    reg_mem,
    mem_imm,
    mem_reg,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Add,
    Sub,
    Cmp,
    And,
    Or,
    Xor,
}

impl Operation {
    pub fn of(mnemonic: Mnemonic) -> Option<Operation> {
        match mnemonic {
            Mnemonic::Add => Some(Operation::Add),
            Mnemonic::Sub => Some(Operation::Sub),
            Mnemonic::Cmp => Some(Operation::Cmp),
            Mnemonic::And => Some(Operation::And),
            Mnemonic::Or => Some(Operation::Or),
            Mnemonic::Xor => Some(Operation::Xor),
            _ => None,
        }
    }

    fn is_logic(self) -> bool {
        matches!(self, Operation::And | Operation::Or | Operation::Xor)
    }

    fn writes_result(self) -> bool {
        self != Operation::Cmp
    }

    fn flags(self) -> &'static [Register] {
        if self.is_logic() {
            &[Register::Cf, Register::Of, Register::Sf, Register::Zf, Register::Pf]
        } else {
            &[
                Register::Cf,
                Register::Of,
                Register::Sf,
                Register::Zf,
                Register::Af,
                Register::Pf,
            ]
        }
    }

    fn result(self, a: ExprRef, b: ExprRef) -> Result<ExprRef, AnalysisError> {
        match self {
            Operation::Add => bvadd(a, b),
            Operation::Sub | Operation::Cmp => bvsub(a, b),
            Operation::And => bvand(a, b),
            Operation::Or => bvor(a, b),
            Operation::Xor => bvxor(a, b),
        }
    }
}

fn msb(value: ExprRef, bits: u32) -> Result<ExprRef, AnalysisError> {
    extract(bits - 1, bits - 1, value)
}

/// `#b1` iff the low byte of `r` has an even number of set bits.
fn parity(r: &ExprRef) -> Result<ExprRef, AnalysisError> {
    let odd = (1..8).try_fold(extract(0, 0, r.clone())?, |p, i| {
        bvxor(p, extract(i, i, r.clone())?)
    })?;

    bvnot(odd)
}

fn flag_expression(
    operation: Operation,
    flag: Register,
    a: &ExprRef,
    b: &ExprRef,
    r: &ExprRef,
    bits: u32,
) -> Result<ExprRef, AnalysisError> {
    use Operation::*;

    match (flag, operation) {
        (Register::Cf, Add) => bool_to_flag(compare(CompareOp::Ult, r.clone(), a.clone())?),
        (Register::Cf, Sub | Cmp) => bool_to_flag(compare(CompareOp::Ult, a.clone(), b.clone())?),
        (Register::Of, Add) => msb(
            bvand(bvxor(a.clone(), r.clone())?, bvxor(b.clone(), r.clone())?)?,
            bits,
        ),
        (Register::Of, Sub | Cmp) => msb(
            bvand(bvxor(a.clone(), b.clone())?, bvxor(a.clone(), r.clone())?)?,
            bits,
        ),
        (Register::Cf | Register::Of, _) => Ok(bvfalse()),
        (Register::Af, _) => extract(4, 4, bvxor(bvxor(a.clone(), b.clone())?, r.clone())?),
        (Register::Sf, _) => msb(r.clone(), bits),
        (Register::Zf, _) => bool_to_flag(equal(r.clone(), bv(0, bits))?),
        (Register::Pf, _) => parity(r),
        _ => Ok(bvfalse()),
    }
}

fn is_zeroing_idiom(operation: Operation, dst: &Operand, src: &Operand) -> bool {
    operation == Operation::Xor && src.kind() == OperandKind::Register && dst == src
}

fn model(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
    shape: OperandShape,
) -> Result<(), AnalysisError> {
    let operation = Operation::of(builder.mnemonic()).ok_or_else(|| builder.unsupported())?;
    let (dst_op, src_op) = (*builder.operand(0)?, *builder.operand(1)?);
    let bits = dst_op.bit_size();
    let zeroing = is_zeroing_idiom(operation, &dst_op, &src_op);

    let a = ap.build_symbolic_operand(&dst_op)?;
    let b = match shape {
        OperandShape::RegImm | OperandShape::MemImm => immediate(&src_op, bits)?,
        _ => ap.build_symbolic_operand(&src_op)?,
    };

    let r = if zeroing {
        bv(0, bits)
    } else {
        operation.result(a.clone(), b.clone())?
    };

    let flags = operation
        .flags()
        .iter()
        .map(|f| Ok((*f, flag_expression(operation, *f, &a, &b, &r, bits)?)))
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    if operation.writes_result() {
        match shape {
            OperandShape::RegImm | OperandShape::RegReg | OperandShape::RegMem => {
                let dst = ap.register(&dst_op)?;
                let se = ap.create_reg_se(inst, r, dst, dst_op.size())?;

                match shape {
                    _ if zeroing => ap.assignment_spread_taint_reg_imm(se, dst),
                    OperandShape::RegImm => ap.union_spread_taint_reg_imm(se, dst),
                    OperandShape::RegReg => {
                        let src = ap.register(&src_op)?;
                        ap.union_spread_taint_reg_reg(se, dst, src)
                    }
                    _ => ap.union_spread_taint_reg_mem(se, dst, src_op.value(), src_op.size()),
                };
            }
            OperandShape::MemImm | OperandShape::MemReg => {
                let (address, size) = (dst_op.value(), dst_op.size());
                let se = ap.create_mem_se(inst, r, address, size)?;

                if shape == OperandShape::MemImm {
                    ap.union_spread_taint_mem_imm(se, address, size);
                } else {
                    let src = ap.register(&src_op)?;
                    ap.union_spread_taint_mem_reg(se, address, size, src);
                }
            }
        }
    }

    let sources = if zeroing { vec![] } else { vec![dst_op, src_op] };

    for (flag, expr) in flags {
        let se = ap.create_flag_se(inst, expr, flag)?;
        ap.assignment_spread_taint_flag(se, flag, &sources)?;
    }

    Ok(())
}

fn reg_imm(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    model(builder, ap, inst, OperandShape::RegImm)
}

fn reg_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    model(builder, ap, inst, OperandShape::RegReg)
}

fn reg_mem(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    model(builder, ap, inst, OperandShape::RegMem)
}

fn mem_imm(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    model(builder, ap, inst, OperandShape::MemImm)
}

fn mem_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    model(builder, ap, inst, OperandShape::MemReg)
}
