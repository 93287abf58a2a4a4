//! Stack pushes and pops.
//!
//! The decoder resolves the stack slot, so the memory operand already names
//! the bytes below (PUSH) or at (POP) the current stack pointer. Both move
//! RSP by the slot size; RSP keeps its own taint.

use super::{immediate, unsupported, InstructionBuilder, ShapeHandlers};
use crate::{
    engine::AnalysisError,
    expression::{bv, bvadd, bvsub},
    inst::Inst,
    processor::AnalysisProcessor,
    register::Register,
};

pub static PUSH_HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm: unsupported,
    reg_reg: unsupported,
    reg_mem: unsupported,
    mem_imm: push_imm,
    mem_reg: push_reg,
};

pub static POP_HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm: unsupported,
    reg_reg: unsupported,
    reg_mem: pop_reg,
    mem_imm: unsupported,
    mem_reg: unsupported,
};

fn move_stack_pointer(
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
    size: u32,
    grow: bool,
) -> Result<(), AnalysisError> {
    let rsp = ap.build_symbolic_reg_operand(Register::Rsp, 8)?;
    let delta = bv(size as u64, 64);

    let expr = if grow {
        bvsub(rsp, delta)?
    } else {
        bvadd(rsp, delta)?
    };

    let se = ap.create_reg_se(inst, expr, Register::Rsp, 8)?;
    ap.assignment_spread_taint_reg_reg(se, Register::Rsp, Register::Rsp);

    Ok(())
}

fn push_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (slot, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let src = ap.register(src_op)?;
    let (address, size) = (slot.value(), slot.size());

    // `push rsp` stores the value before the decrement.
    let value = ap.build_symbolic_reg_operand(src, src_op.size())?;

    move_stack_pointer(ap, inst, size, true)?;

    let se = ap.create_mem_se(inst, value, address, size)?;
    ap.assignment_spread_taint_mem_reg(se, address, size, src);

    Ok(())
}

fn push_imm(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (slot, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let (address, size) = (slot.value(), slot.size());

    let value = immediate(src_op, slot.bit_size())?;

    move_stack_pointer(ap, inst, size, true)?;

    let se = ap.create_mem_se(inst, value, address, size)?;
    ap.assignment_spread_taint_mem_imm(se, address, size);

    Ok(())
}

fn pop_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, slot) = (builder.operand(0)?, builder.operand(1)?);
    let dst = ap.register(dst_op)?;
    let (address, size) = (slot.value(), slot.size());

    let value = ap.build_symbolic_mem_operand(address, size)?;

    // Written last, so `pop rsp` ends with the loaded value.
    move_stack_pointer(ap, inst, size, false)?;

    let se = ap.create_reg_se(inst, value, dst, dst_op.size())?;
    ap.assignment_spread_taint_reg_mem(se, dst, address, size);

    Ok(())
}
