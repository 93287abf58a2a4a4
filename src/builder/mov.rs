use super::{immediate, InstructionBuilder, ShapeHandlers};
use crate::{engine::AnalysisError, inst::Inst, processor::AnalysisProcessor};

pub static HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm,
    reg_reg,
    reg_mem,
    mem_imm,
    mem_reg,
};

fn reg_imm(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let dst = ap.register(dst_op)?;

    let expr = immediate(src_op, dst_op.bit_size())?;

    let se = ap.create_reg_se(inst, expr, dst, dst_op.size())?;
    ap.assignment_spread_taint_reg_imm(se, dst);

    Ok(())
}

fn reg_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let (dst, src) = (ap.register(dst_op)?, ap.register(src_op)?);

    let expr = ap.build_symbolic_reg_operand(src, src_op.size())?;

    let se = ap.create_reg_se(inst, expr, dst, dst_op.size())?;
    ap.assignment_spread_taint_reg_reg(se, dst, src);

    Ok(())
}

fn reg_mem(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let dst = ap.register(dst_op)?;

    let expr = ap.build_symbolic_mem_operand(src_op.value(), src_op.size())?;

    let se = ap.create_reg_se(inst, expr, dst, dst_op.size())?;
    ap.assignment_spread_taint_reg_mem(se, dst, src_op.value(), src_op.size());

    Ok(())
}

fn mem_imm(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);

    let expr = immediate(src_op, dst_op.bit_size())?;

    let se = ap.create_mem_se(inst, expr, dst_op.value(), dst_op.size())?;
    ap.assignment_spread_taint_mem_imm(se, dst_op.value(), dst_op.size());

    Ok(())
}

fn mem_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let src = ap.register(src_op)?;

    let expr = ap.build_symbolic_reg_operand(src, src_op.size())?;

    let se = ap.create_mem_se(inst, expr, dst_op.value(), dst_op.size())?;
    ap.assignment_spread_taint_mem_reg(se, dst_op.value(), dst_op.size(), src);

    Ok(())
}
