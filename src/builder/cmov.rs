//! Conditional moves.
//!
//! The expression always encodes both outcomes of the condition. Taint only
//! follows the move if the condition holds on the concrete flags; when it
//! does not, the destination keeps whatever taint it had.

use super::{unsupported, InstructionBuilder, Mnemonic, ShapeHandlers};
use crate::{
    engine::AnalysisError,
    expression::{bvnot, bvor, bvtrue, bvxor, equal, ite, ExprRef},
    inst::Inst,
    processor::AnalysisProcessor,
    register::Register,
};

pub static HANDLERS: ShapeHandlers = ShapeHandlers {
    reg_imm: unsupported,
    reg_reg,
    reg_mem,
    mem_imm: unsupported,
    mem_reg: unsupported,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Test {
    O,
    B,
    E,
    Be,
    S,
    P,
    L,
    Le,
}

/// Flag test of a condition code, possibly negated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Condition {
    test: Test,
    negated: bool,
}

impl Condition {
    pub fn of(mnemonic: Mnemonic) -> Option<Condition> {
        use Mnemonic::*;

        let (test, negated) = match mnemonic {
            Cmovo => (Test::O, false),
            Cmovno => (Test::O, true),
            Cmovb => (Test::B, false),
            Cmovae => (Test::B, true),
            Cmove => (Test::E, false),
            Cmovne => (Test::E, true),
            Cmovbe => (Test::Be, false),
            Cmova => (Test::Be, true),
            Cmovs => (Test::S, false),
            Cmovns => (Test::S, true),
            Cmovp => (Test::P, false),
            Cmovnp => (Test::P, true),
            Cmovl => (Test::L, false),
            Cmovge => (Test::L, true),
            Cmovle => (Test::Le, false),
            Cmovg => (Test::Le, true),
            _ => return None,
        };

        Some(Condition { test, negated })
    }

    /// 1-bit expression over the current flag versions, `#b1` if the move
    /// happens.
    pub fn predicate(&self, ap: &AnalysisProcessor) -> Result<ExprRef, AnalysisError> {
        let flag = |f: Register| ap.build_symbolic_flag_operand(f);

        let test = match self.test {
            Test::O => flag(Register::Of)?,
            Test::B => flag(Register::Cf)?,
            Test::E => flag(Register::Zf)?,
            Test::Be => bvor(flag(Register::Cf)?, flag(Register::Zf)?)?,
            Test::S => flag(Register::Sf)?,
            Test::P => flag(Register::Pf)?,
            Test::L => bvxor(flag(Register::Sf)?, flag(Register::Of)?)?,
            Test::Le => bvor(
                flag(Register::Zf)?,
                bvxor(flag(Register::Sf)?, flag(Register::Of)?)?,
            )?,
        };

        if self.negated {
            bvnot(test)
        } else {
            Ok(test)
        }
    }

    /// The same test on the concrete flags.
    pub fn evaluate(&self, ap: &AnalysisProcessor) -> bool {
        let flag = |f: Register| ap.flag_value(f);

        let test = match self.test {
            Test::O => flag(Register::Of),
            Test::B => flag(Register::Cf),
            Test::E => flag(Register::Zf),
            Test::Be => flag(Register::Cf) || flag(Register::Zf),
            Test::S => flag(Register::Sf),
            Test::P => flag(Register::Pf),
            Test::L => flag(Register::Sf) != flag(Register::Of),
            Test::Le => flag(Register::Zf) || flag(Register::Sf) != flag(Register::Of),
        };

        test != self.negated
    }
}

fn condition(builder: &InstructionBuilder) -> Result<Condition, AnalysisError> {
    Condition::of(builder.mnemonic()).ok_or_else(|| builder.unsupported())
}

fn reg_reg(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let (dst, src) = (ap.register(dst_op)?, ap.register(src_op)?);
    let condition = condition(builder)?;

    let predicate = condition.predicate(ap)?;
    let dst_expr = ap.build_symbolic_reg_operand(dst, dst_op.size())?;
    let src_expr = ap.build_symbolic_reg_operand(src, src_op.size())?;

    let expr = ite(equal(predicate, bvtrue())?, src_expr, dst_expr)?;

    let se = ap.create_reg_se(inst, expr, dst, dst_op.size())?;

    if condition.evaluate(ap) {
        ap.assignment_spread_taint_reg_reg(se, dst, src);
    }

    Ok(())
}

fn reg_mem(
    builder: &InstructionBuilder,
    ap: &mut AnalysisProcessor,
    inst: &mut Inst,
) -> Result<(), AnalysisError> {
    let (dst_op, src_op) = (builder.operand(0)?, builder.operand(1)?);
    let dst = ap.register(dst_op)?;
    let (address, size) = (src_op.value(), src_op.size());
    let condition = condition(builder)?;

    let predicate = condition.predicate(ap)?;
    let dst_expr = ap.build_symbolic_reg_operand(dst, dst_op.size())?;
    let src_expr = ap.build_symbolic_mem_operand(address, size)?;

    let expr = ite(equal(predicate, bvtrue())?, src_expr, dst_expr)?;

    let se = ap.create_reg_se(inst, expr, dst, dst_op.size())?;

    if condition.evaluate(ap) {
        ap.assignment_spread_taint_reg_mem(se, dst, address, size);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concrete::Snapshot,
        engine::{SymbolicEngine, TaintEngine},
        processor::Statistics,
    };
    use strum::IntoEnumIterator;

    fn concrete(cf: bool, zf: bool, sf: bool, of: bool) -> Snapshot {
        Snapshot::new()
            .with_flag(Register::Cf, cf)
            .with_flag(Register::Zf, zf)
            .with_flag(Register::Sf, sf)
            .with_flag(Register::Of, of)
    }

    fn holds(mnemonic: Mnemonic, concrete: &Snapshot) -> bool {
        let mut symbolic = SymbolicEngine::new();
        let mut taint = TaintEngine::new();
        let mut statistics = Statistics::default();
        let ap = AnalysisProcessor::new(&mut symbolic, &mut taint, &mut statistics, concrete, 0);

        Condition::of(mnemonic).unwrap().evaluate(&ap)
    }

    #[test]
    fn every_cmov_has_a_condition() {
        let conditions = Mnemonic::iter().filter_map(Condition::of).count();

        assert_eq!(conditions, 16);
        assert_eq!(Condition::of(Mnemonic::Mov), None);
    }

    #[test]
    fn signed_conditions_compare_sign_and_overflow() {
        let less = concrete(false, false, true, false);

        assert!(holds(Mnemonic::Cmovl, &less));
        assert!(!holds(Mnemonic::Cmovge, &less));
        assert!(holds(Mnemonic::Cmovle, &less));
        assert!(!holds(Mnemonic::Cmovg, &less));

        let equal = concrete(false, true, true, true);

        assert!(!holds(Mnemonic::Cmovl, &equal));
        assert!(holds(Mnemonic::Cmovle, &equal));
        assert!(holds(Mnemonic::Cmovbe, &equal));
        assert!(!holds(Mnemonic::Cmova, &equal));
    }

    #[test]
    fn predicate_matches_flag_table() {
        let mut symbolic = SymbolicEngine::new();
        let mut taint = TaintEngine::new();
        let mut statistics = Statistics::default();
        let concrete = Snapshot::new();
        let ap = AnalysisProcessor::new(&mut symbolic, &mut taint, &mut statistics, &concrete, 1);

        let render = |m| Condition::of(m).unwrap().predicate(&ap).unwrap().to_string();

        assert_eq!(render(Mnemonic::Cmovo), "of_t1_v0");
        assert_eq!(render(Mnemonic::Cmovae), "(bvnot cf_t1_v0)");
        assert_eq!(render(Mnemonic::Cmovbe), "(bvor cf_t1_v0 zf_t1_v0)");
        assert_eq!(
            render(Mnemonic::Cmovg),
            "(bvnot (bvor zf_t1_v0 (bvxor sf_t1_v0 of_t1_v0)))"
        );
    }
}
