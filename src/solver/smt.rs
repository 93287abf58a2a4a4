//! SMT-LIB2 rendering of recorded definitions.
//!
//! Initial versions become `declare-fun`s, every written version a
//! `define-fun` over earlier ones, so a script can be extended with
//! assertions and handed to any QF_BV solver.

use super::Formula;
use crate::expression::SymbolRef;
use std::{collections::BTreeSet, io::Write};

pub fn write_declarations<W>(out: &mut W, symbols: &BTreeSet<SymbolRef>) -> std::io::Result<()>
where
    W: Write + ?Sized,
{
    symbols
        .iter()
        .try_for_each(|s| writeln!(out, "(declare-fun {} () (_ BitVec {}))", s, s.bits()))
}

pub fn write_definitions<W>(out: &mut W, formula: &Formula) -> std::io::Result<()>
where
    W: Write + ?Sized,
{
    formula.definitions().try_for_each(|(symbol, expr)| {
        writeln!(
            out,
            "(define-fun {} () (_ BitVec {}) {})",
            symbol,
            symbol.bits(),
            expr
        )
    })
}

/// Complete script for `formula`, starting with the logic declaration.
pub fn export<W>(out: &mut W, formula: &Formula) -> std::io::Result<()>
where
    W: Write + ?Sized,
{
    writeln!(out, "(set-logic QF_BV)")?;

    write_declarations(out, &formula.inputs())?;
    write_definitions(out, formula)
}

pub fn to_smt2(formula: &Formula) -> String {
    let mut buffer = Vec::new();

    export(&mut buffer, formula).expect("writing to a Vec does not fail");

    String::from_utf8_lossy(&buffer).into_owned()
}
