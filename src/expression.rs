//! Bit-vector expressions describing instruction semantics.
//!
//! Expressions are immutable trees shared through [`ExprRef`]. Leaves are
//! literals or references to a register/memory byte at a given version.
//! Every constructor checks operand sorts, so a well-formed tree always has
//! a width that matches what it computes. `Display` renders SMT-LIB2 terms.

use crate::engine::{AnalysisError, Location, Version};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc};

pub type ExprRef = Arc<Expr>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sort {
    Bool,
    BitVec(u32),
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(bits) => write!(f, "(_ BitVec {})", bits),
        }
    }
}

/// A register or memory byte as of one particular write.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SymbolRef {
    pub location: Location,
    pub version: Version,
}

impl SymbolRef {
    pub fn new(location: Location, version: Version) -> Self {
        Self { location, version }
    }

    pub fn bits(&self) -> u32 {
        self.location.bit_size()
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.location {
            Location::Register { thread, register } => {
                write!(f, "{}_t{}_v{}", register, thread, self.version)
            }
            Location::Memory(address) => write!(f, "mem_{:#x}_v{}", address, self.version),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Udiv,
    Urem,
    Sdiv,
    Srem,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompareOp {
    Eq,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

fn unary_to_smt(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "bvnot",
        UnaryOp::Neg => "bvneg",
    }
}

fn binary_to_smt(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "bvadd",
        BinaryOp::Sub => "bvsub",
        BinaryOp::Mul => "bvmul",
        BinaryOp::Udiv => "bvudiv",
        BinaryOp::Urem => "bvurem",
        BinaryOp::Sdiv => "bvsdiv",
        BinaryOp::Srem => "bvsrem",
        BinaryOp::And => "bvand",
        BinaryOp::Or => "bvor",
        BinaryOp::Xor => "bvxor",
        BinaryOp::Shl => "bvshl",
        BinaryOp::Lshr => "bvlshr",
        BinaryOp::Ashr => "bvashr",
    }
}

fn compare_to_smt(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ult => "bvult",
        CompareOp::Ule => "bvule",
        CompareOp::Ugt => "bvugt",
        CompareOp::Uge => "bvuge",
        CompareOp::Slt => "bvslt",
        CompareOp::Sle => "bvsle",
        CompareOp::Sgt => "bvsgt",
        CompareOp::Sge => "bvsge",
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Expr {
    Bool(bool),
    Const {
        value: u64,
        bits: u32,
    },
    Symbol(SymbolRef),
    Unary {
        op: UnaryOp,
        value: ExprRef,
    },
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
    },
    Compare {
        op: CompareOp,
        left: ExprRef,
        right: ExprRef,
    },
    Ite {
        condition: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
    },
    Extract {
        high: u32,
        low: u32,
        value: ExprRef,
    },
    Concat {
        high: ExprRef,
        low: ExprRef,
    },
    ZeroExtend {
        bits: u32,
        value: ExprRef,
    },
    SignExtend {
        bits: u32,
        value: ExprRef,
    },
}

impl Expr {
    pub fn sort(&self) -> Sort {
        match self {
            Expr::Bool(_) | Expr::Compare { .. } => Sort::Bool,
            Expr::Const { bits, .. } => Sort::BitVec(*bits),
            Expr::Symbol(symbol) => Sort::BitVec(symbol.bits()),
            Expr::Unary { value, .. } => value.sort(),
            Expr::Binary { left, .. } => left.sort(),
            Expr::Ite { then, .. } => then.sort(),
            Expr::Extract { high, low, .. } => Sort::BitVec(high - low + 1),
            Expr::Concat { high, low } => Sort::BitVec(bits_of(high) + bits_of(low)),
            Expr::ZeroExtend { bits, value } | Expr::SignExtend { bits, value } => {
                Sort::BitVec(bits + bits_of(value))
            }
        }
    }

    /// Width in bits, `None` for boolean terms.
    pub fn bits(&self) -> Option<u32> {
        match self.sort() {
            Sort::BitVec(bits) => Some(bits),
            Sort::Bool => None,
        }
    }

    /// All register/memory versions this expression reads.
    pub fn symbols(&self) -> BTreeSet<SymbolRef> {
        let mut symbols = BTreeSet::new();

        self.collect_symbols(&mut symbols);

        symbols
    }

    fn collect_symbols(&self, out: &mut BTreeSet<SymbolRef>) {
        match self {
            Expr::Bool(_) | Expr::Const { .. } => {}
            Expr::Symbol(symbol) => {
                out.insert(*symbol);
            }
            Expr::Unary { value, .. }
            | Expr::Extract { value, .. }
            | Expr::ZeroExtend { value, .. }
            | Expr::SignExtend { value, .. } => value.collect_symbols(out),
            Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Expr::Ite {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_symbols(out);
                then.collect_symbols(out);
                otherwise.collect_symbols(out);
            }
            Expr::Concat { high, low } => {
                high.collect_symbols(out);
                low.collect_symbols(out);
            }
        }
    }
}

fn bits_of(e: &Expr) -> u32 {
    e.bits().unwrap_or(0)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Const { value, bits } => write!(f, "(_ bv{} {})", value, bits),
            Expr::Symbol(symbol) => write!(f, "{}", symbol),
            Expr::Unary { op, value } => write!(f, "({} {})", unary_to_smt(*op), value),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", binary_to_smt(*op), left, right)
            }
            Expr::Compare { op, left, right } => {
                write!(f, "({} {} {})", compare_to_smt(*op), left, right)
            }
            Expr::Ite {
                condition,
                then,
                otherwise,
            } => write!(f, "(ite {} {} {})", condition, then, otherwise),
            Expr::Extract { high, low, value } => {
                write!(f, "((_ extract {} {}) {})", high, low, value)
            }
            Expr::Concat { high, low } => write!(f, "(concat {} {})", high, low),
            Expr::ZeroExtend { bits, value } => write!(f, "((_ zero_extend {}) {})", bits, value),
            Expr::SignExtend { bits, value } => write!(f, "((_ sign_extend {}) {})", bits, value),
        }
    }
}

//
// Constructors
//

fn mismatch(expected: Sort, actual: Sort) -> AnalysisError {
    AnalysisError::ExpressionWidthMismatch { expected, actual }
}

pub fn expect_sort(e: &Expr, expected: Sort) -> Result<(), AnalysisError> {
    let actual = e.sort();

    if actual == expected {
        Ok(())
    } else {
        Err(mismatch(expected, actual))
    }
}

fn expect_bitvec(e: &Expr) -> Result<u32, AnalysisError> {
    e.bits().ok_or_else(|| mismatch(Sort::BitVec(1), Sort::Bool))
}

fn mask(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1_u64 << bits) - 1)
    }
}

/// Bit-vector literal, truncated to `bits`.
pub fn bv(value: u64, bits: u32) -> ExprRef {
    debug_assert!(bits > 0 && bits <= 64, "literals are 1 to 64 bits wide");

    Arc::new(Expr::Const {
        value: mask(value, bits),
        bits,
    })
}

pub fn bvtrue() -> ExprRef {
    bv(1, 1)
}

pub fn bvfalse() -> ExprRef {
    bv(0, 1)
}

pub fn boolean(value: bool) -> ExprRef {
    Arc::new(Expr::Bool(value))
}

pub fn symbol(symbol: SymbolRef) -> ExprRef {
    Arc::new(Expr::Symbol(symbol))
}

pub fn equal(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_sort(&right, left.sort())?;

    Ok(Arc::new(Expr::Compare {
        op: CompareOp::Eq,
        left,
        right,
    }))
}

pub fn compare(op: CompareOp, left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    let bits = expect_bitvec(&left)?;
    expect_sort(&right, Sort::BitVec(bits))?;

    Ok(Arc::new(Expr::Compare { op, left, right }))
}

pub fn ite(condition: ExprRef, then: ExprRef, otherwise: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_sort(&condition, Sort::Bool)?;
    expect_sort(&otherwise, then.sort())?;

    Ok(Arc::new(Expr::Ite {
        condition,
        then,
        otherwise,
    }))
}

pub fn unary(op: UnaryOp, value: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_bitvec(&value)?;

    Ok(Arc::new(Expr::Unary { op, value }))
}

pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    let bits = expect_bitvec(&left)?;
    expect_sort(&right, Sort::BitVec(bits))?;

    Ok(Arc::new(Expr::Binary { op, left, right }))
}

pub fn bvnot(value: ExprRef) -> Result<ExprRef, AnalysisError> {
    unary(UnaryOp::Not, value)
}

pub fn bvadd(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    binary(BinaryOp::Add, left, right)
}

pub fn bvsub(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    binary(BinaryOp::Sub, left, right)
}

pub fn bvand(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    binary(BinaryOp::And, left, right)
}

pub fn bvor(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    binary(BinaryOp::Or, left, right)
}

pub fn bvxor(left: ExprRef, right: ExprRef) -> Result<ExprRef, AnalysisError> {
    binary(BinaryOp::Xor, left, right)
}

pub fn extract(high: u32, low: u32, value: ExprRef) -> Result<ExprRef, AnalysisError> {
    let bits = expect_bitvec(&value)?;

    if low > high || high >= bits {
        return Err(mismatch(Sort::BitVec(high + 1), Sort::BitVec(bits)));
    }

    if low == 0 && high + 1 == bits {
        return Ok(value);
    }

    Ok(Arc::new(Expr::Extract { high, low, value }))
}

pub fn concat(high: ExprRef, low: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_bitvec(&high)?;
    expect_bitvec(&low)?;

    Ok(Arc::new(Expr::Concat { high, low }))
}

pub fn zx(bits: u32, value: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_bitvec(&value)?;

    if bits == 0 {
        return Ok(value);
    }

    Ok(Arc::new(Expr::ZeroExtend { bits, value }))
}

pub fn sx(bits: u32, value: ExprRef) -> Result<ExprRef, AnalysisError> {
    expect_bitvec(&value)?;

    if bits == 0 {
        return Ok(value);
    }

    Ok(Arc::new(Expr::SignExtend { bits, value }))
}

/// Turns a boolean term into a 1-bit vector (`#b1` when it holds).
pub fn bool_to_flag(condition: ExprRef) -> Result<ExprRef, AnalysisError> {
    ite(condition, bvtrue(), bvfalse())
}
