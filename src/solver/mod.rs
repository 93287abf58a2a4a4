pub mod external;
pub mod smt;

pub use self::{external::*, smt::*};

use crate::{
    engine::SymbolicElement,
    expression::{ExprRef, Sort, SymbolRef},
};
use log::debug;
use std::{
    collections::{BTreeSet, HashMap},
    convert::From,
    io,
};
use thiserror::Error;

pub type Model = HashMap<SymbolRef, u64>;

/// Definitions recorded by a sequence of symbolic elements.
#[derive(Clone, Debug, Default)]
pub struct Formula<'a> {
    elements: Vec<&'a SymbolicElement>,
}

impl<'a> Formula<'a> {
    pub fn new<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = &'a SymbolicElement>,
    {
        Self {
            elements: elements.into_iter().collect(),
        }
    }

    pub fn elements(&self) -> &[&'a SymbolicElement] {
        &self.elements
    }

    /// Every defined location version with its full-width value, in
    /// creation order.
    pub fn definitions(&self) -> impl Iterator<Item = &'a (SymbolRef, ExprRef)> + '_ {
        self.elements
            .iter()
            .copied()
            .flat_map(|e| e.definitions().iter())
    }

    /// Symbols `exprs` reference that no element of the formula defines.
    pub fn undefined<'e, I>(&self, exprs: I) -> BTreeSet<SymbolRef>
    where
        I: IntoIterator<Item = &'e ExprRef>,
    {
        let defined = self.definitions().map(|(s, _)| *s).collect::<BTreeSet<_>>();

        exprs
            .into_iter()
            .flat_map(|e| e.symbols())
            .filter(|s| !defined.contains(s))
            .collect()
    }

    /// Location versions the formula reads but never writes.
    pub fn inputs(&self) -> BTreeSet<SymbolRef> {
        self.undefined(self.definitions().map(|(_, e)| e))
    }
}

pub trait Solver: Default {
    fn name() -> &'static str;

    /// Looks for values of the formula's inputs under which `assertion`
    /// holds.
    fn solve(&self, formula: &Formula, assertion: &ExprRef) -> Result<Option<Model>, SolverError> {
        debug!("try to solve with {} solver", Self::name());

        if assertion.sort() != Sort::Bool {
            return Err(SolverError::InvalidAssertion(assertion.sort()));
        }

        time_debug!("finished solving formula", {
            self.solve_impl(formula, assertion)
        })
    }

    fn solve_impl(
        &self,
        formula: &Formula,
        assertion: &ExprRef,
    ) -> Result<Option<Model>, SolverError>;
}

#[derive(Debug, Error, Clone)]
pub enum SolverError {
    #[error("failed to compute satisfiability within the given limits")]
    SatUnknown,

    #[error("assertion has sort {0}, expected Bool")]
    InvalidAssertion(Sort),

    #[error("solver failed with IO error")]
    IoError(String),
}

impl From<io::Error> for SolverError {
    fn from(err: io::Error) -> Self {
        SolverError::IoError(err.to_string())
    }
}
