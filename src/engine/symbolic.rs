use super::{AnalysisError, ElementId, JournaledMap, Location, ThreadId, Version};
use crate::{
    expression::{self, ExprRef, Sort, SymbolRef},
    operand::{Operand, OperandKind},
    register::Register,
};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest version of a location and the element that produced it.
///
/// Version 0 is the unconstrained value a location holds before the first
/// recorded write; it has no producing element.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: Version,
    pub element: Option<ElementId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    Register {
        thread: ThreadId,
        register: Register,
        size: u32,
        version: Version,
    },
    Memory {
        address: u64,
        size: u32,
        versions: Vec<Version>,
    },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Destination::Register {
                thread,
                register,
                version,
                ..
            } => write!(f, "{}_t{}_v{}", register, thread, version),
            Destination::Memory { address, size, .. } => {
                write!(f, "[{:#x}..{:#x}]", address, address.wrapping_add(*size as u64))
            }
        }
    }
}

/// The record of one write effect of one instruction occurrence.
#[derive(Clone, Debug)]
pub struct SymbolicElement {
    id: ElementId,
    expression: ExprRef,
    destination: Destination,
    definitions: Vec<(SymbolRef, ExprRef)>,
    tainted: bool,
}

impl SymbolicElement {
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The value written, at the width of the destination operand.
    pub fn expression(&self) -> &ExprRef {
        &self.expression
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Full-width value of every location version this element created:
    /// one entry for a register, one per byte for memory.
    pub fn definitions(&self) -> &[(SymbolRef, ExprRef)] {
        &self.definitions
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub(crate) fn set_tainted(&mut self, tainted: bool) {
        self.tainted = tainted;
    }
}

impl fmt::Display for SymbolicElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{} {} := {}{}",
            self.id,
            self.destination,
            self.expression,
            if self.tainted { " [tainted]" } else { "" }
        )
    }
}

fn register_bits(register: Register, size: u32) -> Result<u32, AnalysisError> {
    if register.is_flag() {
        return Ok(1);
    }

    match size {
        1 | 2 | 4 | 8 => Ok(size * 8),
        _ => Err(AnalysisError::ExpressionWidthMismatch {
            expected: Sort::BitVec(register.bit_size()),
            actual: Sort::BitVec(size.saturating_mul(8)),
        }),
    }
}

/// Versioned symbolic state of every register and memory byte.
#[derive(Debug, Default)]
pub struct SymbolicEngine {
    versions: JournaledMap<Location, VersionEntry>,
    next_element: ElementId,
    saved_next_element: Option<ElementId>,
}

impl SymbolicEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version_entry(&self, location: Location) -> VersionEntry {
        self.versions.get(&location).copied().unwrap_or_default()
    }

    pub fn current_version(&self, location: Location) -> Version {
        self.version_entry(location).version
    }

    /// Id the next created element will get.
    pub fn next_element_id(&self) -> ElementId {
        self.next_element
    }

    fn current_symbol(&self, location: Location) -> ExprRef {
        expression::symbol(SymbolRef::new(location, self.current_version(location)))
    }

    pub fn read_register(
        &self,
        thread: ThreadId,
        register: Register,
        size: u32,
    ) -> Result<ExprRef, AnalysisError> {
        let bits = register_bits(register, size)?;
        let full = self.current_symbol(Location::register(thread, register));

        expression::extract(bits - 1, 0, full)
    }

    /// Little-endian concatenation of the current version of every byte.
    pub fn read_memory(&self, address: u64, size: u32) -> Result<ExprRef, AnalysisError> {
        Operand::memory(address, size).check_size()?;

        let mut bytes = Location::memory_range(address, size).map(|l| self.current_symbol(l));

        let first = bytes.next().ok_or(AnalysisError::ExpressionWidthMismatch {
            expected: Sort::BitVec(8),
            actual: Sort::BitVec(0),
        })?;

        bytes.try_fold(first, |low, high| expression::concat(high, low))
    }

    pub fn read_operand(
        &self,
        thread: ThreadId,
        operand: &Operand,
    ) -> Result<ExprRef, AnalysisError> {
        match operand.kind() {
            OperandKind::Register => {
                let register = Register::from_id(operand.value())
                    .ok_or(AnalysisError::UnknownRegister(operand.value()))?;

                self.read_register(thread, register, operand.size())
            }
            OperandKind::Memory => self.read_memory(operand.value(), operand.size()),
            OperandKind::Immediate => {
                operand.check_size()?;

                Ok(expression::bv(operand.value(), operand.bit_size()))
            }
        }
    }

    /// Records `expr` as the new value of the low `size` bytes of `register`.
    ///
    /// 32-bit writes clear the upper half, 8 and 16-bit writes keep the
    /// untouched bits of the previous version, following x86-64.
    pub fn write_register(
        &mut self,
        thread: ThreadId,
        register: Register,
        size: u32,
        expr: ExprRef,
    ) -> Result<SymbolicElement, AnalysisError> {
        let bits = register_bits(register, size)?;
        expression::expect_sort(&expr, Sort::BitVec(bits))?;

        let location = Location::register(thread, register);
        let full_bits = register.bit_size();

        let definition = if bits == full_bits {
            expr.clone()
        } else if bits == 32 {
            expression::zx(32, expr.clone())?
        } else {
            let previous = self.current_symbol(location);
            expression::concat(
                expression::extract(full_bits - 1, bits, previous)?,
                expr.clone(),
            )?
        };

        let id = self.allocate_element();
        let version = self.current_version(location) + 1;

        self.versions.insert(
            location,
            VersionEntry {
                version,
                element: Some(id),
            },
        );

        trace!("#{}: {}_t{}_v{} := {}", id, register, thread, version, expr);

        Ok(SymbolicElement {
            id,
            expression: expr,
            destination: Destination::Register {
                thread,
                register,
                size,
                version,
            },
            definitions: vec![(SymbolRef::new(location, version), definition)],
            tainted: false,
        })
    }

    pub fn write_memory(
        &mut self,
        address: u64,
        size: u32,
        expr: ExprRef,
    ) -> Result<SymbolicElement, AnalysisError> {
        Operand::memory(address, size).check_size()?;
        expression::expect_sort(&expr, Sort::BitVec(size * 8))?;

        // Slice every byte before the first version is allocated.
        let slices = (0..size)
            .map(|i| expression::extract(i * 8 + 7, i * 8, expr.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.allocate_element();

        let mut versions = Vec::with_capacity(size as usize);
        let mut definitions = Vec::with_capacity(size as usize);

        for (location, slice) in Location::memory_range(address, size).zip(slices) {
            let version = self.current_version(location) + 1;

            self.versions.insert(
                location,
                VersionEntry {
                    version,
                    element: Some(id),
                },
            );

            versions.push(version);
            definitions.push((SymbolRef::new(location, version), slice));
        }

        trace!("#{}: [{:#x}; {}] := {}", id, address, size, expr);

        Ok(SymbolicElement {
            id,
            expression: expr,
            destination: Destination::Memory {
                address,
                size,
                versions,
            },
            definitions,
            tainted: false,
        })
    }

    fn allocate_element(&mut self) -> ElementId {
        let id = self.next_element;

        self.next_element += 1;

        id
    }

    pub fn begin(&mut self) {
        self.versions.begin();
        self.saved_next_element = Some(self.next_element);
    }

    pub fn commit(&mut self) {
        self.versions.commit();
        self.saved_next_element = None;
    }

    pub fn rollback(&mut self) {
        self.versions.rollback();

        if let Some(next) = self.saved_next_element.take() {
            self.next_element = next;
        }
    }

    /// Version table in a stable order.
    pub fn entries(&self) -> Vec<(Location, VersionEntry)> {
        let mut entries = self
            .versions
            .iter()
            .map(|(l, e)| (*l, *e))
            .collect::<Vec<_>>();

        entries.sort_by_key(|(l, _)| *l);

        entries
    }

    pub fn restore(&mut self, entries: &[(Location, VersionEntry)], next_element: ElementId) {
        self.versions.reset(entries.iter().copied());
        self.next_element = next_element;
        self.saved_next_element = None;
    }
}
