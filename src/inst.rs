use crate::engine::{SymbolicElement, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One analyzed occurrence of an instruction.
#[derive(Clone, Debug)]
pub struct Inst {
    thread_id: ThreadId,
    address: u64,
    disassembly: String,
    elements: Vec<SymbolicElement>,
    next_address: Option<u64>,
}

impl Inst {
    pub fn new(thread_id: ThreadId, address: u64, disassembly: &str) -> Self {
        Self {
            thread_id,
            address,
            disassembly: disassembly.to_owned(),
            elements: Vec::new(),
            next_address: None,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn disassembly(&self) -> &str {
        &self.disassembly
    }

    pub fn elements(&self) -> &[SymbolicElement] {
        &self.elements
    }

    pub fn number_of_elements(&self) -> usize {
        self.elements.len()
    }

    /// Straight-line successor, known when the instruction size was given.
    pub fn next_address(&self) -> Option<u64> {
        self.next_address
    }

    pub fn is_tainted(&self) -> bool {
        self.elements.iter().any(|e| e.is_tainted())
    }

    pub(crate) fn add_element(&mut self, element: SymbolicElement) -> &mut SymbolicElement {
        self.elements.push(element);

        let last = self.elements.len() - 1;

        &mut self.elements[last]
    }

    pub(crate) fn set_next_address(&mut self, next_address: Option<u64>) {
        self.next_address = next_address;
    }

    pub fn record(&self) -> TraceRecord {
        TraceRecord {
            thread_id: self.thread_id,
            address: self.address,
            disassembly: self.disassembly.clone(),
            elements: self
                .elements
                .iter()
                .map(|e| ElementRecord {
                    id: e.id(),
                    expression: e.expression().to_string(),
                    tainted: e.is_tainted(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "[tid:{}] {:#018x}: {}",
            self.thread_id, self.address, self.disassembly
        )?;

        self.elements
            .iter()
            .try_for_each(|e| writeln!(f, "    {}", e))
    }
}

/// Display view of an [`Inst`] handed to trace consumers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub thread_id: ThreadId,
    pub address: u64,
    pub disassembly: String,
    pub elements: Vec<ElementRecord>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: u64,
    pub expression: String,
    pub tainted: bool,
}

/// Append-only sequence of analyzed instructions.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    insts: Vec<Inst>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Inst> {
        self.insts.get(index)
    }

    pub fn last(&self) -> Option<&Inst> {
        self.insts.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inst> {
        self.insts.iter()
    }

    /// Every element of the trace in creation order.
    pub fn elements(&self) -> impl Iterator<Item = &SymbolicElement> {
        self.insts.iter().flat_map(|i| i.elements().iter())
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.insts.truncate(len);
    }
}
