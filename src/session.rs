//! Analysis session shared by every thread of the instrumented program.
//!
//! All events go through one lock, so element ids and versions follow a
//! single total order regardless of how the harness interleaves threads.

use crate::{
    builder::{InstructionBuilder, Mnemonic},
    concrete::{ConcreteState, Snapshot},
    engine::{
        AnalysisError, ElementId, Location, SymbolicEngine, TaintEngine, ThreadId, Version,
        VersionEntry,
    },
    inst::{Trace, TraceRecord},
    operand::Operand,
    processor::{AnalysisProcessor, Statistics},
    register::{Register, ARGUMENT_REGISTERS},
    solver::{smt, Formula},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::{self, Write},
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

pub mod defaults {
    pub const RECORD_TRACE: bool = true;
}

/// Locations holding untrusted input when the session starts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaintSource {
    Register { thread: ThreadId, register: Register },
    Memory { address: u64, size: u32 },
    /// The integer argument registers of a thread.
    Arguments { thread: ThreadId },
}

impl TaintSource {
    fn locations(&self) -> Vec<Location> {
        match self {
            TaintSource::Register { thread, register } => {
                vec![Location::register(*thread, *register)]
            }
            TaintSource::Memory { address, size } => {
                Location::memory_range(*address, *size).collect()
            }
            TaintSource::Arguments { thread } => ARGUMENT_REGISTERS
                .iter()
                .map(|r| Location::register(*thread, *r))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub taint_sources: Vec<TaintSource>,
    /// Without a trace only statistics are kept of processed instructions.
    pub record_trace: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            taint_sources: Vec::new(),
            record_trace: defaults::RECORD_TRACE,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemoryChunk {
    pub address: u64,
    pub bytes: Vec<u8>,
}

/// One retired instruction as reported by the instrumentation harness.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstructionEvent {
    pub thread_id: ThreadId,
    pub address: u64,
    #[serde(default)]
    pub size: Option<u64>,
    pub disassembly: String,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    #[serde(default)]
    pub registers: BTreeMap<String, u64>,
    #[serde(default)]
    pub flags: BTreeMap<String, u8>,
    #[serde(default)]
    pub memory: Vec<MemoryChunk>,
}

fn parse_register(name: &str) -> Result<Register, AnalysisError> {
    Register::from_str(name).map_err(|_| AnalysisError::UnknownRegisterName(name.to_owned()))
}

impl InstructionEvent {
    /// Concrete state the event carries.
    pub fn snapshot(&self) -> Result<Snapshot, AnalysisError> {
        let mut snapshot = Snapshot::new();

        for (name, value) in self.registers.iter() {
            snapshot.set_register(parse_register(name)?, *value);
        }

        for (name, value) in self.flags.iter() {
            snapshot.set_register(parse_register(name)?, (*value != 0) as u64);
        }

        self.memory
            .iter()
            .for_each(|chunk| snapshot.write_memory(chunk.address, &chunk.bytes));

        Ok(snapshot)
    }

    pub fn builder(&self) -> InstructionBuilder {
        let builder = InstructionBuilder::new(self.mnemonic)
            .address(self.address)
            .disassembly(&self.disassembly)
            .operands(self.operands.clone());

        match self.size {
            Some(size) => builder.instruction_size(size),
            None => builder,
        }
    }
}

/// Engine state from which analysis can be resumed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub versions: Vec<(Location, VersionEntry)>,
    pub tainted: Vec<Location>,
    pub next_element: ElementId,
    pub statistics: Statistics,
    pub trace_length: usize,
}

struct SessionState {
    symbolic: SymbolicEngine,
    taint: TaintEngine,
    statistics: Statistics,
    trace: Trace,
    options: SessionOptions,
}

impl SessionState {
    fn discard(&mut self, address: u64, disassembly: &str, error: AnalysisError) -> AnalysisError {
        self.statistics.discarded += 1;

        warn!("discarded {:#x}: {} ({})", address, disassembly, error);

        error
    }
}

pub struct Session {
    state: Mutex<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let mut taint = TaintEngine::new();

        options
            .taint_sources
            .iter()
            .inspect(|s| debug!("taint source: {:?}", s))
            .flat_map(|s| s.locations())
            .for_each(|l| taint.set(l));

        Self {
            state: Mutex::new(SessionState {
                symbolic: SymbolicEngine::new(),
                taint,
                statistics: Statistics::default(),
                trace: Trace::new(),
                options,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("no other thread should fail")
    }

    pub fn process(&self, event: &InstructionEvent) -> Result<TraceRecord, AnalysisError> {
        match event.snapshot() {
            Ok(concrete) => self.process_with(event.thread_id, &event.builder(), &concrete),
            Err(error) => Err(self.lock().discard(event.address, &event.disassembly, error)),
        }
    }

    /// Models one instruction of `thread` and appends it to the trace.
    pub fn process_with(
        &self,
        thread: ThreadId,
        builder: &InstructionBuilder,
        concrete: &dyn ConcreteState,
    ) -> Result<TraceRecord, AnalysisError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut ap = AnalysisProcessor::new(
            &mut state.symbolic,
            &mut state.taint,
            &mut state.statistics,
            concrete,
            thread,
        );

        match builder.process(&mut ap) {
            Ok(inst) => {
                let record = inst.record();

                if state.options.record_trace {
                    state.trace.push(inst);
                }

                Ok(record)
            }
            Err(error) => Err(state.discard(
                builder.instruction_address().unwrap_or_default(),
                builder.disassembly_text(),
                error,
            )),
        }
    }

    /// Runs `f` against the engines of the session while holding its lock.
    pub fn with_processor<R, F>(&self, thread: ThreadId, concrete: &dyn ConcreteState, f: F) -> R
    where
        F: FnOnce(&mut AnalysisProcessor) -> R,
    {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut ap = AnalysisProcessor::new(
            &mut state.symbolic,
            &mut state.taint,
            &mut state.statistics,
            concrete,
            thread,
        );

        f(&mut ap)
    }

    /// Processes `events` in order and stops at the first failure, which
    /// makes the rest of the trace untrustworthy.
    pub fn replay(&self, events: &[InstructionEvent]) -> Result<Vec<TraceRecord>, AnalysisError> {
        time_info!(format!("replayed {} instruction events", events.len()), {
            events.iter().map(|e| self.process(e)).collect()
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let state = self.lock();

        let checkpoint = Checkpoint {
            versions: state.symbolic.entries(),
            tainted: state.taint.entries(),
            next_element: state.symbolic.next_element_id(),
            statistics: state.statistics,
            trace_length: state.trace.len(),
        };

        debug!(
            "checkpoint: {} versions, {} tainted, next element #{}",
            checkpoint.versions.len(),
            checkpoint.tainted.len(),
            checkpoint.next_element
        );

        checkpoint
    }

    /// Resets the engines to `checkpoint` and drops the instructions
    /// recorded after it.
    pub fn restore(&self, checkpoint: &Checkpoint) {
        let mut state = self.lock();

        state
            .symbolic
            .restore(&checkpoint.versions, checkpoint.next_element);
        state.taint.restore(&checkpoint.tainted);
        state.statistics = checkpoint.statistics;
        state.trace.truncate(checkpoint.trace_length);

        debug!("restored checkpoint at element #{}", checkpoint.next_element);
    }

    pub fn statistics(&self) -> Statistics {
        self.lock().statistics
    }

    pub fn with_trace<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Trace) -> R,
    {
        f(&self.lock().trace)
    }

    pub fn trace_records(&self) -> Vec<TraceRecord> {
        self.with_trace(|t| t.iter().map(|i| i.record()).collect())
    }

    pub fn is_register_tainted(&self, thread: ThreadId, register: Register) -> bool {
        self.lock().taint.is_register_tainted(thread, register)
    }

    pub fn is_memory_tainted(&self, address: u64, size: u32) -> bool {
        self.lock().taint.is_memory_tainted(address, size)
    }

    pub fn current_version(&self, location: Location) -> Version {
        self.lock().symbolic.current_version(location)
    }

    /// Writes the definitions of the whole trace as an SMT-LIB2 script.
    pub fn export_smt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let state = self.lock();
        let formula = Formula::new(state.trace.elements());

        time_debug!("exported trace to SMT-LIB2", { smt::export(out, &formula) })
    }
}
