use crate::{
    concrete::ConcreteState,
    engine::{AnalysisError, Location, SymbolicElement, SymbolicEngine, TaintEngine, ThreadId},
    expression::ExprRef,
    inst::Inst,
    operand::{Operand, OperandKind},
    register::Register,
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub instructions: u64,
    pub expressions: u64,
    pub tainted_elements: u64,
    pub discarded: u64,
    /// Instructions kept in the trace without a semantic model.
    #[serde(default)]
    pub unmodeled: u64,
}

/// Everything a builder needs while modeling one instruction occurrence.
///
/// Builders only reach the engines through this type.
pub struct AnalysisProcessor<'a> {
    symbolic: &'a mut SymbolicEngine,
    taint: &'a mut TaintEngine,
    statistics: &'a mut Statistics,
    concrete: &'a dyn ConcreteState,
    thread_id: ThreadId,
}

impl<'a> AnalysisProcessor<'a> {
    pub fn new(
        symbolic: &'a mut SymbolicEngine,
        taint: &'a mut TaintEngine,
        statistics: &'a mut Statistics,
        concrete: &'a dyn ConcreteState,
        thread_id: ThreadId,
    ) -> Self {
        Self {
            symbolic,
            taint,
            statistics,
            concrete,
            thread_id,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn statistics(&self) -> &Statistics {
        self.statistics
    }

    pub(crate) fn statistics_mut(&mut self) -> &mut Statistics {
        self.statistics
    }

    pub fn inc_number_of_expressions(&mut self, n: usize) {
        self.statistics.expressions += n as u64;
    }

    /// Register named by a register operand.
    pub fn register(&self, operand: &Operand) -> Result<Register, AnalysisError> {
        Register::from_id(operand.value()).ok_or(AnalysisError::UnknownRegister(operand.value()))
    }

    pub fn build_symbolic_reg_operand(
        &self,
        register: Register,
        size: u32,
    ) -> Result<ExprRef, AnalysisError> {
        self.symbolic.read_register(self.thread_id, register, size)
    }

    pub fn build_symbolic_flag_operand(&self, flag: Register) -> Result<ExprRef, AnalysisError> {
        self.symbolic.read_register(self.thread_id, flag, 1)
    }

    pub fn build_symbolic_mem_operand(
        &self,
        address: u64,
        size: u32,
    ) -> Result<ExprRef, AnalysisError> {
        self.symbolic.read_memory(address, size)
    }

    pub fn build_symbolic_operand(&self, operand: &Operand) -> Result<ExprRef, AnalysisError> {
        self.symbolic.read_operand(self.thread_id, operand)
    }

    pub fn create_reg_se<'i>(
        &mut self,
        inst: &'i mut Inst,
        expr: ExprRef,
        register: Register,
        size: u32,
    ) -> Result<&'i mut SymbolicElement, AnalysisError> {
        let element = self
            .symbolic
            .write_register(self.thread_id, register, size, expr)?;

        Ok(inst.add_element(element))
    }

    pub fn create_flag_se<'i>(
        &mut self,
        inst: &'i mut Inst,
        expr: ExprRef,
        flag: Register,
    ) -> Result<&'i mut SymbolicElement, AnalysisError> {
        self.create_reg_se(inst, expr, flag, 1)
    }

    pub fn create_mem_se<'i>(
        &mut self,
        inst: &'i mut Inst,
        expr: ExprRef,
        address: u64,
        size: u32,
    ) -> Result<&'i mut SymbolicElement, AnalysisError> {
        let element = self.symbolic.write_memory(address, size, expr)?;

        Ok(inst.add_element(element))
    }

    pub fn register_value(&self, register: Register) -> Option<u64> {
        self.concrete.register(register)
    }

    /// Concrete value of a flag at the moment of analysis.
    pub fn flag_value(&self, flag: Register) -> bool {
        self.concrete.flag(flag)
    }

    pub fn memory_value(&self, address: u64, size: u32) -> Option<u64> {
        self.concrete.read_memory(address, size)
    }

    pub fn is_reg_tainted(&self, register: Register) -> bool {
        self.taint.is_register_tainted(self.thread_id, register)
    }

    pub fn is_mem_tainted(&self, address: u64, size: u32) -> bool {
        self.taint.is_memory_tainted(address, size)
    }

    fn locations(&self, operand: &Operand) -> Result<Vec<Location>, AnalysisError> {
        Ok(match operand.kind() {
            OperandKind::Register => {
                vec![Location::register(self.thread_id, self.register(operand)?)]
            }
            OperandKind::Memory => Location::memory_range(operand.value(), operand.size()).collect(),
            OperandKind::Immediate => vec![],
        })
    }

    fn count(&mut self, tainted: bool) -> bool {
        if tainted {
            self.statistics.tainted_elements += 1;
        }

        tainted
    }

    pub fn assignment_spread_taint_reg_reg(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
        source: Register,
    ) -> bool {
        let tainted = self
            .taint
            .spread_reg_reg(se, self.thread_id, destination, source);

        self.count(tainted)
    }

    pub fn assignment_spread_taint_reg_mem(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
        address: u64,
        size: u32,
    ) -> bool {
        let tainted = self
            .taint
            .spread_reg_mem(se, self.thread_id, destination, address, size);

        self.count(tainted)
    }

    pub fn assignment_spread_taint_mem_reg(
        &mut self,
        se: &mut SymbolicElement,
        address: u64,
        size: u32,
        source: Register,
    ) -> bool {
        let tainted = self
            .taint
            .spread_mem_reg(se, address, size, self.thread_id, source);

        self.count(tainted)
    }

    pub fn assignment_spread_taint_reg_imm(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
    ) -> bool {
        let tainted = self.taint.spread_reg_imm(se, self.thread_id, destination);

        self.count(tainted)
    }

    pub fn assignment_spread_taint_mem_imm(
        &mut self,
        se: &mut SymbolicElement,
        address: u64,
        size: u32,
    ) -> bool {
        let tainted = self.taint.spread_mem_imm(se, address, size);

        self.count(tainted)
    }

    /// `destination := destination op source` for registers.
    pub fn union_spread_taint_reg_reg(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
        source: Register,
    ) -> bool {
        let dst = Location::register(self.thread_id, destination);
        let src = Location::register(self.thread_id, source);
        let tainted = self.taint.spread(se, &[dst], &[dst, src]);

        self.count(tainted)
    }

    pub fn union_spread_taint_reg_mem(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
        address: u64,
        size: u32,
    ) -> bool {
        let dst = Location::register(self.thread_id, destination);
        let sources = std::iter::once(dst)
            .chain(Location::memory_range(address, size))
            .collect::<Vec<_>>();
        let tainted = self.taint.spread(se, &[dst], &sources);

        self.count(tainted)
    }

    pub fn union_spread_taint_mem_reg(
        &mut self,
        se: &mut SymbolicElement,
        address: u64,
        size: u32,
        source: Register,
    ) -> bool {
        let destinations = Location::memory_range(address, size).collect::<Vec<_>>();
        let mut sources = destinations.clone();
        sources.push(Location::register(self.thread_id, source));
        let tainted = self.taint.spread(se, &destinations, &sources);

        self.count(tainted)
    }

    /// An immediate operand adds no taint, the destination keeps its own.
    pub fn union_spread_taint_reg_imm(
        &mut self,
        se: &mut SymbolicElement,
        destination: Register,
    ) -> bool {
        let dst = Location::register(self.thread_id, destination);
        let tainted = self.taint.spread(se, &[dst], &[dst]);

        self.count(tainted)
    }

    pub fn union_spread_taint_mem_imm(
        &mut self,
        se: &mut SymbolicElement,
        address: u64,
        size: u32,
    ) -> bool {
        let destinations = Location::memory_range(address, size).collect::<Vec<_>>();
        let tainted = self.taint.spread(se, &destinations, &destinations);

        self.count(tainted)
    }

    /// Gives a flag the combined taint of the operands it was computed from.
    pub fn assignment_spread_taint_flag(
        &mut self,
        se: &mut SymbolicElement,
        flag: Register,
        sources: &[Operand],
    ) -> Result<bool, AnalysisError> {
        let sources = sources
            .iter()
            .map(|o| self.locations(o))
            .collect::<Result<Vec<_>, _>>()?
            .concat();

        let tainted = self
            .taint
            .spread(se, &[Location::register(self.thread_id, flag)], &sources);

        Ok(self.count(tainted))
    }

    /// Runs `f` with both engines journaled; on error every write `f` made
    /// is undone and the element counter is restored.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, AnalysisError>
    where
        F: FnOnce(&mut Self) -> Result<T, AnalysisError>,
    {
        let statistics = *self.statistics;

        self.symbolic.begin();
        self.taint.begin();

        match f(self) {
            Ok(value) => {
                self.symbolic.commit();
                self.taint.commit();

                Ok(value)
            }
            Err(error) => {
                self.symbolic.rollback();
                self.taint.rollback();
                *self.statistics = statistics;

                debug!("rolled back engine state: {}", error);

                Err(error)
            }
        }
    }
}
