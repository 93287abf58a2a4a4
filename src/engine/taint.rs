use super::{JournaledMap, Location, SymbolicElement, ThreadId};
use crate::register::Register;
use log::trace;

/// Byte-granular taint state of every register and memory byte.
///
/// A location is tainted iff it is present in the table.
#[derive(Debug, Default)]
pub struct TaintEngine {
    tainted: JournaledMap<Location, ()>,
}

impl TaintEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tainted(&self, location: Location) -> bool {
        self.tainted.contains_key(&location)
    }

    pub fn is_register_tainted(&self, thread: ThreadId, register: Register) -> bool {
        self.is_tainted(Location::register(thread, register))
    }

    /// True if any byte of the range is tainted.
    pub fn is_memory_tainted(&self, address: u64, size: u32) -> bool {
        Location::memory_range(address, size).any(|l| self.is_tainted(l))
    }

    pub fn set(&mut self, location: Location) {
        self.tainted.insert(location, ());
    }

    pub fn clear(&mut self, location: Location) {
        self.tainted.remove(&location);
    }

    fn assign(&mut self, location: Location, tainted: bool) {
        if tainted {
            self.set(location)
        } else {
            self.clear(location)
        }
    }

    /// Gives every destination the combined taint of the sources and tags the
    /// element with it. An empty source list untaints the destinations.
    pub fn spread(
        &mut self,
        element: &mut SymbolicElement,
        destinations: &[Location],
        sources: &[Location],
    ) -> bool {
        let tainted = sources.iter().any(|l| self.is_tainted(*l));

        destinations
            .iter()
            .for_each(|destination| self.assign(*destination, tainted));

        element.set_tainted(tainted);

        trace!(
            "#{}: taint {:?} <- {:?} = {}",
            element.id(),
            destinations,
            sources,
            tainted
        );

        tainted
    }

    /// Copy from register to register.
    pub fn spread_reg_reg(
        &mut self,
        element: &mut SymbolicElement,
        thread: ThreadId,
        destination: Register,
        source: Register,
    ) -> bool {
        self.spread(
            element,
            &[Location::register(thread, destination)],
            &[Location::register(thread, source)],
        )
    }

    /// Copy from memory to register.
    pub fn spread_reg_mem(
        &mut self,
        element: &mut SymbolicElement,
        thread: ThreadId,
        destination: Register,
        address: u64,
        size: u32,
    ) -> bool {
        let sources = Location::memory_range(address, size).collect::<Vec<_>>();

        self.spread(element, &[Location::register(thread, destination)], &sources)
    }

    /// Copy from register to every byte of a memory range.
    pub fn spread_mem_reg(
        &mut self,
        element: &mut SymbolicElement,
        address: u64,
        size: u32,
        thread: ThreadId,
        source: Register,
    ) -> bool {
        let destinations = Location::memory_range(address, size).collect::<Vec<_>>();

        self.spread(element, &destinations, &[Location::register(thread, source)])
    }

    /// Constant load into a register.
    pub fn spread_reg_imm(
        &mut self,
        element: &mut SymbolicElement,
        thread: ThreadId,
        destination: Register,
    ) -> bool {
        self.spread(element, &[Location::register(thread, destination)], &[])
    }

    /// Constant store into memory.
    pub fn spread_mem_imm(&mut self, element: &mut SymbolicElement, address: u64, size: u32) -> bool {
        let destinations = Location::memory_range(address, size).collect::<Vec<_>>();

        self.spread(element, &destinations, &[])
    }

    pub fn begin(&mut self) {
        self.tainted.begin();
    }

    pub fn commit(&mut self) {
        self.tainted.commit();
    }

    pub fn rollback(&mut self) {
        self.tainted.rollback();
    }

    /// Tainted locations in a stable order.
    pub fn entries(&self) -> Vec<Location> {
        let mut entries = self.tainted.iter().map(|(l, _)| *l).collect::<Vec<_>>();

        entries.sort();

        entries
    }

    pub fn restore(&mut self, entries: &[Location]) {
        self.tainted.reset(entries.iter().map(|l| (*l, ())));
    }
}
