use crate::register::Register;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::{BTreeMap, HashMap};

/// Runtime values of the instruction being analyzed, supplied by the
/// instrumentation harness.
pub trait ConcreteState {
    fn register(&self, register: Register) -> Option<u64>;

    fn flag(&self, flag: Register) -> bool {
        self.register(flag).map_or(false, |v| v & 1 == 1)
    }

    /// Little-endian value of `size` bytes (1 to 8) at `address`.
    fn read_memory(&self, address: u64, size: u32) -> Option<u64>;
}

/// Owned register file and sparse memory image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    registers: HashMap<Register, u64>,
    memory: BTreeMap<u64, u8>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(mut self, register: Register, value: u64) -> Self {
        self.set_register(register, value);
        self
    }

    pub fn with_flag(self, flag: Register, value: bool) -> Self {
        self.with_register(flag, value as u64)
    }

    pub fn with_memory(mut self, address: u64, bytes: &[u8]) -> Self {
        self.write_memory(address, bytes);
        self
    }

    pub fn set_register(&mut self, register: Register, value: u64) {
        self.registers.insert(register, value);
    }

    pub fn write_memory(&mut self, address: u64, bytes: &[u8]) {
        bytes.iter().enumerate().for_each(|(offset, byte)| {
            self.memory.insert(address.wrapping_add(offset as u64), *byte);
        });
    }
}

impl ConcreteState for Snapshot {
    fn register(&self, register: Register) -> Option<u64> {
        self.registers.get(&register).copied()
    }

    fn read_memory(&self, address: u64, size: u32) -> Option<u64> {
        if size == 0 || size > 8 {
            return None;
        }

        let bytes = (0..size as u64)
            .map(|offset| self.memory.get(&address.wrapping_add(offset)).copied())
            .collect::<Option<Vec<u8>>>()?;

        Some(LittleEndian::read_uint(&bytes, size as usize))
    }
}
