//! Scripted register map used by the driver tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::vec::Vec;

use crate::RegisterBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Register map with optional per-register response queues and injected failures.
///
/// Reads of a register with a queued response consume it; otherwise the bytes come from the
/// register map. Writes land in the register map and are recorded in order.
#[derive(Debug, Default)]
pub struct MockBus {
    memory: HashMap<u16, u8>,
    queued: HashMap<u16, VecDeque<Vec<u8>>>,
    fail_reads: HashSet<u16>,
    fail_writes: HashSet<u16>,
    pub reads: Vec<u16>,
    pub writes: Vec<(u16, Vec<u8>)>,
    pub sleeps: Vec<u32>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, register: u16, data: &[u8]) -> &mut Self {
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert(register + i as u16, *byte);
        }
        self
    }

    pub fn queue(&mut self, register: u16, data: &[u8]) -> &mut Self {
        self.queued.entry(register).or_default().push_back(data.to_vec());
        self
    }

    pub fn fail_read(&mut self, register: u16) -> &mut Self {
        self.fail_reads.insert(register);
        self
    }

    pub fn fail_write(&mut self, register: u16) -> &mut Self {
        self.fail_writes.insert(register);
        self
    }

    pub fn writes_to(&self, register: u16) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(r, _)| *r == register)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn reads_of(&self, register: u16) -> usize {
        self.reads.iter().filter(|r| **r == register).count()
    }
}

impl RegisterBus for MockBus {
    type Error = MockError;

    fn read(&mut self, register: u16, buffer: &mut [u8]) -> Result<(), MockError> {
        self.reads.push(register);
        if self.fail_reads.contains(&register) {
            return Err(MockError);
        }
        if let Some(data) = self.queued.get_mut(&register).and_then(VecDeque::pop_front) {
            buffer.copy_from_slice(&data);
            return Ok(());
        }
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = *self.memory.get(&(register + i as u16)).unwrap_or(&0);
        }
        Ok(())
    }

    fn write(&mut self, register: u16, data: &[u8]) -> Result<(), MockError> {
        if self.fail_writes.contains(&register) {
            return Err(MockError);
        }
        self.writes.push((register, data.to_vec()));
        self.set(register, data);
        Ok(())
    }

    fn sleep_ms(&mut self, ms: u32) -> Result<(), MockError> {
        self.sleeps.push(ms);
        Ok(())
    }
}
