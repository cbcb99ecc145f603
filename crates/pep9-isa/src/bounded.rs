//! Bounded execution for batch runs.
//!
//! Batch and CLI execution must terminate even when the guest program
//! does not. The bounded wrapper runs the CPU with an instruction
//! ceiling; exceeding it is reported as a control error, not a panic.

use pep_core::MemoryDevice;

use crate::cpu::IsaCpu;

/// An `IsaCpu` with a step ceiling.
pub struct BoundedIsaCpu {
    cpu: IsaCpu,
    max_steps: u64,
}

impl BoundedIsaCpu {
    /// Ceiling used when the caller does not supply one.
    pub const DEFAULT_MAX_STEPS: u64 = 25_000;

    #[must_use]
    pub fn new(cpu: IsaCpu, max_steps: u64) -> Self {
        Self { cpu, max_steps }
    }

    #[must_use]
    pub fn cpu(&self) -> &IsaCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut IsaCpu {
        &mut self.cpu
    }

    #[must_use]
    pub fn into_inner(self) -> IsaCpu {
        self.cpu
    }

    /// Execute until an error, STOP, or the step ceiling.
    ///
    /// Returns true on clean termination. Exceeding the ceiling raises
    /// the endless-loop control fault and signals simulation finished.
    pub fn run<M: MemoryDevice>(&mut self, mem: &mut M) -> bool {
        self.cpu.run_bounded(mem, self.max_steps)
    }
}
