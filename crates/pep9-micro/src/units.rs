//! Unit-test pre- and postconditions for microprograms.
//!
//! A micro test harness seeds the datapath and memory from `UnitPre`
//! clauses, runs the program, and checks `UnitPost` clauses afterwards.
//! The clauses arrive already parsed; this is the data surface the
//! microassembler's UnitPre:/UnitPost: comments lower into.

use pep_core::{MemoryDevice, StatusBit};

use crate::datapath::Datapath;

/// One precondition or postcondition clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSpec {
    /// A register holds a value. Word registers take both bytes; the
    /// one-byte registers (IS, T1) take the low byte.
    Register { reg: u8, value: u16 },
    /// A status bit holds a value.
    Status { bit: StatusBit, value: bool },
    /// A memory cell holds a value, `width` bytes wide (1 or 2).
    Memory { address: u16, value: u16, width: u8 },
}

/// The unit preconditions and postconditions of one microprogram.
#[derive(Debug, Clone, Default)]
pub struct UnitTest {
    pub pre: Vec<UnitSpec>,
    pub post: Vec<UnitSpec>,
}

fn register_is_byte_wide(reg: u8) -> bool {
    // IS and T1 are the bank's one-byte registers.
    reg == 8 || reg == 11
}

impl UnitTest {
    /// Seed the datapath and memory from the preconditions.
    pub fn apply_preconditions<M: MemoryDevice>(&self, data: &mut Datapath, mem: &mut M) {
        for spec in &self.pre {
            match *spec {
                UnitSpec::Register { reg, value } => {
                    if register_is_byte_wide(reg) {
                        data.registers_mut().write_byte(reg, (value & 0xFF) as u8);
                    } else {
                        data.registers_mut().write_word(reg, value);
                    }
                }
                UnitSpec::Status { bit, value } => {
                    data.registers_mut().write_status_bit(bit, value);
                }
                UnitSpec::Memory {
                    address,
                    value,
                    width,
                } => {
                    if width == 1 {
                        mem.set_byte(address, (value & 0xFF) as u8);
                    } else {
                        mem.set_word(address, value);
                    }
                }
            }
        }
        data.registers_mut().flatten();
    }

    /// Check every postcondition, collecting a diagnostic per failure.
    pub fn check_postconditions<M: MemoryDevice>(
        &self,
        data: &Datapath,
        mem: &M,
    ) -> Result<(), Vec<String>> {
        let mut failures = Vec::new();
        for spec in &self.post {
            match *spec {
                UnitSpec::Register { reg, value } => {
                    let actual = if register_is_byte_wide(reg) {
                        u16::from(data.registers().read_byte_current(reg))
                    } else {
                        data.registers().read_word_current(reg)
                    };
                    if actual != value {
                        failures.push(format!(
                            "register {reg}: expected {value:#06X}, found {actual:#06X}"
                        ));
                    }
                }
                UnitSpec::Status { bit, value } => {
                    let actual = data.registers().read_status_bit_current(bit);
                    if actual != value {
                        failures.push(format!("status {bit:?}: expected {value}, found {actual}"));
                    }
                }
                UnitSpec::Memory {
                    address,
                    value,
                    width,
                } => {
                    let actual = if width == 1 {
                        u16::from(mem.get_byte(address))
                    } else {
                        mem.get_word(address)
                    };
                    if actual != value {
                        failures.push(format!(
                            "Mem[{address:#06X}]: expected {value:#06X}, found {actual:#06X}"
                        ));
                    }
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
