//! The datapath: buses, memory registers, and the bus state machine.
//!
//! One call to [`Datapath::step`] is one clock cycle. The bus state
//! advances first (a read or write completes on the third consecutive
//! cycle holding the same MAR), then the clocks act in fixed order:
//! the MemWriteReady commit uses the previous MAR, then MARCk, LoadCk,
//! the MDR clocks, and finally the status clocks.

use pep_core::{
    AccessKind, C_MASK, MemoryDevice, N_MASK, RegisterFile, StatusBit, V_MASK, Z_MASK,
};
use thiserror::Error;

use crate::alu::{self, AluFunction, AluOutput};
use crate::program::{
    CLOCK_SIGNAL_COUNT, CONTROL_SIGNAL_COUNT, ClockSignal, ControlSignal, MicroLine,
    SIGNAL_DISABLED,
};

/// A data-section failure: a clock asserted with no value to latch, or a
/// malformed signal vector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataFault {
    #[error("Control signals did not match in length ({0} supplied).")]
    ControlVectorLength(usize),
    #[error("Clock signals did not match in length ({0} supplied).")]
    ClockVectorLength(usize),
    #[error("No values on A & B during MARCk.")]
    MarInputMissing,
    #[error("MARMux has no output but MARCk.")]
    MarMuxNoOutput,
    #[error("No destination register specified for LoadCk.")]
    LoadDestinationMissing,
    #[error("No value on C Bus to clock in.")]
    CBusValueMissing,
    #[error("No value from data bus to write to {0}.")]
    DataBusValueMissing(&'static str),
    #[error("No value on C bus to write to {0}.")]
    CBusToMdrMissing(&'static str),
    #[error("No value to clock into {0}.")]
    MdrSourceMissing(&'static str),
    #[error("Unable to read from memory into {0}.")]
    MemoryReadFailed(&'static str),
    #[error("ALU Error: No output from ALU to clock into status bits.")]
    StatusClockNoAluOutput,
}

/// Whether the CPU moves one or two bytes per bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    OneByte,
    TwoByte,
}

/// Memory bus state. A read or write completes when the bus reaches the
/// Ready state, three consecutive same-MAR cycles after it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    None,
    MemReadFirstWait,
    MemReadSecondWait,
    MemReadReady,
    MemWriteFirstWait,
    MemWriteSecondWait,
    MemWriteReady,
}

/// The six memory-interface registers (MDR is the one-byte bus's; MDRE
/// and MDRO are the two-byte bus's halves).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MemoryRegister {
    MarA = 0,
    MarB = 1,
    Mdr = 2,
    Mdre = 3,
    Mdro = 4,
}

const MEMORY_REGISTER_COUNT: usize = 5;

pub struct Datapath {
    width: BusWidth,
    regs: RegisterFile,
    mem_regs: [u8; MEMORY_REGISTER_COUNT],
    bus_state: BusState,
    control: [u8; CONTROL_SIGNAL_COUNT],
    clock: [bool; CLOCK_SIGNAL_COUNT],
    /// ALU result computed at most once per cycle. `None` means not yet
    /// computed this cycle; `Some(None)` means computed with no output.
    alu_cache: Option<Option<AluOutput>>,
    fault: Option<DataFault>,
}

impl Datapath {
    #[must_use]
    pub fn new(width: BusWidth) -> Self {
        Self {
            width,
            regs: RegisterFile::new(),
            mem_regs: [0; MEMORY_REGISTER_COUNT],
            bus_state: BusState::None,
            control: [SIGNAL_DISABLED; CONTROL_SIGNAL_COUNT],
            clock: [false; CLOCK_SIGNAL_COUNT],
            alu_cache: None,
            fault: None,
        }
    }

    #[must_use]
    pub fn width(&self) -> BusWidth {
        self.width
    }

    #[must_use]
    pub fn bus_state(&self) -> BusState {
        self.bus_state
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    #[must_use]
    pub fn memory_register(&self, reg: MemoryRegister) -> u8 {
        self.mem_regs[reg as usize]
    }

    pub fn set_memory_register(&mut self, reg: MemoryRegister, value: u8) {
        self.mem_regs[reg as usize] = value;
    }

    /// Drive one control signal (interactive/unit-test use).
    pub fn set_control(&mut self, signal: ControlSignal, value: u8) {
        self.control[signal as usize] = value;
    }

    /// Assert or release one clock line (interactive/unit-test use).
    pub fn set_clock(&mut self, clock: ClockSignal, asserted: bool) {
        self.clock[clock as usize] = asserted;
    }

    /// Copy a microline's signal vectors into the datapath. The vectors
    /// must match the datapath's lengths exactly; a mismatch is an
    /// unrecoverable assembly defect surfaced as a data fault.
    pub fn set_signals_from_line(&mut self, line: &MicroLine) -> Result<(), DataFault> {
        if line.control.len() != CONTROL_SIGNAL_COUNT {
            let fault = DataFault::ControlVectorLength(line.control.len());
            self.fault = Some(fault.clone());
            return Err(fault);
        }
        if line.clock.len() != CLOCK_SIGNAL_COUNT {
            let fault = DataFault::ClockVectorLength(line.clock.len());
            self.fault = Some(fault.clone());
            return Err(fault);
        }
        self.control.copy_from_slice(&line.control);
        for (slot, value) in self.clock.iter_mut().zip(line.clock.iter()) {
            *slot = *value;
        }
        Ok(())
    }

    /// Release every control signal and clock line.
    pub fn clear_signals(&mut self) {
        self.control = [SIGNAL_DISABLED; CONTROL_SIGNAL_COUNT];
        self.clock = [false; CLOCK_SIGNAL_COUNT];
    }

    /// Reset everything: registers, status bits, memory registers, bus
    /// state, signals, and any pending fault.
    pub fn clear_cpu(&mut self) {
        self.regs.clear_registers();
        self.regs.clear_status_bits();
        self.mem_regs = [0; MEMORY_REGISTER_COUNT];
        self.bus_state = BusState::None;
        self.clear_signals();
        self.fault = None;
        self.alu_cache = None;
    }

    #[must_use]
    pub fn had_fault(&self) -> bool {
        self.fault.is_some()
    }

    #[must_use]
    pub fn fault(&self) -> Option<&DataFault> {
        self.fault.as_ref()
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    fn control_value(&self, signal: ControlSignal) -> Option<u8> {
        let value = self.control[signal as usize];
        if value == SIGNAL_DISABLED {
            None
        } else {
            Some(value)
        }
    }

    fn clocked(&self, clock: ClockSignal) -> bool {
        self.clock[clock as usize]
    }

    fn fail(&mut self, fault: DataFault) {
        self.fault = Some(fault);
    }

    /// The register byte driven onto the A bus, if the line drives one.
    #[must_use]
    pub fn value_on_a_bus(&self) -> Option<u8> {
        self.control_value(ControlSignal::A)
            .map(|reg| self.regs.read_byte_current(reg))
    }

    /// The register byte driven onto the B bus, if the line drives one.
    #[must_use]
    pub fn value_on_b_bus(&self) -> Option<u8> {
        self.control_value(ControlSignal::B)
            .map(|reg| self.regs.read_byte_current(reg))
    }

    /// Carry-in selected by CSMux: 0 routes the C bit, 1 the saved-carry
    /// S bit.
    #[must_use]
    pub fn csmux_output(&self) -> Option<bool> {
        match self.control_value(ControlSignal::CSMux) {
            Some(0) => Some(self.regs.read_status_bit_current(StatusBit::C)),
            Some(1) => Some(self.regs.read_status_bit_current(StatusBit::S)),
            _ => None,
        }
    }

    /// The ALU's A input: the A bus, or the MDR side selected by AMux
    /// (EOMux picks the MDR half on the two-byte bus).
    #[must_use]
    pub fn amux_output(&self) -> Option<u8> {
        match self.control_value(ControlSignal::AMux) {
            Some(0) => match self.width {
                BusWidth::OneByte => Some(self.mem_regs[MemoryRegister::Mdr as usize]),
                BusWidth::TwoByte => match self.control_value(ControlSignal::EOMux) {
                    Some(0) => Some(self.mem_regs[MemoryRegister::Mdre as usize]),
                    Some(1) => Some(self.mem_regs[MemoryRegister::Mdro as usize]),
                    _ => None,
                },
            },
            Some(1) => self.value_on_a_bus(),
            _ => None,
        }
    }

    /// Evaluate the ALU at most once per cycle.
    pub fn alu_output(&mut self) -> Option<AluOutput> {
        if let Some(cached) = self.alu_cache {
            return cached;
        }
        let computed = self.compute_alu();
        self.alu_cache = Some(computed);
        computed
    }

    fn compute_alu(&self) -> Option<AluOutput> {
        let function = AluFunction::from_value(self.control_value(ControlSignal::Alu)?)?;
        let a = self.amux_output()?;
        let b = if function.is_unary() {
            0
        } else {
            self.value_on_b_bus()?
        };
        alu::evaluate(function, a, b, self.csmux_output())
    }

    /// The byte on the C bus: packed NZVC when CMux is 0, the ALU output
    /// when CMux is 1.
    pub fn value_on_c_bus(&mut self) -> Option<u8> {
        match self.control_value(ControlSignal::CMux) {
            Some(0) => Some(self.regs.packed_nzvc()),
            Some(1) => self.alu_output().map(|out| out.result),
            _ => None,
        }
    }

    /// The address on the memory bus, from the MAR pair.
    fn mar_address(&self) -> u16 {
        u16::from(self.mem_regs[MemoryRegister::MarA as usize]) << 8
            | u16::from(self.mem_regs[MemoryRegister::MarB as usize])
    }

    /// Advance the bus state machine for this cycle.
    ///
    /// A cycle that clocks a different address into the MAR restarts the
    /// access; dropping both MemRead and MemWrite returns the bus to
    /// idle; switching direction restarts in the new direction's first
    /// wait state.
    fn handle_bus_state(&mut self) {
        let mar_changed = if self.clocked(ClockSignal::MarCk)
            && let (Some(a), Some(b)) = (self.value_on_a_bus(), self.value_on_b_bus())
        {
            a != self.mem_regs[MemoryRegister::MarA as usize]
                || b != self.mem_regs[MemoryRegister::MarB as usize]
        } else {
            false
        };
        let read = self.control_value(ControlSignal::MemRead) == Some(1);
        let write = self.control_value(ControlSignal::MemWrite) == Some(1);

        self.bus_state = match self.bus_state {
            BusState::None => {
                // The MAR cannot change on the same cycle an access starts.
                if mar_changed {
                    BusState::None
                } else if read {
                    BusState::MemReadFirstWait
                } else if write {
                    BusState::MemWriteFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemReadFirstWait => {
                if read && !mar_changed {
                    BusState::MemReadSecondWait
                } else if read {
                    BusState::MemReadFirstWait
                } else if write {
                    BusState::MemWriteFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemReadSecondWait => {
                if read && !mar_changed {
                    BusState::MemReadReady
                } else if read {
                    BusState::MemReadFirstWait
                } else if write {
                    BusState::MemWriteFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemReadReady => {
                if read {
                    BusState::MemReadFirstWait
                } else if write {
                    BusState::MemWriteFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemWriteFirstWait => {
                if write && !mar_changed {
                    BusState::MemWriteSecondWait
                } else if write {
                    BusState::MemWriteFirstWait
                } else if read {
                    BusState::MemReadFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemWriteSecondWait => {
                if write && !mar_changed {
                    BusState::MemWriteReady
                } else if write {
                    BusState::MemWriteFirstWait
                } else if read {
                    BusState::MemReadFirstWait
                } else {
                    BusState::None
                }
            }
            BusState::MemWriteReady => {
                if write {
                    BusState::MemWriteFirstWait
                } else if read {
                    BusState::MemReadFirstWait
                } else {
                    BusState::None
                }
            }
        };
    }

    /// Execute one datapath cycle against memory.
    pub fn step<M: MemoryDevice>(&mut self, mem: &mut M) {
        // A fault left from the previous cycle has been reported by now.
        self.fault = None;
        match self.width {
            BusWidth::OneByte => self.step_one_byte(mem),
            BusWidth::TwoByte => self.step_two_byte(mem),
        }
    }

    fn step_one_byte<M: MemoryDevice>(&mut self, mem: &mut M) {
        // The bus state drives everything else this cycle.
        self.handle_bus_state();
        self.alu_cache = None;

        let a = self.value_on_a_bus();
        let b = self.value_on_b_bus();
        let c = self.value_on_c_bus();
        let alu = self.alu_output();

        // A completed write commits before MARCk can move the address.
        if self.bus_state == BusState::MemWriteReady {
            let address = self.mar_address();
            let _ = mem.write_byte(
                address,
                self.mem_regs[MemoryRegister::Mdr as usize],
                AccessKind::None,
            );
        }

        if self.clocked(ClockSignal::MarCk) {
            if let (Some(a), Some(b)) = (a, b) {
                self.mem_regs[MemoryRegister::MarA as usize] = a;
                self.mem_regs[MemoryRegister::MarB as usize] = b;
            } else {
                self.fail(DataFault::MarInputMissing);
                return;
            }
        }

        self.apply_load_clock(c);

        if self.clocked(ClockSignal::MdrCk) {
            match self.control_value(ControlSignal::MdrMux) {
                Some(0) => {
                    if self.bus_state == BusState::MemReadReady {
                        let address = self.mar_address();
                        self.mem_regs[MemoryRegister::Mdr as usize] = mem.get_byte(address);
                    } else {
                        self.fail(DataFault::DataBusValueMissing("MDR"));
                    }
                }
                Some(1) => {
                    if let Some(value) = c {
                        self.mem_regs[MemoryRegister::Mdr as usize] = value;
                    } else {
                        self.fail(DataFault::CBusToMdrMissing("MDR"));
                    }
                }
                _ => self.fail(DataFault::MdrSourceMissing("MDR")),
            }
        }

        self.apply_status_clocks(alu);
    }

    fn step_two_byte<M: MemoryDevice>(&mut self, mem: &mut M) {
        self.handle_bus_state();
        self.alu_cache = None;

        let a = self.value_on_a_bus();
        let b = self.value_on_b_bus();
        let c = self.value_on_c_bus();
        let alu = self.alu_output();

        // Word commit: the two-byte bus ignores the low address bit.
        if self.bus_state == BusState::MemWriteReady {
            let address = self.mar_address() & 0xFFFE;
            let word = u16::from(self.mem_regs[MemoryRegister::Mdre as usize]) << 8
                | u16::from(self.mem_regs[MemoryRegister::Mdro as usize]);
            let _ = mem.write_word(address, word, AccessKind::None);
        }

        if self.clocked(ClockSignal::MarCk) {
            match self.control_value(ControlSignal::MarMux) {
                Some(0) => {
                    self.mem_regs[MemoryRegister::MarA as usize] =
                        self.mem_regs[MemoryRegister::Mdre as usize];
                    self.mem_regs[MemoryRegister::MarB as usize] =
                        self.mem_regs[MemoryRegister::Mdro as usize];
                }
                Some(1) => {
                    if let (Some(a), Some(b)) = (a, b) {
                        self.mem_regs[MemoryRegister::MarA as usize] = a;
                        self.mem_regs[MemoryRegister::MarB as usize] = b;
                    } else {
                        self.fail(DataFault::MarMuxNoOutput);
                        return;
                    }
                }
                _ => {
                    self.fail(DataFault::MarMuxNoOutput);
                    return;
                }
            }
        }

        self.apply_load_clock(c);

        // A memory-sourced MDR clock opens a transaction for the whole
        // word access; it closes at end of step.
        let memory_sourced = (self.clocked(ClockSignal::MdreCk)
            && self.control_value(ControlSignal::MdreMux) == Some(0))
            || (self.clocked(ClockSignal::MdroCk)
                && self.control_value(ControlSignal::MdroMux) == Some(0));
        if memory_sourced {
            mem.begin_transaction(AccessKind::None);
        }

        if self.clocked(ClockSignal::MdreCk) {
            self.clock_mdr_half(mem, MemoryRegister::Mdre, ControlSignal::MdreMux, 0, c, "MDRE");
        }
        if self.clocked(ClockSignal::MdroCk) {
            self.clock_mdr_half(mem, MemoryRegister::Mdro, ControlSignal::MdroMux, 1, c, "MDRO");
        }

        if memory_sourced {
            mem.end_transaction();
        }
        if self.fault.is_some() {
            return;
        }

        self.apply_status_clocks(alu);
    }

    /// Clock one half of the two-byte MDR from memory or the C bus.
    fn clock_mdr_half<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        reg: MemoryRegister,
        mux: ControlSignal,
        offset: u16,
        c: Option<u8>,
        name: &'static str,
    ) {
        match self.control_value(mux) {
            Some(0) => {
                if self.bus_state == BusState::MemReadReady {
                    let address = (self.mar_address() & 0xFFFE).wrapping_add(offset);
                    match mem.read_byte(address, AccessKind::None) {
                        Ok(value) => self.mem_regs[reg as usize] = value,
                        Err(_) => self.fail(DataFault::MemoryReadFailed(name)),
                    }
                } else {
                    self.fail(DataFault::DataBusValueMissing(name));
                }
            }
            Some(1) => {
                if let Some(value) = c {
                    self.mem_regs[reg as usize] = value;
                } else {
                    self.fail(DataFault::CBusToMdrMissing(name));
                }
            }
            _ => self.fail(DataFault::MdrSourceMissing(name)),
        }
    }

    fn apply_load_clock(&mut self, c: Option<u8>) {
        if !self.clocked(ClockSignal::LoadCk) {
            return;
        }
        match (self.control_value(ControlSignal::C), c) {
            (None, _) => self.fail(DataFault::LoadDestinationMissing),
            (_, None) => self.fail(DataFault::CBusValueMissing),
            (Some(destination), Some(value)) => self.regs.write_byte(destination, value),
        }
    }

    fn apply_status_clocks(&mut self, alu: Option<AluOutput>) {
        let mut missing_output = false;

        if self.clocked(ClockSignal::NCk) {
            if let Some(out) = alu {
                self.regs.write_status_bit(StatusBit::N, out.nzvc & N_MASK != 0);
            } else {
                missing_output = true;
            }
        }
        if self.clocked(ClockSignal::ZCk) {
            if let Some(out) = alu {
                let z = out.nzvc & Z_MASK != 0;
                match self.control_value(ControlSignal::AndZ) {
                    Some(0) => self.regs.write_status_bit(StatusBit::Z, z),
                    Some(1) => {
                        let old = self.regs.read_status_bit_current(StatusBit::Z);
                        self.regs.write_status_bit(StatusBit::Z, z && old);
                    }
                    _ => missing_output = true,
                }
            } else {
                missing_output = true;
            }
        }
        if self.clocked(ClockSignal::VCk) {
            if let Some(out) = alu {
                self.regs.write_status_bit(StatusBit::V, out.nzvc & V_MASK != 0);
            } else {
                missing_output = true;
            }
        }
        if self.clocked(ClockSignal::CCk) {
            if let Some(out) = alu {
                self.regs.write_status_bit(StatusBit::C, out.nzvc & C_MASK != 0);
            } else {
                missing_output = true;
            }
        }
        if self.clocked(ClockSignal::SCk) {
            // The saved-carry bit latches the ALU's carry out.
            if let Some(out) = alu {
                self.regs.write_status_bit(StatusBit::S, out.nzvc & C_MASK != 0);
            } else {
                missing_output = true;
            }
        }

        if missing_output {
            self.fail(DataFault::StatusClockNoAluOutput);
        }
    }
}
