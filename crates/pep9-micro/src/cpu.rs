//! The microcode executor: one microline per step.

use pep_core::{
    CpuRegister, InstructionSet, InterruptChannel, InterruptHandler, Listeners, MemoryDevice,
    Observable, StatusBit, Value,
};
use thiserror::Error;

use crate::datapath::{BusWidth, Datapath, MemoryRegister};
use crate::program::{BranchCondition, BranchFunction, MicrocodeProgram};

const PC_REG: u8 = CpuRegister::Pc as u8;
const IS_REG: u8 = CpuRegister::Is as u8;

/// A control-section failure in the microcode executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MicroFault {
    #[error("Microprogram counter {0} is outside the program.")]
    ProgramCounterRange(usize),
    #[error("No microcode implements instruction specifier {0:#04X}.")]
    MissingInstructionEntry(u8),
    #[error("No microcode implements the addressing mode of instruction specifier {0:#04X}.")]
    MissingAddressingModeEntry(u8),
    #[error("Possible endless loop detected.")]
    EndlessLoop,
}

/// The Pep/9 microcode-level CPU.
///
/// Owns the datapath (and through it the register file), the assembled
/// microprogram, and the decoder jump tables built from the program's
/// symbols. Memory is borrowed per cycle.
pub struct MicroCpu {
    data: Datapath,
    program: MicrocodeProgram,
    iset: InstructionSet,
    upc: usize,
    cycle_count: u64,
    /// Entry line per opcode for the InstructionDecoder branch, resolved
    /// from the program's symbols by mnemonic name.
    instr_jump: [Option<usize>; 256],
    /// Entry line per opcode for the AddressingModeDecoder branch.
    addr_jump: [Option<usize>; 256],
    in_debug: bool,
    execution_finished: bool,
    breakpoint_hit: bool,
    control_fault: Option<MicroFault>,
    handler: InterruptHandler,
    simulation_finished: Listeners<()>,
}

impl MicroCpu {
    /// Create a CPU over an assembled microprogram.
    ///
    /// The decoder jump tables resolve each opcode's mnemonic and
    /// addressing-mode names against the program's symbol table; entries
    /// with no matching symbol stay empty and fault only if a decoder
    /// branch reaches them.
    #[must_use]
    pub fn new(width: BusWidth, program: MicrocodeProgram, iset: InstructionSet) -> Self {
        let mut instr_jump = [None; 256];
        let mut addr_jump = [None; 256];
        for opcode in 0..=255u8 {
            let mnemonic = iset.mnemonic(opcode);
            instr_jump[opcode as usize] = program.symbol(mnemonic.name());
            addr_jump[opcode as usize] = iset
                .addr_mode(opcode)
                .name()
                .and_then(|name| program.symbol(name));
        }
        Self {
            data: Datapath::new(width),
            program,
            iset,
            upc: 0,
            cycle_count: 0,
            instr_jump,
            addr_jump,
            in_debug: false,
            execution_finished: false,
            breakpoint_hit: false,
            control_fault: None,
            handler: InterruptHandler::new(),
            simulation_finished: Listeners::new(),
        }
    }

    #[must_use]
    pub fn datapath(&self) -> &Datapath {
        &self.data
    }

    pub fn datapath_mut(&mut self) -> &mut Datapath {
        &mut self.data
    }

    #[must_use]
    pub fn program(&self) -> &MicrocodeProgram {
        &self.program
    }

    /// Toggle a breakpoint on a microprogram line.
    pub fn set_breakpoint(&mut self, line: usize, enabled: bool) {
        self.program.set_breakpoint(line, enabled);
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptHandler {
        &mut self.handler
    }

    pub fn subscribe_simulation_finished(&mut self, callback: impl FnMut(&()) + 'static) {
        self.simulation_finished.subscribe(callback);
    }

    pub fn set_debugging(&mut self, enabled: bool) {
        self.in_debug = enabled;
    }

    #[must_use]
    pub fn microprogram_counter(&self) -> usize {
        self.upc
    }

    /// Jump the microprogram counter to the line labelled `start`, when
    /// the program defines one (skipping its initialisation preamble).
    pub fn set_upc_to_start(&mut self) {
        if let Some(start) = self.program.symbol("start") {
            self.upc = start;
        }
    }

    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    #[must_use]
    pub fn execution_finished(&self) -> bool {
        self.execution_finished
    }

    #[must_use]
    pub fn stopped_for_breakpoint(&self) -> bool {
        self.breakpoint_hit
    }

    #[must_use]
    pub fn control_fault(&self) -> Option<MicroFault> {
        self.control_fault
    }

    pub(crate) fn set_control_fault(&mut self, fault: MicroFault) {
        self.control_fault = Some(fault);
    }

    /// True if the last cycle failed in any subsystem.
    pub fn had_error_on_step<M: MemoryDevice>(&self, mem: &M) -> bool {
        self.control_fault.is_some() || self.data.had_fault() || mem.had_error()
    }

    /// Highest-precedence diagnostic: memory, then data section, then
    /// control.
    pub fn error_message<M: MemoryDevice>(&self, mem: &M) -> Option<String> {
        if let Some(message) = mem.error_message() {
            return Some(message);
        }
        if let Some(fault) = self.data.fault() {
            return Some(fault.to_string());
        }
        self.control_fault.map(|fault| fault.to_string())
    }

    pub fn cancel_execution(&mut self) {
        self.execution_finished = true;
        self.in_debug = false;
    }

    /// Reset execution state but keep the loaded microprogram and its
    /// breakpoints.
    pub fn reset(&mut self) {
        self.data.clear_cpu();
        self.upc = 0;
        self.cycle_count = 0;
        self.execution_finished = false;
        self.breakpoint_hit = false;
        self.control_fault = None;
        self.in_debug = false;
        self.handler.clear_queued();
    }

    /// Execute one microcode cycle.
    pub fn step<M: MemoryDevice>(&mut self, mem: &mut M) {
        self.breakpoint_hit = false;

        if self.upc == 0 {
            // Instruction start: predict the instruction specifier for
            // the register pane, before any fetch cycles run.
            let pc = self.data.registers().read_word_current(PC_REG);
            let predicted = mem.get_byte(pc);
            self.data.registers_mut().set_ir_cache(predicted);
            mem.on_cycle_started();
        }

        let Some(line) = self.program.line(self.upc) else {
            self.control_fault = Some(MicroFault::ProgramCounterRange(self.upc));
            self.execution_finished = true;
            return;
        };
        let branch = line.branch;
        if self.data.set_signals_from_line(line).is_err() {
            // The fault is recorded on the datapath; the run loop
            // surfaces it as a data-section error.
            return;
        }

        self.data.step(mem);
        self.apply_branch(branch);
        self.cycle_count += 1;

        if self.execution_finished || self.had_error_on_step(mem) {
            self.data.registers_mut().flatten();
            self.simulation_finished.emit(&());
        }

        mem.on_cycle_finished();

        if self.in_debug
            && self
                .program
                .line(self.upc)
                .is_some_and(|next| next.breakpoint)
        {
            self.handler.interrupt(InterruptChannel::BreakpointMicro);
        }
        for channel in self.handler.drain() {
            if channel == InterruptChannel::BreakpointMicro {
                self.breakpoint_hit = true;
            }
        }
    }

    /// Execute until an error, a Stop branch, or (in debug mode) a
    /// breakpoint. Returns true on clean termination.
    pub fn run<M: MemoryDevice>(&mut self, mem: &mut M) -> bool {
        loop {
            self.step(mem);
            if self.had_error_on_step(mem)
                || self.execution_finished
                || (self.in_debug && self.breakpoint_hit)
            {
                break;
            }
        }
        !self.had_error_on_step(mem) && !self.breakpoint_hit
    }

    fn apply_branch(&mut self, branch: BranchFunction) {
        if branch == BranchFunction::Stop {
            self.execution_finished = true;
            return;
        }
        if self.execution_finished {
            return;
        }
        match branch {
            BranchFunction::Sequential => self.upc += 1,
            BranchFunction::Unconditional(target) => self.upc = target,
            BranchFunction::Conditional {
                condition,
                true_target,
                false_target,
            } => {
                self.upc = if self.condition_holds(condition) {
                    true_target
                } else {
                    false_target
                };
            }
            BranchFunction::InstructionDecoder => {
                let is = self.data.registers().read_byte_current(IS_REG);
                match self.instr_jump[is as usize] {
                    Some(target) => self.upc = target,
                    None => {
                        self.control_fault = Some(MicroFault::MissingInstructionEntry(is));
                        self.execution_finished = true;
                    }
                }
            }
            BranchFunction::AddressingModeDecoder => {
                let is = self.data.registers().read_byte_current(IS_REG);
                match self.addr_jump[is as usize] {
                    Some(target) => self.upc = target,
                    None => {
                        self.control_fault = Some(MicroFault::MissingAddressingModeEntry(is));
                        self.execution_finished = true;
                    }
                }
            }
            BranchFunction::Stop => {}
        }
    }

    fn condition_holds(&self, condition: BranchCondition) -> bool {
        let regs = self.data.registers();
        let n = regs.read_status_bit_current(StatusBit::N);
        let z = regs.read_status_bit_current(StatusBit::Z);
        match condition {
            BranchCondition::GreaterThan => !n && !z,
            BranchCondition::GreaterOrEqual => !n,
            BranchCondition::Equal => z,
            BranchCondition::NotEqual => !z,
            BranchCondition::LessOrEqual => n || z,
            BranchCondition::LessThan => n,
            BranchCondition::Overflow => regs.read_status_bit_current(StatusBit::V),
            BranchCondition::Carry => regs.read_status_bit_current(StatusBit::C),
            BranchCondition::SavedCarry => regs.read_status_bit_current(StatusBit::S),
            BranchCondition::PcEven => regs.read_word_current(PC_REG) & 1 == 0,
            BranchCondition::IsUnary => {
                let is = regs.read_byte_current(IS_REG);
                self.iset.is_unary(self.iset.mnemonic(is))
            }
        }
    }
}

/// A `MicroCpu` with a cycle ceiling for batch runs. An instruction
/// takes on the order of twenty microcode cycles, so the default ceiling
/// is correspondingly larger than the ISA one.
pub struct BoundedMicroCpu {
    cpu: MicroCpu,
    max_cycles: u64,
}

impl BoundedMicroCpu {
    pub const DEFAULT_MAX_CYCLES: u64 = 250_000;

    #[must_use]
    pub fn new(cpu: MicroCpu, max_cycles: u64) -> Self {
        Self { cpu, max_cycles }
    }

    #[must_use]
    pub fn cpu(&self) -> &MicroCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut MicroCpu {
        &mut self.cpu
    }

    /// Execute until an error, a Stop branch, or the cycle ceiling.
    /// Returns true on clean termination.
    pub fn run<M: MemoryDevice>(&mut self, mem: &mut M) -> bool {
        while !self.cpu.had_error_on_step(mem) && !self.cpu.execution_finished() {
            if self.cpu.cycle_count() >= self.max_cycles {
                self.cpu.set_control_fault(MicroFault::EndlessLoop);
                self.cpu.cancel_execution();
                break;
            }
            self.cpu.step(mem);
        }
        !self.cpu.had_error_on_step(mem)
    }
}

const MICRO_QUERY_PATHS: &[&str] = &[
    "upc",
    "cycles",
    "bus_state",
    "mara",
    "marb",
    "mdr",
    "mdre",
    "mdro",
    "flags.n",
    "flags.z",
    "flags.v",
    "flags.c",
    "flags.s",
    "finished",
];

impl Observable for MicroCpu {
    fn query(&self, path: &str) -> Option<Value> {
        let regs = self.data.registers();
        match path {
            "upc" => Some(Value::U64(self.upc as u64)),
            "cycles" => Some(self.cycle_count.into()),
            "bus_state" => Some(format!("{:?}", self.data.bus_state()).into()),
            "mara" => Some(self.data.memory_register(MemoryRegister::MarA).into()),
            "marb" => Some(self.data.memory_register(MemoryRegister::MarB).into()),
            "mdr" => Some(self.data.memory_register(MemoryRegister::Mdr).into()),
            "mdre" => Some(self.data.memory_register(MemoryRegister::Mdre).into()),
            "mdro" => Some(self.data.memory_register(MemoryRegister::Mdro).into()),
            "flags.n" => Some(regs.read_status_bit_current(StatusBit::N).into()),
            "flags.z" => Some(regs.read_status_bit_current(StatusBit::Z).into()),
            "flags.v" => Some(regs.read_status_bit_current(StatusBit::V).into()),
            "flags.c" => Some(regs.read_status_bit_current(StatusBit::C).into()),
            "flags.s" => Some(regs.read_status_bit_current(StatusBit::S).into()),
            "finished" => Some(self.execution_finished.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        MICRO_QUERY_PATHS
    }
}
