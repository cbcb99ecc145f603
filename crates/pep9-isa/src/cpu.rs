//! The ISA-level CPU and its per-instruction step loop.

use std::collections::HashSet;

use pep_core::{
    AccessKind, CpuRegister, InstructionSet, InterruptChannel, InterruptHandler, Listeners,
    MemoryDevice, Mnemonic, Observable, RegisterFile, StatusBit, Value,
};
use thiserror::Error;

use crate::trace::StackTracer;
use crate::traps::OsVectors;

pub(crate) const A_REG: u8 = CpuRegister::A as u8;
pub(crate) const X_REG: u8 = CpuRegister::X as u8;
pub(crate) const SP_REG: u8 = CpuRegister::Sp as u8;
pub(crate) const PC_REG: u8 = CpuRegister::Pc as u8;
pub(crate) const IS_REG: u8 = CpuRegister::Is as u8;
pub(crate) const OS_REG: u8 = CpuRegister::Os as u8;

/// SP seeded when no operating system is installed.
const DEFAULT_STACK_POINTER: u16 = 0xFBF8;

/// How often the step loop yields to the host event loop. Must be greater
/// than 1 or externally-signalled breakpoints could never be observed
/// between yields.
const YIELD_INTERVAL: u64 = 500;

/// A control-flow failure raised by the executor itself, as opposed to a
/// memory fault reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlFault {
    #[error("Error: Failed to perform memory access.")]
    MemoryAccess,
    #[error("Error: NOP0 is not a unary instruction.")]
    Nop0NotUnary,
    #[error("Error: Attempted to execute invalid unary instruction.")]
    InvalidUnary,
    #[error("Error: Attempted to execute invalid nonunary instruction.")]
    InvalidNonunary,
    #[error("Error: Attempted to execute invalid trap instruction.")]
    InvalidTrap,
    #[error("Error: Cannot execute trap with no operating system installed.")]
    TrapWithoutOs,
    #[error("Possible endless loop detected.")]
    EndlessLoop,
}

/// The Pep/9 ISA-level CPU.
///
/// The CPU owns its register file, decode tables, tracer, breakpoints and
/// interrupt plumbing; memory is borrowed per step so the machine layer
/// stays the single owner of the device.
pub struct IsaCpu {
    pub(crate) regs: RegisterFile,
    pub(crate) iset: InstructionSet,
    pub(crate) os: Option<OsVectors>,
    pub(crate) tracer: StackTracer,
    pub(crate) handler: InterruptHandler,
    breakpoints: HashSet<u16>,
    in_debug: bool,
    pub(crate) execution_finished: bool,
    pub(crate) control_fault: Option<ControlFault>,
    breakpoint_hit: bool,
    call_depth: i32,
    instruction_count: u64,
    /// Decoded operand for debugger display: the value for reads, the
    /// effective address for writes.
    pub(crate) operand_value_cache: u16,
    yield_to_host: Option<Box<dyn FnMut()>>,
    instruction_finished: Listeners<u8>,
    simulation_finished: Listeners<()>,
}

impl IsaCpu {
    /// Create a CPU over the given decode tables.
    #[must_use]
    pub fn new(iset: InstructionSet) -> Self {
        Self {
            regs: RegisterFile::new(),
            iset,
            os: None,
            tracer: StackTracer::new(),
            handler: InterruptHandler::new(),
            breakpoints: HashSet::new(),
            in_debug: false,
            execution_finished: false,
            control_fault: None,
            breakpoint_hit: false,
            call_depth: 0,
            instruction_count: 0,
            operand_value_cache: 0,
            yield_to_host: None,
            instruction_finished: Listeners::new(),
            simulation_finished: Listeners::new(),
        }
    }

    /// Install the operating-system vector contract used by traps and
    /// `init_cpu`.
    pub fn set_os_vectors(&mut self, vectors: OsVectors) {
        self.os = Some(vectors);
    }

    /// Seed SP from the user-stack vector (or the bare-machine default
    /// when no OS is installed) and flatten, so the first instruction
    /// starts from a coherent snapshot.
    pub fn init_cpu<M: MemoryDevice>(&mut self, mem: &M) {
        let sp = match self.os {
            Some(vectors) => mem.get_word(mem.max_address().wrapping_sub(vectors.user_stack_offset)),
            None => DEFAULT_STACK_POINTER,
        };
        self.regs.write_word(SP_REG, sp);
        self.regs.flatten();
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    #[must_use]
    pub fn instruction_set(&self) -> &InstructionSet {
        &self.iset
    }

    #[must_use]
    pub fn tracer(&self) -> &StackTracer {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut StackTracer {
        &mut self.tracer
    }

    /// Register or raise interrupt channels (breakpoint callbacks).
    pub fn interrupts_mut(&mut self) -> &mut InterruptHandler {
        &mut self.handler
    }

    pub fn add_breakpoint(&mut self, address: u16) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: u16) {
        self.breakpoints.remove(&address);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    #[must_use]
    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    /// Enable breakpoint observation for this run.
    pub fn set_debugging(&mut self, enabled: bool) {
        self.in_debug = enabled;
    }

    /// Install the callback invoked every 500 completed instructions so
    /// the host event loop can observe cancel and breakpoint toggles.
    pub fn set_yield_hook(&mut self, hook: impl FnMut() + 'static) {
        self.yield_to_host = Some(Box::new(hook));
    }

    /// Subscribe to instruction-retired events (the opcode that retired).
    pub fn subscribe_instruction_finished(&mut self, callback: impl FnMut(&u8) + 'static) {
        self.instruction_finished.subscribe(callback);
    }

    /// Subscribe to simulation-finished events.
    pub fn subscribe_simulation_finished(&mut self, callback: impl FnMut(&()) + 'static) {
        self.simulation_finished.subscribe(callback);
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
    pub fn call_depth(&self) -> i32 {
        self.call_depth
    }

    #[must_use]
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// The decoded operand of the last non-unary instruction.
    #[must_use]
    pub fn operand_value_cache(&self) -> u16 {
        self.operand_value_cache
    }

    #[must_use]
    pub fn control_fault(&self) -> Option<ControlFault> {
        self.control_fault
    }

    pub(crate) fn set_control_fault(&mut self, fault: ControlFault) {
        self.control_fault = Some(fault);
    }

    /// True if the last step failed in any subsystem.
    pub fn had_error_on_step<M: MemoryDevice>(&self, mem: &M) -> bool {
        self.control_fault.is_some() || mem.had_error()
    }

    /// The highest-precedence diagnostic: memory errors first, then
    /// control faults.
    pub fn error_message<M: MemoryDevice>(&self, mem: &M) -> Option<String> {
        if let Some(message) = mem.error_message() {
            return Some(message);
        }
        self.control_fault.map(|fault| fault.to_string())
    }

    /// Cancel execution cooperatively; the next loop iteration observes
    /// the flags and exits cleanly.
    pub fn cancel_execution(&mut self) {
        self.execution_finished = true;
        self.in_debug = false;
    }

    /// Reset every piece of execution state, keeping breakpoints.
    pub fn reset(&mut self) {
        self.regs.clear_registers();
        self.regs.clear_status_bits();
        self.execution_finished = false;
        self.control_fault = None;
        self.breakpoint_hit = false;
        self.call_depth = 0;
        self.instruction_count = 0;
        self.operand_value_cache = 0;
        self.in_debug = false;
        self.tracer.reset();
        self.handler.clear_queued();
    }

    /// Execute one complete instruction.
    pub fn step<M: MemoryDevice>(&mut self, mem: &mut M) {
        self.breakpoint_hit = false;

        // Remember where the instruction started so the start pane can be
        // rolled back if this turns out to be the last one.
        let start_pc = self.regs.read_word_current(PC_REG);
        mem.on_cycle_started();
        self.tracer
            .on_instruction_start(self.regs.read_byte_start(IS_REG));

        let mut okay = true;
        let mut pc = start_pc;
        mem.begin_transaction(AccessKind::Instruction);
        let is = match mem.read_byte(pc, AccessKind::Instruction) {
            Ok(byte) => byte,
            Err(_) => {
                okay = false;
                0
            }
        };
        self.regs.write_byte(IS_REG, is);
        let mnemonic = self.iset.mnemonic(is);
        pc = pc.wrapping_add(1);
        self.regs.write_word(PC_REG, pc);

        if self.iset.is_trap(mnemonic) {
            mem.end_transaction();
            self.execute_trap(mem, mnemonic);
        } else if self.iset.is_unary(mnemonic) {
            mem.end_transaction();
            self.execute_unary(mem, mnemonic);
        } else {
            let operand_spec = match mem.read_word(pc, AccessKind::Instruction) {
                Ok(word) => word,
                Err(_) => {
                    okay = false;
                    0
                }
            };
            mem.end_transaction();
            self.regs.write_word(OS_REG, operand_spec);
            let mode = self.iset.addr_mode(is);
            pc = pc.wrapping_add(2);
            self.regs.write_word(PC_REG, pc);
            self.execute_nonunary(mem, mnemonic, operand_spec, mode);
        }

        if !okay {
            self.control_fault = Some(ControlFault::MemoryAccess);
        }

        // Notify the tracer before flattening, while the start pane still
        // holds the pre-instruction SP and PC.
        let is_current = self.regs.read_byte_current(IS_REG);
        let operand_spec = self.regs.read_word_current(OS_REG);
        let sp_start = self.regs.read_word_start(SP_REG);
        let sp_current = self.regs.read_word_current(SP_REG);
        let pc_start = self.regs.read_word_start(PC_REG);
        let accumulator = self.regs.read_word_current(A_REG);
        self.tracer.on_instruction_end(
            &self.iset,
            is_current,
            operand_spec,
            sp_start,
            sp_current,
            pc_start,
            accumulator,
        );

        mem.on_cycle_finished();
        mem.on_instruction_finished(is);
        self.update_at_instruction_end(mem);
        self.instruction_finished.emit(&is);
        self.instruction_count += 1;

        self.regs.flatten();
        if self.instruction_count % YIELD_INTERVAL == 0
            && let Some(hook) = self.yield_to_host.as_mut()
        {
            hook();
        }

        // If execution finished on this instruction, restore the original
        // starting program counter: the instruction at the current PC will
        // not execute, and the debugger should point at the offender.
        if self.execution_finished || self.had_error_on_step(mem) {
            self.regs.overwrite_register_word_start(PC_REG, start_pc);
            self.simulation_finished.emit(&());
        }

        if self.in_debug
            && self
                .breakpoints
                .contains(&self.regs.read_word_current(PC_REG))
        {
            self.handler.interrupt(InterruptChannel::BreakpointAsm);
        }
        for channel in self.handler.drain() {
            if channel == InterruptChannel::BreakpointAsm {
                self.breakpoint_hit = true;
            }
        }
    }

    /// Execute until an error, STOP, or (in debug mode) a breakpoint.
    ///
    /// At least one instruction always executes, so resuming from a
    /// breakpoint steps past it rather than re-observing the stale hit.
    /// Returns true on clean termination.
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

    /// Execute with an instruction ceiling, for batch runs that must
    /// terminate. Exceeding the ceiling raises the endless-loop control
    /// fault; the step that observes it finishes the simulation and
    /// rolls the start-pane PC back.
    pub fn run_bounded<M: MemoryDevice>(&mut self, mem: &mut M, max_steps: u64) -> bool {
        while !self.had_error_on_step(mem) && !self.execution_finished && !self.breakpoint_hit {
            if self.instruction_count >= max_steps {
                self.set_control_fault(ControlFault::EndlessLoop);
            }
            self.step(mem);
        }
        !self.had_error_on_step(mem) && !self.breakpoint_hit
    }

    fn update_at_instruction_end<M: MemoryDevice>(&mut self, mem: &M) {
        let is = self.regs.read_byte_current(IS_REG);
        let mnemonic = self.iset.mnemonic(is);
        if mnemonic == Mnemonic::Call || self.iset.is_trap(mnemonic) {
            self.call_depth += 1;
        } else if mnemonic == Mnemonic::Ret || mnemonic == Mnemonic::Rettr {
            self.call_depth -= 1;
        }
        if self.had_error_on_step(mem) {
            self.execution_finished = true;
        }
    }

    pub(crate) fn status_bit(&self, bit: StatusBit) -> bool {
        self.regs.read_status_bit_current(bit)
    }

    pub(crate) fn set_status_bit(&mut self, bit: StatusBit, value: bool) {
        self.regs.write_status_bit(bit, value);
    }
}

const ISA_QUERY_PATHS: &[&str] = &[
    "a",
    "x",
    "sp",
    "pc",
    "is",
    "os",
    "flags.n",
    "flags.z",
    "flags.v",
    "flags.c",
    "call_depth",
    "instructions",
    "finished",
    "operand",
];

impl Observable for IsaCpu {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "a" => Some(self.regs.read_word_current(A_REG).into()),
            "x" => Some(self.regs.read_word_current(X_REG).into()),
            "sp" => Some(self.regs.read_word_current(SP_REG).into()),
            "pc" => Some(self.regs.read_word_current(PC_REG).into()),
            "is" => Some(self.regs.read_byte_current(IS_REG).into()),
            "os" => Some(self.regs.read_word_current(OS_REG).into()),
            "flags.n" => Some(self.status_bit(StatusBit::N).into()),
            "flags.z" => Some(self.status_bit(StatusBit::Z).into()),
            "flags.v" => Some(self.status_bit(StatusBit::V).into()),
            "flags.c" => Some(self.status_bit(StatusBit::C).into()),
            "call_depth" => Some(Value::U64(self.call_depth.unsigned_abs().into())),
            "instructions" => Some(self.instruction_count.into()),
            "finished" => Some(self.execution_finished.into()),
            "operand" => Some(self.operand_value_cache.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        ISA_QUERY_PATHS
    }
}
