//! Machine wiring: memory map, CPU, and batch execution.

use std::collections::HashMap;

use log::{debug, info};
use pep_core::{InstructionSet, MemoryDevice};
use pep9_isa::{IsaCpu, OsVectors};
use pep9_mem::{MainMemory, MemoryChip, RamChip, RomChip};
use pep9_micro::{BoundedMicroCpu, BusWidth, MicroCpu, MicrocodeProgram, UnitTest};

use crate::os::{OsImage, default_os_image};

/// Machine construction parameters.
pub struct MachineConfig {
    /// Burned OS image. Defaults to the built-in minimal image.
    pub os: OsImage,
    /// Whether NOP0 traps or executes as a plain unary. One choice per
    /// machine lifetime.
    pub nop0_is_trap: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            os: default_os_image(),
            nop0_is_trap: true,
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// True when the program reached STOP with no error.
    pub success: bool,
    /// Everything the program wrote to charOut.
    pub output: Vec<u8>,
    /// Highest-precedence diagnostic when `success` is false.
    pub error: Option<String>,
    /// Instructions executed.
    pub instructions: u64,
}

/// A complete Pep/9 computer: main memory with the OS burned in, the
/// memory-mapped I/O ports, and the ISA CPU.
pub struct Pep9Machine {
    mem: MainMemory,
    cpu: IsaCpu,
    char_in: u16,
    char_out: u16,
    /// Assembler symbols, passed through unchanged for debugger display.
    symbols: HashMap<String, u16>,
}

impl Pep9Machine {
    /// Build the machine from an OS image: RAM below the charIn port,
    /// the two I/O ports at the addresses the vectors name, RAM in any
    /// gap, and ROM over the burned region.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        let os = config.os;
        let char_in = os.char_in();
        let char_out = os.char_out();
        let rom_start = os.rom_start();

        let mut mem = MainMemory::new(os.burn_address());
        mem.install(MemoryChip::Ram(RamChip::new(0, u32::from(char_in))));
        mem.install_input_port(char_in);
        mem.install_output_port(char_out);
        if char_out + 1 < rom_start {
            mem.install(MemoryChip::Ram(RamChip::new(
                char_out + 1,
                u32::from(rom_start - char_out - 1),
            )));
        }
        mem.install(MemoryChip::Rom(RomChip::new(
            rom_start,
            u32::from(os.burn_address() - rom_start) + 1,
        )));
        for (offset, byte) in os.rom_bytes().iter().enumerate() {
            mem.set_byte(rom_start + offset as u16, *byte);
        }
        info!(
            "operating system: {} bytes burned through {:#06X}, ports at {:#06X}/{:#06X}",
            os.rom_bytes().len(),
            os.burn_address(),
            char_in,
            char_out
        );

        let mut cpu = IsaCpu::new(InstructionSet::new(config.nop0_is_trap));
        cpu.set_os_vectors(OsVectors::new(os.burn_address()));

        Self {
            mem,
            cpu,
            char_in,
            char_out,
            symbols: HashMap::new(),
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &IsaCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut IsaCpu {
        &mut self.cpu
    }

    #[must_use]
    pub fn memory(&self) -> &MainMemory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut MainMemory {
        &mut self.mem
    }

    /// Load a user program at address 0 through the pure path.
    pub fn load_program(&mut self, bytes: &[u8]) {
        debug!("loading {} object bytes at 0x0000", bytes.len());
        for (address, byte) in bytes.iter().enumerate() {
            self.mem.set_byte(address as u16, *byte);
        }
    }

    /// Record the assembler's symbol table for debugger display.
    pub fn set_symbol_table(&mut self, symbols: HashMap<String, u16>) {
        self.symbols = symbols;
    }

    /// The assembler symbols, unchanged from the loader.
    #[must_use]
    pub fn symbol_table(&self) -> &HashMap<String, u16> {
        &self.symbols
    }

    /// Buffer batch input behind the charIn port.
    pub fn buffer_input(&mut self, data: &[u8]) {
        self.mem.buffer_input(self.char_in, data);
    }

    /// Echo every byte written to charOut to stdout as it appears.
    pub fn echo_output_to_stdout(&mut self) {
        let port = self.char_out;
        self.mem.subscribe_changed(move |change| {
            if change.address == port {
                print!("{}", change.value as char);
            }
        });
    }

    /// Run the loaded program to completion with an instruction ceiling.
    pub fn run(&mut self, max_steps: u64) -> RunOutcome {
        self.cpu.init_cpu(&self.mem);
        let success = self.cpu.run_bounded(&mut self.mem, max_steps);
        let output = self
            .mem
            .output_bytes(self.char_out)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let error = if success {
            None
        } else {
            self.cpu.error_message(&self.mem)
        };
        RunOutcome {
            success,
            output,
            error,
            instructions: self.cpu.instruction_count(),
        }
    }
}

/// Result of a microprogram unit run.
#[derive(Debug, Clone)]
pub struct MicroRunOutcome {
    /// True when the program stopped cleanly and every postcondition
    /// held.
    pub success: bool,
    pub error: Option<String>,
    /// Postcondition failures, one diagnostic each.
    pub failures: Vec<String>,
    pub cycles: u64,
}

/// Run a microprogram against a flat 64K RAM, seeding unit preconditions
/// first and checking postconditions after — the flow a `cpurun` harness
/// drives.
#[must_use]
pub fn run_microprogram(
    program: MicrocodeProgram,
    unit: &UnitTest,
    width: BusWidth,
    max_cycles: u64,
) -> MicroRunOutcome {
    let mut mem = MainMemory::flat_ram(0xFFFF);
    let mut cpu = MicroCpu::new(width, program, InstructionSet::new(true));
    unit.apply_preconditions(cpu.datapath_mut(), &mut mem);

    let mut bounded = BoundedMicroCpu::new(cpu, max_cycles);
    let clean = bounded.run(&mut mem);
    let error = if clean {
        None
    } else {
        bounded.cpu().error_message(&mem)
    };
    let failures = match unit.check_postconditions(bounded.cpu().datapath(), &mem) {
        Ok(()) => Vec::new(),
        Err(failures) => failures,
    };
    debug!(
        "microprogram finished after {} cycles, {} postcondition failures",
        bounded.cpu().cycle_count(),
        failures.len()
    );
    MicroRunOutcome {
        success: clean && failures.is_empty(),
        error,
        failures,
        cycles: bounded.cpu().cycle_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pep9_micro::{BranchFunction, ClockSignal, ControlSignal, MicroLine, UnitSpec};

    /// LDBA 'h',i; STBA charOut,d; LDBA charIn,d; STBA charOut,d; STOP
    fn echo_program() -> Vec<u8> {
        vec![
            0xD0, 0x00, b'h', // LDBA 'h',i
            0xF1, 0xFC, 0x16, // STBA 0xFC16,d
            0xD1, 0xFC, 0x15, // LDBA 0xFC15,d
            0xF1, 0xFC, 0x16, // STBA 0xFC16,d
            0x00, // STOP
        ]
    }

    #[test]
    fn machine_runs_a_program_with_io() {
        let mut machine = Pep9Machine::new(MachineConfig::default());
        machine.load_program(&echo_program());
        machine.buffer_input(b"i");

        let outcome = machine.run(1_000);
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.output, b"hi");
        // init_cpu seeded SP from the user-stack vector.
        assert_eq!(machine.cpu().registers().read_word_start(4), 0xFB8F);
    }

    #[test]
    fn trap_vectors_into_the_builtin_handler_and_returns() {
        let mut machine = Pep9Machine::new(MachineConfig::default());
        // DECO 0x0000,i traps; the built-in handler RETTRs straight back.
        machine.load_program(&[0x38, 0x00, 0x00, 0x00]);

        let outcome = machine.run(1_000);
        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(machine.cpu().registers().read_word_current(6), 0x0004);
    }

    #[test]
    fn writing_to_rom_fails_the_run() {
        let mut machine = Pep9Machine::new(MachineConfig::default());
        // STBA 0xFD00,d — a store into the OS ROM.
        machine.load_program(&[0xF1, 0xFD, 0x00, 0x00]);

        let outcome = machine.run(1_000);
        assert!(!outcome.success);
        assert!(outcome.error.expect("diagnostic").contains("read-only"));
    }

    #[test]
    fn reading_past_buffered_input_fails_the_run() {
        let mut machine = Pep9Machine::new(MachineConfig::default());
        machine.load_program(&[0xD1, 0xFC, 0x15, 0x00]); // LDBA charIn,d

        let outcome = machine.run(1_000);
        assert!(!outcome.success);
        assert!(outcome.error.expect("diagnostic").contains("input"));
    }

    #[test]
    fn runaway_programs_hit_the_ceiling() {
        let mut machine = Pep9Machine::new(MachineConfig::default());
        machine.load_program(&[0x12, 0x00, 0x00]); // BR 0x0000,i

        let outcome = machine.run(50);
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.expect("diagnostic"),
            "Possible endless loop detected."
        );
    }

    #[test]
    fn microprogram_unit_run_checks_postconditions() {
        // Copy the constant register 23 (0x01) into register 0's low
        // byte, then stop.
        let lines = vec![
            MicroLine::new()
                .with_control(ControlSignal::A, 23)
                .with_control(ControlSignal::AMux, 1)
                .with_control(ControlSignal::Alu, 0)
                .with_control(ControlSignal::CMux, 1)
                .with_control(ControlSignal::C, 1)
                .with_clock(ClockSignal::LoadCk)
                .with_branch(BranchFunction::Stop),
        ];
        let program = MicrocodeProgram::new(lines).expect("assembles");
        let unit = UnitTest {
            pre: vec![UnitSpec::Register { reg: 0, value: 0 }],
            post: vec![UnitSpec::Register { reg: 0, value: 0x0001 }],
        };

        let outcome = run_microprogram(program, &unit, BusWidth::OneByte, 100);
        assert!(outcome.success, "failures: {:?}", outcome.failures);
        assert_eq!(outcome.cycles, 1);
    }
}
