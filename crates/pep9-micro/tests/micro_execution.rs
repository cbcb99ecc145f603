//! Cycle-level scenarios: bus timing, mux routing, decoder dispatch.

use pep_core::{AccessKind, InstructionSet, MemoryDevice, MemoryError, StatusBit};
use pep9_micro::{
    BoundedMicroCpu, BranchCondition, BranchFunction, BusState, BusWidth, ClockSignal,
    ControlSignal, Datapath, MemoryRegister, MicroCpu, MicroLine, MicrocodeProgram, UnitSpec,
    UnitTest,
};

struct TestMemory {
    bytes: Vec<u8>,
}

impl TestMemory {
    fn new() -> Self {
        Self {
            bytes: vec![0; 0x1_0000],
        }
    }
}

impl MemoryDevice for TestMemory {
    fn max_address(&self) -> u16 {
        0xFFFF
    }

    fn read_byte(&mut self, address: u16, _access: AccessKind) -> Result<u8, MemoryError> {
        Ok(self.bytes[address as usize])
    }

    fn write_byte(
        &mut self,
        address: u16,
        value: u8,
        _access: AccessKind,
    ) -> Result<(), MemoryError> {
        self.bytes[address as usize] = value;
        Ok(())
    }

    fn get_byte(&self, address: u16) -> u8 {
        self.bytes[address as usize]
    }

    fn set_byte(&mut self, address: u16, value: u8) {
        self.bytes[address as usize] = value;
    }
}

fn one_byte_cpu(lines: Vec<MicroLine>) -> MicroCpu {
    let program = MicrocodeProgram::new(lines).expect("program assembles");
    MicroCpu::new(BusWidth::OneByte, program, InstructionSet::new(true))
}

fn two_byte_cpu(lines: Vec<MicroLine>) -> MicroCpu {
    let program = MicrocodeProgram::new(lines).expect("program assembles");
    MicroCpu::new(BusWidth::TwoByte, program, InstructionSet::new(true))
}

#[test]
fn bus_reaches_read_ready_in_three_same_mar_cycles() {
    let mut data = Datapath::new(BusWidth::OneByte);
    let mut mem = TestMemory::new();
    data.set_control(ControlSignal::MemRead, 1);

    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemReadFirstWait);
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemReadSecondWait);
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemReadReady);
    // Holding MemRead past Ready starts the next read.
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemReadFirstWait);
    // Dropping both strobes idles the bus.
    data.set_control(ControlSignal::MemRead, pep9_micro::SIGNAL_DISABLED);
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::None);
}

#[test]
fn bus_reaches_write_ready_and_commits_the_mdr() {
    let mut data = Datapath::new(BusWidth::OneByte);
    let mut mem = TestMemory::new();
    data.set_memory_register(MemoryRegister::MarA, 0x12);
    data.set_memory_register(MemoryRegister::MarB, 0x34);
    data.set_memory_register(MemoryRegister::Mdr, 0x9C);
    data.set_control(ControlSignal::MemWrite, 1);

    data.step(&mut mem);
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemWriteSecondWait);
    assert_eq!(mem.get_byte(0x1234), 0x00);
    data.step(&mut mem);
    assert_eq!(data.bus_state(), BusState::MemWriteReady);
    assert_eq!(mem.get_byte(0x1234), 0x9C);
}

#[test]
fn one_byte_memory_read_lands_in_the_mdr() {
    // Cycle 1 clocks PC's bytes into the MAR; cycles 2-4 hold MemRead,
    // the fourth clocking the arrived byte into the MDR.
    let lines = vec![
        MicroLine::new()
            .with_control(ControlSignal::A, 6)
            .with_control(ControlSignal::B, 7)
            .with_clock(ClockSignal::MarCk),
        MicroLine::new().with_control(ControlSignal::MemRead, 1),
        MicroLine::new().with_control(ControlSignal::MemRead, 1),
        MicroLine::new()
            .with_control(ControlSignal::MemRead, 1)
            .with_control(ControlSignal::MdrMux, 0)
            .with_clock(ClockSignal::MdrCk),
        MicroLine::new().with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.datapath_mut().registers_mut().write_word(6, 0x1234);
    mem.set_byte(0x1234, 0xAB);

    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().bus_state(), BusState::None);
    assert_eq!(cpu.datapath().memory_register(MemoryRegister::MarA), 0x12);
    assert_eq!(cpu.datapath().memory_register(MemoryRegister::MarB), 0x34);

    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().bus_state(), BusState::MemReadFirstWait);
    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().bus_state(), BusState::MemReadSecondWait);
    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().bus_state(), BusState::MemReadReady);
    assert_eq!(cpu.datapath().memory_register(MemoryRegister::Mdr), 0xAB);
    assert!(!cpu.had_error_on_step(&mem));

    cpu.step(&mut mem);
    assert!(cpu.execution_finished());
}

#[test]
fn load_clock_routes_a_register_through_the_alu() {
    // Pass the constant register 23 (0x01) through ALU function 0 onto
    // the C bus and clock it into register 2.
    let lines = vec![
        MicroLine::new()
            .with_control(ControlSignal::A, 23)
            .with_control(ControlSignal::AMux, 1)
            .with_control(ControlSignal::Alu, 0)
            .with_control(ControlSignal::CMux, 1)
            .with_control(ControlSignal::C, 2)
            .with_clock(ClockSignal::LoadCk)
            .with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().registers().read_byte_current(2), 0x01);
    assert!(!cpu.had_error_on_step(&mem));
}

#[test]
fn load_clock_without_a_c_bus_value_faults() {
    let lines = vec![
        MicroLine::new()
            .with_control(ControlSignal::C, 2)
            .with_clock(ClockSignal::LoadCk)
            .with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.step(&mut mem);
    assert!(cpu.had_error_on_step(&mem));
    assert_eq!(
        cpu.error_message(&mem).expect("diagnostic"),
        "No value on C Bus to clock in."
    );
}

#[test]
fn and_z_combines_zero_results_across_bytes() {
    // First cycle: 0x00 + 0x00 sets Z. Second cycle: 0x01 + 0x00 with
    // AndZ keeps Z only if the new result is also zero.
    let add_bytes = |a_reg: u8, and_z: u8| {
        MicroLine::new()
            .with_control(ControlSignal::A, a_reg)
            .with_control(ControlSignal::B, 22)
            .with_control(ControlSignal::AMux, 1)
            .with_control(ControlSignal::Alu, 1)
            .with_control(ControlSignal::AndZ, and_z)
            .with_clock(ClockSignal::ZCk)
    };
    let lines = vec![
        add_bytes(22, 0),
        add_bytes(22, 1),
        add_bytes(23, 1).with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();

    cpu.step(&mut mem);
    assert!(
        cpu.datapath()
            .registers()
            .read_status_bit_current(StatusBit::Z)
    );
    // Zero again under AndZ: still zero.
    cpu.step(&mut mem);
    assert!(
        cpu.datapath()
            .registers()
            .read_status_bit_current(StatusBit::Z)
    );
    // Nonzero byte under AndZ clears the accumulated Z.
    cpu.step(&mut mem);
    assert!(
        !cpu.datapath()
            .registers()
            .read_status_bit_current(StatusBit::Z)
    );
}

#[test]
fn two_byte_bus_reads_a_word_into_mdre_and_mdro() {
    let lines = vec![
        MicroLine::new()
            .with_control(ControlSignal::A, 0)
            .with_control(ControlSignal::B, 1)
            .with_control(ControlSignal::MarMux, 1)
            .with_clock(ClockSignal::MarCk),
        MicroLine::new().with_control(ControlSignal::MemRead, 1),
        MicroLine::new().with_control(ControlSignal::MemRead, 1),
        MicroLine::new()
            .with_control(ControlSignal::MemRead, 1)
            .with_control(ControlSignal::MdreMux, 0)
            .with_control(ControlSignal::MdroMux, 0)
            .with_clock(ClockSignal::MdreCk)
            .with_clock(ClockSignal::MdroCk)
            .with_branch(BranchFunction::Stop),
    ];
    let mut cpu = two_byte_cpu(lines);
    let mut mem = TestMemory::new();
    // The odd address exercises the low-bit mask.
    cpu.datapath_mut().registers_mut().write_word(0, 0x2001);
    mem.set_byte(0x2000, 0xBE);
    mem.set_byte(0x2001, 0xEF);

    for _ in 0..4 {
        cpu.step(&mut mem);
    }
    assert!(!cpu.had_error_on_step(&mem));
    assert_eq!(cpu.datapath().memory_register(MemoryRegister::Mdre), 0xBE);
    assert_eq!(cpu.datapath().memory_register(MemoryRegister::Mdro), 0xEF);
}

#[test]
fn two_byte_bus_writes_a_word_from_mdre_and_mdro() {
    let route_constant = |constant_reg: u8, mux: ControlSignal, ck: ClockSignal| {
        MicroLine::new()
            .with_control(ControlSignal::A, constant_reg)
            .with_control(ControlSignal::AMux, 1)
            .with_control(ControlSignal::Alu, 0)
            .with_control(ControlSignal::CMux, 1)
            .with_control(mux, 1)
            .with_clock(ck)
    };
    let lines = vec![
        MicroLine::new()
            .with_control(ControlSignal::A, 0)
            .with_control(ControlSignal::B, 1)
            .with_control(ControlSignal::MarMux, 1)
            .with_clock(ClockSignal::MarCk),
        route_constant(24, ControlSignal::MdreMux, ClockSignal::MdreCk),
        route_constant(25, ControlSignal::MdroMux, ClockSignal::MdroCk),
        MicroLine::new().with_control(ControlSignal::MemWrite, 1),
        MicroLine::new().with_control(ControlSignal::MemWrite, 1),
        MicroLine::new()
            .with_control(ControlSignal::MemWrite, 1)
            .with_branch(BranchFunction::Stop),
    ];
    let mut cpu = two_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.datapath_mut().registers_mut().write_word(0, 0x3001);

    for _ in 0..6 {
        cpu.step(&mut mem);
    }
    assert!(!cpu.had_error_on_step(&mem));
    // Constants 0x02/0x03 land at the word-aligned address.
    assert_eq!(mem.get_byte(0x3000), 0x02);
    assert_eq!(mem.get_byte(0x3001), 0x03);
}

#[test]
fn decoder_branches_dispatch_by_instruction_and_mode() {
    let lines = vec![
        MicroLine::new().with_branch(BranchFunction::InstructionDecoder),
        MicroLine::new()
            .with_symbol("ldwa")
            .with_branch(BranchFunction::AddressingModeDecoder),
        MicroLine::new()
            .with_symbol("i")
            .with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    // Opcode 0xC0 = LDWA immediate.
    cpu.datapath_mut().registers_mut().write_byte(8, 0xC0);

    cpu.step(&mut mem);
    assert_eq!(cpu.microprogram_counter(), 1);
    cpu.step(&mut mem);
    assert_eq!(cpu.microprogram_counter(), 2);
    cpu.step(&mut mem);
    assert!(cpu.execution_finished());
    assert!(!cpu.had_error_on_step(&mem));
}

#[test]
fn decoder_without_an_entry_is_a_control_fault() {
    let lines = vec![MicroLine::new().with_branch(BranchFunction::InstructionDecoder)];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.datapath_mut().registers_mut().write_byte(8, 0xC0);

    cpu.step(&mut mem);
    assert!(cpu.execution_finished());
    assert!(cpu.had_error_on_step(&mem));
    assert!(
        cpu.error_message(&mem)
            .expect("diagnostic")
            .contains("0xC0")
    );
}

#[test]
fn conditional_branches_follow_the_status_bits() {
    let lines = vec![
        MicroLine::new().with_branch(BranchFunction::Conditional {
            condition: BranchCondition::LessThan,
            true_target: 2,
            false_target: 1,
        }),
        MicroLine::new().with_branch(BranchFunction::Stop),
        MicroLine::new().with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.datapath_mut()
        .registers_mut()
        .write_status_bit(StatusBit::N, true);

    cpu.step(&mut mem);
    assert_eq!(cpu.microprogram_counter(), 2);
}

#[test]
fn malformed_signal_vector_is_a_recoverable_data_fault() {
    let mut short = MicroLine::new();
    short.control = vec![pep9_micro::SIGNAL_DISABLED; 3];
    let mut cpu = one_byte_cpu(vec![short]);
    let mut mem = TestMemory::new();

    cpu.step(&mut mem);
    assert!(cpu.had_error_on_step(&mem));
    assert!(
        cpu.error_message(&mem)
            .expect("diagnostic")
            .contains("Control signals")
    );
}

#[test]
fn bounded_micro_run_detects_endless_loops() {
    let lines = vec![MicroLine::new().with_branch(BranchFunction::Unconditional(0))];
    let cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    let mut bounded = BoundedMicroCpu::new(cpu, 100);

    let clean = bounded.run(&mut mem);
    assert!(!clean);
    assert_eq!(
        bounded.cpu().error_message(&mem).expect("diagnostic"),
        "Possible endless loop detected."
    );
}

#[test]
fn micro_breakpoints_suspend_at_the_flagged_line() {
    let lines = vec![
        MicroLine::new(),
        MicroLine::new(),
        MicroLine::new().with_branch(BranchFunction::Stop),
    ];
    let mut cpu = one_byte_cpu(lines);
    cpu.set_debugging(true);
    cpu.set_breakpoint(1, true);
    let mut mem = TestMemory::new();

    let clean = cpu.run(&mut mem);
    assert!(!clean);
    assert!(cpu.stopped_for_breakpoint());
    assert!(!cpu.execution_finished());
    assert_eq!(cpu.microprogram_counter(), 1);

    let clean = cpu.run(&mut mem);
    assert!(clean);
    assert!(cpu.execution_finished());
}

#[test]
fn unit_preconditions_seed_and_postconditions_check() {
    let mut data = Datapath::new(BusWidth::OneByte);
    let mut mem = TestMemory::new();
    let unit = UnitTest {
        pre: vec![
            UnitSpec::Register { reg: 0, value: 0x1234 },
            UnitSpec::Register { reg: 8, value: 0xC0 },
            UnitSpec::Status {
                bit: StatusBit::N,
                value: true,
            },
            UnitSpec::Memory {
                address: 0x0100,
                value: 0xBEEF,
                width: 2,
            },
        ],
        post: vec![
            UnitSpec::Register { reg: 0, value: 0x1234 },
            UnitSpec::Memory {
                address: 0x0100,
                value: 0xBEEF,
                width: 2,
            },
        ],
    };

    unit.apply_preconditions(&mut data, &mut mem);
    assert_eq!(data.registers().read_word_current(0), 0x1234);
    assert_eq!(data.registers().read_byte_current(8), 0xC0);
    assert!(unit.check_postconditions(&data, &mem).is_ok());

    let failing = UnitTest {
        post: vec![UnitSpec::Register { reg: 0, value: 0 }],
        ..UnitTest::default()
    };
    let failures = failing
        .check_postconditions(&data, &mem)
        .expect_err("must fail");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("register 0"));
}

#[test]
fn ir_cache_predicts_the_instruction_specifier_at_cycle_zero() {
    let lines = vec![MicroLine::new().with_branch(BranchFunction::Stop)];
    let mut cpu = one_byte_cpu(lines);
    let mut mem = TestMemory::new();
    cpu.datapath_mut().registers_mut().write_word(6, 0x0400);
    mem.set_byte(0x0400, 0x91);

    cpu.step(&mut mem);
    assert_eq!(cpu.datapath().registers().ir_cache(), 0x91);
}
