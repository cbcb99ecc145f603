//! Single-step test vectors: state in, one instruction, state out.
//!
//! Vectors live in `tests/data/step_vectors.json`. Each case seeds
//! registers and memory, executes exactly one instruction, and compares
//! registers, packed NZVC, and any listed memory cells. Register fields
//! omitted from the final state are asserted unchanged.

use std::fs;
use std::path::Path;

use pep_core::{AccessKind, CpuRegister, InstructionSet, MemoryDevice, MemoryError};
use pep9_isa::IsaCpu;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
struct CpuState {
    #[serde(default)]
    a: u16,
    #[serde(default)]
    x: u16,
    #[serde(default)]
    sp: u16,
    #[serde(default)]
    pc: u16,
    #[serde(default)]
    nzvc: u8,
    #[serde(default)]
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FinalState {
    a: Option<u16>,
    x: Option<u16>,
    sp: Option<u16>,
    pc: Option<u16>,
    nzvc: Option<u8>,
    #[serde(default)]
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Deserialize)]
struct StepVector {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: FinalState,
}

/// Flat 64K RAM, no fault paths: vectors exercise architecture, not
/// error handling.
struct VectorMemory {
    bytes: Vec<u8>,
}

impl MemoryDevice for VectorMemory {
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

fn load_vectors() -> Vec<StepVector> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/step_vectors.json");
    let content = fs::read_to_string(&path).expect("vector file readable");
    serde_json::from_str(&content).expect("vector file parses")
}

#[test]
fn single_step_vectors() {
    const A: u8 = CpuRegister::A as u8;
    const X: u8 = CpuRegister::X as u8;
    const SP: u8 = CpuRegister::Sp as u8;
    const PC: u8 = CpuRegister::Pc as u8;

    let vectors = load_vectors();
    assert!(!vectors.is_empty());

    for vector in vectors {
        let name = &vector.name;
        let mut mem = VectorMemory {
            bytes: vec![0; 0x1_0000],
        };
        for (address, value) in &vector.initial.ram {
            mem.bytes[*address as usize] = *value;
        }

        let mut cpu = IsaCpu::new(InstructionSet::new(true));
        {
            let regs = cpu.registers_mut();
            regs.write_word(A, vector.initial.a);
            regs.write_word(X, vector.initial.x);
            regs.write_word(SP, vector.initial.sp);
            regs.write_word(PC, vector.initial.pc);
            regs.write_packed_nzvc(vector.initial.nzvc);
            regs.flatten();
        }

        cpu.step(&mut mem);
        assert!(!cpu.had_error_on_step(&mem), "{name}: unexpected fault");

        let regs = cpu.registers();
        let expect = |field: Option<u16>, initial: u16| field.unwrap_or(initial);
        assert_eq!(
            regs.read_word_current(A),
            expect(vector.final_state.a, vector.initial.a),
            "{name}: A"
        );
        assert_eq!(
            regs.read_word_current(X),
            expect(vector.final_state.x, vector.initial.x),
            "{name}: X"
        );
        assert_eq!(
            regs.read_word_current(SP),
            expect(vector.final_state.sp, vector.initial.sp),
            "{name}: SP"
        );
        assert_eq!(
            regs.read_word_current(PC),
            expect(vector.final_state.pc, vector.initial.pc),
            "{name}: PC"
        );
        assert_eq!(
            regs.packed_nzvc(),
            vector.final_state.nzvc.unwrap_or(vector.initial.nzvc),
            "{name}: NZVC"
        );
        for (address, value) in &vector.final_state.ram {
            assert_eq!(
                mem.get_byte(*address),
                *value,
                "{name}: M[{address:#06X}]"
            );
        }
    }
}
