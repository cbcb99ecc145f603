//! Instruction semantics for the unary and non-unary handlers.
//!
//! Flag conventions: every result-producing operation sets N from the
//! high bit and Z from an all-zero result. Adds (and the subtracts built
//! on add-with-complement) set V on signed overflow of the final add and
//! C on unsigned carry out. Compares additionally flip N by V so the N
//! bit reflects the signed comparison even when the subtraction
//! overflowed.

use pep_core::{AccessKind, AddrMode, MemoryDevice, Mnemonic, StatusBit};

use crate::cpu::{A_REG, ControlFault, IsaCpu, PC_REG, SP_REG, X_REG};

impl IsaCpu {
    pub(crate) fn execute_unary<M: MemoryDevice>(&mut self, mem: &mut M, mnemonic: Mnemonic) {
        let sp = self.regs.read_word_current(SP_REG);
        let acc = self.regs.read_word_current(A_REG);
        let idx = self.regs.read_word_current(X_REG);

        match mnemonic {
            Mnemonic::Stop => {
                self.execution_finished = true;
            }

            Mnemonic::Ret => {
                let target = mem.read_word(sp, AccessKind::Data).unwrap_or(0);
                self.regs.write_word(PC_REG, target);
                self.regs.write_word(SP_REG, sp.wrapping_add(2));
            }

            Mnemonic::Rettr => {
                let status = mem.read_byte(sp, AccessKind::Data).unwrap_or(0);
                self.regs.write_packed_nzvc(status);
                let a = mem.read_word(sp.wrapping_add(1), AccessKind::Data).unwrap_or(0);
                self.regs.write_word(A_REG, a);
                let x = mem.read_word(sp.wrapping_add(3), AccessKind::Data).unwrap_or(0);
                self.regs.write_word(X_REG, x);
                let pc = mem.read_word(sp.wrapping_add(5), AccessKind::Data).unwrap_or(0);
                self.regs.write_word(PC_REG, pc);
                let old_sp = mem.read_word(sp.wrapping_add(7), AccessKind::Data).unwrap_or(0);
                self.regs.write_word(SP_REG, old_sp);
            }

            Mnemonic::Movspa => {
                self.regs.write_word(A_REG, sp);
            }

            Mnemonic::Movflga => {
                self.regs.write_word(A_REG, u16::from(self.regs.packed_nzvc()));
            }

            Mnemonic::Movaflg => {
                self.regs.write_packed_nzvc((acc & 0xFF) as u8);
            }

            Mnemonic::Nota => {
                let result = !acc;
                self.regs.write_word(A_REG, result);
                self.set_nz_word(result);
            }

            Mnemonic::Notx => {
                let result = !idx;
                self.regs.write_word(X_REG, result);
                self.set_nz_word(result);
            }

            Mnemonic::Nega => {
                let result = acc.wrapping_neg();
                self.regs.write_word(A_REG, result);
                self.set_nz_word(result);
                // The only signed overflow is negating the most negative value.
                self.set_status_bit(StatusBit::V, result == 0x8000);
            }

            Mnemonic::Negx => {
                let result = idx.wrapping_neg();
                self.regs.write_word(X_REG, result);
                self.set_nz_word(result);
                self.set_status_bit(StatusBit::V, result == 0x8000);
            }

            Mnemonic::Asla => {
                let result = acc << 1;
                self.regs.write_word(A_REG, result);
                self.set_nz_word(result);
                // Signed overflow iff the sign bit changed.
                self.set_status_bit(StatusBit::V, (acc ^ result) & 0x8000 != 0);
                self.set_status_bit(StatusBit::C, acc & 0x8000 != 0);
            }

            Mnemonic::Aslx => {
                let result = idx << 1;
                self.regs.write_word(X_REG, result);
                self.set_nz_word(result);
                self.set_status_bit(StatusBit::V, (idx ^ result) & 0x8000 != 0);
                self.set_status_bit(StatusBit::C, idx & 0x8000 != 0);
            }

            Mnemonic::Asra => {
                let result = acc >> 1 | (acc & 0x8000);
                self.regs.write_word(A_REG, result);
                self.set_nz_word(result);
                self.set_status_bit(StatusBit::C, acc & 0x0001 != 0);
            }

            Mnemonic::Asrx => {
                let result = idx >> 1 | (idx & 0x8000);
                self.regs.write_word(X_REG, result);
                self.set_nz_word(result);
                self.set_status_bit(StatusBit::C, idx & 0x0001 != 0);
            }

            Mnemonic::Rora => {
                let carry_in = u16::from(self.status_bit(StatusBit::C)) << 15;
                self.regs.write_word(A_REG, acc >> 1 | carry_in);
                self.set_status_bit(StatusBit::C, acc & 0x0001 != 0);
            }

            Mnemonic::Rorx => {
                let carry_in = u16::from(self.status_bit(StatusBit::C)) << 15;
                self.regs.write_word(X_REG, idx >> 1 | carry_in);
                self.set_status_bit(StatusBit::C, idx & 0x0001 != 0);
            }

            Mnemonic::Rola => {
                let carry_in = u16::from(self.status_bit(StatusBit::C));
                self.regs.write_word(A_REG, acc << 1 | carry_in);
                self.set_status_bit(StatusBit::C, acc & 0x8000 != 0);
            }

            Mnemonic::Rolx => {
                let carry_in = u16::from(self.status_bit(StatusBit::C));
                self.regs.write_word(X_REG, idx << 1 | carry_in);
                self.set_status_bit(StatusBit::C, idx & 0x8000 != 0);
            }

            Mnemonic::Nop0 => {
                // Reachable only when NOP0 is configured as a plain unary;
                // the trap classification dispatches before the unary path.
                if self.iset.is_trap(Mnemonic::Nop0) {
                    self.set_control_fault(ControlFault::Nop0NotUnary);
                    self.execution_finished = true;
                }
            }

            _ => {
                self.set_control_fault(ControlFault::InvalidUnary);
                self.execution_finished = true;
            }
        }
    }

    pub(crate) fn execute_nonunary<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        mnemonic: Mnemonic,
        operand_spec: u16,
        mode: AddrMode,
    ) {
        let acc = self.regs.read_word_current(A_REG);
        let idx = self.regs.read_word_current(X_REG);
        let sp = self.regs.read_word_current(SP_REG);

        let ok = match mnemonic {
            Mnemonic::Br => self.branch(mem, operand_spec, mode, true),
            Mnemonic::Brle => {
                let taken = self.status_bit(StatusBit::N) || self.status_bit(StatusBit::Z);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brlt => {
                let taken = self.status_bit(StatusBit::N);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Breq => {
                let taken = self.status_bit(StatusBit::Z);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brne => {
                let taken = !self.status_bit(StatusBit::Z);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brge => {
                let taken = !self.status_bit(StatusBit::N);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brgt => {
                let taken = !self.status_bit(StatusBit::N) && !self.status_bit(StatusBit::Z);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brv => {
                let taken = self.status_bit(StatusBit::V);
                self.branch(mem, operand_spec, mode, taken)
            }
            Mnemonic::Brc => {
                let taken = self.status_bit(StatusBit::C);
                self.branch(mem, operand_spec, mode, taken)
            }

            Mnemonic::Call => self.call_subroutine(mem, operand_spec, mode, sp),

            Mnemonic::Addsp => match self.read_operand_word(mem, operand_spec, mode) {
                Some(delta) => {
                    self.regs.write_word(SP_REG, sp.wrapping_add(delta));
                    true
                }
                None => false,
            },

            Mnemonic::Subsp => match self.read_operand_word(mem, operand_spec, mode) {
                Some(delta) => {
                    self.regs.write_word(SP_REG, sp.wrapping_sub(delta));
                    true
                }
                None => false,
            },

            Mnemonic::Adda => self.add_register(mem, operand_spec, mode, A_REG, acc, false),
            Mnemonic::Addx => self.add_register(mem, operand_spec, mode, X_REG, idx, false),
            Mnemonic::Suba => self.add_register(mem, operand_spec, mode, A_REG, acc, true),
            Mnemonic::Subx => self.add_register(mem, operand_spec, mode, X_REG, idx, true),

            Mnemonic::Anda => self.logic_register(mem, operand_spec, mode, A_REG, acc, true),
            Mnemonic::Andx => self.logic_register(mem, operand_spec, mode, X_REG, idx, true),
            Mnemonic::Ora => self.logic_register(mem, operand_spec, mode, A_REG, acc, false),
            Mnemonic::Orx => self.logic_register(mem, operand_spec, mode, X_REG, idx, false),

            Mnemonic::Cpwa => self.compare_word(mem, operand_spec, mode, acc),
            Mnemonic::Cpwx => self.compare_word(mem, operand_spec, mode, idx),
            Mnemonic::Cpba => self.compare_byte(mem, operand_spec, mode, acc),
            Mnemonic::Cpbx => self.compare_byte(mem, operand_spec, mode, idx),

            Mnemonic::Ldwa => self.load_word(mem, operand_spec, mode, A_REG),
            Mnemonic::Ldwx => self.load_word(mem, operand_spec, mode, X_REG),
            Mnemonic::Ldba => self.load_byte(mem, operand_spec, mode, A_REG, acc),
            Mnemonic::Ldbx => self.load_byte(mem, operand_spec, mode, X_REG, idx),

            Mnemonic::Stwa => self.write_operand_word(mem, operand_spec, acc, mode).is_some(),
            Mnemonic::Stwx => self.write_operand_word(mem, operand_spec, idx, mode).is_some(),
            Mnemonic::Stba => self
                .write_operand_byte(mem, operand_spec, (acc & 0xFF) as u8, mode)
                .is_some(),
            Mnemonic::Stbx => self
                .write_operand_byte(mem, operand_spec, (idx & 0xFF) as u8, mode)
                .is_some(),

            _ => {
                self.set_control_fault(ControlFault::InvalidNonunary);
                self.execution_finished = true;
                true
            }
        };

        if !ok {
            self.set_control_fault(ControlFault::MemoryAccess);
        }
    }

    fn set_nz_word(&mut self, result: u16) {
        self.set_status_bit(StatusBit::N, result & 0x8000 != 0);
        self.set_status_bit(StatusBit::Z, result == 0);
    }

    /// CALL: push the return address, then jump.
    fn call_subroutine<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        sp: u16,
    ) -> bool {
        let Some(target) = self.read_operand_word(mem, operand_spec, mode) else {
            return false;
        };
        let new_sp = sp.wrapping_sub(2);
        let return_address = self.regs.read_word_current(PC_REG);
        let pushed = mem
            .write_word(new_sp, return_address, AccessKind::Data)
            .is_ok();
        self.regs.write_word(PC_REG, target);
        self.regs.write_word(SP_REG, new_sp);
        pushed
    }

    /// Resolve the operand and take the branch when the condition holds.
    /// An untaken branch performs no operand access at all.
    fn branch<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        taken: bool,
    ) -> bool {
        if !taken {
            return true;
        }
        match self.read_operand_word(mem, operand_spec, mode) {
            Some(target) => {
                self.regs.write_word(PC_REG, target);
                true
            }
            None => false,
        }
    }

    /// ADDr / SUBr. A subtract adds the two's complement of the operand,
    /// with V and C computed on the post-inversion value so signed
    /// overflow matches the hardware carry model.
    fn add_register<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg: u8,
        reg_value: u16,
        subtract: bool,
    ) -> bool {
        let Some(mut operand) = self.read_operand_word(mem, operand_spec, mode) else {
            return false;
        };
        if subtract {
            operand = operand.wrapping_neg();
        }
        let result = reg_value.wrapping_add(operand);
        self.regs.write_word(reg, result);
        self.set_nz_word(result);
        self.set_status_bit(
            StatusBit::V,
            (!(reg_value ^ operand) & (reg_value ^ result)) & 0x8000 != 0,
        );
        self.set_status_bit(StatusBit::C, result < reg_value || result < operand);
        true
    }

    /// ANDr / ORr: bitwise, N and Z only.
    fn logic_register<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg: u8,
        reg_value: u16,
        and: bool,
    ) -> bool {
        let Some(operand) = self.read_operand_word(mem, operand_spec, mode) else {
            return false;
        };
        let result = if and {
            reg_value & operand
        } else {
            reg_value | operand
        };
        self.regs.write_word(reg, result);
        self.set_nz_word(result);
        true
    }

    /// CPWr: subtract without writing the register, then flip N by V so
    /// the N bit reflects the signed comparison.
    fn compare_word<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg_value: u16,
    ) -> bool {
        let Some(operand) = self.read_operand_word(mem, operand_spec, mode) else {
            return false;
        };
        let negated = operand.wrapping_neg();
        let result = reg_value.wrapping_add(negated);
        self.set_nz_word(result);
        self.set_status_bit(
            StatusBit::V,
            (!(reg_value ^ negated) & (reg_value ^ result)) & 0x8000 != 0,
        );
        self.set_status_bit(StatusBit::C, result < reg_value || result < negated);
        let signed_n = self.status_bit(StatusBit::N) ^ self.status_bit(StatusBit::V);
        self.set_status_bit(StatusBit::N, signed_n);
        true
    }

    /// CPBr: 8-bit compare; N and Z from the byte result, V and C zeroed.
    fn compare_byte<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg_value: u16,
    ) -> bool {
        let Some(operand) = self.read_operand_byte(mem, operand_spec, mode) else {
            return false;
        };
        let negated = u16::from(operand).wrapping_neg();
        let result = reg_value.wrapping_add(negated) & 0xFF;
        self.set_status_bit(StatusBit::N, result & 0x80 != 0);
        self.set_status_bit(StatusBit::Z, result == 0);
        self.set_status_bit(StatusBit::V, false);
        self.set_status_bit(StatusBit::C, false);
        true
    }

    fn load_word<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg: u8,
    ) -> bool {
        let Some(value) = self.read_operand_word(mem, operand_spec, mode) else {
            return false;
        };
        self.regs.write_word(reg, value);
        self.set_nz_word(value);
        true
    }

    /// LDBr: load into the low byte, preserving the high byte. N is
    /// forced clear; Z reflects the loaded byte.
    fn load_byte<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand_spec: u16,
        mode: AddrMode,
        reg: u8,
        reg_value: u16,
    ) -> bool {
        let Some(value) = self.read_operand_byte(mem, operand_spec, mode) else {
            return false;
        };
        let result = (reg_value & 0xFF00) | u16::from(value);
        self.regs.write_word(reg, result);
        self.set_status_bit(StatusBit::N, false);
        self.set_status_bit(StatusBit::Z, result & 0xFF == 0);
        true
    }
}
