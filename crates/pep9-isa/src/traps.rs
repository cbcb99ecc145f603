//! Trap execution: the synchronous software interrupt behind the
//! unimplemented-mnemonic instructions.
//!
//! A trap saves the process state in a ten-byte frame growing down from
//! the scratch address T, then vectors into the operating system's
//! unified trap handler. Both addresses are fixed words just below the
//! OS burn address:
//!
//! ```text
//! burn - 9 : word  address of T, the frame base
//! burn - 1 : word  address of the trap handler
//!
//! M[T-1]  <- IS      M[T-3] <- SP     M[T-5] <- PC
//! M[T-7]  <- X       M[T-9] <- A     M[T-10] <- NZVC (packed)
//! SP <- T - 10       PC <- handler
//! ```

use pep_core::{AccessKind, MemoryDevice, Mnemonic};

use crate::cpu::{A_REG, ControlFault, IsaCpu, IS_REG, PC_REG, SP_REG, X_REG};

/// The operating system's fixed-vector contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsVectors {
    /// Uppermost address the OS loader burned.
    pub burn_address: u16,
    /// Offset below `max_address` of the word holding the initial user
    /// stack pointer.
    pub user_stack_offset: u16,
}

impl OsVectors {
    /// Offset of the user-stack vector in the published Pep/9 OS.
    pub const USER_STACK_OFFSET: u16 = 11;

    #[must_use]
    pub fn new(burn_address: u16) -> Self {
        Self {
            burn_address,
            user_stack_offset: Self::USER_STACK_OFFSET,
        }
    }

    /// Address of the word holding T, the trap scratch base.
    #[must_use]
    pub fn trap_scratch_vector(self) -> u16 {
        self.burn_address.wrapping_sub(9)
    }

    /// Address of the word holding the unified trap handler address.
    #[must_use]
    pub fn trap_handler_vector(self) -> u16 {
        self.burn_address.wrapping_sub(1)
    }
}

impl IsaCpu {
    pub(crate) fn execute_trap<M: MemoryDevice>(&mut self, mem: &mut M, mnemonic: Mnemonic) {
        let Some(vectors) = self.os else {
            self.set_control_fault(ControlFault::TrapWithoutOs);
            self.execution_finished = true;
            return;
        };

        let scratch = mem
            .read_word(vectors.trap_scratch_vector(), AccessKind::Data)
            .unwrap_or(0);

        let mut ok = true;
        match mnemonic {
            Mnemonic::Nop | Mnemonic::Deci | Mnemonic::Deco | Mnemonic::Hexo | Mnemonic::Stro => {
                // The hardware increments PC past the operand specifier for
                // non-unary traps; the trap path never fetches it itself.
                let pc = self.regs.read_word_current(PC_REG).wrapping_add(2);
                self.regs.write_word(PC_REG, pc);
            }
            Mnemonic::Nop0 | Mnemonic::Nop1 => {}
            _ => {
                self.set_control_fault(ControlFault::InvalidTrap);
                self.execution_finished = true;
                return;
            }
        }

        // Clear the index register at trap entry so OS code never sees
        // junk in its high byte; the published OS depends on this fix.
        // The frame therefore records the cleared value.
        self.regs.write_word(X_REG, 0);

        let is = self.regs.read_byte_current(IS_REG);
        let sp = self.regs.read_word_current(SP_REG);
        let pc = self.regs.read_word_current(PC_REG);
        let x = self.regs.read_word_current(X_REG);
        let a = self.regs.read_word_current(A_REG);

        ok &= mem
            .write_byte(scratch.wrapping_sub(1), is, AccessKind::Data)
            .is_ok();
        ok &= mem
            .write_word(scratch.wrapping_sub(3), sp, AccessKind::Data)
            .is_ok();
        ok &= mem
            .write_word(scratch.wrapping_sub(5), pc, AccessKind::Data)
            .is_ok();
        ok &= mem
            .write_word(scratch.wrapping_sub(7), x, AccessKind::Data)
            .is_ok();
        ok &= mem
            .write_word(scratch.wrapping_sub(9), a, AccessKind::Data)
            .is_ok();
        ok &= mem
            .write_byte(
                scratch.wrapping_sub(10),
                self.regs.packed_nzvc(),
                AccessKind::Data,
            )
            .is_ok();

        let handler = match mem.read_word(vectors.trap_handler_vector(), AccessKind::Data) {
            Ok(address) => address,
            Err(_) => {
                ok = false;
                0
            }
        };
        self.regs.write_word(SP_REG, scratch.wrapping_sub(10));
        self.regs.write_word(PC_REG, handler);

        if !ok {
            self.set_control_fault(ControlFault::MemoryAccess);
        }
    }
}
