//! Operand resolution across the eight Pep/9 addressing modes.
//!
//! Word and byte widths resolve separately: the deferred modes (N, SF,
//! SFX) always dereference a word-sized pointer, but the byte-width
//! helpers fetch the pointer's two bytes individually. Every memory
//! access is wrapped in a Data transaction; the deferred modes use one
//! transaction for the pointer fetch and a second for the value access.
//!
//! The helpers return `None` on any failed access (including a write in
//! immediate mode); the device keeps the precise diagnostic, the executor
//! records the generic control fault.

use pep_core::{AccessKind, AddrMode, MemoryDevice};

use crate::cpu::{IsaCpu, SP_REG, X_REG};

impl IsaCpu {
    fn sp(&self) -> u16 {
        self.regs.read_word_current(SP_REG)
    }

    fn x(&self) -> u16 {
        self.regs.read_word_current(X_REG)
    }

    /// Effective address for the non-deferred modes, `None` for immediate.
    fn direct_address(&self, operand: u16, mode: AddrMode) -> Option<u16> {
        match mode {
            AddrMode::D => Some(operand),
            AddrMode::S => Some(operand.wrapping_add(self.sp())),
            AddrMode::X => Some(operand.wrapping_add(self.x())),
            AddrMode::Sx => Some(operand.wrapping_add(self.sp()).wrapping_add(self.x())),
            _ => None,
        }
    }

    fn read_word_tx<M: MemoryDevice>(&mut self, mem: &mut M, address: u16) -> Option<u16> {
        mem.begin_transaction(AccessKind::Data);
        let result = mem.read_word(address, AccessKind::Data);
        mem.end_transaction();
        result.ok()
    }

    fn read_byte_tx<M: MemoryDevice>(&mut self, mem: &mut M, address: u16) -> Option<u8> {
        mem.begin_transaction(AccessKind::Data);
        let result = mem.read_byte(address, AccessKind::Data);
        mem.end_transaction();
        result.ok()
    }

    /// Fetch a deferred-mode pointer byte by byte, in one transaction.
    fn read_pointer_bytewise<M: MemoryDevice>(&mut self, mem: &mut M, address: u16) -> Option<u16> {
        mem.begin_transaction(AccessKind::Data);
        let hi = mem.read_byte(address, AccessKind::Data);
        let lo = mem.read_byte(address.wrapping_add(1), AccessKind::Data);
        mem.end_transaction();
        Some(u16::from(hi.ok()?) << 8 | u16::from(lo.ok()?))
    }

    /// Resolve and read a word operand. Caches the decoded value for the
    /// debugger on success.
    pub fn read_operand_word<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand: u16,
        mode: AddrMode,
    ) -> Option<u16> {
        let value = match mode {
            AddrMode::None => Some(0),
            AddrMode::I => Some(operand),
            AddrMode::D | AddrMode::S | AddrMode::X | AddrMode::Sx => {
                let address = self.direct_address(operand, mode)?;
                self.read_word_tx(mem, address)
            }
            AddrMode::N => {
                let pointer = self.read_word_tx(mem, operand)?;
                self.read_word_tx(mem, pointer)
            }
            AddrMode::Sf => {
                let pointer = self.read_word_tx(mem, operand.wrapping_add(self.sp()))?;
                self.read_word_tx(mem, pointer)
            }
            AddrMode::Sfx => {
                let pointer = self.read_word_tx(mem, operand.wrapping_add(self.sp()))?;
                self.read_word_tx(mem, pointer.wrapping_add(self.x()))
            }
        }?;
        self.operand_value_cache = value;
        Some(value)
    }

    /// Resolve and read a byte operand. Caches the decoded value for the
    /// debugger on success.
    pub fn read_operand_byte<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand: u16,
        mode: AddrMode,
    ) -> Option<u8> {
        let value = match mode {
            AddrMode::None => Some(0),
            AddrMode::I => Some((operand & 0xFF) as u8),
            AddrMode::D | AddrMode::S | AddrMode::X | AddrMode::Sx => {
                let address = self.direct_address(operand, mode)?;
                self.read_byte_tx(mem, address)
            }
            AddrMode::N => {
                let pointer = self.read_pointer_bytewise(mem, operand)?;
                self.read_byte_tx(mem, pointer)
            }
            AddrMode::Sf => {
                let pointer = self.read_pointer_bytewise(mem, operand.wrapping_add(self.sp()))?;
                self.read_byte_tx(mem, pointer)
            }
            AddrMode::Sfx => {
                let pointer = self.read_pointer_bytewise(mem, operand.wrapping_add(self.sp()))?;
                self.read_byte_tx(mem, pointer.wrapping_add(self.x()))
            }
        }?;
        self.operand_value_cache = u16::from(value);
        Some(value)
    }

    /// Resolve the write target for the operand and compute nothing else.
    ///
    /// Immediate mode has no write target. The deferred modes dereference
    /// their pointer in its own transaction before the write.
    fn resolve_write_address<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand: u16,
        mode: AddrMode,
    ) -> Option<u16> {
        match mode {
            AddrMode::None | AddrMode::I => None,
            AddrMode::D | AddrMode::S | AddrMode::X | AddrMode::Sx => {
                self.direct_address(operand, mode)
            }
            AddrMode::N => self.read_word_tx(mem, operand),
            AddrMode::Sf => self.read_word_tx(mem, operand.wrapping_add(self.sp())),
            AddrMode::Sfx => {
                let pointer = self.read_word_tx(mem, operand.wrapping_add(self.sp()))?;
                Some(pointer.wrapping_add(self.x()))
            }
        }
    }

    /// Resolve the effective address and write a word there. Caches the
    /// effective address for the debugger.
    pub fn write_operand_word<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand: u16,
        value: u16,
        mode: AddrMode,
    ) -> Option<()> {
        let address = self.resolve_write_address(mem, operand, mode)?;
        self.operand_value_cache = address;
        mem.begin_transaction(AccessKind::Data);
        let result = mem.write_word(address, value, AccessKind::Data);
        mem.end_transaction();
        result.ok()
    }

    /// Resolve the effective address and write a byte there. Caches the
    /// effective address for the debugger.
    pub fn write_operand_byte<M: MemoryDevice>(
        &mut self,
        mem: &mut M,
        operand: u16,
        value: u8,
        mode: AddrMode,
    ) -> Option<()> {
        let address = self.resolve_write_address(mem, operand, mode)?;
        self.operand_value_cache = address;
        mem.begin_transaction(AccessKind::Data);
        let result = mem.write_byte(address, value, AccessKind::Data);
        mem.end_transaction();
        result.ok()
    }
}
