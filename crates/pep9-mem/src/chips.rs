//! Memory chip variants.
//!
//! Each chip covers a contiguous address range and answers the four
//! access operations. Read/write may fault or perform I/O; get/set never
//! do. A tagged enum with one dispatching impl replaces dynamic dispatch:
//! the set of chip kinds is closed and the hot path is a `match`.

use std::collections::VecDeque;

use pep_core::MemoryError;

/// Read/write RAM.
#[derive(Debug, Clone)]
pub struct RamChip {
    base: u16,
    bytes: Vec<u8>,
}

impl RamChip {
    /// Create a RAM chip of `size` bytes starting at `base`, zero-filled.
    #[must_use]
    pub fn new(base: u16, size: u32) -> Self {
        Self {
            base,
            bytes: vec![0; size as usize],
        }
    }
}

/// Read-only storage for the operating system.
///
/// Writes fault; sets succeed, which is how the OS loader burns the image
/// in.
#[derive(Debug, Clone)]
pub struct RomChip {
    base: u16,
    bytes: Vec<u8>,
}

impl RomChip {
    /// Create a ROM chip of `size` bytes starting at `base`, zero-filled.
    #[must_use]
    pub fn new(base: u16, size: u32) -> Self {
        Self {
            base,
            bytes: vec![0; size as usize],
        }
    }
}

/// Filler for address ranges with no backing storage. Reads 0, drops
/// sets, faults on writes.
#[derive(Debug, Clone)]
pub struct ConstChip {
    base: u16,
    size: u32,
}

impl ConstChip {
    #[must_use]
    pub fn new(base: u16, size: u32) -> Self {
        Self { base, size }
    }
}

/// Memory-mapped input port backed by a buffered byte queue.
///
/// Each read consumes one buffered byte; reading past the end of the
/// buffer is a fault (batch execution has no interactive input to wait
/// for). A pure get peeks without consuming.
#[derive(Debug, Clone)]
pub struct InputChip {
    base: u16,
    buffer: VecDeque<u8>,
}

impl InputChip {
    #[must_use]
    pub fn new(base: u16) -> Self {
        Self {
            base,
            buffer: VecDeque::new(),
        }
    }

    /// Append bytes behind the port.
    pub fn buffer_input(&mut self, data: &[u8]) {
        self.buffer.extend(data.iter().copied());
    }

    /// Bytes still waiting to be read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Memory-mapped output port. Every write or set appends to the captured
/// output stream.
#[derive(Debug, Clone)]
pub struct OutputChip {
    base: u16,
    written: Vec<u8>,
}

impl OutputChip {
    #[must_use]
    pub fn new(base: u16) -> Self {
        Self {
            base,
            written: Vec::new(),
        }
    }

    /// Everything written to the port since construction.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.written
    }
}

/// A chip installed in main memory.
#[derive(Debug, Clone)]
pub enum MemoryChip {
    Ram(RamChip),
    Rom(RomChip),
    Const(ConstChip),
    Input(InputChip),
    Output(OutputChip),
}

impl MemoryChip {
    /// First address the chip covers.
    #[must_use]
    pub fn base(&self) -> u16 {
        match self {
            Self::Ram(chip) => chip.base,
            Self::Rom(chip) => chip.base,
            Self::Const(chip) => chip.base,
            Self::Input(chip) => chip.base,
            Self::Output(chip) => chip.base,
        }
    }

    /// Number of addresses the chip covers.
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            Self::Ram(chip) => chip.bytes.len() as u32,
            Self::Rom(chip) => chip.bytes.len() as u32,
            Self::Const(chip) => chip.size,
            Self::Input(_) | Self::Output(_) => 1,
        }
    }

    /// True if `address` falls inside this chip's range.
    #[must_use]
    pub fn contains(&self, address: u16) -> bool {
        address >= self.base() && u32::from(address - self.base()) < self.size()
    }

    /// Side-effecting read.
    pub fn read_byte(&mut self, address: u16) -> Result<u8, MemoryError> {
        match self {
            Self::Ram(chip) => Ok(chip.bytes[(address - chip.base) as usize]),
            Self::Rom(chip) => Ok(chip.bytes[(address - chip.base) as usize]),
            Self::Const(_) => Ok(0),
            Self::Input(chip) => chip
                .buffer
                .pop_front()
                .ok_or(MemoryError::InputExhausted(address)),
            Self::Output(chip) => Ok(chip.written.last().copied().unwrap_or(0)),
        }
    }

    /// Side-effecting write. Returns the stored value so the aggregate
    /// can emit a change event.
    pub fn write_byte(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        match self {
            Self::Ram(chip) => {
                chip.bytes[(address - chip.base) as usize] = value;
                Ok(())
            }
            Self::Rom(_) | Self::Const(_) => Err(MemoryError::ReadonlyWrite(address)),
            Self::Input(_) => Err(MemoryError::PortWrite(address)),
            Self::Output(chip) => {
                chip.written.push(value);
                Ok(())
            }
        }
    }

    /// Pure read: never consumes input, never faults.
    #[must_use]
    pub fn get_byte(&self, address: u16) -> u8 {
        match self {
            Self::Ram(chip) => chip.bytes[(address - chip.base) as usize],
            Self::Rom(chip) => chip.bytes[(address - chip.base) as usize],
            Self::Const(_) => 0,
            Self::Input(chip) => chip.buffer.front().copied().unwrap_or(0),
            Self::Output(chip) => chip.written.last().copied().unwrap_or(0),
        }
    }

    /// Pure write: succeeds on ROM, ignored by chips with nothing to
    /// store. Returns true if a value was stored (and a change event
    /// should fire).
    pub fn set_byte(&mut self, address: u16, value: u8) -> bool {
        match self {
            Self::Ram(chip) => {
                chip.bytes[(address - chip.base) as usize] = value;
                true
            }
            Self::Rom(chip) => {
                chip.bytes[(address - chip.base) as usize] = value;
                true
            }
            Self::Const(_) | Self::Input(_) => false,
            Self::Output(chip) => {
                chip.written.push(value);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_reads_back_writes() {
        let mut chip = MemoryChip::Ram(RamChip::new(0x1000, 0x100));
        assert!(chip.contains(0x1000));
        assert!(chip.contains(0x10FF));
        assert!(!chip.contains(0x1100));
        chip.write_byte(0x1080, 0xAB).expect("ram write");
        assert_eq!(chip.get_byte(0x1080), 0xAB);
    }

    #[test]
    fn rom_faults_on_write_but_accepts_set() {
        let mut chip = MemoryChip::Rom(RomChip::new(0xFC00, 0x400));
        assert_eq!(
            chip.write_byte(0xFC00, 0x12),
            Err(MemoryError::ReadonlyWrite(0xFC00))
        );
        assert!(chip.set_byte(0xFC00, 0x12));
        assert_eq!(chip.read_byte(0xFC00), Ok(0x12));
    }

    #[test]
    fn input_consumes_on_read_and_peeks_on_get() {
        let mut port = InputChip::new(0xFC15);
        port.buffer_input(b"hi");
        let mut chip = MemoryChip::Input(port);
        assert_eq!(chip.get_byte(0xFC15), b'h');
        assert_eq!(chip.read_byte(0xFC15), Ok(b'h'));
        assert_eq!(chip.read_byte(0xFC15), Ok(b'i'));
        assert_eq!(
            chip.read_byte(0xFC15),
            Err(MemoryError::InputExhausted(0xFC15))
        );
    }

    #[test]
    fn output_captures_writes_and_sets() {
        let mut chip = MemoryChip::Output(OutputChip::new(0xFC16));
        chip.write_byte(0xFC16, b'o').expect("port write");
        assert!(chip.set_byte(0xFC16, b'k'));
        let MemoryChip::Output(port) = &chip else {
            unreachable!();
        };
        assert_eq!(port.output(), b"ok");
    }

    #[test]
    fn const_chip_reads_zero_and_drops_sets() {
        let mut chip = MemoryChip::Const(ConstChip::new(0x8000, 0x10));
        assert_eq!(chip.read_byte(0x8005), Ok(0));
        assert!(!chip.set_byte(0x8005, 0xFF));
        assert_eq!(chip.get_byte(0x8005), 0);
    }
}
