//! The aggregate memory device.
//!
//! `MainMemory` composes chips by address range and presents them to the
//! CPUs as one 16-bit address space. It also owns the bookkeeping the
//! debugger relies on: the sets of addresses read, written, and set since
//! the last clear, the sticky error state, and the changed-byte event
//! channel.

use std::collections::HashSet;

use pep_core::{AccessKind, Listeners, MemoryChange, MemoryDevice, MemoryError};

use crate::chips::{InputChip, MemoryChip, OutputChip};

pub struct MainMemory {
    /// Installed chips, kept sorted by base address.
    chips: Vec<MemoryChip>,
    max_address: u16,
    bytes_read: HashSet<u16>,
    bytes_written: HashSet<u16>,
    bytes_set: HashSet<u16>,
    /// Read tracking is useful for cache visualisation but pure overhead
    /// for plain RAM runs, so it is switchable.
    track_reads: bool,
    error: Option<MemoryError>,
    changed: Listeners<MemoryChange>,
    in_transaction: bool,
}

impl MainMemory {
    /// Create an empty memory with the given highest address. Chips are
    /// installed separately.
    #[must_use]
    pub fn new(max_address: u16) -> Self {
        Self {
            chips: Vec::new(),
            max_address,
            bytes_read: HashSet::new(),
            bytes_written: HashSet::new(),
            bytes_set: HashSet::new(),
            track_reads: false,
            error: None,
            changed: Listeners::new(),
            in_transaction: false,
        }
    }

    /// Convenience: a single RAM chip covering the whole address space.
    #[must_use]
    pub fn flat_ram(max_address: u16) -> Self {
        let mut memory = Self::new(max_address);
        memory.install(MemoryChip::Ram(crate::RamChip::new(
            0,
            u32::from(max_address) + 1,
        )));
        memory
    }

    /// Install a chip. Ranges must not overlap.
    ///
    /// # Panics
    ///
    /// Panics if the chip overlaps one already installed; the memory map
    /// is fixed at machine construction and an overlap is a wiring bug.
    pub fn install(&mut self, chip: MemoryChip) {
        let base = chip.base();
        let end = u32::from(base) + chip.size();
        for existing in &self.chips {
            let existing_end = u32::from(existing.base()) + existing.size();
            assert!(
                end <= u32::from(existing.base()) || u32::from(base) >= existing_end,
                "chip at {base:#06X} overlaps chip at {:#06X}",
                existing.base()
            );
        }
        let position = self
            .chips
            .iter()
            .position(|existing| existing.base() > base)
            .unwrap_or(self.chips.len());
        self.chips.insert(position, chip);
    }

    fn chip_index(&self, address: u16) -> Option<usize> {
        self.chips.iter().position(|chip| chip.contains(address))
    }

    fn record(&mut self, error: MemoryError) -> MemoryError {
        self.error = Some(error.clone());
        error
    }

    /// Subscribe to changed-byte events from writes and sets.
    pub fn subscribe_changed(&mut self, callback: impl FnMut(&MemoryChange) + 'static) {
        self.changed.subscribe(callback);
    }

    /// Buffer input bytes behind the input port at `address`.
    ///
    /// Returns false if no input chip is installed there.
    pub fn buffer_input(&mut self, address: u16, data: &[u8]) -> bool {
        if let Some(index) = self.chip_index(address)
            && let MemoryChip::Input(port) = &mut self.chips[index]
        {
            port.buffer_input(data);
            return true;
        }
        false
    }

    /// The bytes captured by the output port at `address`, if one is
    /// installed there.
    #[must_use]
    pub fn output_bytes(&self, address: u16) -> Option<&[u8]> {
        self.chips.iter().find_map(|chip| match chip {
            MemoryChip::Output(port) if chip.contains(address) => Some(port.output()),
            _ => None,
        })
    }

    /// Install a one-byte input port at `address`.
    pub fn install_input_port(&mut self, address: u16) {
        self.install(MemoryChip::Input(InputChip::new(address)));
    }

    /// Install a one-byte output port at `address`.
    pub fn install_output_port(&mut self, address: u16) {
        self.install(MemoryChip::Output(OutputChip::new(address)));
    }

    /// Enable or disable recording of read addresses.
    pub fn set_read_tracking(&mut self, enabled: bool) {
        self.track_reads = enabled;
    }

    #[must_use]
    pub fn read_tracking(&self) -> bool {
        self.track_reads
    }

    /// Addresses read since the last clear (when tracking is enabled).
    #[must_use]
    pub fn bytes_read(&self) -> &HashSet<u16> {
        &self.bytes_read
    }

    /// Addresses written through the side-effecting path since the last
    /// clear.
    #[must_use]
    pub fn bytes_written(&self) -> &HashSet<u16> {
        &self.bytes_written
    }

    /// Addresses modified through the pure path since the last clear.
    #[must_use]
    pub fn bytes_set(&self) -> &HashSet<u16> {
        &self.bytes_set
    }

    pub fn clear_bytes_read(&mut self) {
        self.bytes_read.clear();
    }

    pub fn clear_bytes_written(&mut self) {
        self.bytes_written.clear();
    }

    pub fn clear_bytes_set(&mut self) {
        self.bytes_set.clear();
    }

    /// Clear all three observation sets at once.
    pub fn clear_byte_caches(&mut self) {
        self.bytes_read.clear();
        self.bytes_written.clear();
        self.bytes_set.clear();
    }

    /// Zero every address through the pure path.
    pub fn clear_memory(&mut self) {
        for address in 0..=self.max_address {
            self.set_byte(address, 0);
        }
        self.clear_byte_caches();
    }
}

impl MemoryDevice for MainMemory {
    fn max_address(&self) -> u16 {
        self.max_address
    }

    fn read_byte(&mut self, address: u16, _access: AccessKind) -> Result<u8, MemoryError> {
        let Some(index) = self.chip_index(address) else {
            return Err(self.record(MemoryError::OutOfBounds(address)));
        };
        match self.chips[index].read_byte(address) {
            Ok(value) => {
                if self.track_reads {
                    self.bytes_read.insert(address);
                }
                Ok(value)
            }
            Err(error) => Err(self.record(error)),
        }
    }

    fn write_byte(
        &mut self,
        address: u16,
        value: u8,
        _access: AccessKind,
    ) -> Result<(), MemoryError> {
        let Some(index) = self.chip_index(address) else {
            return Err(self.record(MemoryError::OutOfBounds(address)));
        };
        match self.chips[index].write_byte(address, value) {
            Ok(()) => {
                self.bytes_written.insert(address);
                self.changed.emit(&MemoryChange { address, value });
                Ok(())
            }
            Err(error) => Err(self.record(error)),
        }
    }

    fn get_byte(&self, address: u16) -> u8 {
        self.chip_index(address)
            .map_or(0, |index| self.chips[index].get_byte(address))
    }

    fn set_byte(&mut self, address: u16, value: u8) {
        if let Some(index) = self.chip_index(address)
            && self.chips[index].set_byte(address, value)
        {
            self.bytes_set.insert(address);
            self.changed.emit(&MemoryChange { address, value });
        }
    }

    fn begin_transaction(&mut self, _access: AccessKind) {
        debug_assert!(!self.in_transaction, "transaction already outstanding");
        self.in_transaction = true;
    }

    fn end_transaction(&mut self) {
        debug_assert!(self.in_transaction, "no transaction outstanding");
        self.in_transaction = false;
    }

    fn had_error(&self) -> bool {
        self.error.is_some()
    }

    fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    fn clear_errors(&mut self) {
        self.error = None;
    }
}
