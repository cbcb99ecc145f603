//! Property tests for the pure access path.
//!
//! The debugger and loader lean on `set`/`get` being exact inverses over
//! the whole address space, including unaligned words and the wrap at the
//! top of memory.

use pep_core::MemoryDevice;
use pep9_mem::MainMemory;
use proptest::prelude::*;

proptest! {
    #[test]
    fn set_get_byte_round_trips(address: u16, value: u8) {
        let mut memory = MainMemory::flat_ram(0xFFFF);
        memory.set_byte(address, value);
        prop_assert_eq!(memory.get_byte(address), value);
    }

    #[test]
    fn set_get_word_round_trips(address: u16, value: u16) {
        let mut memory = MainMemory::flat_ram(0xFFFF);
        memory.set_word(address, value);
        prop_assert_eq!(memory.get_word(address), value);
        // Big-endian: the high byte lands at the lower address.
        prop_assert_eq!(memory.get_byte(address), (value >> 8) as u8);
    }

    #[test]
    fn set_word_is_two_byte_sets(address in 0u16..0xFFFE, value: u16) {
        let mut memory = MainMemory::flat_ram(0xFFFF);
        memory.set_word(address, value);
        prop_assert_eq!(memory.get_byte(address + 1), (value & 0xFF) as u8);
    }
}
