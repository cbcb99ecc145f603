//! The operating-system image and its vector contract.
//!
//! The OS loader burns the image so its last byte lands at the top of
//! memory. The six words just below the top are fixed vectors:
//!
//! ```text
//! max - 11 : initial user stack pointer
//! max -  9 : trap scratch base T (the system stack temp)
//! max -  7 : address of the charIn input port
//! max -  5 : address of the charOut output port
//! max -  3 : loader entry point
//! max -  1 : unified trap handler
//! ```

use thiserror::Error;

/// Vector offsets below the top of memory.
const USER_STACK_VECTOR: u16 = 11;
const CHAR_IN_VECTOR: u16 = 7;
const CHAR_OUT_VECTOR: u16 = 5;
const LOADER_VECTOR: u16 = 3;
const TRAP_HANDLER_VECTOR: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OsImageError {
    #[error("operating system image of {0} bytes cannot hold the vector table")]
    TooSmall(usize),
    #[error("operating system image of {0} bytes exceeds the address space")]
    TooLarge(usize),
}

/// A burned operating-system image.
#[derive(Debug, Clone)]
pub struct OsImage {
    rom: Vec<u8>,
    max_address: u16,
}

impl OsImage {
    /// Wrap raw ROM bytes burned through `max_address`.
    pub fn new(rom: Vec<u8>, max_address: u16) -> Result<Self, OsImageError> {
        if rom.len() < 12 {
            return Err(OsImageError::TooSmall(rom.len()));
        }
        if rom.len() > usize::from(max_address) + 1 {
            return Err(OsImageError::TooLarge(rom.len()));
        }
        Ok(Self { rom, max_address })
    }

    /// The uppermost burned address.
    #[must_use]
    pub fn burn_address(&self) -> u16 {
        self.max_address
    }

    /// The first address the image covers.
    #[must_use]
    pub fn rom_start(&self) -> u16 {
        self.max_address - (self.rom.len() as u16 - 1)
    }

    #[must_use]
    pub fn rom_bytes(&self) -> &[u8] {
        &self.rom
    }

    /// The big-endian word whose low byte sits `offset - 1` bytes below
    /// the top of memory.
    fn vector_word(&self, offset: u16) -> u16 {
        let hi = self.rom[self.rom.len() - 1 - offset as usize];
        let lo = self.rom[self.rom.len() - offset as usize];
        u16::from(hi) << 8 | u16::from(lo)
    }

    #[must_use]
    pub fn user_stack_pointer(&self) -> u16 {
        self.vector_word(USER_STACK_VECTOR)
    }

    #[must_use]
    pub fn char_in(&self) -> u16 {
        self.vector_word(CHAR_IN_VECTOR)
    }

    #[must_use]
    pub fn char_out(&self) -> u16 {
        self.vector_word(CHAR_OUT_VECTOR)
    }

    #[must_use]
    pub fn loader_entry(&self) -> u16 {
        self.vector_word(LOADER_VECTOR)
    }

    #[must_use]
    pub fn trap_handler(&self) -> u16 {
        self.vector_word(TRAP_HANDLER_VECTOR)
    }
}

/// A minimal built-in OS image for running bare programs: the published
/// memory map (user stack at 0xFB8F, ports at 0xFC15/0xFC16, ROM from
/// 0xFC17) with a trap handler that immediately returns, so the trap
/// instructions behave as no-ops until a real OS is supplied.
#[must_use]
pub fn default_os_image() -> OsImage {
    const ROM_START: u16 = 0xFC17;
    let size = usize::from(0xFFFF - ROM_START) + 1;
    let mut rom = vec![0u8; size];

    let mut put_word = |address: u16, value: u16| {
        let index = usize::from(address - ROM_START);
        rom[index] = (value >> 8) as u8;
        rom[index + 1] = (value & 0xFF) as u8;
    };
    put_word(0xFFF4, 0xFB8F); // user stack
    put_word(0xFFF6, 0xFC0F); // trap scratch base T
    put_word(0xFFF8, 0xFC15); // charIn
    put_word(0xFFFA, 0xFC16); // charOut
    put_word(0xFFFC, ROM_START); // loader entry
    put_word(0xFFFE, ROM_START); // trap handler

    // The handler: a bare RETTR at the start of ROM.
    rom[0] = 0x02;

    OsImage::new(rom, 0xFFFF).expect("built-in image is well formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_read_from_the_top_of_the_image() {
        let os = default_os_image();
        assert_eq!(os.burn_address(), 0xFFFF);
        assert_eq!(os.rom_start(), 0xFC17);
        assert_eq!(os.user_stack_pointer(), 0xFB8F);
        assert_eq!(os.char_in(), 0xFC15);
        assert_eq!(os.char_out(), 0xFC16);
        assert_eq!(os.trap_handler(), 0xFC17);
        assert_eq!(os.loader_entry(), 0xFC17);
    }

    #[test]
    fn undersized_images_are_rejected() {
        assert_eq!(
            OsImage::new(vec![0; 4], 0xFFFF).err(),
            Some(OsImageError::TooSmall(4))
        );
    }
}
