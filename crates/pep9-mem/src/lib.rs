//! Pep/9 main memory.
//!
//! Memory is assembled from chips — RAM, ROM, a constant-zero filler, and
//! the two memory-mapped I/O ports — composed by address range into a
//! [`MainMemory`] aggregate that implements the core `MemoryDevice`
//! contract: side-effecting read/write, pure get/set, sticky errors, and
//! the read/written/set observation sets the debugger displays.

mod chips;
mod main_memory;

pub use chips::{ConstChip, InputChip, MemoryChip, OutputChip, RamChip, RomChip};
pub use main_memory::MainMemory;
