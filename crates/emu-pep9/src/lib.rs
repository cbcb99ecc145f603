//! The assembled Pep/9 machine.
//!
//! Wires the execution core into a runnable computer: main memory built
//! from the operating system's vector contract (RAM below the I/O ports,
//! memory-mapped charIn/charOut, ROM over the burned region), the
//! ISA-level CPU, an object-code loader, and batch execution with
//! buffered input and captured output.

mod machine;
mod object;
mod os;

pub use machine::{MachineConfig, MicroRunOutcome, Pep9Machine, RunOutcome, run_microprogram};
pub use object::{ObjectError, parse_object_code};
pub use os::{OsImage, OsImageError, default_os_image};
