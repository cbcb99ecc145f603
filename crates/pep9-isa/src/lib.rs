//! Pep/9 ISA-level simulator.
//!
//! Executes one machine instruction per step, atomically: fetch the
//! instruction specifier, decode, resolve the operand across the eight
//! addressing modes, execute, and update NZVC — leaving the register
//! file's start pane pointing at the state the instruction began from.
//!
//! Traps (the unimplemented-mnemonic instructions DECI, DECO, HEXO, STRO
//! and the NOPs) save a process frame on the system stack and vector into
//! the operating system; RETTR reverses them exactly.

mod bounded;
mod cpu;
mod execute;
mod operand;
mod trace;
mod traps;

pub use bounded::BoundedIsaCpu;
pub use cpu::{ControlFault, IsaCpu};
pub use trace::{MemoryTrace, StackFrame, StackTrace, StackTracer, TagFormat, TraceTag};
pub use traps::OsVectors;
