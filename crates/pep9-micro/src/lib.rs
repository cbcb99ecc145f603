//! Pep/9 microcode-level simulator.
//!
//! Interprets a microprogram one datapath cycle at a time: each line's
//! control signals steer the buses and the ALU, the clock signals latch
//! registers and status bits, and the memory bus state machine times
//! reads and writes across three same-address cycles. The branch
//! function of the line then selects the next microprogram counter.

mod alu;
mod cpu;
mod datapath;
mod program;
mod units;

pub use alu::{AluFunction, AluOutput};
pub use cpu::{BoundedMicroCpu, MicroCpu, MicroFault};
pub use datapath::{BusState, BusWidth, DataFault, Datapath, MemoryRegister};
pub use program::{
    BranchCondition, BranchFunction, CLOCK_SIGNAL_COUNT, CONTROL_SIGNAL_COUNT, ClockSignal,
    ControlSignal, MicroLine, MicrocodeProgram, ProgramError, SIGNAL_DISABLED,
};
pub use units::{UnitSpec, UnitTest};
