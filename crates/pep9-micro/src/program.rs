//! The microprogram as data.
//!
//! A microline is a flat record: one control-signal vector, one
//! clock-signal vector, and a branch function whose targets are direct
//! line indices. The microassembler resolves symbolic targets before the
//! program reaches the executor; sequential (assembler-assigned)
//! branches resolve here, when the program is assembled into its final
//! form.

use std::collections::HashMap;

use thiserror::Error;

/// Value a control signal holds when the microline does not drive it.
pub const SIGNAL_DISABLED: u8 = u8::MAX;

/// Number of control signals, one- and two-byte bus combined.
pub const CONTROL_SIGNAL_COUNT: usize = 15;

/// Number of clock signals.
pub const CLOCK_SIGNAL_COUNT: usize = 10;

/// Control signals, indexed into a microline's control vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ControlSignal {
    MemRead = 0,
    MemWrite = 1,
    /// Register number driven onto the A bus.
    A = 2,
    /// Register number driven onto the B bus.
    B = 3,
    /// 0 routes the MDR (or EOMux) into the ALU's A input, 1 the A bus.
    AMux = 4,
    /// 0 routes packed NZVC onto the C bus, 1 the ALU output.
    CMux = 5,
    /// ALU function selector, 0..=15.
    Alu = 6,
    /// Carry-in source: 0 the C bit, 1 the saved-carry S bit.
    CSMux = 7,
    /// Destination register number for LoadCk.
    C = 8,
    /// 1 makes ZCk AND the new Z with the old (multi-byte zero tests).
    AndZ = 9,
    /// One-byte bus: 0 clocks MDR from memory, 1 from the C bus.
    MdrMux = 10,
    /// Two-byte bus: 0 routes MDRE, 1 MDRO into the ALU's A input.
    EOMux = 11,
    /// Two-byte bus: 0 loads MAR from MDRE/MDRO, 1 from the A/B buses.
    MarMux = 12,
    /// Two-byte bus: 0 clocks MDRE from memory, 1 from the C bus.
    MdreMux = 13,
    /// Two-byte bus: 0 clocks MDRO from memory, 1 from the C bus.
    MdroMux = 14,
}

/// Clock signals, indexed into a microline's clock vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ClockSignal {
    NCk = 0,
    ZCk = 1,
    VCk = 2,
    CCk = 3,
    SCk = 4,
    MarCk = 5,
    LoadCk = 6,
    MdrCk = 7,
    MdreCk = 8,
    MdroCk = 9,
}

/// Predicate of a conditional micro branch, evaluated over the current
/// status bits, program counter, and instruction specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCondition {
    /// !N and !Z.
    GreaterThan,
    /// !N.
    GreaterOrEqual,
    /// Z.
    Equal,
    /// !Z.
    NotEqual,
    /// N or Z.
    LessOrEqual,
    /// N.
    LessThan,
    /// V.
    Overflow,
    /// C.
    Carry,
    /// The saved-carry S bit.
    SavedCarry,
    /// The program counter is even.
    PcEven,
    /// The current instruction specifier decodes to a unary mnemonic.
    IsUnary,
}

/// How execution continues after a microline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchFunction {
    /// Fall through to the next line. Resolved to `Unconditional` when
    /// the program is assembled (the final line resolves to `Stop`).
    Sequential,
    Unconditional(usize),
    Conditional {
        condition: BranchCondition,
        true_target: usize,
        false_target: usize,
    },
    /// Jump-table dispatch on the current instruction specifier.
    InstructionDecoder,
    /// Jump-table dispatch on the addressing mode of the current
    /// instruction specifier.
    AddressingModeDecoder,
    Stop,
}

/// One line of microcode.
#[derive(Debug, Clone)]
pub struct MicroLine {
    /// Control values indexed by `ControlSignal`; `SIGNAL_DISABLED` where
    /// the line does not drive the signal.
    pub control: Vec<u8>,
    /// Clock lines indexed by `ClockSignal`.
    pub clock: Vec<bool>,
    pub branch: BranchFunction,
    pub symbol: Option<String>,
    pub comment: Option<String>,
    pub breakpoint: bool,
}

impl MicroLine {
    /// An empty line: nothing driven, nothing clocked, falls through.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: vec![SIGNAL_DISABLED; CONTROL_SIGNAL_COUNT],
            clock: vec![false; CLOCK_SIGNAL_COUNT],
            branch: BranchFunction::Sequential,
            symbol: None,
            comment: None,
            breakpoint: false,
        }
    }

    #[must_use]
    pub fn with_control(mut self, signal: ControlSignal, value: u8) -> Self {
        self.control[signal as usize] = value;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: ClockSignal) -> Self {
        self.clock[clock as usize] = true;
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: BranchFunction) -> Self {
        self.branch = branch;
        self
    }

    #[must_use]
    pub fn with_symbol(mut self, name: &str) -> Self {
        self.symbol = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, text: &str) -> Self {
        self.comment = Some(text.to_string());
        self
    }

    /// The value driven on a control signal, if the line drives it.
    #[must_use]
    pub fn control_value(&self, signal: ControlSignal) -> Option<u8> {
        match self.control.get(signal as usize) {
            Some(&value) if value != SIGNAL_DISABLED => Some(value),
            _ => None,
        }
    }

    /// True if the line asserts a clock.
    #[must_use]
    pub fn clocks(&self, clock: ClockSignal) -> bool {
        self.clock.get(clock as usize).copied().unwrap_or(false)
    }
}

impl Default for MicroLine {
    fn default() -> Self {
        Self::new()
    }
}

/// A structurally invalid microprogram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("line {0}: MemRead and MemWrite are both asserted")]
    ReadWriteConflict(usize),
    #[error("line {line}: branch target {target} is past the end of the program")]
    TargetOutOfRange { line: usize, target: usize },
    #[error("duplicate symbol \"{0}\"")]
    DuplicateSymbol(String),
}

/// An assembled, validated microprogram.
pub struct MicrocodeProgram {
    lines: Vec<MicroLine>,
    symbols: HashMap<String, usize>,
}

impl MicrocodeProgram {
    /// Assemble lines into a program: collect symbols, resolve sequential
    /// branches to direct targets (the final line stops), and validate.
    pub fn new(mut lines: Vec<MicroLine>) -> Result<Self, ProgramError> {
        let mut symbols = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            if let Some(symbol) = &line.symbol
                && symbols.insert(symbol.clone(), index).is_some()
            {
                return Err(ProgramError::DuplicateSymbol(symbol.clone()));
            }
        }

        let count = lines.len();
        for (index, line) in lines.iter_mut().enumerate() {
            if line.branch == BranchFunction::Sequential {
                line.branch = if index + 1 < count {
                    BranchFunction::Unconditional(index + 1)
                } else {
                    BranchFunction::Stop
                };
            }
        }

        for (index, line) in lines.iter().enumerate() {
            if line.control_value(ControlSignal::MemRead) == Some(1)
                && line.control_value(ControlSignal::MemWrite) == Some(1)
            {
                return Err(ProgramError::ReadWriteConflict(index));
            }
            let check = |target: usize| {
                if target < count {
                    Ok(())
                } else {
                    Err(ProgramError::TargetOutOfRange {
                        line: index,
                        target,
                    })
                }
            };
            match line.branch {
                BranchFunction::Unconditional(target) => check(target)?,
                BranchFunction::Conditional {
                    true_target,
                    false_target,
                    ..
                } => {
                    check(true_target)?;
                    check(false_target)?;
                }
                _ => {}
            }
        }

        Ok(Self { lines, symbols })
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&MicroLine> {
        self.lines.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Resolve a symbol to its line index.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }

    /// Toggle the breakpoint flag on a line.
    pub fn set_breakpoint(&mut self, index: usize, enabled: bool) {
        if let Some(line) = self.lines.get_mut(index) {
            line.breakpoint = enabled;
        }
    }

    pub fn clear_breakpoints(&mut self) {
        for line in &mut self.lines {
            line.breakpoint = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_branches_resolve_to_next_line_then_stop() {
        let program =
            MicrocodeProgram::new(vec![MicroLine::new(), MicroLine::new()]).expect("assembles");
        assert_eq!(
            program.line(0).map(|line| line.branch),
            Some(BranchFunction::Unconditional(1))
        );
        assert_eq!(
            program.line(1).map(|line| line.branch),
            Some(BranchFunction::Stop)
        );
    }

    #[test]
    fn read_write_conflict_is_rejected() {
        let bad = MicroLine::new()
            .with_control(ControlSignal::MemRead, 1)
            .with_control(ControlSignal::MemWrite, 1);
        assert_eq!(
            MicrocodeProgram::new(vec![bad]).err(),
            Some(ProgramError::ReadWriteConflict(0))
        );
    }

    #[test]
    fn dangling_branch_target_is_rejected() {
        let bad = MicroLine::new().with_branch(BranchFunction::Unconditional(7));
        assert_eq!(
            MicrocodeProgram::new(vec![bad]).err(),
            Some(ProgramError::TargetOutOfRange { line: 0, target: 7 })
        );
    }

    #[test]
    fn symbols_resolve_to_line_indices() {
        let program = MicrocodeProgram::new(vec![
            MicroLine::new().with_symbol("start"),
            MicroLine::new().with_symbol("ldwa"),
        ])
        .expect("assembles");
        assert_eq!(program.symbol("ldwa"), Some(1));
        assert_eq!(program.symbol("missing"), None);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let result = MicrocodeProgram::new(vec![
            MicroLine::new().with_symbol("loop"),
            MicroLine::new().with_symbol("loop"),
        ]);
        assert_eq!(
            result.err(),
            Some(ProgramError::DuplicateSymbol("loop".to_string()))
        );
    }
}
