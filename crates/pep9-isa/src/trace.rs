//! Typed shadow of program memory for the debugger's stack panes.
//!
//! The tracer is a pure observer: it never touches memory or registers.
//! It watches instruction boundaries and maintains frames of typed slots
//! for the user stack, the OS stack (between trap entry and RETTR), the
//! globals area, and the heap. Typed slot tags come from the host (the
//! assembler's trace-tag pass) through a per-instruction-address map.
//!
//! Tracing failure is advisory: when the observed SP movement disagrees
//! with the model, the trace is flagged not-intact and the UI suppresses
//! it; the simulation itself continues.

use std::collections::HashMap;

use pep_core::{InstructionSet, Mnemonic};

/// Display format of a primitive slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFormat {
    /// One-byte character.
    Char,
    /// One-byte decimal.
    Dec1,
    /// Two-byte decimal.
    Dec2,
    /// One-byte hexadecimal.
    Hex1,
    /// Two-byte hexadecimal.
    Hex2,
}

impl TagFormat {
    /// Size of the slot in bytes.
    #[must_use]
    pub fn size(self) -> u16 {
        match self {
            Self::Char | Self::Dec1 | Self::Hex1 => 1,
            Self::Dec2 | Self::Hex2 => 2,
        }
    }
}

/// A typed slot description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceTag {
    Primitive {
        name: String,
        format: TagFormat,
    },
    Array {
        name: String,
        format: TagFormat,
        count: u16,
    },
    Struct {
        name: String,
        fields: Vec<TraceTag>,
    },
}

impl TraceTag {
    #[must_use]
    pub fn primitive(name: &str, format: TagFormat) -> Self {
        Self::Primitive {
            name: name.to_string(),
            format,
        }
    }

    /// An untyped filler slot used to keep frame sizes consistent when no
    /// tag information is available.
    #[must_use]
    pub fn opaque(size: u16) -> Self {
        Self::Array {
            name: String::new(),
            format: TagFormat::Hex1,
            count: size,
        }
    }

    /// Total size in bytes.
    #[must_use]
    pub fn size(&self) -> u16 {
        match self {
            Self::Primitive { format, .. } => format.size(),
            Self::Array { format, count, .. } => format.size().wrapping_mul(*count),
            Self::Struct { fields, .. } => fields.iter().map(TraceTag::size).sum(),
        }
    }
}

/// One stack frame: an ordered list of `(stack address, tag)` slots.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    slots: Vec<(u16, TraceTag)>,
}

impl StackFrame {
    pub fn push(&mut self, address: u16, tag: TraceTag) {
        self.slots.push((address, tag));
    }

    /// Pop slots from the top of the frame until `size` bytes are
    /// accounted for. Returns false if the slots do not tile the size
    /// exactly.
    pub fn pop(&mut self, size: u16) -> bool {
        let mut popped = 0u16;
        while popped < size {
            let Some((_, tag)) = self.slots.pop() else {
                return false;
            };
            popped = popped.wrapping_add(tag.size());
        }
        popped == size
    }

    /// Total bytes described by the frame.
    #[must_use]
    pub fn size(&self) -> u16 {
        self.slots.iter().map(|(_, tag)| tag.size()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn slots(&self) -> &[(u16, TraceTag)] {
        &self.slots
    }
}

/// A call stack of frames plus the pending frame that accumulates
/// parameter tags until the next CALL promotes it.
#[derive(Debug, Clone)]
pub struct StackTrace {
    frames: Vec<StackFrame>,
    next_frame: StackFrame,
}

impl StackTrace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![StackFrame::default()],
            next_frame: StackFrame::default(),
        }
    }

    /// A CALL completed: tag the return address and promote the pending
    /// parameter frame to the callee's frame.
    pub fn call(&mut self, sp: u16) {
        self.next_frame
            .push(sp, TraceTag::primitive("retAddr", TagFormat::Hex2));
        self.frames.push(std::mem::take(&mut self.next_frame));
    }

    /// A RET completed: the callee's frame (minus the return address)
    /// becomes the pending frame again.
    pub fn ret(&mut self) -> bool {
        let Some(mut frame) = self.frames.pop() else {
            return false;
        };
        let ok = frame.pop(2);
        self.next_frame = frame;
        ok && !self.frames.is_empty()
    }

    /// Push an already-built frame (trap entry).
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Pop a whole frame (trap exit).
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn push_locals(&mut self, mut sp: u16, tags: &[TraceTag]) {
        if let Some(top) = self.frames.last_mut() {
            for tag in tags {
                let size = tag.size();
                top.push(sp, tag.clone());
                sp = sp.wrapping_sub(size);
            }
        }
    }

    pub fn push_params(&mut self, mut sp: u16, tags: &[TraceTag]) {
        for tag in tags {
            let size = tag.size();
            self.next_frame.push(sp, tag.clone());
            sp = sp.wrapping_sub(size);
        }
    }

    pub fn pop_locals(&mut self, size: u16) -> bool {
        self.frames
            .last_mut()
            .is_some_and(|frame| frame.pop(size))
    }

    pub fn pop_params(&mut self, size: u16) -> bool {
        self.next_frame.pop(size)
    }

    /// Number of open frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    #[must_use]
    pub fn pending(&self) -> &StackFrame {
        &self.next_frame
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// The three memory sub-traces the debugger displays.
#[derive(Debug, Clone)]
pub struct MemoryTrace {
    pub user_stack: StackTrace,
    pub os_stack: StackTrace,
    pub globals: StackFrame,
    pub heap: Vec<StackFrame>,
    active_is_os: bool,
    intact: bool,
}

impl MemoryTrace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_stack: StackTrace::new(),
            os_stack: StackTrace::new(),
            globals: StackFrame::default(),
            heap: Vec::new(),
            active_is_os: false,
            intact: true,
        }
    }

    /// The stack currently executing: OS between trap entry and RETTR,
    /// user otherwise.
    #[must_use]
    pub fn active_stack(&self) -> &StackTrace {
        if self.active_is_os {
            &self.os_stack
        } else {
            &self.user_stack
        }
    }

    fn active_stack_mut(&mut self) -> &mut StackTrace {
        if self.active_is_os {
            &mut self.os_stack
        } else {
            &mut self.user_stack
        }
    }

    /// True while the model still agrees with the observed SP movement.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.intact
    }
}

impl Default for MemoryTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// The passive observer the ISA executor notifies at instruction
/// boundaries.
pub struct StackTracer {
    trace: MemoryTrace,
    /// Trace tags keyed by the address of the instruction they annotate.
    tags: HashMap<u16, Vec<TraceTag>>,
    enabled: bool,
    is_trapped: bool,
    first_line_after_call: bool,
}

impl StackTracer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace: MemoryTrace::new(),
            tags: HashMap::new(),
            enabled: true,
            is_trapped: false,
            first_line_after_call: false,
        }
    }

    /// Enable or disable tracking entirely.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Supply the typed tags for the instruction at `address` (a SUBSP or
    /// ADDSP whose slots the assembler annotated).
    pub fn add_tags(&mut self, address: u16, tags: Vec<TraceTag>) {
        self.tags.insert(address, tags);
    }

    /// Record a typed global at a fixed address.
    pub fn add_global(&mut self, address: u16, tag: TraceTag) {
        self.trace.globals.push(address, tag);
    }

    /// Record a heap allocation the host observed (e.g. a malloc call).
    pub fn record_heap_frame(&mut self, frame: StackFrame) {
        self.trace.heap.push(frame);
    }

    #[must_use]
    pub fn trace(&self) -> &MemoryTrace {
        &self.trace
    }

    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.trace.intact
    }

    pub fn reset(&mut self) {
        self.trace = MemoryTrace::new();
        self.is_trapped = false;
        self.first_line_after_call = false;
    }

    /// Hook at the start of each instruction; `_is` is the specifier of
    /// the instruction that just retired.
    pub fn on_instruction_start(&mut self, _is: u8) {}

    /// Observe a completed instruction.
    #[allow(clippy::too_many_arguments)]
    pub fn on_instruction_end(
        &mut self,
        iset: &InstructionSet,
        is: u8,
        _operand_spec: u16,
        sp_start: u16,
        sp_current: u16,
        pc_start: u16,
        _accumulator: u16,
    ) {
        if !self.enabled {
            return;
        }
        let mnemonic = iset.mnemonic(is);
        let was_first_line = self.first_line_after_call;
        self.first_line_after_call = false;

        if iset.is_trap(mnemonic) {
            // Trap entry: SP now points at the saved NZVC byte, the base
            // of the fixed ten-byte process frame.
            let mut frame = StackFrame::default();
            frame.push(
                sp_current.wrapping_add(9),
                TraceTag::primitive("IS", TagFormat::Hex1),
            );
            frame.push(
                sp_current.wrapping_add(7),
                TraceTag::primitive("SP", TagFormat::Hex2),
            );
            frame.push(
                sp_current.wrapping_add(5),
                TraceTag::primitive("PC", TagFormat::Hex2),
            );
            frame.push(
                sp_current.wrapping_add(3),
                TraceTag::primitive("X", TagFormat::Hex2),
            );
            frame.push(
                sp_current.wrapping_add(1),
                TraceTag::primitive("A", TagFormat::Hex2),
            );
            frame.push(sp_current, TraceTag::primitive("NZVC", TagFormat::Hex1));
            self.trace.os_stack.push_frame(frame);
            self.trace.active_is_os = true;
            self.is_trapped = true;
            self.first_line_after_call = true;
            return;
        }

        match mnemonic {
            Mnemonic::Rettr => {
                if self.trace.os_stack.pop_frame().is_none() {
                    self.trace.intact = false;
                }
                self.trace.active_is_os = false;
                self.is_trapped = false;
            }
            Mnemonic::Call => {
                self.trace.active_stack_mut().call(sp_current);
                self.first_line_after_call = true;
            }
            Mnemonic::Ret => {
                if !self.trace.active_stack_mut().ret() {
                    self.trace.intact = false;
                }
            }
            Mnemonic::Subsp => {
                let size = sp_start.wrapping_sub(sp_current);
                let tags = self.tags.get(&pc_start).cloned();
                let typed = match tags {
                    Some(tags) if tags.iter().map(TraceTag::size).sum::<u16>() == size => tags,
                    Some(_) => {
                        self.trace.intact = false;
                        vec![TraceTag::opaque(size)]
                    }
                    None => vec![TraceTag::opaque(size)],
                };
                let stack = self.trace.active_stack_mut();
                // Locals belong to the frame the CALL just opened;
                // anything else accumulates as parameters for the next
                // CALL.
                if was_first_line {
                    stack.push_locals(sp_start.wrapping_sub(1), &typed);
                } else {
                    stack.push_params(sp_start.wrapping_sub(1), &typed);
                }
            }
            Mnemonic::Addsp => {
                let size = sp_current.wrapping_sub(sp_start);
                let stack = self.trace.active_stack_mut();
                let popped = if stack.pending().is_empty() {
                    stack.pop_locals(size)
                } else {
                    stack.pop_params(size)
                };
                if !popped {
                    self.trace.intact = false;
                }
            }
            _ => {}
        }
    }
}

impl Default for StackTracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pep_core::InstructionSet;

    const CALL_I: u8 = 36;
    const RET: u8 = 1;
    const SUBSP_I: u8 = 88;
    const ADDSP_I: u8 = 80;
    const DECI_I: u8 = 48;
    const RETTR: u8 = 2;

    fn tracer_and_set() -> (StackTracer, InstructionSet) {
        (StackTracer::new(), InstructionSet::new(true))
    }

    #[test]
    fn call_then_ret_balances() {
        let (mut tracer, iset) = tracer_and_set();
        assert_eq!(tracer.trace().user_stack.depth(), 1);
        // CALL at 0x1000, SP dropped 0xFB00 -> 0xFAFE.
        tracer.on_instruction_end(&iset, CALL_I, 0x2000, 0xFB00, 0xFAFE, 0x1000, 0);
        assert_eq!(tracer.trace().user_stack.depth(), 2);
        tracer.on_instruction_end(&iset, RET, 0, 0xFAFE, 0xFB00, 0x2000, 0);
        assert_eq!(tracer.trace().user_stack.depth(), 1);
        assert!(tracer.is_intact());
    }

    #[test]
    fn params_accumulate_into_callee_frame() {
        let (mut tracer, iset) = tracer_and_set();
        tracer.add_tags(
            0x1000,
            vec![
                TraceTag::primitive("arg1", TagFormat::Dec2),
                TraceTag::primitive("arg2", TagFormat::Dec2),
            ],
        );
        // SUBSP #4 at 0x1000: parameter slots.
        tracer.on_instruction_end(&iset, SUBSP_I, 4, 0xFB00, 0xFAFC, 0x1000, 0);
        assert_eq!(tracer.trace().user_stack.pending().size(), 4);
        // The CALL promotes them, plus the return address slot.
        tracer.on_instruction_end(&iset, CALL_I, 0x2000, 0xFAFC, 0xFAFA, 0x1003, 0);
        let frames = tracer.trace().user_stack.frames();
        assert_eq!(frames.last().map(StackFrame::size), Some(6));
        assert!(tracer.is_intact());
    }

    #[test]
    fn locals_follow_the_call() {
        let (mut tracer, iset) = tracer_and_set();
        tracer.on_instruction_end(&iset, CALL_I, 0x2000, 0xFB00, 0xFAFE, 0x1000, 0);
        // First line of the callee reserves locals.
        tracer.add_tags(0x2000, vec![TraceTag::primitive("tmp", TagFormat::Dec2)]);
        tracer.on_instruction_end(&iset, SUBSP_I, 2, 0xFAFE, 0xFAFC, 0x2000, 0);
        assert_eq!(
            tracer.trace().user_stack.frames().last().map(StackFrame::size),
            Some(4)
        );
        // Callee releases them before returning.
        tracer.on_instruction_end(&iset, ADDSP_I, 2, 0xFAFC, 0xFAFE, 0x2100, 0);
        tracer.on_instruction_end(&iset, RET, 0, 0xFAFE, 0xFB00, 0x2102, 0);
        assert!(tracer.is_intact());
        assert_eq!(tracer.trace().user_stack.depth(), 1);
    }

    #[test]
    fn trap_pushes_and_rettr_pops_the_os_frame() {
        let (mut tracer, iset) = tracer_and_set();
        // DECI trap: SP lands at T-10 = 0xFB85.
        tracer.on_instruction_end(&iset, DECI_I, 0x0042, 0xFB00, 0xFB85, 0x4000, 0);
        assert!(tracer.trace().active_stack().frames().len() > 1);
        let os_frames = tracer.trace().os_stack.frames();
        assert_eq!(os_frames.last().map(StackFrame::size), Some(10));
        tracer.on_instruction_end(&iset, RETTR, 0, 0xFB85, 0xFB00, 0xFC52, 0);
        assert_eq!(tracer.trace().os_stack.depth(), 1);
        assert!(tracer.is_intact());
        assert!(!tracer.trace().active_stack().frames().is_empty());
    }

    #[test]
    fn mismatched_tags_flag_not_intact_but_keep_tracking() {
        let (mut tracer, iset) = tracer_and_set();
        tracer.add_tags(0x1000, vec![TraceTag::primitive("only2", TagFormat::Dec2)]);
        // SUBSP moved SP by 6, tags only cover 2.
        tracer.on_instruction_end(&iset, SUBSP_I, 6, 0xFB00, 0xFAFA, 0x1000, 0);
        assert!(!tracer.is_intact());
        // The opaque filler keeps the pending frame size honest.
        assert_eq!(tracer.trace().user_stack.pending().size(), 6);
    }

    #[test]
    fn unbalanced_ret_flags_not_intact() {
        let (mut tracer, iset) = tracer_and_set();
        tracer.on_instruction_end(&iset, RET, 0, 0xFB00, 0xFB02, 0x1000, 0);
        assert!(!tracer.is_intact());
    }
}
