//! Pep/9 instruction-set decode tables.
//!
//! The 256-entry opcode space maps onto roughly 55 mnemonics. Unary
//! instructions occupy a single opcode; branches occupy two (immediate
//! and indexed); everything else occupies a block of eight, one per
//! addressing mode. The tables are built once at startup and never
//! change for the life of the simulation.

/// A Pep/9 machine instruction mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Stop,
    Ret,
    Rettr,
    Movspa,
    Movflga,
    Movaflg,
    Nota,
    Notx,
    Nega,
    Negx,
    Asla,
    Aslx,
    Asra,
    Asrx,
    Rola,
    Rolx,
    Rora,
    Rorx,
    Br,
    Brle,
    Brlt,
    Breq,
    Brne,
    Brge,
    Brgt,
    Brv,
    Brc,
    Call,
    Nop0,
    Nop1,
    Nop,
    Deci,
    Deco,
    Hexo,
    Stro,
    Addsp,
    Subsp,
    Adda,
    Addx,
    Suba,
    Subx,
    Anda,
    Andx,
    Ora,
    Orx,
    Cpwa,
    Cpwx,
    Cpba,
    Cpbx,
    Ldwa,
    Ldwx,
    Ldba,
    Ldbx,
    Stwa,
    Stwx,
    Stba,
    Stbx,
}

impl Mnemonic {
    /// Lowercase assembler spelling, also used to look up microprogram
    /// entry points by symbol.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Ret => "ret",
            Self::Rettr => "rettr",
            Self::Movspa => "movspa",
            Self::Movflga => "movflga",
            Self::Movaflg => "movaflg",
            Self::Nota => "nota",
            Self::Notx => "notx",
            Self::Nega => "nega",
            Self::Negx => "negx",
            Self::Asla => "asla",
            Self::Aslx => "aslx",
            Self::Asra => "asra",
            Self::Asrx => "asrx",
            Self::Rola => "rola",
            Self::Rolx => "rolx",
            Self::Rora => "rora",
            Self::Rorx => "rorx",
            Self::Br => "br",
            Self::Brle => "brle",
            Self::Brlt => "brlt",
            Self::Breq => "breq",
            Self::Brne => "brne",
            Self::Brge => "brge",
            Self::Brgt => "brgt",
            Self::Brv => "brv",
            Self::Brc => "brc",
            Self::Call => "call",
            Self::Nop0 => "nop0",
            Self::Nop1 => "nop1",
            Self::Nop => "nop",
            Self::Deci => "deci",
            Self::Deco => "deco",
            Self::Hexo => "hexo",
            Self::Stro => "stro",
            Self::Addsp => "addsp",
            Self::Subsp => "subsp",
            Self::Adda => "adda",
            Self::Addx => "addx",
            Self::Suba => "suba",
            Self::Subx => "subx",
            Self::Anda => "anda",
            Self::Andx => "andx",
            Self::Ora => "ora",
            Self::Orx => "orx",
            Self::Cpwa => "cpwa",
            Self::Cpwx => "cpwx",
            Self::Cpba => "cpba",
            Self::Cpbx => "cpbx",
            Self::Ldwa => "ldwa",
            Self::Ldwx => "ldwx",
            Self::Ldba => "ldba",
            Self::Ldbx => "ldbx",
            Self::Stwa => "stwa",
            Self::Stwx => "stwx",
            Self::Stba => "stba",
            Self::Stbx => "stbx",
        }
    }
}

/// A Pep/9 addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    /// No operand (unary instructions and machine-level traps).
    None,
    /// Immediate.
    I,
    /// Direct.
    D,
    /// Indirect.
    N,
    /// Stack-relative.
    S,
    /// Stack-relative deferred.
    Sf,
    /// Indexed.
    X,
    /// Stack-indexed.
    Sx,
    /// Stack-deferred indexed.
    Sfx,
}

impl AddrMode {
    /// Lowercase assembler spelling, also used to look up microprogram
    /// addressing-mode entry points by symbol. `None` has no spelling.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::I => Some("i"),
            Self::D => Some("d"),
            Self::N => Some("n"),
            Self::S => Some("s"),
            Self::Sf => Some("sf"),
            Self::X => Some("x"),
            Self::Sx => Some("sx"),
            Self::Sfx => Some("sfx"),
        }
    }
}

/// Addressing-mode order within an eight-opcode instruction block.
const BLOCK_MODES: [AddrMode; 8] = [
    AddrMode::I,
    AddrMode::D,
    AddrMode::N,
    AddrMode::S,
    AddrMode::Sf,
    AddrMode::X,
    AddrMode::Sx,
    AddrMode::Sfx,
];

/// Immutable decoder tables for the Pep/9 opcode space.
///
/// `nop0_is_trap` selects whether opcode 38 (NOP0) is dispatched through
/// the trap machinery or executed as a plain unary no-op. Callers must
/// pick one interpretation for the life of a simulation.
pub struct InstructionSet {
    mnemonic: [Mnemonic; 256],
    addr_mode: [AddrMode; 256],
    nop0_is_trap: bool,
}

impl InstructionSet {
    /// Build the decode tables.
    #[must_use]
    pub fn new(nop0_is_trap: bool) -> Self {
        let mut mnemonic = [Mnemonic::Stop; 256];
        let mut addr_mode = [AddrMode::None; 256];

        // 0..=17: unary register instructions, one opcode each.
        let unary: [Mnemonic; 18] = [
            Mnemonic::Stop,
            Mnemonic::Ret,
            Mnemonic::Rettr,
            Mnemonic::Movspa,
            Mnemonic::Movflga,
            Mnemonic::Movaflg,
            Mnemonic::Nota,
            Mnemonic::Notx,
            Mnemonic::Nega,
            Mnemonic::Negx,
            Mnemonic::Asla,
            Mnemonic::Aslx,
            Mnemonic::Asra,
            Mnemonic::Asrx,
            Mnemonic::Rola,
            Mnemonic::Rolx,
            Mnemonic::Rora,
            Mnemonic::Rorx,
        ];
        for (opcode, m) in unary.into_iter().enumerate() {
            mnemonic[opcode] = m;
        }

        // 18..=37: branches and CALL, immediate then indexed.
        let branches: [Mnemonic; 10] = [
            Mnemonic::Br,
            Mnemonic::Brle,
            Mnemonic::Brlt,
            Mnemonic::Breq,
            Mnemonic::Brne,
            Mnemonic::Brge,
            Mnemonic::Brgt,
            Mnemonic::Brv,
            Mnemonic::Brc,
            Mnemonic::Call,
        ];
        for (i, m) in branches.into_iter().enumerate() {
            let base = 18 + i * 2;
            mnemonic[base] = m;
            addr_mode[base] = AddrMode::I;
            mnemonic[base + 1] = m;
            addr_mode[base + 1] = AddrMode::X;
        }

        // 38..=79: traps. All trap opcodes decode with no addressing mode;
        // the trap hardware itself does not fetch an operand.
        mnemonic[38] = Mnemonic::Nop0;
        mnemonic[39] = Mnemonic::Nop1;
        let trap_blocks: [(usize, Mnemonic); 5] = [
            (40, Mnemonic::Nop),
            (48, Mnemonic::Deci),
            (56, Mnemonic::Deco),
            (64, Mnemonic::Hexo),
            (72, Mnemonic::Stro),
        ];
        for (base, m) in trap_blocks {
            for opcode in base..base + 8 {
                mnemonic[opcode] = m;
            }
        }

        // 80..=255: eight-opcode blocks, one opcode per addressing mode.
        let blocks: [(usize, Mnemonic); 22] = [
            (80, Mnemonic::Addsp),
            (88, Mnemonic::Subsp),
            (96, Mnemonic::Adda),
            (104, Mnemonic::Addx),
            (112, Mnemonic::Suba),
            (120, Mnemonic::Subx),
            (128, Mnemonic::Anda),
            (136, Mnemonic::Andx),
            (144, Mnemonic::Ora),
            (152, Mnemonic::Orx),
            (160, Mnemonic::Cpwa),
            (168, Mnemonic::Cpwx),
            (176, Mnemonic::Cpba),
            (184, Mnemonic::Cpbx),
            (192, Mnemonic::Ldwa),
            (200, Mnemonic::Ldwx),
            (208, Mnemonic::Ldba),
            (216, Mnemonic::Ldbx),
            (224, Mnemonic::Stwa),
            (232, Mnemonic::Stwx),
            (240, Mnemonic::Stba),
            (248, Mnemonic::Stbx),
        ];
        for (base, m) in blocks {
            for (i, mode) in BLOCK_MODES.into_iter().enumerate() {
                mnemonic[base + i] = m;
                addr_mode[base + i] = mode;
            }
        }

        Self {
            mnemonic,
            addr_mode,
            nop0_is_trap,
        }
    }

    /// Decode an opcode to its mnemonic.
    #[must_use]
    pub fn mnemonic(&self, opcode: u8) -> Mnemonic {
        self.mnemonic[opcode as usize]
    }

    /// Decode an opcode to its addressing mode.
    #[must_use]
    pub fn addr_mode(&self, opcode: u8) -> AddrMode {
        self.addr_mode[opcode as usize]
    }

    /// True if the mnemonic takes no operand specifier.
    #[must_use]
    pub fn is_unary(&self, m: Mnemonic) -> bool {
        matches!(
            m,
            Mnemonic::Stop
                | Mnemonic::Ret
                | Mnemonic::Rettr
                | Mnemonic::Movspa
                | Mnemonic::Movflga
                | Mnemonic::Movaflg
                | Mnemonic::Nota
                | Mnemonic::Notx
                | Mnemonic::Nega
                | Mnemonic::Negx
                | Mnemonic::Asla
                | Mnemonic::Aslx
                | Mnemonic::Asra
                | Mnemonic::Asrx
                | Mnemonic::Rola
                | Mnemonic::Rolx
                | Mnemonic::Rora
                | Mnemonic::Rorx
                | Mnemonic::Nop0
                | Mnemonic::Nop1
        )
    }

    /// True if the mnemonic is dispatched through the trap machinery.
    #[must_use]
    pub fn is_trap(&self, m: Mnemonic) -> bool {
        match m {
            Mnemonic::Nop
            | Mnemonic::Deci
            | Mnemonic::Deco
            | Mnemonic::Hexo
            | Mnemonic::Stro
            | Mnemonic::Nop1 => true,
            Mnemonic::Nop0 => self.nop0_is_trap,
            _ => false,
        }
    }

    /// True if the mnemonic writes its operand to memory.
    #[must_use]
    pub fn is_store(&self, m: Mnemonic) -> bool {
        matches!(
            m,
            Mnemonic::Stba | Mnemonic::Stbx | Mnemonic::Stwa | Mnemonic::Stwx | Mnemonic::Deci
        )
    }

    /// How many bytes of the decoded operand the debugger displays.
    ///
    /// Byte loads and compares operate on a one-byte value; every other
    /// operand (including store targets, which are addresses) is a word.
    #[must_use]
    pub fn operand_display_width(&self, m: Mnemonic) -> u8 {
        match m {
            Mnemonic::Ldba | Mnemonic::Ldbx | Mnemonic::Cpba | Mnemonic::Cpbx => 1,
            _ => 2,
        }
    }

    /// The boot-time NOP0 interpretation this set was built with.
    #[must_use]
    pub fn nop0_is_trap(&self) -> bool {
        self.nop0_is_trap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_decodes() {
        let iset = InstructionSet::new(true);
        for opcode in 0..=255u8 {
            // Decoding is total; this mainly checks the table fill left
            // no gaps that alias to the STOP initializer above opcode 0.
            let m = iset.mnemonic(opcode);
            if opcode > 0 {
                assert!(
                    m != Mnemonic::Stop,
                    "opcode {opcode:#04X} fell through to STOP"
                );
            }
            let _ = iset.addr_mode(opcode);
        }
    }

    #[test]
    fn unary_opcodes_have_no_addressing_mode() {
        let iset = InstructionSet::new(true);
        for opcode in 0..=255u8 {
            let m = iset.mnemonic(opcode);
            if iset.is_unary(m) {
                assert_eq!(
                    iset.addr_mode(opcode),
                    AddrMode::None,
                    "unary opcode {opcode:#04X} decodes an addressing mode"
                );
            }
        }
    }

    #[test]
    fn block_instructions_cover_all_eight_modes() {
        let iset = InstructionSet::new(true);
        // ADDA immediate is the canonical opcode 0x60.
        assert_eq!(iset.mnemonic(0x60), Mnemonic::Adda);
        assert_eq!(iset.addr_mode(0x60), AddrMode::I);
        assert_eq!(iset.addr_mode(0x61), AddrMode::D);
        assert_eq!(iset.addr_mode(0x62), AddrMode::N);
        assert_eq!(iset.addr_mode(0x63), AddrMode::S);
        assert_eq!(iset.addr_mode(0x64), AddrMode::Sf);
        assert_eq!(iset.addr_mode(0x65), AddrMode::X);
        assert_eq!(iset.addr_mode(0x66), AddrMode::Sx);
        assert_eq!(iset.addr_mode(0x67), AddrMode::Sfx);
        // LDBA direct, the canonical byte-load opcode.
        assert_eq!(iset.mnemonic(0xD1), Mnemonic::Ldba);
        assert_eq!(iset.addr_mode(0xD1), AddrMode::D);
    }

    #[test]
    fn branches_alternate_immediate_and_indexed() {
        let iset = InstructionSet::new(true);
        assert_eq!(iset.mnemonic(18), Mnemonic::Br);
        assert_eq!(iset.addr_mode(18), AddrMode::I);
        assert_eq!(iset.addr_mode(19), AddrMode::X);
        assert_eq!(iset.mnemonic(36), Mnemonic::Call);
        assert_eq!(iset.addr_mode(37), AddrMode::X);
    }

    #[test]
    fn nop0_trap_classification_follows_flag() {
        let trapping = InstructionSet::new(true);
        assert!(trapping.is_trap(Mnemonic::Nop0));
        let plain = InstructionSet::new(false);
        assert!(!plain.is_trap(Mnemonic::Nop0));
        assert!(plain.is_trap(Mnemonic::Nop1));
        assert!(plain.is_unary(Mnemonic::Nop0));
    }

    #[test]
    fn store_predicate_includes_deci() {
        let iset = InstructionSet::new(true);
        assert!(iset.is_store(Mnemonic::Stwa));
        assert!(iset.is_store(Mnemonic::Deci));
        assert!(!iset.is_store(Mnemonic::Ldwa));
    }

    #[test]
    fn byte_loads_display_one_byte_operands() {
        let iset = InstructionSet::new(true);
        assert_eq!(iset.operand_display_width(Mnemonic::Ldba), 1);
        assert_eq!(iset.operand_display_width(Mnemonic::Cpbx), 1);
        // Store operands are addresses, displayed at word width.
        assert_eq!(iset.operand_display_width(Mnemonic::Stba), 2);
        assert_eq!(iset.operand_display_width(Mnemonic::Adda), 2);
    }
}
