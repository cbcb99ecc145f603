//! The sixteen-function ALU.
//!
//! Every result-producing function reports N from the high bit and Z
//! from an all-zero result; the adds report C on unsigned carry out and
//! V on signed overflow. Function 15 moves the A input straight into the
//! NZVC bits and computes nothing else.

use pep_core::{C_MASK, N_MASK, V_MASK, Z_MASK};

/// ALU function selector values 0..=15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluFunction {
    /// 0: A.
    A,
    /// 1: A plus B.
    ApB,
    /// 2: A plus ~B plus 1.
    ApNotBp1,
    /// 3: A plus B plus Cin.
    ApBpCin,
    /// 4: A plus ~B plus Cin.
    ApNotBpCin,
    /// 5: A AND B.
    AAndB,
    /// 6: ~(A AND B).
    NotAAndB,
    /// 7: A OR B.
    AOrB,
    /// 8: ~(A OR B).
    NotAOrB,
    /// 9: A XOR B.
    AXorB,
    /// 10: ~A.
    NotA,
    /// 11: arithmetic shift left of A.
    AslA,
    /// 12: rotate A left through carry.
    RolA,
    /// 13: arithmetic shift right of A (sign extends).
    AsrA,
    /// 14: rotate A right through carry.
    RorA,
    /// 15: move A into NZVC.
    NzvcA,
}

impl AluFunction {
    /// Decode a control-signal value.
    #[must_use]
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::A),
            1 => Some(Self::ApB),
            2 => Some(Self::ApNotBp1),
            3 => Some(Self::ApBpCin),
            4 => Some(Self::ApNotBpCin),
            5 => Some(Self::AAndB),
            6 => Some(Self::NotAAndB),
            7 => Some(Self::AOrB),
            8 => Some(Self::NotAOrB),
            9 => Some(Self::AXorB),
            10 => Some(Self::NotA),
            11 => Some(Self::AslA),
            12 => Some(Self::RolA),
            13 => Some(Self::AsrA),
            14 => Some(Self::RorA),
            15 => Some(Self::NzvcA),
            _ => None,
        }
    }

    /// True if the function uses only the A input.
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::A | Self::NotA | Self::AslA | Self::RolA | Self::AsrA | Self::RorA | Self::NzvcA
        )
    }
}

/// Result byte plus the packed NZVC it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    pub result: u8,
    pub nzvc: u8,
}

/// Evaluate an ALU function.
///
/// Returns `None` when the function needs a carry in and none is routed
/// to it. Presence of the A and B inputs is the datapath's concern; the
/// values arrive here already resolved.
#[must_use]
pub fn evaluate(
    function: AluFunction,
    a: u8,
    b: u8,
    carry_in: Option<bool>,
) -> Option<AluOutput> {
    let mut nzvc = 0u8;

    let add = |a: u8, b: u8, carry: bool, nzvc: &mut u8| {
        let result = a.wrapping_add(b).wrapping_add(u8::from(carry));
        if result < a || result < b {
            *nzvc |= C_MASK;
        }
        // Signed overflow iff the inputs agree in sign and the result
        // disagrees.
        if (!(a ^ b) & (a ^ result)) & 0x80 != 0 {
            *nzvc |= V_MASK;
        }
        result
    };

    let result = match function {
        AluFunction::A => a,
        AluFunction::ApB => add(a, b, false, &mut nzvc),
        AluFunction::ApNotBp1 => add(a, !b, true, &mut nzvc),
        AluFunction::ApBpCin => add(a, b, carry_in?, &mut nzvc),
        AluFunction::ApNotBpCin => add(a, !b, carry_in?, &mut nzvc),
        AluFunction::AAndB => a & b,
        AluFunction::NotAAndB => !(a & b),
        AluFunction::AOrB => a | b,
        AluFunction::NotAOrB => !(a | b),
        AluFunction::AXorB => a ^ b,
        AluFunction::NotA => !a,
        AluFunction::AslA => {
            if a & 0x80 != 0 {
                nzvc |= C_MASK;
            }
            if ((a << 1) ^ a) & 0x80 != 0 {
                nzvc |= V_MASK;
            }
            a << 1
        }
        AluFunction::RolA => {
            if a & 0x80 != 0 {
                nzvc |= C_MASK;
            }
            if ((a << 1) ^ a) & 0x80 != 0 {
                nzvc |= V_MASK;
            }
            a << 1 | u8::from(carry_in?)
        }
        AluFunction::AsrA => {
            if a & 0x01 != 0 {
                nzvc |= C_MASK;
            }
            // The sign bit shifts into itself.
            a >> 1 | (a & 0x80)
        }
        AluFunction::RorA => {
            if a & 0x01 != 0 {
                nzvc |= C_MASK;
            }
            a >> 1 | u8::from(carry_in?) << 7
        }
        AluFunction::NzvcA => {
            // Status bits pass straight through; no N/Z recomputation.
            return Some(AluOutput {
                result: 0,
                nzvc: a & (N_MASK | Z_MASK | V_MASK | C_MASK),
            });
        }
    };

    if result & 0x80 != 0 {
        nzvc |= N_MASK;
    }
    if result == 0 {
        nzvc |= Z_MASK;
    }
    Some(AluOutput { result, nzvc })
}
