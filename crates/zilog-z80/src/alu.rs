//! Arithmetic and logic for the Z80.
//!
//! Every function returns the full flags byte it would produce. Callers
//! merge it into F through the instruction's flag effects, so bits an
//! instruction leaves alone are computed here but never stored.

#![allow(clippy::verbose_bit_mask)] // Clearer to read mask comparisons.

use std::fmt;

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// The eight accumulator operations selected by bits 3-5 of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    /// Opcode order: ADD ADC SUB SBC AND XOR OR CP.
    pub const ALL: [Self; 8] = [
        Self::Add,
        Self::Adc,
        Self::Sub,
        Self::Sbc,
        Self::And,
        Self::Xor,
        Self::Or,
        Self::Cp,
    ];

    /// Assembler prefix, including the `A,` that ADD/ADC/SBC spell out.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Add => "ADD A,",
            Self::Adc => "ADC A,",
            Self::Sub => "SUB ",
            Self::Sbc => "SBC A,",
            Self::And => "AND ",
            Self::Xor => "XOR ",
            Self::Or => "OR ",
            Self::Cp => "CP ",
        }
    }

    /// Does the result go back into A?
    #[must_use]
    pub const fn stores(self) -> bool {
        !matches!(self, Self::Cp)
    }
}

/// The eight rotate/shift operations of the CB page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    /// Undocumented: shift left, bit 0 = 1.
    Sll,
    Srl,
}

impl ShiftOp {
    /// Opcode order: RLC RRC RL RR SLA SRA SLL SRL.
    pub const ALL: [Self; 8] = [
        Self::Rlc,
        Self::Rrc,
        Self::Rl,
        Self::Rr,
        Self::Sla,
        Self::Sra,
        Self::Sll,
        Self::Srl,
    ];
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rlc => "RLC",
            Self::Rrc => "RRC",
            Self::Rl => "RL",
            Self::Rr => "RR",
            Self::Sla => "SLA",
            Self::Sra => "SRA",
            Self::Sll => "SLL",
            Self::Srl => "SRL",
        };
        f.write_str(name)
    }
}

/// Apply an accumulator operation. `carry` is the incoming C flag.
#[must_use]
pub fn alu8(op: AluOp, a: u8, b: u8, carry: bool) -> AluResult {
    match op {
        AluOp::Add => add8(a, b, false),
        AluOp::Adc => add8(a, b, carry),
        AluOp::Sub => sub8(a, b, false),
        AluOp::Sbc => sub8(a, b, carry),
        AluOp::And => logic(a & b, HF),
        AluOp::Xor => logic(a ^ b, 0),
        AluOp::Or => logic(a | b, 0),
        AluOp::Cp => cp8(a, b),
    }
}

/// Add two bytes with optional carry, returning result and flags.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result16 = u16::from(a) + u16::from(b) + u16::from(c);
    let result = result16 as u8;

    let mut flags = sz53(result);

    // Half-carry flag
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }

    // Overflow flag (both operands same sign, result different sign)
    if ((a ^ b) & 0x80 == 0) && ((a ^ result) & 0x80 != 0) {
        flags |= PF;
    }

    if result16 > 0xFF {
        flags |= CF;
    }

    AluResult {
        value: result,
        flags,
    }
}

/// Subtract two bytes with optional borrow, returning result and flags.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = sz53(result) | NF;

    // Half-carry flag (borrow from bit 4)
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }

    // Overflow flag (operands different sign, result same sign as subtrahend)
    if ((a ^ b) & 0x80 != 0) && ((b ^ result) & 0x80 == 0) {
        flags |= PF;
    }

    // Carry flag (borrow)
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }

    AluResult {
        value: result,
        flags,
    }
}

/// Compare (subtract without storing result).
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let mut result = sub8(a, b, false);
    // For CP, undocumented flags come from operand, not result
    result.flags = (result.flags & !(YF | XF)) | (b & (YF | XF));
    result
}

fn logic(result: u8, extra: u8) -> AluResult {
    AluResult {
        value: result,
        flags: sz53p(result) | extra,
    }
}

/// Increment byte.
#[must_use]
pub fn inc8(a: u8) -> AluResult {
    let result = a.wrapping_add(1);
    let mut flags = sz53(result);
    if a & 0x0F == 0x0F {
        flags |= HF;
    }
    if a == 0x7F {
        flags |= PF; // Overflow
    }
    AluResult {
        value: result,
        flags,
    }
}

/// Decrement byte.
#[must_use]
pub fn dec8(a: u8) -> AluResult {
    let result = a.wrapping_sub(1);
    let mut flags = sz53(result) | NF;
    if a & 0x0F == 0x00 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF; // Overflow
    }
    AluResult {
        value: result,
        flags,
    }
}

/// Rotate or shift a byte. `carry` feeds RL and RR.
///
/// Flags are the CB-page set: S, Z, Y, X and parity from the result, C from
/// the bit shifted out, H and N clear. The accumulator rotates (RLCA etc.)
/// use the same result and mask off S, Z and P/V.
#[must_use]
pub fn shift8(op: ShiftOp, a: u8, carry: bool) -> AluResult {
    let (result, out) = match op {
        ShiftOp::Rlc => (a.rotate_left(1), a & 0x80 != 0),
        ShiftOp::Rrc => (a.rotate_right(1), a & 1 != 0),
        ShiftOp::Rl => ((a << 1) | u8::from(carry), a & 0x80 != 0),
        ShiftOp::Rr => ((a >> 1) | (u8::from(carry) << 7), a & 1 != 0),
        ShiftOp::Sla => (a << 1, a & 0x80 != 0),
        ShiftOp::Sra => ((a >> 1) | (a & 0x80), a & 1 != 0),
        ShiftOp::Sll => ((a << 1) | 1, a & 0x80 != 0),
        ShiftOp::Srl => (a >> 1, a & 1 != 0),
    };
    AluResult {
        value: result,
        flags: sz53p(result) | if out { CF } else { 0 },
    }
}

/// Decimal adjust A after BCD arithmetic. `f` is the current flags byte.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let nf = f & NF != 0;
    let cf = f & CF != 0;
    let hf = f & HF != 0;

    let mut correction: u8 = 0;
    let mut new_cf = cf;

    if hf || (a & 0x0F) > 9 {
        correction |= 0x06;
    }
    if cf || a > 0x99 {
        correction |= 0x60;
        new_cf = true;
    }

    let result = if nf {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };

    let new_hf = if nf {
        hf && (a & 0x0F) < 6
    } else {
        (a & 0x0F) > 9
    };

    let mut flags = sz53p(result) | (f & NF);
    if new_cf {
        flags |= CF;
    }
    if new_hf {
        flags |= HF;
    }
    AluResult {
        value: result,
        flags,
    }
}

/// 16-bit add for HL/IX/IY.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let result32 = u32::from(a) + u32::from(b);
    let result = result32 as u16;

    // Undocumented flags from high byte of result
    let mut flags = ((result >> 8) as u8) & (YF | XF);

    // Half-carry from bit 11
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }

    if result32 > 0xFFFF {
        flags |= CF;
    }

    (result, flags)
}

/// 16-bit add with carry for HL.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result32 = u32::from(a) + u32::from(b) + u32::from(c);
    let result = result32 as u16;

    let mut flags = wide_sz53(result);

    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        flags |= HF;
    }

    if ((a ^ b) & 0x8000 == 0) && ((a ^ result) & 0x8000 != 0) {
        flags |= PF;
    }

    if result32 > 0xFFFF {
        flags |= CF;
    }

    (result, flags)
}

/// 16-bit subtract with borrow for HL.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = wide_sz53(result) | NF;

    // Half-carry (borrow from bit 12)
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        flags |= HF;
    }

    if ((a ^ b) & 0x8000 != 0) && ((b ^ result) & 0x8000 == 0) {
        flags |= PF;
    }

    if u32::from(a) < u32::from(b) + u32::from(c) {
        flags |= CF;
    }

    (result, flags)
}

/// S and Z from the whole word, Y and X from the high byte.
fn wide_sz53(value: u16) -> u8 {
    let mut flags = ((value >> 8) as u8) & (SF | YF | XF);
    if value == 0 {
        flags |= ZF;
    }
    flags
}
