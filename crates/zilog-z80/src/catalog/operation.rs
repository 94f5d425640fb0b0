//! What an instruction does, as data.
//!
//! Operations are structural: `Ld8 { dst: Reg(B), src: Mem(Hl) }` rather
//! than an opcode number, so the executor never looks at opcode bytes.

use std::fmt;

use crate::alu::{AluOp, ShiftOp};
use crate::registers::{Condition, Index, Reg8, Reg16};

/// A memory operand's address source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pointer {
    Bc,
    De,
    Hl,
    /// (IX+d) or (IY+d), with `d` from the template's displacement slot.
    Indexed(Index),
    /// (nn), with `nn` from the template's immediate slots.
    Absolute,
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bc => f.write_str("(BC)"),
            Self::De => f.write_str("(DE)"),
            Self::Hl => f.write_str("(HL)"),
            Self::Indexed(index) => write!(f, "({}+d)", index.name()),
            Self::Absolute => f.write_str("(nn)"),
        }
    }
}

/// An 8-bit source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand8 {
    Reg(Reg8),
    /// Immediate byte `n`.
    Imm,
    Mem(Pointer),
}

impl Operand8 {
    pub const HL: Self = Self::Mem(Pointer::Hl);

    /// Operand selected by a 3-bit register field, with the (HL) slot at 6.
    ///
    /// Under a DD/FD prefix, H and L become the index halves and (HL)
    /// becomes (IX+d).
    #[must_use]
    pub const fn from_code(code: u8, index: Option<Index>) -> Self {
        match (code & 7, index) {
            (0, _) => Self::Reg(Reg8::B),
            (1, _) => Self::Reg(Reg8::C),
            (2, _) => Self::Reg(Reg8::D),
            (3, _) => Self::Reg(Reg8::E),
            (4, None) => Self::Reg(Reg8::H),
            (5, None) => Self::Reg(Reg8::L),
            (6, None) => Self::HL,
            (4, Some(index)) => Self::Reg(index.halves().0),
            (5, Some(index)) => Self::Reg(index.halves().1),
            (6, Some(index)) => Self::Mem(Pointer::Indexed(index)),
            _ => Self::Reg(Reg8::A),
        }
    }

    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(self, Self::Mem(_))
    }
}

impl fmt::Display for Operand8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Imm => f.write_str("n"),
            Self::Mem(pointer) => write!(f, "{pointer}"),
        }
    }
}

/// A 16-bit source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand16 {
    Reg(Reg16),
    /// Immediate word `nn`.
    Imm,
    /// Word at (nn).
    Mem,
}

impl fmt::Display for Operand16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Imm => f.write_str("nn"),
            Self::Mem => f.write_str("(nn)"),
        }
    }
}

/// ED-page block instructions, in opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockOp {
    Ldi,
    Cpi,
    Ini,
    Outi,
    Ldd,
    Cpd,
    Ind,
    Outd,
}

impl BlockOp {
    /// Does HL move downwards?
    #[must_use]
    pub const fn decrements(self) -> bool {
        matches!(self, Self::Ldd | Self::Cpd | Self::Ind | Self::Outd)
    }

    /// Mnemonic, e.g. `LDIR` for the repeating form of `LDI`.
    #[must_use]
    pub const fn mnemonic(self, repeat: bool) -> &'static str {
        match (self, repeat) {
            (Self::Ldi, false) => "LDI",
            (Self::Cpi, false) => "CPI",
            (Self::Ini, false) => "INI",
            (Self::Outi, false) => "OUTI",
            (Self::Ldd, false) => "LDD",
            (Self::Cpd, false) => "CPD",
            (Self::Ind, false) => "IND",
            (Self::Outd, false) => "OUTD",
            (Self::Ldi, true) => "LDIR",
            (Self::Cpi, true) => "CPIR",
            (Self::Ini, true) => "INIR",
            (Self::Outi, true) => "OTIR",
            (Self::Ldd, true) => "LDDR",
            (Self::Cpd, true) => "CPDR",
            (Self::Ind, true) => "INDR",
            (Self::Outd, true) => "OTDR",
        }
    }
}

/// The semantic effect of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Nop,
    /// A DD/FD prefix followed by another prefix: costs a fetch, does nothing.
    IgnoredPrefix,
    Halt,

    Ld8 {
        dst: Operand8,
        src: Operand8,
    },
    /// LD A,I or LD A,R: also copies IFF2 into P/V.
    LdAFromSpecial(Reg8),
    Ld16 {
        dst: Operand16,
        src: Operand16,
    },
    Push(Reg16),
    Pop(Reg16),
    ExAf,
    Exx,
    ExDeHl,
    /// EX (SP),HL/IX/IY.
    ExStack(Reg16),

    Alu {
        op: AluOp,
        src: Operand8,
    },
    Inc8(Operand8),
    Dec8(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    Add16 {
        dst: Reg16,
        src: Reg16,
    },
    Adc16(Reg16),
    Sbc16(Reg16),
    Daa,
    Cpl,
    Neg,
    Scf,
    Ccf,

    /// RLCA, RRCA, RLA, RRA.
    RotateA(ShiftOp),
    /// CB-page rotate or shift. `copy` is the undocumented DDCB register
    /// that also receives the result.
    Shift {
        op: ShiftOp,
        target: Operand8,
        copy: Option<Reg8>,
    },
    Bit {
        bit: u8,
        src: Operand8,
    },
    Res {
        bit: u8,
        target: Operand8,
        copy: Option<Reg8>,
    },
    Set {
        bit: u8,
        target: Operand8,
        copy: Option<Reg8>,
    },
    Rld,
    Rrd,

    Jp(Option<Condition>),
    /// JP (HL), JP (IX), JP (IY): jump to the register value.
    JpReg(Reg16),
    Jr(Option<Condition>),
    Djnz,
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Retn,
    Reti,
    Rst(u8),

    Di,
    Ei,
    Im(u8),

    /// IN A,(n).
    InImm,
    /// OUT (n),A.
    OutImm,
    /// IN r,(C); `None` is the undocumented IN (C) that only sets flags.
    InC(Option<Reg8>),
    /// OUT (C),r; `None` is the undocumented OUT (C),0.
    OutC(Option<Reg8>),
    Block {
        op: BlockOp,
        repeat: bool,
    },
}
