//! Z80 register set.

use std::fmt;

use crate::flags::{CF, PF, SF, ZF};

/// Which index register an instruction addresses through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Index {
    Ix,
    Iy,
}

impl Index {
    pub const ALL: [Self; 2] = [Self::Ix, Self::Iy];

    /// The prefix byte that selects this register.
    #[must_use]
    pub const fn prefix(self) -> u8 {
        match self {
            Self::Ix => 0xDD,
            Self::Iy => 0xFD,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ix => "IX",
            Self::Iy => "IY",
        }
    }

    /// High and low halves (undocumented IXH/IXL, IYH/IYL).
    #[must_use]
    pub const fn halves(self) -> (Reg8, Reg8) {
        match self {
            Self::Ix => (Reg8::Ixh, Reg8::Ixl),
            Self::Iy => (Reg8::Iyh, Reg8::Iyl),
        }
    }

    #[must_use]
    pub const fn pair(self) -> Reg16 {
        match self {
            Self::Ix => Reg16::Ix,
            Self::Iy => Reg16::Iy,
        }
    }
}

/// An 8-bit register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
}

impl Reg8 {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::H => "H",
            Self::L => "L",
            Self::Ixh => "IXH",
            Self::Ixl => "IXL",
            Self::Iyh => "IYH",
            Self::Iyl => "IYL",
            Self::I => "I",
            Self::R => "R",
        }
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A 16-bit register pair operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    Af,
    Bc,
    De,
    Hl,
    Sp,
    Ix,
    Iy,
}

impl Reg16 {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Af => "AF",
            Self::Bc => "BC",
            Self::De => "DE",
            Self::Hl => "HL",
            Self::Sp => "SP",
            Self::Ix => "IX",
            Self::Iy => "IY",
        }
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Z80 registers snapshot for observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    // Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Alternate registers
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    // Other registers
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    /// WZ/MEMPTR - internal temporary register.
    /// Its high byte leaks into X/Y after BIT n,(HL).
    pub wz: u16,

    // Interrupt state
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,

    pub halted: bool,

    /// Q latch: the flags the last instruction wrote, or 0 if it left F
    /// alone. SCF and CCF take X/Y from it.
    pub q: u8,
    /// The last instruction was LD A,I or LD A,R.
    pub last_was_ld_a_ir: bool,
}

impl Registers {
    /// Power-on state: AF and SP all ones, everything else zero.
    #[must_use]
    pub fn power_on() -> Self {
        Self {
            a: 0xFF,
            f: 0xFF,
            sp: 0xFFFF,
            ..Self::default()
        }
    }

    /// Get AF register pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    /// Get BC register pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    /// Get DE register pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    /// Get HL register pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    /// Set AF register pair.
    pub fn set_af(&mut self, value: u16) {
        [self.f, self.a] = value.to_le_bytes();
    }

    /// Set BC register pair.
    pub fn set_bc(&mut self, value: u16) {
        [self.c, self.b] = value.to_le_bytes();
    }

    /// Set DE register pair.
    pub fn set_de(&mut self, value: u16) {
        [self.e, self.d] = value.to_le_bytes();
    }

    /// Set HL register pair.
    pub fn set_hl(&mut self, value: u16) {
        [self.l, self.h] = value.to_le_bytes();
    }

    #[must_use]
    pub fn get8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::Ixh => (self.ix >> 8) as u8,
            Reg8::Ixl => self.ix as u8,
            Reg8::Iyh => (self.iy >> 8) as u8,
            Reg8::Iyl => self.iy as u8,
            Reg8::I => self.i,
            Reg8::R => self.r,
        }
    }

    pub fn set8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.a = value,
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
            Reg8::Ixh => self.ix = (self.ix & 0x00FF) | (u16::from(value) << 8),
            Reg8::Ixl => self.ix = (self.ix & 0xFF00) | u16::from(value),
            Reg8::Iyh => self.iy = (self.iy & 0x00FF) | (u16::from(value) << 8),
            Reg8::Iyl => self.iy = (self.iy & 0xFF00) | u16::from(value),
            Reg8::I => self.i = value,
            Reg8::R => self.r = value,
        }
    }

    #[must_use]
    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::Af => self.af(),
            Reg16::Bc => self.bc(),
            Reg16::De => self.de(),
            Reg16::Hl => self.hl(),
            Reg16::Sp => self.sp,
            Reg16::Ix => self.ix,
            Reg16::Iy => self.iy,
        }
    }

    pub fn set16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::Af => self.set_af(value),
            Reg16::Bc => self.set_bc(value),
            Reg16::De => self.set_de(value),
            Reg16::Hl => self.set_hl(value),
            Reg16::Sp => self.sp = value,
            Reg16::Ix => self.ix = value,
            Reg16::Iy => self.iy = value,
        }
    }

    #[must_use]
    pub fn index(&self, index: Index) -> u16 {
        self.get16(index.pair())
    }

    /// EX AF,AF'.
    pub fn exchange_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }

    /// EXX: swap BC, DE and HL with their shadows.
    pub fn exchange_main(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }

    /// Advance the memory refresh counter. Bit 7 of R is never changed by
    /// refresh; only LD R,A writes it.
    pub fn refresh(&mut self, fetches: u8) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(fetches) & 0x7F);
    }

    #[must_use]
    pub const fn carry(&self) -> bool {
        self.f & CF != 0
    }

    /// Evaluate a condition code against F.
    #[must_use]
    pub const fn condition(&self, cc: Condition) -> bool {
        let f = self.f;
        match cc {
            Condition::Nz => f & ZF == 0,
            Condition::Z => f & ZF != 0,
            Condition::Nc => f & CF == 0,
            Condition::C => f & CF != 0,
            Condition::Po => f & PF == 0,
            Condition::Pe => f & PF != 0,
            Condition::P => f & SF == 0,
            Condition::M => f & SF != 0,
        }
    }
}

/// Branch condition codes, in opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

impl Condition {
    pub const ALL: [Self; 8] = [
        Self::Nz,
        Self::Z,
        Self::Nc,
        Self::C,
        Self::Po,
        Self::Pe,
        Self::P,
        Self::M,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nz => "NZ",
            Self::Z => "Z",
            Self::Nc => "NC",
            Self::C => "C",
            Self::Po => "PO",
            Self::Pe => "PE",
            Self::P => "P",
            Self::M => "M",
        }
    }
}
