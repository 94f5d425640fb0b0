//! Per-instruction flag effect descriptors.
//!
//! Every instruction belongs to a [`Family`], and each family has a fixed
//! [`FlagEffects`] row saying what happens to each of the eight F bits. The
//! executor computes a candidate flags byte; [`FlagEffects::apply`] then
//! merges it with the old F so that unaffected bits survive and forced bits
//! take their forced value regardless of what the executor produced.

use std::fmt;

use crate::flags::{ALL, CF, HF, NF, PF, SF, XF, YF, ZF};

/// What an instruction does to one flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagEffect {
    /// Bit keeps its previous value.
    Unaffected,
    /// Bit reflects the result by the usual rule (sign, zero, carry, ...).
    Result,
    /// Bit is always cleared.
    Reset,
    /// Bit is always set.
    Set,
    /// Bit follows an instruction-specific rule (e.g. P/V = BC != 0).
    Special,
}

impl FlagEffect {
    const fn symbol(self) -> char {
        match self {
            Self::Unaffected => '-',
            Self::Result => '*',
            Self::Reset => '0',
            Self::Set => '1',
            Self::Special => '?',
        }
    }
}

/// Effects on all eight flag bits.
///
/// Stored as four masks so applying them costs a few bit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagEffects {
    /// Bits taken from the computed flags by the usual rule.
    result: u8,
    /// Bits taken from the computed flags by an instruction-specific rule.
    special: u8,
    /// Bits forced to 1.
    set: u8,
    /// Bits forced to 0.
    reset: u8,
}

impl FlagEffects {
    /// No flag changes.
    pub const UNAFFECTED: Self = Self {
        result: 0,
        special: 0,
        set: 0,
        reset: 0,
    };

    /// Build from per-bit effects in `S Z Y H X P/V N C` order.
    #[must_use]
    pub const fn new(effects: [FlagEffect; 8]) -> Self {
        let mut packed = Self::UNAFFECTED;
        let mut i = 0;
        while i < 8 {
            let bit = ALL[i];
            match effects[i] {
                FlagEffect::Unaffected => {}
                FlagEffect::Result => packed.result |= bit,
                FlagEffect::Special => packed.special |= bit,
                FlagEffect::Set => packed.set |= bit,
                FlagEffect::Reset => packed.reset |= bit,
            }
            i += 1;
        }
        packed
    }

    /// Effect on a single flag bit (one of the `flags` constants).
    #[must_use]
    pub const fn effect(self, bit: u8) -> FlagEffect {
        if self.set & bit != 0 {
            FlagEffect::Set
        } else if self.reset & bit != 0 {
            FlagEffect::Reset
        } else if self.special & bit != 0 {
            FlagEffect::Special
        } else if self.result & bit != 0 {
            FlagEffect::Result
        } else {
            FlagEffect::Unaffected
        }
    }

    /// Per-bit effects in `S Z Y H X P/V N C` order; the inverse of [`new`](Self::new).
    #[must_use]
    pub const fn row(self) -> [FlagEffect; 8] {
        let mut row = [FlagEffect::Unaffected; 8];
        let mut i = 0;
        while i < 8 {
            row[i] = self.effect(ALL[i]);
            i += 1;
        }
        row
    }

    /// Bits taken from the executor's computed flags.
    #[must_use]
    pub const fn computed(self) -> u8 {
        self.result | self.special
    }

    /// Bits this instruction may change.
    #[must_use]
    pub const fn affected(self) -> u8 {
        self.computed() | self.set | self.reset
    }

    /// Merge computed flags into the previous F value.
    #[must_use]
    pub const fn apply(self, old: u8, computed: u8) -> u8 {
        (old & !self.affected()) | (computed & self.computed()) | self.set
    }
}

impl fmt::Display for FlagEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.row()
            .iter()
            .try_for_each(|effect| write!(f, "{}", effect.symbol()))
    }
}

/// Groups of instructions that share one flag behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Loads, jumps, stack, exchanges and control: F untouched.
    None,
    /// LD A,I and LD A,R: P/V copies IFF2.
    LoadIr,
    Inc8,
    Dec8,
    /// ADD and ADC on 8-bit operands.
    Add8,
    /// SUB, SBC and NEG.
    Sub8,
    /// CP: like SUB but X/Y come from the operand.
    Compare,
    And,
    /// OR and XOR.
    OrXor,
    /// ADD HL/IX/IY,rr.
    Add16,
    Adc16,
    Sbc16,
    /// RLCA, RRCA, RLA, RRA.
    RotateA,
    /// CB-prefixed rotates and shifts.
    Shift,
    Bit,
    /// RLD and RRD.
    RotateDigit,
    /// LDI, LDD and their repeats.
    BlockTransfer,
    /// CPI, CPD and their repeats.
    BlockCompare,
    /// INI, IND, OUTI, OUTD and their repeats.
    BlockIo,
    /// IN r,(C).
    InputC,
    Daa,
    Cpl,
    Scf,
    Ccf,
}

impl Family {
    pub const ALL: [Self; 24] = [
        Self::None,
        Self::LoadIr,
        Self::Inc8,
        Self::Dec8,
        Self::Add8,
        Self::Sub8,
        Self::Compare,
        Self::And,
        Self::OrXor,
        Self::Add16,
        Self::Adc16,
        Self::Sbc16,
        Self::RotateA,
        Self::Shift,
        Self::Bit,
        Self::RotateDigit,
        Self::BlockTransfer,
        Self::BlockCompare,
        Self::BlockIo,
        Self::InputC,
        Self::Daa,
        Self::Cpl,
        Self::Scf,
        Self::Ccf,
    ];

    /// The flag effect row for this family.
    #[must_use]
    pub const fn effects(self) -> FlagEffects {
        use FlagEffect::{Reset as O, Result as R, Set as I, Special as X, Unaffected as U};

        // S  Z  Y  H  X  PV N  C
        let row = match self {
            Self::None => [U, U, U, U, U, U, U, U],
            Self::LoadIr => [R, R, R, O, R, X, O, U],
            Self::Inc8 => [R, R, R, R, R, R, O, U],
            Self::Dec8 => [R, R, R, R, R, R, I, U],
            Self::Add8 => [R, R, R, R, R, R, O, R],
            Self::Sub8 => [R, R, R, R, R, R, I, R],
            Self::Compare => [R, R, X, R, X, R, I, R],
            Self::And => [R, R, R, I, R, R, O, O],
            Self::OrXor => [R, R, R, O, R, R, O, O],
            Self::Add16 => [U, U, R, R, R, U, O, R],
            Self::Adc16 => [R, R, R, R, R, R, O, R],
            Self::Sbc16 => [R, R, R, R, R, R, I, R],
            Self::RotateA => [U, U, R, O, R, U, O, R],
            Self::Shift => [R, R, R, O, R, R, O, R],
            Self::Bit => [X, R, X, I, X, X, O, U],
            Self::RotateDigit => [R, R, R, O, R, R, O, U],
            Self::BlockTransfer => [U, U, X, O, X, X, O, U],
            Self::BlockCompare => [R, R, X, R, X, X, I, U],
            Self::BlockIo => [R, R, R, X, R, X, X, X],
            Self::InputC => [R, R, R, O, R, R, O, U],
            Self::Daa => [R, R, R, X, R, R, U, X],
            Self::Cpl => [U, U, R, I, R, U, I, U],
            Self::Scf => [U, U, X, O, X, U, O, I],
            Self::Ccf => [U, U, X, X, X, U, O, X],
        };
        FlagEffects::new(row)
    }
}

const _: () = {
    assert!(Family::None.effects().affected() == 0);
    assert!(Family::Add8.effects().affected() == SF | ZF | YF | HF | XF | PF | NF | CF);
};
