//! Byte templates and cycle costs.

use std::fmt;

use emu_core::Bus;

/// Longest instruction: prefix, CB, displacement, opcode.
pub const MAX_LENGTH: usize = 4;

/// One byte position in an instruction's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Must equal this byte.
    Byte(u8),
    /// Any value, ignored (undefined ED opcodes).
    Any,
    /// Signed offset: the `d` of (IX+d) or the `e` of JR/DJNZ.
    Displacement,
    /// Immediate byte `n`.
    Immediate,
    /// Low byte of immediate word `nn`.
    ImmediateLo,
    /// High byte of immediate word `nn`.
    ImmediateHi,
}

impl Slot {
    const fn accepts(self, byte: u8) -> bool {
        match self {
            Self::Byte(expected) => expected == byte,
            _ => true,
        }
    }
}

/// Operand values pulled out of an instruction's bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operands {
    pub displacement: i8,
    pub immediate: u8,
    pub word: u16,
}

/// Encoding of an instruction: fixed bytes interleaved with operand slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Template {
    slots: [Slot; MAX_LENGTH],
    len: u8,
}

impl Template {
    /// # Panics
    ///
    /// Panics if `slots` is empty or longer than [`MAX_LENGTH`].
    #[must_use]
    pub const fn new(slots: &[Slot]) -> Self {
        assert!(!slots.is_empty() && slots.len() <= MAX_LENGTH);
        let mut out = [Slot::Any; MAX_LENGTH];
        let mut i = 0;
        while i < slots.len() {
            out[i] = slots[i];
            i += 1;
        }
        Self {
            slots: out,
            len: slots.len() as u8,
        }
    }

    /// Encoded length in bytes.
    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots[..usize::from(self.len)]
    }

    /// Leading fixed bytes, up to the first operand slot.
    pub fn fixed_prefix(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots().iter().map_while(|slot| match slot {
            Slot::Byte(b) => Some(*b),
            _ => None,
        })
    }

    /// Do these bytes fit the template? Extra trailing bytes are ignored.
    #[must_use]
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.slots().len()
            && self
                .slots()
                .iter()
                .zip(bytes)
                .all(|(slot, &byte)| slot.accepts(byte))
    }

    /// Does the byte sequence at `address` fit the template?
    pub fn matches<B: Bus + ?Sized>(&self, bus: &B, address: u16) -> bool {
        self.slots()
            .iter()
            .zip(0u16..)
            .all(|(slot, offset)| slot.accepts(bus.peek(address.wrapping_add(offset))))
    }

    /// Read operand values from memory at `address`.
    pub fn operands<B: Bus + ?Sized>(&self, bus: &B, address: u16) -> Operands {
        let mut operands = Operands::default();
        let mut lo = 0;
        let mut hi = 0;
        for (slot, offset) in self.slots().iter().zip(0u16..) {
            let byte = bus.peek(address.wrapping_add(offset));
            match slot {
                Slot::Displacement => operands.displacement = byte as i8,
                Slot::Immediate => operands.immediate = byte,
                Slot::ImmediateLo => lo = byte,
                Slot::ImmediateHi => hi = byte,
                Slot::Byte(_) | Slot::Any => {}
            }
        }
        operands.word = u16::from_le_bytes([lo, hi]);
        operands
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match slot {
                Slot::Byte(b) => write!(f, "{b:02X}")?,
                Slot::Any => f.write_str("??")?,
                Slot::Displacement => f.write_str("d")?,
                Slot::Immediate => f.write_str("n")?,
                Slot::ImmediateLo => f.write_str("nn")?,
                Slot::ImmediateHi => f.write_str("nn")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({self})")
    }
}

/// T-state cost of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cycles {
    Fixed(u8),
    /// Conditional jumps, calls, returns and repeating block instructions.
    Branch { taken: u8, not_taken: u8 },
}

impl Cycles {
    /// Cost when the branch is taken (or the fixed cost).
    #[must_use]
    pub const fn base(self) -> u32 {
        match self {
            Self::Fixed(t) | Self::Branch { taken: t, .. } => t as u32,
        }
    }

    /// Cost actually spent, given whether the branch was taken.
    #[must_use]
    pub const fn realized(self, taken: bool) -> u32 {
        match self {
            Self::Fixed(t) => t as u32,
            Self::Branch { taken: t, .. } if taken => t as u32,
            Self::Branch { not_taken, .. } => not_taken as u32,
        }
    }
}

impl fmt::Display for Cycles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(t) => write!(f, "{t}"),
            Self::Branch { taken, not_taken } => write!(f, "{taken}/{not_taken}"),
        }
    }
}
