//! Prefix-aware instruction decoding.
//!
//! Four of the six decode levels are direct table lookups: unprefixed, CB,
//! ED, and DD/FD. DDCB and FDCB put a displacement byte before the opcode,
//! so they are resolved by matching the byte templates of a precomputed
//! candidate list instead.
//!
//! A DD or FD prefix with no defined continuation is absorbed: it costs
//! one opcode fetch and the following byte is decoded as if unprefixed.

use emu_core::Bus;
use tracing::trace;

use crate::catalog::{BaseSlot, Catalog, Instruction};
use crate::registers::Index;

/// Result of decoding at one address.
#[derive(Debug, Clone, Copy)]
pub struct Decoded<'c> {
    pub instruction: &'c Instruction,
    /// Address of the instruction's first template byte.
    pub address: u16,
    /// Absorbed DD/FD bytes in front of `address`.
    pub skipped: u8,
}

impl Decoded<'_> {
    /// Where decoding started, including absorbed prefixes.
    #[must_use]
    pub fn start(&self) -> u16 {
        self.address.wrapping_sub(u16::from(self.skipped))
    }

    /// Total bytes consumed, including absorbed prefixes.
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from(self.skipped) + self.instruction.length()
    }

    /// Opcode fetches, each of which bumps R.
    #[must_use]
    pub fn fetches(&self) -> u8 {
        self.skipped + self.instruction.fetches()
    }

    /// T-states spent on absorbed prefixes.
    #[must_use]
    pub fn prefix_cycles(&self) -> u32 {
        4 * u32::from(self.skipped)
    }
}

impl Catalog {
    /// Decode the instruction starting at `address`.
    ///
    /// Decoding only peeks at memory, so it has no side effects and always
    /// yields an instruction: every byte sequence means something to a Z80.
    pub fn decode<B: Bus + ?Sized>(&self, bus: &B, address: u16) -> Decoded<'_> {
        let opcode = bus.peek(address);
        let next = bus.peek(address.wrapping_add(1));
        let id = match self.base[usize::from(opcode)] {
            BaseSlot::Instruction(id) => id,
            BaseSlot::Cb => self.cb[usize::from(next)],
            BaseSlot::Ed => self.ed[usize::from(next)],
            BaseSlot::Index(index) => return self.decode_indexed(bus, address, index, next),
        };
        Decoded {
            instruction: self.entry(id),
            address,
            skipped: 0,
        }
    }

    fn decode_indexed<B: Bus + ?Sized>(
        &self,
        bus: &B,
        address: u16,
        index: Index,
        next: u8,
    ) -> Decoded<'_> {
        let page = match index {
            Index::Ix => 0,
            Index::Iy => 1,
        };
        let found = if next == 0xCB {
            self.indexed_bit[page]
                .iter()
                .find(|(template, _)| template.matches(bus, address))
                .map(|&(_, id)| id)
        } else {
            self.indexed[page][usize::from(next)]
        };

        if let Some(id) = found {
            return Decoded {
                instruction: self.entry(id),
                address,
                skipped: 0,
            };
        }

        // The following byte is never DD, FD or CB here, so this recursion
        // is at most one level deep.
        trace!(address, prefix = index.prefix(), "prefix absorbed");
        let inner = self.decode(bus, address.wrapping_add(1));
        Decoded {
            skipped: inner.skipped + 1,
            ..inner
        }
    }
}
