//! The instruction catalog.
//!
//! Every Z80 instruction, documented and undocumented, is one immutable
//! [`Instruction`] entry. The catalog owns those entries plus the decode
//! tables that map opcode bytes to entry identifiers. It is built once per
//! process (see [`Catalog::shared`]) and checked for completeness before
//! first use.

mod build;
mod operation;
mod template;

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use emu_core::Bus;
use thiserror::Error;
use tracing::debug;

use crate::effects::{Family, FlagEffects};
use crate::registers::Index;

pub use operation::{BlockOp, Operand8, Operand16, Operation, Pointer};
pub use template::{Cycles, MAX_LENGTH, Operands, Slot, Template};

/// Stable identity of a catalog entry.
///
/// Identifiers describe where an instruction lives in the opcode space, so
/// they stay the same however the catalog orders its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstructionId {
    /// Unprefixed opcode.
    Base(u8),
    /// CB-prefixed opcode.
    Cb(u8),
    /// Defined ED-prefixed opcode.
    Ed(u8),
    /// Any ED opcode with no defined meaning.
    EdUndefined,
    /// DD- or FD-prefixed opcode.
    Indexed(Index, u8),
    /// DDCB or FDCB opcode (the byte after the displacement).
    IndexedBit(Index, u8),
    /// DD or FD immediately followed by another DD or FD.
    IgnoredPrefix(Index),
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(op) => write!(f, "{op:02X}"),
            Self::Cb(op) => write!(f, "CB {op:02X}"),
            Self::Ed(op) => write!(f, "ED {op:02X}"),
            Self::EdUndefined => f.write_str("ED ??"),
            Self::Indexed(index, op) => write!(f, "{:02X} {op:02X}", index.prefix()),
            Self::IndexedBit(index, op) => write!(f, "{:02X} CB d {op:02X}", index.prefix()),
            Self::IgnoredPrefix(index) => write!(f, "{:02X}", index.prefix()),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct Instruction {
    id: InstructionId,
    mnemonic: String,
    template: Template,
    cycles: Cycles,
    family: Family,
    flags: FlagEffects,
    operation: Operation,
}

impl Instruction {
    #[must_use]
    pub fn id(&self) -> InstructionId {
        self.id
    }

    /// Canonical mnemonic with placeholders: `n`, `nn`, `d` and `e`.
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn cycles(&self) -> Cycles {
        self.cycles
    }

    #[must_use]
    pub fn family(&self) -> Family {
        self.family
    }

    #[must_use]
    pub fn flag_effects(&self) -> FlagEffects {
        self.flags
    }

    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from(self.template.len())
    }

    /// Opcode fetch (M1) cycles, each of which bumps the refresh register.
    #[must_use]
    pub fn fetches(&self) -> u8 {
        match self.id {
            InstructionId::Base(_) | InstructionId::IgnoredPrefix(_) => 1,
            _ => 2,
        }
    }

    /// Mnemonic with operand placeholders replaced by the bytes at `address`.
    ///
    /// Relative jumps show their absolute target.
    pub fn disassemble<B: Bus + ?Sized>(&self, bus: &B, address: u16) -> String {
        let operands = self.template.operands(bus, address);
        let d = operands.displacement;
        let offset = if d < 0 {
            format!("-${:02X}", d.unsigned_abs())
        } else {
            format!("+${d:02X}")
        };
        let target = address
            .wrapping_add(self.length())
            .wrapping_add_signed(i16::from(d));
        self.mnemonic
            .replace("+d", &offset)
            .replace("nn", &format!("${:04X}", operands.word))
            .replace('n', &format!("${:02X}", operands.immediate))
            .replace('e', &format!("${target:04X}"))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic)
    }
}

/// Problems found while building or checking the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("two entries share identifier {0}")]
    DuplicateEntry(InstructionId),

    #[error("{table} opcode {opcode:#04X} is claimed by both {first} and {second}")]
    DuplicateOpcode {
        table: &'static str,
        opcode: u8,
        first: InstructionId,
        second: InstructionId,
    },

    #[error("{table} opcode {opcode:#04X} has no instruction")]
    TableGap { table: &'static str, opcode: u8 },

    #[error("decode table refers to {0}, which is not in the catalog")]
    MissingEntry(InstructionId),

    #[error("template of {0} does not fit any decode table")]
    UnplacedTemplate(InstructionId),

    #[error("no template matches {prefix:02X} CB d {opcode:02X}")]
    UnmatchedTemplate { prefix: u8, opcode: u8 },

    #[error("{count} templates match {prefix:02X} CB d {opcode:02X}")]
    AmbiguousTemplate { prefix: u8, opcode: u8, count: usize },
}

/// First-byte dispatch: an instruction, or a prefix that selects a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BaseSlot {
    Instruction(InstructionId),
    Cb,
    Ed,
    Index(Index),
}

const PREFIXES: [u8; 4] = [0xCB, 0xDD, 0xED, 0xFD];

/// Displacements tried when checking that DDCB templates are unambiguous.
const PROBE_DISPLACEMENTS: [u8; 4] = [0x00, 0x01, 0x7F, 0x80];

/// The instruction set plus its decode tables.
pub struct Catalog {
    entries: Vec<Instruction>,
    by_id: HashMap<InstructionId, usize>,
    pub(crate) base: [BaseSlot; 256],
    pub(crate) cb: [InstructionId; 256],
    pub(crate) ed: [InstructionId; 256],
    /// DD and FD pages; `None` means the prefix is absorbed.
    pub(crate) indexed: [[Option<InstructionId>; 256]; 2],
    /// DDCB and FDCB candidates, searched by template.
    pub(crate) indexed_bit: [Box<[(Template, InstructionId)]>; 2],
}

impl Catalog {
    /// The process-wide catalog, built and checked on first use.
    ///
    /// # Panics
    ///
    /// Panics if the built-in instruction set fails its self-check, which
    /// means the crate itself is broken.
    #[must_use]
    pub fn shared() -> &'static Self {
        static SHARED: LazyLock<Catalog> = LazyLock::new(|| match Catalog::build() {
            Ok(catalog) => catalog,
            Err(err) => panic!("instruction catalog failed self-check: {err}"),
        });
        &SHARED
    }

    /// Build a fresh catalog from the built-in instruction set.
    pub fn build() -> Result<Self, CatalogError> {
        let catalog = Self::from_entries(build::entries())?;
        catalog.verify()?;
        debug!(entries = catalog.entries.len(), "instruction catalog built");
        for family in Family::ALL {
            debug!(?family, entries = catalog.family(family).count(), "family");
        }
        Ok(catalog)
    }

    /// Index entries and place each one in the decode table its template's
    /// fixed bytes select.
    pub(crate) fn from_entries(entries: Vec<Instruction>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id, position).is_some() {
                return Err(CatalogError::DuplicateEntry(entry.id));
            }
        }

        let mut base: [Option<InstructionId>; 256] = [None; 256];
        let mut cb: [Option<InstructionId>; 256] = [None; 256];
        let mut ed: [Option<InstructionId>; 256] = [None; 256];
        let mut ed_fallback = None;
        let mut indexed = [[None; 256]; 2];
        let mut indexed_bit: [Vec<(Template, InstructionId)>; 2] = [Vec::new(), Vec::new()];

        for entry in &entries {
            let fixed: Vec<u8> = entry.template.fixed_prefix().collect();
            let id = entry.id;
            match fixed.as_slice() {
                [0xCB, op] => place(&mut cb, "CB", *op, id)?,
                [0xED] => ed_fallback = Some(id),
                [0xED, op, ..] => place(&mut ed, "ED", *op, id)?,
                [prefix @ (0xDD | 0xFD)] => {
                    let table = &mut indexed[page(*prefix)];
                    place(table, "DD/FD", 0xDD, id)?;
                    place(table, "DD/FD", 0xFD, id)?;
                }
                [prefix @ (0xDD | 0xFD), 0xCB, ..] => {
                    indexed_bit[page(*prefix)].push((entry.template, id));
                }
                [prefix @ (0xDD | 0xFD), op, ..] => {
                    place(&mut indexed[page(*prefix)], "DD/FD", *op, id)?;
                }
                [op, ..] if !PREFIXES.contains(op) => place(&mut base, "base", *op, id)?,
                _ => return Err(CatalogError::UnplacedTemplate(id)),
            }
        }

        if let Some(fallback) = ed_fallback {
            for slot in &mut ed {
                slot.get_or_insert(fallback);
            }
        }

        let mut base_slots = [BaseSlot::Cb; 256];
        for (op, slot) in (0..=255u8).zip(&mut base_slots) {
            *slot = match op {
                0xCB => BaseSlot::Cb,
                0xED => BaseSlot::Ed,
                0xDD => BaseSlot::Index(Index::Ix),
                0xFD => BaseSlot::Index(Index::Iy),
                _ => BaseSlot::Instruction(total(&base, "base", op)?),
            };
        }

        let mut cb_ids = [InstructionId::Cb(0); 256];
        let mut ed_ids = [InstructionId::EdUndefined; 256];
        for op in 0..=255u8 {
            cb_ids[usize::from(op)] = total(&cb, "CB", op)?;
            ed_ids[usize::from(op)] = total(&ed, "ED", op)?;
        }

        let [ix_bits, iy_bits] = indexed_bit;
        Ok(Self {
            entries,
            by_id,
            base: base_slots,
            cb: cb_ids,
            ed: ed_ids,
            indexed,
            indexed_bit: [ix_bits.into_boxed_slice(), iy_bits.into_boxed_slice()],
        })
    }

    /// Self-check: every table reference resolves, and every DDCB/FDCB
    /// opcode is matched by exactly one template.
    pub fn verify(&self) -> Result<(), CatalogError> {
        let referenced = self
            .base
            .iter()
            .filter_map(|slot| match slot {
                BaseSlot::Instruction(id) => Some(*id),
                _ => None,
            })
            .chain(self.cb.iter().copied())
            .chain(self.ed.iter().copied())
            .chain(self.indexed.iter().flatten().filter_map(|id| *id))
            .chain(self.indexed_bit.iter().flat_map(|page| page.iter().map(|(_, id)| *id)));
        for id in referenced {
            if !self.by_id.contains_key(&id) {
                return Err(CatalogError::MissingEntry(id));
            }
        }

        for index in Index::ALL {
            let prefix = index.prefix();
            for opcode in 0..=255u8 {
                for d in PROBE_DISPLACEMENTS {
                    let bytes = [prefix, 0xCB, d, opcode];
                    let count = self.indexed_bit[page(prefix)]
                        .iter()
                        .filter(|(template, _)| template.matches_bytes(&bytes))
                        .count();
                    match count {
                        1 => {}
                        0 => return Err(CatalogError::UnmatchedTemplate { prefix, opcode }),
                        count => {
                            return Err(CatalogError::AmbiguousTemplate {
                                prefix,
                                opcode,
                                count,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up an entry by identifier.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.by_id.get(&id).map(|&position| &self.entries[position])
    }

    /// All entries in build order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter()
    }

    /// Entries sharing one flag behavior.
    pub fn family(&self, family: Family) -> impl Iterator<Item = &Instruction> {
        self.entries.iter().filter(move |entry| entry.family == family)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an identifier taken from one of this catalog's own tables.
    pub(crate) fn entry(&self, id: InstructionId) -> &Instruction {
        // Table identifiers were all resolved by verify().
        &self.entries[self.by_id[&id]]
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

fn page(prefix: u8) -> usize {
    usize::from(prefix == 0xFD)
}

fn place(
    table: &mut [Option<InstructionId>; 256],
    name: &'static str,
    opcode: u8,
    id: InstructionId,
) -> Result<(), CatalogError> {
    let slot = &mut table[usize::from(opcode)];
    match slot {
        Some(first) => Err(CatalogError::DuplicateOpcode {
            table: name,
            opcode,
            first: *first,
            second: id,
        }),
        None => {
            *slot = Some(id);
            Ok(())
        }
    }
}

fn total(
    table: &[Option<InstructionId>; 256],
    name: &'static str,
    opcode: u8,
) -> Result<InstructionId, CatalogError> {
    table[usize::from(opcode)].ok_or(CatalogError::TableGap {
        table: name,
        opcode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without(id: InstructionId) -> Vec<Instruction> {
        build::entries().into_iter().filter(|e| e.id != id).collect()
    }

    #[test]
    fn built_in_set_passes_self_check() {
        let catalog = Catalog::build().expect("catalog builds");
        // 252 base, 256 CB, 78 ED plus the shared undefined entry, and for
        // each of DD and FD: 85 opcodes, the ignored prefix and 256 DDCB forms.
        assert_eq!(catalog.len(), 252 + 256 + 78 + 1 + 2 * (85 + 1 + 256));
    }

    #[test]
    fn identifiers_are_unique() {
        let catalog = Catalog::shared();
        let mut ids: Vec<_> = catalog.iter().map(Instruction::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn missing_base_opcode_is_a_gap() {
        let err = Catalog::from_entries(without(InstructionId::Base(0x00))).unwrap_err();
        assert_eq!(
            err,
            CatalogError::TableGap {
                table: "base",
                opcode: 0x00
            }
        );
    }

    #[test]
    fn missing_cb_opcode_is_a_gap() {
        let err = Catalog::from_entries(without(InstructionId::Cb(0x46))).unwrap_err();
        assert_eq!(
            err,
            CatalogError::TableGap {
                table: "CB",
                opcode: 0x46
            }
        );
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut entries = build::entries();
        let copy = entries[0].clone();
        entries.push(copy);
        assert_eq!(
            Catalog::from_entries(entries).unwrap_err(),
            CatalogError::DuplicateEntry(InstructionId::Base(0x00))
        );
    }

    #[test]
    fn missing_ddcb_template_is_unmatched() {
        let catalog =
            Catalog::from_entries(without(InstructionId::IndexedBit(Index::Iy, 0x46)))
                .expect("tables still build");
        assert_eq!(
            catalog.verify(),
            Err(CatalogError::UnmatchedTemplate {
                prefix: 0xFD,
                opcode: 0x46
            })
        );
    }

    #[test]
    fn undefined_ed_opcodes_share_one_entry() {
        let catalog = Catalog::shared();
        assert_eq!(catalog.ed[0x00], InstructionId::EdUndefined);
        assert_eq!(catalog.ed[0x77], InstructionId::EdUndefined);
        assert_eq!(catalog.ed[0xFF], InstructionId::EdUndefined);
        assert_eq!(catalog.ed[0xB0], InstructionId::Ed(0xB0));
    }

    #[test]
    fn lookup_by_id() {
        let catalog = Catalog::shared();
        let ld = catalog
            .get(InstructionId::Indexed(Index::Ix, 0x21))
            .expect("LD IX,nn is catalogued");
        assert_eq!(ld.mnemonic(), "LD IX,nn");
        assert_eq!(ld.cycles(), Cycles::Fixed(14));
        assert_eq!(ld.length(), 4);
        assert!(catalog.get(InstructionId::Indexed(Index::Ix, 0x00)).is_none());
    }

    #[test]
    fn flag_effects_follow_family() {
        let catalog = Catalog::shared();
        for entry in catalog.iter() {
            assert_eq!(entry.flag_effects(), entry.family().effects(), "{}", entry.id());
        }
    }

    #[test]
    fn iterate_by_family() {
        let catalog = Catalog::shared();
        let compares: Vec<_> = catalog
            .family(Family::BlockCompare)
            .map(Instruction::mnemonic)
            .collect();
        assert_eq!(compares, ["CPI", "CPD", "CPIR", "CPDR"]);
        let total: usize = Family::ALL.iter().map(|&f| catalog.family(f).count()).sum();
        assert_eq!(total, catalog.len());
    }

    struct Bytes(Vec<u8>);

    impl Bus for Bytes {
        fn peek(&self, address: u16) -> u8 {
            self.0.get(usize::from(address)).copied().unwrap_or(0)
        }

        fn write(&mut self, _address: u16, _value: u8) {}
    }

    #[test]
    fn disassembly_substitutes_operands() {
        let catalog = Catalog::shared();
        let show = |id, bytes: &[u8]| {
            catalog
                .get(id)
                .expect("entry exists")
                .disassemble(&Bytes(bytes.to_vec()), 0)
        };
        assert_eq!(show(InstructionId::Base(0x01), &[0x01, 0x34, 0x12]), "LD BC,$1234");
        assert_eq!(show(InstructionId::Base(0x3E), &[0x3E, 0x7F]), "LD A,$7F");
        assert_eq!(show(InstructionId::Base(0x18), &[0x18, 0xFE]), "JR $0000");
        assert_eq!(
            show(
                InstructionId::Indexed(Index::Iy, 0x36),
                &[0xFD, 0x36, 0xFB, 0x09]
            ),
            "LD (IY-$05),$09"
        );
        assert_eq!(
            show(
                InstructionId::IndexedBit(Index::Ix, 0x46),
                &[0xDD, 0xCB, 0x06, 0x46]
            ),
            "BIT 0,(IX+$06)"
        );
    }
}
