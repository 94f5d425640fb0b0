//! The built-in Z80 instruction set.
//!
//! Opcodes are enumerated by their bit fields rather than listed one by
//! one: for an opcode `xx yyy zzz`, `x` picks the quadrant, `y` and `z`
//! pick registers, conditions or operations, and `y` splits further into
//! `p` (bits 4-5) and `q` (bit 3). DD and FD pages reuse the unprefixed
//! decoding with HL swapped for IX/IY.

use super::{
    BlockOp, Cycles, Instruction, InstructionId, Operand8, Operand16, Operation, Pointer, Slot,
    Template,
};
use crate::alu::{AluOp, ShiftOp};
use crate::effects::{Family, FlagEffects};
use crate::registers::{Condition, Index, Reg8, Reg16};

const NONE: &[Slot] = &[];
const N: &[Slot] = &[Slot::Immediate];
const NN: &[Slot] = &[Slot::ImmediateLo, Slot::ImmediateHi];
const D: &[Slot] = &[Slot::Displacement];
const D_N: &[Slot] = &[Slot::Displacement, Slot::Immediate];

/// An instruction before its flag effects are attached.
struct Def {
    mnemonic: String,
    operands: &'static [Slot],
    cycles: Cycles,
    family: Family,
    operation: Operation,
}

impl Def {
    fn new(
        mnemonic: impl Into<String>,
        operands: &'static [Slot],
        cycles: Cycles,
        family: Family,
        operation: Operation,
    ) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            operands,
            cycles,
            family,
            operation,
        }
    }

    /// An instruction that leaves F alone.
    fn plain(
        mnemonic: impl Into<String>,
        operands: &'static [Slot],
        cycles: Cycles,
        operation: Operation,
    ) -> Self {
        Self::new(mnemonic, operands, cycles, Family::None, operation)
    }
}

const fn t(states: u8) -> Cycles {
    Cycles::Fixed(states)
}

const fn branch(taken: u8, not_taken: u8) -> Cycles {
    Cycles::Branch { taken, not_taken }
}

/// Enumerate every instruction, then attach flag effects by family.
pub(super) fn entries() -> Vec<Instruction> {
    let mut entries = Vec::with_capacity(1600);

    for op in 0..=255u8 {
        if matches!(op, 0xCB | 0xDD | 0xED | 0xFD) {
            continue;
        }
        if let Some(def) = main_page(op, None) {
            push(&mut entries, InstructionId::Base(op), &[op], def);
        }
    }

    for op in 0..=255u8 {
        push(&mut entries, InstructionId::Cb(op), &[0xCB, op], cb_page(op));
    }

    for op in 0..=255u8 {
        if let Some(def) = ed_page(op) {
            push(&mut entries, InstructionId::Ed(op), &[0xED, op], def);
        }
    }
    insert(
        &mut entries,
        InstructionId::EdUndefined,
        vec![Slot::Byte(0xED), Slot::Any],
        Def::plain("NOP", NONE, t(8), Operation::Nop),
    );

    for index in Index::ALL {
        let prefix = index.prefix();
        for op in 0..=255u8 {
            if matches!(op, 0xCB | 0xDD | 0xFD) {
                continue;
            }
            if let Some(def) = main_page(op, Some(index)) {
                push(&mut entries, InstructionId::Indexed(index, op), &[prefix, op], def);
            }
        }
        push(
            &mut entries,
            InstructionId::IgnoredPrefix(index),
            &[prefix],
            Def::plain("NONI", NONE, t(4), Operation::IgnoredPrefix),
        );
        for op in 0..=255u8 {
            insert(
                &mut entries,
                InstructionId::IndexedBit(index, op),
                vec![
                    Slot::Byte(prefix),
                    Slot::Byte(0xCB),
                    Slot::Displacement,
                    Slot::Byte(op),
                ],
                indexed_bit_page(index, op),
            );
        }
    }

    attach_flag_effects(&mut entries);
    entries
}

fn push(entries: &mut Vec<Instruction>, id: InstructionId, fixed: &[u8], def: Def) {
    let slots = fixed
        .iter()
        .copied()
        .map(Slot::Byte)
        .chain(def.operands.iter().copied())
        .collect();
    insert(entries, id, slots, def);
}

fn insert(entries: &mut Vec<Instruction>, id: InstructionId, slots: Vec<Slot>, def: Def) {
    entries.push(Instruction {
        id,
        mnemonic: def.mnemonic,
        template: Template::new(&slots),
        cycles: def.cycles,
        family: def.family,
        flags: FlagEffects::UNAFFECTED,
        operation: def.operation,
    });
}

/// Second pass: flag behavior depends only on the family.
fn attach_flag_effects(entries: &mut [Instruction]) {
    for entry in entries {
        entry.flags = entry.family.effects();
    }
}

/// Plain register for a 3-bit register field; `None` for the (HL) slot.
const fn reg8(code: u8) -> Option<Reg8> {
    match code & 7 {
        0 => Some(Reg8::B),
        1 => Some(Reg8::C),
        2 => Some(Reg8::D),
        3 => Some(Reg8::E),
        4 => Some(Reg8::H),
        5 => Some(Reg8::L),
        6 => None,
        _ => Some(Reg8::A),
    }
}

const fn alu_family(op: AluOp) -> Family {
    match op {
        AluOp::Add | AluOp::Adc => Family::Add8,
        AluOp::Sub | AluOp::Sbc => Family::Sub8,
        AluOp::And => Family::And,
        AluOp::Xor | AluOp::Or => Family::OrXor,
        AluOp::Cp => Family::Compare,
    }
}

/// Operand slots and T-states for an 8-bit operand: a register, (HL), or
/// (IX+d) with its displacement byte.
fn operand_cost(operand: Operand8, reg: u8, hl: u8, indexed: u8) -> (&'static [Slot], u8) {
    match operand {
        Operand8::Mem(Pointer::Indexed(_)) => (D, indexed),
        Operand8::Mem(_) => (NONE, hl),
        _ => (NONE, reg),
    }
}

/// Unprefixed opcodes, or their DD/FD forms when `index` is set.
///
/// Returns `None` for DD/FD opcodes that do not involve HL, H or L: the
/// prefix has no effect on those and the decoder absorbs it.
fn main_page(op: u8, index: Option<Index>) -> Option<Def> {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;
    let indexed = index.is_some();
    let hl = index.map_or(Reg16::Hl, Index::pair);
    // The prefix fetch adds four T-states to register forms.
    let extra = if indexed { 4 } else { 0 };
    let r = |code: u8| Operand8::from_code(code, index);
    let plain = |code: u8| Operand8::from_code(code, None);
    let rp = |p: u8| [Reg16::Bc, Reg16::De, hl, Reg16::Sp][usize::from(p)];
    let rp2 = |p: u8| [Reg16::Bc, Reg16::De, hl, Reg16::Af][usize::from(p)];
    let cc = |code: u8| Condition::ALL[usize::from(code)];

    let def = match (x, z) {
        (0, 0) => {
            if indexed {
                return None;
            }
            match y {
                0 => Def::plain("NOP", NONE, t(4), Operation::Nop),
                1 => Def::plain("EX AF,AF'", NONE, t(4), Operation::ExAf),
                2 => Def::plain("DJNZ e", D, branch(13, 8), Operation::Djnz),
                3 => Def::plain("JR e", D, t(12), Operation::Jr(None)),
                _ => {
                    let cond = cc(y - 4);
                    Def::plain(
                        format!("JR {},e", cond.name()),
                        D,
                        branch(12, 7),
                        Operation::Jr(Some(cond)),
                    )
                }
            }
        }
        (0, 1) if q == 0 => {
            if indexed && p != 2 {
                return None;
            }
            Def::plain(
                format!("LD {},nn", rp(p)),
                NN,
                t(10 + extra),
                Operation::Ld16 {
                    dst: Operand16::Reg(rp(p)),
                    src: Operand16::Imm,
                },
            )
        }
        (0, 1) => Def::new(
            format!("ADD {hl},{}", rp(p)),
            NONE,
            t(11 + extra),
            Family::Add16,
            Operation::Add16 {
                dst: hl,
                src: rp(p),
            },
        ),
        (0, 2) => {
            if indexed && p != 2 {
                return None;
            }
            let a = Operand8::Reg(Reg8::A);
            match (q, p) {
                (0, 0) => Def::plain(
                    "LD (BC),A",
                    NONE,
                    t(7),
                    Operation::Ld8 {
                        dst: Operand8::Mem(Pointer::Bc),
                        src: a,
                    },
                ),
                (0, 1) => Def::plain(
                    "LD (DE),A",
                    NONE,
                    t(7),
                    Operation::Ld8 {
                        dst: Operand8::Mem(Pointer::De),
                        src: a,
                    },
                ),
                (0, 2) => Def::plain(
                    format!("LD (nn),{hl}"),
                    NN,
                    t(16 + extra),
                    Operation::Ld16 {
                        dst: Operand16::Mem,
                        src: Operand16::Reg(hl),
                    },
                ),
                (0, _) => Def::plain(
                    "LD (nn),A",
                    NN,
                    t(13),
                    Operation::Ld8 {
                        dst: Operand8::Mem(Pointer::Absolute),
                        src: a,
                    },
                ),
                (_, 0) => Def::plain(
                    "LD A,(BC)",
                    NONE,
                    t(7),
                    Operation::Ld8 {
                        dst: a,
                        src: Operand8::Mem(Pointer::Bc),
                    },
                ),
                (_, 1) => Def::plain(
                    "LD A,(DE)",
                    NONE,
                    t(7),
                    Operation::Ld8 {
                        dst: a,
                        src: Operand8::Mem(Pointer::De),
                    },
                ),
                (_, 2) => Def::plain(
                    format!("LD {hl},(nn)"),
                    NN,
                    t(16 + extra),
                    Operation::Ld16 {
                        dst: Operand16::Reg(hl),
                        src: Operand16::Mem,
                    },
                ),
                _ => Def::plain(
                    "LD A,(nn)",
                    NN,
                    t(13),
                    Operation::Ld8 {
                        dst: a,
                        src: Operand8::Mem(Pointer::Absolute),
                    },
                ),
            }
        }
        (0, 3) => {
            if indexed && p != 2 {
                return None;
            }
            let (name, operation) = if q == 0 {
                ("INC", Operation::Inc16(rp(p)))
            } else {
                ("DEC", Operation::Dec16(rp(p)))
            };
            Def::plain(format!("{name} {}", rp(p)), NONE, t(6 + extra), operation)
        }
        (0, 4 | 5) => {
            if indexed && !matches!(y, 4..=6) {
                return None;
            }
            let target = r(y);
            let (name, family, operation) = if z == 4 {
                ("INC", Family::Inc8, Operation::Inc8(target))
            } else {
                ("DEC", Family::Dec8, Operation::Dec8(target))
            };
            let (operands, cycles) = operand_cost(target, 4 + extra, 11, 23);
            Def::new(
                format!("{name} {target}"),
                operands,
                t(cycles),
                family,
                operation,
            )
        }
        (0, 6) => {
            if indexed && !matches!(y, 4..=6) {
                return None;
            }
            let target = r(y);
            let (operands, cycles) = match target {
                Operand8::Mem(Pointer::Indexed(_)) => (D_N, 19),
                Operand8::Mem(_) => (N, 10),
                _ => (N, 7 + extra),
            };
            Def::plain(
                format!("LD {target},n"),
                operands,
                t(cycles),
                Operation::Ld8 {
                    dst: target,
                    src: Operand8::Imm,
                },
            )
        }
        (0, _) => {
            if indexed {
                return None;
            }
            match y {
                0..=3 => {
                    let shift = ShiftOp::ALL[usize::from(y)];
                    Def::new(
                        format!("{shift}A"),
                        NONE,
                        t(4),
                        Family::RotateA,
                        Operation::RotateA(shift),
                    )
                }
                4 => Def::new("DAA", NONE, t(4), Family::Daa, Operation::Daa),
                5 => Def::new("CPL", NONE, t(4), Family::Cpl, Operation::Cpl),
                6 => Def::new("SCF", NONE, t(4), Family::Scf, Operation::Scf),
                _ => Def::new("CCF", NONE, t(4), Family::Ccf, Operation::Ccf),
            }
        }
        (1, _) if op == 0x76 => {
            if indexed {
                return None;
            }
            Def::plain("HALT", NONE, t(4), Operation::Halt)
        }
        (1, _) => {
            let (dst, src, operands, cycles) = if !indexed {
                let (dst, src) = (r(y), r(z));
                let cycles = if dst.is_memory() || src.is_memory() { 7 } else { 4 };
                (dst, src, NONE, cycles)
            } else if y == 6 {
                // (IX+d) forms keep the real H and L.
                (r(6), plain(z), D, 19)
            } else if z == 6 {
                (plain(y), r(6), D, 19)
            } else if matches!(y, 4 | 5) || matches!(z, 4 | 5) {
                (r(y), r(z), NONE, 8)
            } else {
                return None;
            };
            Def::plain(
                format!("LD {dst},{src}"),
                operands,
                t(cycles),
                Operation::Ld8 { dst, src },
            )
        }
        (2, _) => {
            if indexed && !matches!(z, 4..=6) {
                return None;
            }
            let op = AluOp::ALL[usize::from(y)];
            let src = r(z);
            let (operands, cycles) = operand_cost(src, 4 + extra, 7, 19);
            Def::new(
                format!("{}{src}", op.prefix()),
                operands,
                t(cycles),
                alu_family(op),
                Operation::Alu { op, src },
            )
        }
        _ => {
            if indexed && !matches!(op, 0xE1 | 0xE3 | 0xE5 | 0xE9 | 0xF9) {
                return None;
            }
            match z {
                0 => Def::plain(
                    format!("RET {}", cc(y).name()),
                    NONE,
                    branch(11, 5),
                    Operation::Ret(Some(cc(y))),
                ),
                1 if q == 0 => Def::plain(
                    format!("POP {}", rp2(p)),
                    NONE,
                    t(10 + extra),
                    Operation::Pop(rp2(p)),
                ),
                1 => match p {
                    0 => Def::plain("RET", NONE, t(10), Operation::Ret(None)),
                    1 => Def::plain("EXX", NONE, t(4), Operation::Exx),
                    2 => Def::plain(
                        format!("JP ({hl})"),
                        NONE,
                        t(4 + extra),
                        Operation::JpReg(hl),
                    ),
                    _ => Def::plain(
                        format!("LD SP,{hl}"),
                        NONE,
                        t(6 + extra),
                        Operation::Ld16 {
                            dst: Operand16::Reg(Reg16::Sp),
                            src: Operand16::Reg(hl),
                        },
                    ),
                },
                2 => Def::plain(
                    format!("JP {},nn", cc(y).name()),
                    NN,
                    t(10),
                    Operation::Jp(Some(cc(y))),
                ),
                3 => match y {
                    0 => Def::plain("JP nn", NN, t(10), Operation::Jp(None)),
                    1 => return None,
                    2 => Def::plain("OUT (n),A", N, t(11), Operation::OutImm),
                    3 => Def::plain("IN A,(n)", N, t(11), Operation::InImm),
                    4 => Def::plain(
                        format!("EX (SP),{hl}"),
                        NONE,
                        t(19 + extra),
                        Operation::ExStack(hl),
                    ),
                    5 => Def::plain("EX DE,HL", NONE, t(4), Operation::ExDeHl),
                    6 => Def::plain("DI", NONE, t(4), Operation::Di),
                    _ => Def::plain("EI", NONE, t(4), Operation::Ei),
                },
                4 => Def::plain(
                    format!("CALL {},nn", cc(y).name()),
                    NN,
                    branch(17, 10),
                    Operation::Call(Some(cc(y))),
                ),
                5 if q == 0 => Def::plain(
                    format!("PUSH {}", rp2(p)),
                    NONE,
                    t(11 + extra),
                    Operation::Push(rp2(p)),
                ),
                5 if p == 0 => Def::plain("CALL nn", NN, t(17), Operation::Call(None)),
                5 => return None,
                6 => {
                    let op = AluOp::ALL[usize::from(y)];
                    Def::new(
                        format!("{}n", op.prefix()),
                        N,
                        t(7),
                        alu_family(op),
                        Operation::Alu {
                            op,
                            src: Operand8::Imm,
                        },
                    )
                }
                _ => Def::plain(
                    format!("RST {:02X}H", y * 8),
                    NONE,
                    t(11),
                    Operation::Rst(y * 8),
                ),
            }
        }
    };
    Some(def)
}

/// CB page: rotates, shifts and bit operations on a register or (HL).
fn cb_page(op: u8) -> Def {
    let y = (op >> 3) & 7;
    let target = Operand8::from_code(op, None);
    let memory = target.is_memory();
    let cycles = if memory { 15 } else { 8 };
    match op >> 6 {
        0 => {
            let shift = ShiftOp::ALL[usize::from(y)];
            Def::new(
                format!("{shift} {target}"),
                NONE,
                t(cycles),
                Family::Shift,
                Operation::Shift {
                    op: shift,
                    target,
                    copy: None,
                },
            )
        }
        1 => Def::new(
            format!("BIT {y},{target}"),
            NONE,
            t(if memory { 12 } else { 8 }),
            Family::Bit,
            Operation::Bit {
                bit: y,
                src: target,
            },
        ),
        2 => Def::plain(
            format!("RES {y},{target}"),
            NONE,
            t(cycles),
            Operation::Res {
                bit: y,
                target,
                copy: None,
            },
        ),
        _ => Def::plain(
            format!("SET {y},{target}"),
            NONE,
            t(cycles),
            Operation::Set {
                bit: y,
                target,
                copy: None,
            },
        ),
    }
}

/// ED page. `None` marks an opcode with no defined meaning.
fn ed_page(op: u8) -> Option<Def> {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;
    let rp = [Reg16::Bc, Reg16::De, Reg16::Hl, Reg16::Sp][usize::from(p)];

    let def = match (x, z) {
        (1, 0) => match reg8(y) {
            Some(r) => Def::new(
                format!("IN {r},(C)"),
                NONE,
                t(12),
                Family::InputC,
                Operation::InC(Some(r)),
            ),
            None => Def::new("IN (C)", NONE, t(12), Family::InputC, Operation::InC(None)),
        },
        (1, 1) => match reg8(y) {
            Some(r) => Def::plain(format!("OUT (C),{r}"), NONE, t(12), Operation::OutC(Some(r))),
            None => Def::plain("OUT (C),0", NONE, t(12), Operation::OutC(None)),
        },
        (1, 2) if q == 0 => Def::new(
            format!("SBC HL,{rp}"),
            NONE,
            t(15),
            Family::Sbc16,
            Operation::Sbc16(rp),
        ),
        (1, 2) => Def::new(
            format!("ADC HL,{rp}"),
            NONE,
            t(15),
            Family::Adc16,
            Operation::Adc16(rp),
        ),
        (1, 3) if q == 0 => Def::plain(
            format!("LD (nn),{rp}"),
            NN,
            t(20),
            Operation::Ld16 {
                dst: Operand16::Mem,
                src: Operand16::Reg(rp),
            },
        ),
        (1, 3) => Def::plain(
            format!("LD {rp},(nn)"),
            NN,
            t(20),
            Operation::Ld16 {
                dst: Operand16::Reg(rp),
                src: Operand16::Mem,
            },
        ),
        (1, 4) => Def::new("NEG", NONE, t(8), Family::Sub8, Operation::Neg),
        (1, 5) if y == 1 => Def::plain("RETI", NONE, t(14), Operation::Reti),
        (1, 5) => Def::plain("RETN", NONE, t(14), Operation::Retn),
        (1, 6) => {
            // Opcodes 4E and 6E select an undefined mode that behaves as 0.
            let mode = [0, 0, 1, 2][usize::from(y & 3)];
            Def::plain(format!("IM {mode}"), NONE, t(8), Operation::Im(mode))
        }
        (1, 7) => match y {
            0 => Def::plain(
                "LD I,A",
                NONE,
                t(9),
                Operation::Ld8 {
                    dst: Operand8::Reg(Reg8::I),
                    src: Operand8::Reg(Reg8::A),
                },
            ),
            1 => Def::plain(
                "LD R,A",
                NONE,
                t(9),
                Operation::Ld8 {
                    dst: Operand8::Reg(Reg8::R),
                    src: Operand8::Reg(Reg8::A),
                },
            ),
            2 => Def::new(
                "LD A,I",
                NONE,
                t(9),
                Family::LoadIr,
                Operation::LdAFromSpecial(Reg8::I),
            ),
            3 => Def::new(
                "LD A,R",
                NONE,
                t(9),
                Family::LoadIr,
                Operation::LdAFromSpecial(Reg8::R),
            ),
            4 => Def::new("RRD", NONE, t(18), Family::RotateDigit, Operation::Rrd),
            5 => Def::new("RLD", NONE, t(18), Family::RotateDigit, Operation::Rld),
            _ => return None,
        },
        (2, 0..=3) if y >= 4 => {
            let block = [
                BlockOp::Ldi,
                BlockOp::Cpi,
                BlockOp::Ini,
                BlockOp::Outi,
                BlockOp::Ldd,
                BlockOp::Cpd,
                BlockOp::Ind,
                BlockOp::Outd,
            ][usize::from((y & 1) * 4 + z)];
            let repeat = y >= 6;
            let family = match block {
                BlockOp::Ldi | BlockOp::Ldd => Family::BlockTransfer,
                BlockOp::Cpi | BlockOp::Cpd => Family::BlockCompare,
                _ => Family::BlockIo,
            };
            let cycles = if repeat { branch(21, 16) } else { t(16) };
            Def::new(
                block.mnemonic(repeat),
                NONE,
                cycles,
                family,
                Operation::Block { op: block, repeat },
            )
        }
        _ => return None,
    };
    Some(def)
}

/// DDCB/FDCB page: CB operations on (IX+d). Opcodes whose register field
/// is not 6 also copy the result into that register, except BIT, which
/// behaves identically for all eight.
fn indexed_bit_page(index: Index, op: u8) -> Def {
    let y = (op >> 3) & 7;
    let target = Operand8::Mem(Pointer::Indexed(index));
    let copy = reg8(op);
    let suffix = copy.map(|r| format!(",{r}")).unwrap_or_default();
    match op >> 6 {
        0 => {
            let shift = ShiftOp::ALL[usize::from(y)];
            Def::new(
                format!("{shift} {target}{suffix}"),
                NONE,
                t(23),
                Family::Shift,
                Operation::Shift {
                    op: shift,
                    target,
                    copy,
                },
            )
        }
        1 => Def::new(
            format!("BIT {y},{target}"),
            NONE,
            t(20),
            Family::Bit,
            Operation::Bit {
                bit: y,
                src: target,
            },
        ),
        2 => Def::plain(
            format!("RES {y},{target}{suffix}"),
            NONE,
            t(23),
            Operation::Res {
                bit: y,
                target,
                copy,
            },
        ),
        _ => Def::plain(
            format!("SET {y},{target}{suffix}"),
            NONE,
            t(23),
            Operation::Set {
                bit: y,
                target,
                copy,
            },
        ),
    }
}
