//! Table-driven Z80 CPU core.
//!
//! The instruction set lives in a [`Catalog`] of immutable entries, each
//! carrying its byte template, cycle cost, flag effects and semantics. The
//! decoder walks the CB/ED/DD/FD prefix tree to find an entry, and [`Z80`]
//! executes one entry per `step()`.

mod alu;
mod catalog;
mod cpu;
mod decoder;
mod effects;
mod execute;
mod flags;
mod registers;

pub use alu::{AluOp, AluResult, ShiftOp};
pub use catalog::{
    BlockOp, Catalog, CatalogError, Cycles, Instruction, InstructionId, MAX_LENGTH, Operand8,
    Operand16, Operands, Operation, Pointer, Slot, Template,
};
pub use cpu::Z80;
pub use decoder::Decoded;
pub use effects::{Family, FlagEffect, FlagEffects};
pub use execute::Execution;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::{Condition, Index, Reg8, Reg16, Registers};
