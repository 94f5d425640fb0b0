//! Instruction semantics.
//!
//! [`Instruction::execute`] runs one catalog entry against the register
//! file and bus. The operation computes a candidate flags byte; the
//! entry's flag effects decide which of its bits reach F.

use emu_core::IoBus;

use crate::alu::{self, AluOp};
use crate::catalog::{BlockOp, Instruction, Operand8, Operand16, Operands, Operation, Pointer};
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};
use crate::registers::{Condition, Reg8, Registers};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    /// T-states spent, after resolving any branch.
    pub cycles: u32,
    /// New PC if the instruction transferred control; otherwise PC moves
    /// past the instruction.
    pub jump: Option<u16>,
}

impl Instruction {
    /// Execute this instruction, whose template starts at `address`.
    ///
    /// PC is not touched: the caller applies `jump` or steps past the
    /// instruction. The same applies to R, since only the caller knows how
    /// many prefixes were fetched.
    pub fn execute<B: IoBus + ?Sized>(
        &self,
        regs: &mut Registers,
        bus: &mut B,
        address: u16,
    ) -> Execution {
        let operands = self.template().operands(bus, address);
        let mut exec = Executor {
            regs,
            bus,
            operands,
            address,
            next: address.wrapping_add(self.length()),
            taken: false,
            jump: None,
        };
        let computed = exec.run(self.operation());
        exec.regs.q = match computed {
            Some(flags) => {
                exec.regs.f = self.flag_effects().apply(exec.regs.f, flags);
                exec.regs.f
            }
            None => 0,
        };
        exec.regs.last_was_ld_a_ir = matches!(self.operation(), Operation::LdAFromSpecial(_));
        Execution {
            cycles: self.cycles().realized(exec.taken),
            jump: exec.jump,
        }
    }
}

struct Executor<'a, B: ?Sized> {
    regs: &'a mut Registers,
    bus: &'a mut B,
    operands: Operands,
    /// First byte of the instruction, where repeating block ops return to.
    address: u16,
    /// Address after the instruction: return address for calls.
    next: u16,
    taken: bool,
    jump: Option<u16>,
}

impl<B: IoBus + ?Sized> Executor<'_, B> {
    fn pointer(&mut self, pointer: Pointer) -> u16 {
        match pointer {
            Pointer::Bc => self.regs.bc(),
            Pointer::De => self.regs.de(),
            Pointer::Hl => self.regs.hl(),
            Pointer::Indexed(index) => {
                let address = self
                    .regs
                    .index(index)
                    .wrapping_add_signed(i16::from(self.operands.displacement));
                self.regs.wz = address;
                address
            }
            Pointer::Absolute => self.operands.word,
        }
    }

    fn read8(&mut self, operand: Operand8) -> u8 {
        match operand {
            Operand8::Reg(reg) => self.regs.get8(reg),
            Operand8::Imm => self.operands.immediate,
            Operand8::Mem(pointer) => {
                let address = self.pointer(pointer);
                self.bus.read(address)
            }
        }
    }

    fn write8(&mut self, operand: Operand8, value: u8) {
        match operand {
            Operand8::Reg(reg) => self.regs.set8(reg, value),
            // Never a destination in the catalog.
            Operand8::Imm => {}
            Operand8::Mem(pointer) => {
                let address = self.pointer(pointer);
                self.bus.write(address, value);
            }
        }
    }

    fn push(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.bus.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.bus.write(self.regs.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let value = self.bus.read_word(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    fn jump_to(&mut self, target: u16) {
        self.taken = true;
        self.jump = Some(target);
    }

    fn holds(&self, condition: Option<Condition>) -> bool {
        condition.is_none_or(|cc| self.regs.condition(cc))
    }

    /// Perform the operation. Returns the computed flags, if it has any.
    fn run(&mut self, operation: &Operation) -> Option<u8> {
        match *operation {
            Operation::Nop | Operation::IgnoredPrefix => None,
            Operation::Halt => {
                self.regs.halted = true;
                None
            }

            Operation::Ld8 { dst, src } => {
                let value = self.read8(src);
                self.write8(dst, value);
                match (dst, src) {
                    (
                        Operand8::Reg(Reg8::A),
                        Operand8::Mem(p @ (Pointer::Bc | Pointer::De | Pointer::Absolute)),
                    ) => {
                        self.regs.wz = self.pointer(p).wrapping_add(1);
                    }
                    (
                        Operand8::Mem(p @ (Pointer::Bc | Pointer::De | Pointer::Absolute)),
                        Operand8::Reg(Reg8::A),
                    ) => {
                        let low = self.pointer(p).wrapping_add(1) & 0x00FF;
                        self.regs.wz = (u16::from(value) << 8) | low;
                    }
                    _ => {}
                }
                None
            }
            Operation::LdAFromSpecial(reg) => {
                let value = self.regs.get8(reg);
                self.regs.a = value;
                Some(sz53(value) | if self.regs.iff2 { PF } else { 0 })
            }
            Operation::Ld16 { dst, src } => {
                let value = match src {
                    Operand16::Reg(reg) => self.regs.get16(reg),
                    Operand16::Imm => self.operands.word,
                    Operand16::Mem => {
                        self.regs.wz = self.operands.word.wrapping_add(1);
                        self.bus.read_word(self.operands.word)
                    }
                };
                match dst {
                    Operand16::Reg(reg) => self.regs.set16(reg, value),
                    Operand16::Mem => {
                        self.bus.write_word(self.operands.word, value);
                        self.regs.wz = self.operands.word.wrapping_add(1);
                    }
                    Operand16::Imm => {}
                }
                None
            }
            Operation::Push(reg) => {
                let value = self.regs.get16(reg);
                self.push(value);
                None
            }
            Operation::Pop(reg) => {
                let value = self.pop();
                self.regs.set16(reg, value);
                None
            }
            Operation::ExAf => {
                self.regs.exchange_af();
                None
            }
            Operation::Exx => {
                self.regs.exchange_main();
                None
            }
            Operation::ExDeHl => {
                let (de, hl) = (self.regs.de(), self.regs.hl());
                self.regs.set_de(hl);
                self.regs.set_hl(de);
                None
            }
            Operation::ExStack(reg) => {
                let sp = self.regs.sp;
                let from_stack = self.bus.read_word(sp);
                let value = self.regs.get16(reg);
                self.bus.write_word(sp, value);
                self.regs.set16(reg, from_stack);
                self.regs.wz = from_stack;
                None
            }

            Operation::Alu { op, src } => {
                let value = self.read8(src);
                let result = alu::alu8(op, self.regs.a, value, self.regs.carry());
                if op.stores() {
                    self.regs.a = result.value;
                }
                Some(result.flags)
            }
            Operation::Inc8(target) => {
                let result = alu::inc8(self.read8(target));
                self.write8(target, result.value);
                Some(result.flags)
            }
            Operation::Dec8(target) => {
                let result = alu::dec8(self.read8(target));
                self.write8(target, result.value);
                Some(result.flags)
            }
            Operation::Inc16(reg) => {
                let value = self.regs.get16(reg).wrapping_add(1);
                self.regs.set16(reg, value);
                None
            }
            Operation::Dec16(reg) => {
                let value = self.regs.get16(reg).wrapping_sub(1);
                self.regs.set16(reg, value);
                None
            }
            Operation::Add16 { dst, src } => {
                let lhs = self.regs.get16(dst);
                let (result, flags) = alu::add16(lhs, self.regs.get16(src));
                self.regs.wz = lhs.wrapping_add(1);
                self.regs.set16(dst, result);
                Some(flags)
            }
            Operation::Adc16(src) => {
                let hl = self.regs.hl();
                let (result, flags) = alu::adc16(hl, self.regs.get16(src), self.regs.carry());
                self.regs.wz = hl.wrapping_add(1);
                self.regs.set_hl(result);
                Some(flags)
            }
            Operation::Sbc16(src) => {
                let hl = self.regs.hl();
                let (result, flags) = alu::sbc16(hl, self.regs.get16(src), self.regs.carry());
                self.regs.wz = hl.wrapping_add(1);
                self.regs.set_hl(result);
                Some(flags)
            }
            Operation::Daa => {
                let result = alu::daa(self.regs.a, self.regs.f);
                self.regs.a = result.value;
                Some(result.flags)
            }
            Operation::Cpl => {
                self.regs.a = !self.regs.a;
                Some(HF | NF | (self.regs.a & (YF | XF)))
            }
            Operation::Neg => {
                let result = alu::alu8(AluOp::Sub, 0, self.regs.a, false);
                self.regs.a = result.value;
                Some(result.flags)
            }
            Operation::Scf => Some(CF | self.scf_ccf_xy()),
            Operation::Ccf => {
                let carried = if self.regs.carry() { HF } else { CF };
                Some(carried | self.scf_ccf_xy())
            }

            Operation::RotateA(op) => {
                let result = alu::shift8(op, self.regs.a, self.regs.carry());
                self.regs.a = result.value;
                Some(result.flags)
            }
            Operation::Shift { op, target, copy } => {
                let value = self.read8(target);
                let result = alu::shift8(op, value, self.regs.carry());
                self.write8(target, result.value);
                if let Some(reg) = copy {
                    self.regs.set8(reg, result.value);
                }
                Some(result.flags)
            }
            Operation::Bit { bit, src } => {
                let value = self.read8(src);
                let set = value & (1 << bit) != 0;
                // Memory forms leak the high byte of the internal address latch.
                let xy = match src {
                    Operand8::Mem(_) => (self.regs.wz >> 8) as u8,
                    _ => value,
                };
                let mut flags = HF | (xy & (YF | XF));
                if !set {
                    flags |= ZF | PF;
                }
                if bit == 7 && set {
                    flags |= SF;
                }
                Some(flags)
            }
            Operation::Res { bit, target, copy } => {
                let value = self.read8(target) & !(1 << bit);
                self.write8(target, value);
                if let Some(reg) = copy {
                    self.regs.set8(reg, value);
                }
                None
            }
            Operation::Set { bit, target, copy } => {
                let value = self.read8(target) | (1 << bit);
                self.write8(target, value);
                if let Some(reg) = copy {
                    self.regs.set8(reg, value);
                }
                None
            }
            Operation::Rld | Operation::Rrd => {
                let hl = self.regs.hl();
                let memory = self.bus.read(hl);
                let a = self.regs.a;
                let (stored, digit) = if matches!(operation, Operation::Rld) {
                    ((memory << 4) | (a & 0x0F), memory >> 4)
                } else {
                    ((a << 4) | (memory >> 4), memory & 0x0F)
                };
                self.bus.write(hl, stored);
                self.regs.a = (a & 0xF0) | digit;
                self.regs.wz = hl.wrapping_add(1);
                Some(sz53p(self.regs.a))
            }

            Operation::Jp(condition) => {
                let target = self.operands.word;
                self.regs.wz = target;
                if self.holds(condition) {
                    self.jump_to(target);
                }
                None
            }
            Operation::JpReg(reg) => {
                let target = self.regs.get16(reg);
                self.jump_to(target);
                None
            }
            Operation::Jr(condition) => {
                if self.holds(condition) {
                    let target = self.relative_target();
                    self.regs.wz = target;
                    self.jump_to(target);
                }
                None
            }
            Operation::Djnz => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    let target = self.relative_target();
                    self.regs.wz = target;
                    self.jump_to(target);
                }
                None
            }
            Operation::Call(condition) => {
                let target = self.operands.word;
                self.regs.wz = target;
                if self.holds(condition) {
                    self.push(self.next);
                    self.jump_to(target);
                }
                None
            }
            Operation::Ret(condition) => {
                if self.holds(condition) {
                    let target = self.pop();
                    self.regs.wz = target;
                    self.jump_to(target);
                }
                None
            }
            Operation::Retn | Operation::Reti => {
                self.regs.iff1 = self.regs.iff2;
                let target = self.pop();
                self.regs.wz = target;
                self.jump_to(target);
                None
            }
            Operation::Rst(vector) => {
                self.push(self.next);
                let target = u16::from(vector);
                self.regs.wz = target;
                self.jump_to(target);
                None
            }

            Operation::Di => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                None
            }
            Operation::Ei => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                None
            }
            Operation::Im(mode) => {
                self.regs.im = mode;
                None
            }

            Operation::InImm => {
                let port = (u16::from(self.regs.a) << 8) | u16::from(self.operands.immediate);
                self.regs.a = self.bus.read_io(port);
                self.regs.wz = port.wrapping_add(1);
                None
            }
            Operation::OutImm => {
                let a = self.regs.a;
                let n = self.operands.immediate;
                self.bus.write_io((u16::from(a) << 8) | u16::from(n), a);
                self.regs.wz = (u16::from(a) << 8) | u16::from(n.wrapping_add(1));
                None
            }
            Operation::InC(reg) => {
                let port = self.regs.bc();
                let value = self.bus.read_io(port);
                if let Some(reg) = reg {
                    self.regs.set8(reg, value);
                }
                self.regs.wz = port.wrapping_add(1);
                Some(sz53p(value))
            }
            Operation::OutC(reg) => {
                let port = self.regs.bc();
                let value = reg.map_or(0, |reg| self.regs.get8(reg));
                self.bus.write_io(port, value);
                self.regs.wz = port.wrapping_add(1);
                None
            }
            Operation::Block { op, repeat } => Some(self.block(op, repeat)),
        }
    }

    /// X/Y of SCF and CCF: A ORed with the F bits the previous instruction
    /// did not itself write.
    fn scf_ccf_xy(&self) -> u8 {
        ((self.regs.q ^ self.regs.f) | self.regs.a) & (YF | XF)
    }

    fn relative_target(&self) -> u16 {
        self.next
            .wrapping_add_signed(i16::from(self.operands.displacement))
    }

    /// Go back to the start of a repeating block instruction. X and Y of
    /// `flags` are replaced by bits 5 and 3 of the rewound PC's high byte.
    fn repeat(&mut self, flags: u8) -> u8 {
        self.regs.wz = self.address.wrapping_add(1);
        self.jump_to(self.address);
        let pch = (self.address >> 8) as u8;
        (flags & !(YF | XF)) | (pch & (YF | XF))
    }

    fn block(&mut self, op: BlockOp, repeat: bool) -> u8 {
        let step: u16 = if op.decrements() { 0xFFFF } else { 1 };
        let hl = self.regs.hl();
        match op {
            BlockOp::Ldi | BlockOp::Ldd => {
                let value = self.bus.read(hl);
                let de = self.regs.de();
                self.bus.write(de, value);
                self.regs.set_hl(hl.wrapping_add(step));
                self.regs.set_de(de.wrapping_add(step));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);

                // X and Y come from bits 3 and 1 of the copied byte plus A.
                let n = value.wrapping_add(self.regs.a);
                let mut flags = (n & XF) | ((n << 4) & YF);
                if bc != 0 {
                    flags |= PF;
                    if repeat {
                        flags = self.repeat(flags);
                    }
                }
                flags
            }
            BlockOp::Cpi | BlockOp::Cpd => {
                let value = self.bus.read(hl);
                let a = self.regs.a;
                let result = a.wrapping_sub(value);
                let half = (a & 0x0F) < (value & 0x0F);
                self.regs.set_hl(hl.wrapping_add(step));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.wz = self.regs.wz.wrapping_add(step);

                let n = result.wrapping_sub(u8::from(half));
                let mut flags = NF | (result & SF) | (n & XF) | ((n << 4) & YF);
                if result == 0 {
                    flags |= ZF;
                }
                if half {
                    flags |= HF;
                }
                if bc != 0 {
                    flags |= PF;
                    if repeat && result != 0 {
                        flags = self.repeat(flags);
                    }
                }
                flags
            }
            BlockOp::Ini | BlockOp::Ind => {
                let port = self.regs.bc();
                let value = self.bus.read_io(port);
                self.bus.write(hl, value);
                self.regs.wz = port.wrapping_add(step);
                self.regs.set_hl(hl.wrapping_add(step));
                self.regs.b = self.regs.b.wrapping_sub(1);
                let k = u16::from(value) + u16::from(self.regs.c.wrapping_add(step as u8));
                self.block_io_flags(value, k, repeat)
            }
            BlockOp::Outi | BlockOp::Outd => {
                let value = self.bus.read(hl);
                self.regs.b = self.regs.b.wrapping_sub(1);
                let port = self.regs.bc();
                self.bus.write_io(port, value);
                self.regs.wz = port.wrapping_add(step);
                self.regs.set_hl(hl.wrapping_add(step));
                let k = u16::from(value) + u16::from(self.regs.l);
                self.block_io_flags(value, k, repeat)
            }
        }
    }

    /// Flags shared by INI/IND/OUTI/OUTD, where `k` is the transferred byte
    /// plus the adjusted C (input) or the new L (output).
    fn block_io_flags(&mut self, value: u8, k: u16, repeat: bool) -> u8 {
        let b = self.regs.b;
        let carry = k > 0xFF;
        let negative = value & 0x80 != 0;
        let p = (k as u8 & 7) ^ b;

        let mut flags = sz53(b);
        if negative {
            flags |= NF;
        }
        if carry {
            flags |= HF | CF;
        }
        if parity(p) {
            flags |= PF;
        }
        if !repeat || b == 0 {
            return flags;
        }

        // Repeating: H and P/V are recomputed from B moved one step further
        // in the direction the carry pushes it.
        let mut flags = self.repeat(flags) & !(HF | PF);
        let (half, adjusted) = match (carry, negative) {
            (true, true) => (b & 0x0F == 0x00, b.wrapping_sub(1)),
            (true, false) => (b & 0x0F == 0x0F, b.wrapping_add(1)),
            (false, _) => (false, b),
        };
        if half {
            flags |= HF;
        }
        if parity(p ^ (adjusted & 7)) {
            flags |= PF;
        }
        flags
    }
}
