//! The stepping Z80 core.

use emu_core::{Bus, Cpu, IoBus, Ticks};
use tracing::{debug, trace};

use crate::catalog::{Catalog, Operation};
use crate::decoder::Decoded;
use crate::flags;
use crate::registers::Registers;

/// Z80 CPU that executes one whole instruction per step.
///
/// The CPU holds registers and interrupt state only. Memory and I/O are
/// borrowed for each call, and instruction behavior comes from a shared
/// read-only [`Catalog`].
pub struct Z80 {
    regs: Registers,
    catalog: &'static Catalog,
    /// Set after EI and after a lone DD/FD prefix: interrupts are not
    /// accepted until one more instruction has run.
    interrupt_blocked: bool,
    total_ticks: Ticks,
}

impl Z80 {
    /// Power-on CPU using the process-wide catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(Catalog::shared())
    }

    #[must_use]
    pub fn with_catalog(catalog: &'static Catalog) -> Self {
        Self {
            regs: Registers::power_on(),
            catalog,
            interrupt_blocked: false,
            total_ticks: Ticks::ZERO,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Return to the power-on state. Memory is not touched.
    pub fn reset(&mut self) {
        self.regs = Registers::power_on();
        self.interrupt_blocked = false;
        self.total_ticks = Ticks::ZERO;
        debug!("cpu reset");
    }

    /// T-states executed since power-on or the last reset.
    #[must_use]
    pub fn total_ticks(&self) -> Ticks {
        self.total_ticks
    }

    #[must_use]
    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    /// Decode the instruction at PC without executing it.
    pub fn next_instruction<B: Bus + ?Sized>(&self, bus: &B) -> Decoded<'static> {
        self.catalog.decode(bus, self.regs.pc)
    }

    /// Set PC directly.
    #[cfg(feature = "test-utils")]
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    /// Set SP directly.
    #[cfg(feature = "test-utils")]
    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
    }

    /// Mutable register access for loading test state.
    #[cfg(feature = "test-utils")]
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    fn push<B: Bus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, lo);
    }

    fn execute<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let pc = self.regs.pc;
        let decoded = self.catalog.decode(bus, pc);
        let instruction = decoded.instruction;
        self.regs.refresh(decoded.fetches());

        let outcome = instruction.execute(&mut self.regs, bus, decoded.address);
        self.regs.pc = outcome
            .jump
            .unwrap_or_else(|| pc.wrapping_add(decoded.length()));
        self.interrupt_blocked = matches!(
            instruction.operation(),
            Operation::Ei | Operation::IgnoredPrefix
        );

        let cycles = decoded.prefix_cycles() + outcome.cycles;
        trace!(
            pc,
            mnemonic = instruction.mnemonic(),
            cycles,
            a = self.regs.a,
            f = %flags::describe(self.regs.f),
            "step"
        );
        cycles
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: IoBus + ?Sized> Cpu<B> for Z80 {
    fn step(&mut self, bus: &mut B) -> u32 {
        let cycles = if self.regs.halted {
            // HALT keeps fetching NOPs (and refreshing) until an interrupt.
            self.regs.refresh(1);
            self.regs.q = 0;
            self.regs.last_was_ld_a_ir = false;
            self.interrupt_blocked = false;
            4
        } else {
            self.execute(bus)
        };
        self.total_ticks += cycles;
        cycles
    }

    fn reset(&mut self) {
        Z80::reset(self);
    }

    /// Accept a maskable interrupt if IFF1 is set and no EI is pending.
    ///
    /// Mode 0 executes whatever the data bus supplies; with nothing driving
    /// the bus that is 0xFF (RST 38H), so modes 0 and 1 behave alike.
    fn interrupt(&mut self, bus: &mut B) -> bool {
        if !self.regs.iff1 || self.interrupt_blocked {
            return false;
        }
        // NMOS parts: LD A,I and LD A,R interrupted at this point leave
        // P/V clear rather than copying IFF2.
        if self.regs.last_was_ld_a_ir {
            self.regs.f &= !flags::PF;
        }
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.q = 0;
        self.regs.last_was_ld_a_ir = false;
        self.regs.refresh(1);
        self.push(bus, self.regs.pc);

        let (target, cycles): (u16, u32) = if self.regs.im == 2 {
            let vector = (u16::from(self.regs.i) << 8) | 0xFF;
            (bus.read_word(vector), 19)
        } else {
            (0x0038, 13)
        };
        self.regs.pc = target;
        self.regs.wz = target;
        self.total_ticks += cycles;
        debug!(mode = self.regs.im, target, "interrupt accepted");
        true
    }

    fn nmi(&mut self, bus: &mut B) {
        self.regs.halted = false;
        self.regs.q = 0;
        self.regs.last_was_ld_a_ir = false;
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        self.regs.refresh(1);
        self.push(bus, self.regs.pc);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        self.total_ticks += 11u32;
        debug!("non-maskable interrupt");
    }

    fn pc(&self) -> u16 {
        Z80::pc(self)
    }

    fn is_halted(&self) -> bool {
        Z80::is_halted(self)
    }
}
