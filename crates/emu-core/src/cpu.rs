//! CPU core trait.

use crate::IoBus;

/// A CPU that executes one instruction per step.
///
/// The bus is borrowed for each call rather than owned, so the host can
/// inspect memory (e.g. the renderer polling a video dirty flag) between
/// steps while the CPU still has exclusive access during execution.
pub trait Cpu<B: IoBus + ?Sized> {
    /// Execute one instruction (or one halted refresh cycle).
    ///
    /// Returns the T-states consumed.
    fn step(&mut self, bus: &mut B) -> u32;

    /// Reset the CPU to its power-on state.
    fn reset(&mut self);

    /// Request a maskable interrupt. Returns true if it was accepted.
    ///
    /// The interrupt is serviced immediately, between instructions.
    fn interrupt(&mut self, bus: &mut B) -> bool;

    /// Request a non-maskable interrupt.
    fn nmi(&mut self, bus: &mut B);

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Returns true if the CPU is halted.
    fn is_halted(&self) -> bool;
}
