//! Core traits and types for instruction-stepped emulation.
//!
//! A CPU executes one whole instruction per `step()` and reports the
//! T-states it consumed. Memory and I/O are reached through the bus traits,
//! so a CPU core never depends on a concrete machine.

mod bus;
mod cpu;
mod ticks;

pub use bus::{Bus, IoBus};
pub use cpu::Cpu;
pub use ticks::Ticks;
