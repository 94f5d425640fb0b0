//! ZX Spectrum memory.
//!
//! A flat address space whose low end holds a write-protected ROM image.
//! Writes that change the display file or attribute area latch a dirty
//! flag the renderer polls before redrawing.

mod config;
mod error;
mod memory;

pub use config::MemoryConfig;
pub use error::MemoryError;
pub use memory::{ATTRIBUTE_WINDOW, Memory, PIXEL_WINDOW};
