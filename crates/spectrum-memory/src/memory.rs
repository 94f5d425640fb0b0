//! Flat Spectrum address space.

use std::ops::Range;

use emu_core::{Bus, IoBus};
use tracing::{debug, trace, warn};

use crate::{MemoryConfig, MemoryError};

/// Display file: 256x192 pixels, one bit per pixel.
pub const PIXEL_WINDOW: Range<usize> = 0x4000..0x5800;

/// Attribute area: one colour byte per 8x8 character cell.
pub const ATTRIBUTE_WINDOW: Range<usize> = 0x5800..0x5B00;

/// Value returned by reads from unmapped I/O ports.
const FLOATING_BUS: u8 = 0xFF;

/// Spectrum memory: ROM at the bottom, RAM above it.
///
/// Layout for the 48K machine:
/// - $0000-$3FFF: ROM (writes ignored once an image is loaded)
/// - $4000-$57FF: display file
/// - $5800-$5AFF: attributes
/// - $5B00-$FFFF: general RAM
///
/// The ROM boundary is not fixed: it is whatever size the last loaded image
/// was, and zero after [`Memory::clear`].
pub struct Memory {
    data: Box<[u8]>,
    rom_size: usize,
    video_memory_changed: bool,
}

impl Memory {
    /// Create zeroed memory with no ROM.
    ///
    /// The video dirty flag starts set so the first frame is always drawn.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_address` is zero.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        assert!(config.max_address > 0, "memory must have at least one byte");
        Self {
            data: vec![0; config.max_address].into_boxed_slice(),
            rom_size: 0,
            video_memory_changed: true,
        }
    }

    /// Size of the address space in bytes.
    #[must_use]
    pub fn max_address(&self) -> usize {
        self.data.len()
    }

    /// Number of write-protected bytes at the bottom of the address space.
    #[must_use]
    pub fn rom_size(&self) -> usize {
        self.rom_size
    }

    /// The whole address space, for renderers and debuggers.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Has the display file or attribute area changed since the flag was
    /// last cleared?
    #[must_use]
    pub fn video_memory_changed(&self) -> bool {
        self.video_memory_changed
    }

    /// Set or clear the video dirty flag. The renderer clears it after a redraw.
    pub fn set_video_memory_changed(&mut self, changed: bool) {
        self.video_memory_changed = changed;
    }

    /// Read and clear the video dirty flag.
    pub fn take_video_memory_changed(&mut self) -> bool {
        std::mem::take(&mut self.video_memory_changed)
    }

    /// Zero all memory and drop the ROM boundary.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.rom_size = 0;
        self.video_memory_changed = true;
        debug!(max_address = self.data.len(), "memory cleared");
    }

    /// Replace memory with a raw ROM image loaded at address 0.
    ///
    /// Everything above the image is zeroed and the image becomes
    /// write-protected. An image must leave at least one byte of RAM; a
    /// rejected image leaves memory untouched.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        if image.len() >= self.data.len() {
            warn!(size = image.len(), max_address = self.data.len(), "ROM image rejected");
            return Err(MemoryError::ImageTooLarge {
                size: image.len(),
                max_address: self.data.len(),
            });
        }

        self.clear();
        self.data[..image.len()].copy_from_slice(image);
        self.rom_size = image.len();
        debug!(size = image.len(), "ROM image loaded");
        Ok(())
    }

    /// Checked read for callers holding addresses wider than 16 bits.
    pub fn get(&self, address: usize) -> Result<u8, MemoryError> {
        self.data
            .get(address)
            .copied()
            .ok_or(MemoryError::OutOfRange {
                address,
                max_address: self.data.len(),
            })
    }

    /// Checked write with the same protection rules as [`Bus::write`].
    pub fn set(&mut self, address: usize, value: u8) -> Result<(), MemoryError> {
        if address >= self.data.len() {
            return Err(MemoryError::OutOfRange {
                address,
                max_address: self.data.len(),
            });
        }
        self.store(address, value);
        Ok(())
    }

    /// Hex dump of `count` bytes starting at `address`, e.g. `"DD21"` or
    /// `"DD 21"` when spaced. Stops at the end of the address space.
    #[must_use]
    pub fn hex_string(&self, address: usize, count: usize, spaced: bool) -> String {
        let end = address.saturating_add(count).min(self.data.len());
        let separator = if spaced { " " } else { "" };
        self.data
            .get(address..end)
            .unwrap_or_default()
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Does a write to this address change what the screen shows?
    #[must_use]
    pub fn is_video_address(address: usize) -> bool {
        PIXEL_WINDOW.contains(&address) || ATTRIBUTE_WINDOW.contains(&address)
    }

    fn wrap(&self, address: u16) -> usize {
        usize::from(address) % self.data.len()
    }

    /// Apply a write: ROM is read-only, unchanged values are ignored, and
    /// screen changes latch the dirty flag.
    fn store(&mut self, address: usize, value: u8) {
        if address < self.rom_size {
            return;
        }
        if self.data[address] == value {
            return;
        }
        if Self::is_video_address(address) {
            self.video_memory_changed = true;
        }
        self.data[address] = value;
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl Bus for Memory {
    fn peek(&self, address: u16) -> u8 {
        self.data[self.wrap(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        let address = self.wrap(address);
        self.store(address, value);
    }
}

impl IoBus for Memory {
    fn read_io(&mut self, port: u16) -> u8 {
        trace!(port, "read from unmapped port");
        FLOATING_BUS
    }

    fn write_io(&mut self, port: u16, value: u8) {
        trace!(port, value, "write to unmapped port");
    }
}
