//! Memory and I/O bus interfaces.

/// Memory bus interface.
///
/// Addresses are 16-bit, matching the Z80 address bus. Implementations whose
/// backing store is smaller than 64K wrap the address themselves.
pub trait Bus {
    /// Read a byte without side effects.
    ///
    /// Instruction decoding only ever peeks, so decoding the same bytes twice
    /// always yields the same result.
    fn peek(&self, address: u16) -> u8;

    /// Read a byte as the CPU does during execution.
    fn read(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    /// Write a byte. Protected regions silently drop the write.
    fn write(&mut self, address: u16, value: u8);

    /// Read a little-endian word without side effects.
    fn peek_word(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.peek(address), self.peek(address.wrapping_add(1))])
    }

    /// Read a little-endian word.
    fn read_word(&mut self, address: u16) -> u16 {
        let lo = self.read(address);
        let hi = self.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Write a little-endian word, low byte first.
    ///
    /// Each half goes through `write()`, so protection and dirty tracking
    /// apply to both bytes independently.
    fn write_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(address, lo);
        self.write(address.wrapping_add(1), hi);
    }
}

/// A bus that also supports the separate Z80 I/O port space.
///
/// IN and OUT instructions place the full 16-bit port address on the bus
/// (the high byte comes from A or B depending on the instruction).
pub trait IoBus: Bus {
    /// Read a byte from the given I/O port.
    fn read_io(&mut self, port: u16) -> u8;

    /// Write a byte to the given I/O port.
    fn write_io(&mut self, port: u16, value: u8);
}
