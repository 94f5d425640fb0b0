//! Memory configuration.

/// Configuration for creating a [`Memory`](crate::Memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Size of the address space in bytes. Addresses wrap modulo this value.
    pub max_address: usize,
}

impl MemoryConfig {
    /// The full 64K Z80 address space.
    pub const FULL_64K: Self = Self {
        max_address: 0x1_0000,
    };
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::FULL_64K
    }
}
