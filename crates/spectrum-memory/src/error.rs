//! Memory errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The image does not leave room for RAM above it.
    #[error("ROM image too large: {size} bytes (must be below {max_address})")]
    ImageTooLarge { size: usize, max_address: usize },

    /// A checked access fell outside `[0, max_address)`.
    #[error("address {address:#06X} out of range (max {max_address:#06X})")]
    OutOfRange { address: usize, max_address: usize },
}
