//! Cycle counts.

/// A count of CPU T-states.
///
/// Instruction costs are small (`u32`), but the running total of an
/// emulated machine overflows 32 bits within minutes, so the accumulator
/// is 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::ops::Add for Ticks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl core::ops::AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl core::ops::AddAssign<u32> for Ticks {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += u64::from(rhs);
    }
}

impl core::ops::Sub for Ticks {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_instruction_costs() {
        let mut total = Ticks::ZERO;
        total += 4u32;
        total += 11u32;
        assert_eq!(total.get(), 15);
    }

    #[test]
    fn subtraction_saturates() {
        assert_eq!(Ticks::new(3) - Ticks::new(10), Ticks::ZERO);
    }
}
