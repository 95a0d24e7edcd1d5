//! The data-register image shared between the TAP and whatever backs its data registers.  The
//! same type carries values and masks, so a `(mask, held)` pair can be passed around by value.
use core::fmt;
use core::ops::{BitAnd, BitOr, Not};

/// Width of the widest data register the TAP can shift
pub const DR_WIDTH: usize = 50;

const DR_MASK: u64 = (1 << DR_WIDTH) - 1;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DrBits(u64);

impl DrBits {
    pub const ZERO: Self = Self(0);
    pub const ALL: Self = Self(DR_MASK);

    /// Build from the low 50 bits of `value`; anything above is dropped
    pub const fn new(value: u64) -> Self {
        Self(value & DR_MASK)
    }

    /// The lowest `width` bits set, which is the mask for a contiguous register of that length
    pub const fn low(width: usize) -> Self {
        if width >= DR_WIDTH {
            Self::ALL
        } else {
            Self((1 << width) - 1)
        }
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// # Panics
    ///
    /// If `index` is not below `DR_WIDTH`.
    pub fn bit(self, index: usize) -> bool {
        assert!(index < DR_WIDTH);
        (self.0 >> index) & 1 != 0
    }

    /// # Panics
    ///
    /// If `index` is not below `DR_WIDTH`, since the bit would fall outside the register.
    pub fn set_bit(&mut self, index: usize, value: bool) {
        assert!(index < DR_WIDTH);
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// `set_bit` by value.
    ///
    /// # Panics
    ///
    /// If `index` is not below `DR_WIDTH`.
    #[must_use]
    pub fn with_bit(mut self, index: usize, value: bool) -> Self {
        self.set_bit(index, value);
        self
    }

    pub fn count_ones(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Indices of the set bits, lowest first
    pub fn ones(self) -> impl Iterator<Item = usize> {
        (0..DR_WIDTH).filter(move |&i| self.bit(i))
    }
}

impl BitAnd for DrBits {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for DrBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Not for DrBits {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & DR_MASK)
    }
}

impl From<u64> for DrBits {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for DrBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrBits({:#015x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_truncates_to_width() {
        assert_eq!(DrBits::new(u64::MAX), DrBits::ALL);
        assert_eq!(DrBits::new(1 << 50).value(), 0);
    }

    #[test]
    fn low_masks() {
        assert_eq!(DrBits::low(0), DrBits::ZERO);
        assert_eq!(DrBits::low(1).value(), 1);
        assert_eq!(DrBits::low(32).value(), 0xffff_ffff);
        assert_eq!(DrBits::low(50), DrBits::ALL);
        assert_eq!(DrBits::low(64), DrBits::ALL);
    }

    #[test]
    fn bit_accessors() {
        let mut b = DrBits::ZERO.with_bit(49, true).with_bit(3, true);
        assert!(b.bit(49));
        assert!(b.bit(3));
        assert!(!b.bit(4));
        b.set_bit(49, false);
        assert_eq!(b.value(), 8);
        assert_eq!(b.ones().collect::<alloc::vec::Vec<_>>(), [3]);
    }

    #[test]
    #[should_panic]
    fn bit_past_width_panics() {
        DrBits::ALL.bit(DR_WIDTH);
    }

    #[test]
    #[should_panic]
    fn set_bit_past_width_panics() {
        let _ = DrBits::ZERO.with_bit(63, true);
    }

    #[test]
    fn not_stays_in_width() {
        assert_eq!(!DrBits::ZERO, DrBits::ALL);
        assert_eq!((!DrBits::low(48)).value(), 0b11 << 48);
    }
}
