//! Placement strategies for choosing among free blocks.

use core::fmt;

/// Policy used to pick a free block for an allocation.
///
/// All strategies scan the free list, O(n) in the number of free blocks.
/// The free list is kept in release order: a block freed on its own joins
/// at the end, while split remainders and merged blocks keep the slot of
/// the free space they came from.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum FitStrategy {
    /// First sufficiently large block in free-list (release) order, which
    /// is not necessarily the lowest address.
    #[default]
    First = 0,
    /// Smallest sufficiently large block; the lowest address wins a tie.
    Best = 1,
    /// Largest sufficiently large block; the lowest address wins a tie.
    Worst = 2,
}

/// A numeric strategy code outside `0..=2`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown fit strategy code {0}")]
pub struct UnknownStrategy(pub u8);

impl TryFrom<u8> for FitStrategy {
    type Error = UnknownStrategy;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::First),
            1 => Ok(Self::Best),
            2 => Ok(Self::Worst),
            other => Err(UnknownStrategy(other)),
        }
    }
}

impl From<FitStrategy> for u8 {
    fn from(s: FitStrategy) -> Self {
        s as Self
    }
}

impl fmt::Display for FitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::First => "first-fit",
            Self::Best => "best-fit",
            Self::Worst => "worst-fit",
        })
    }
}

impl FitStrategy {
    /// Whether a candidate of `size` bytes at offset `at` should replace the
    /// current pick of `current` bytes at `current_at`.
    ///
    /// Equal sizes go to the lower offset, independent of list order.
    #[inline]
    #[must_use]
    pub const fn prefers(self, size: usize, at: usize, current: usize, current_at: usize) -> bool {
        let lower = size == current && at < current_at;
        match self {
            Self::First => false,
            Self::Best => size < current || lower,
            Self::Worst => size > current || lower,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_and_reject_unknown() {
        for s in [FitStrategy::First, FitStrategy::Best, FitStrategy::Worst] {
            assert_eq!(FitStrategy::try_from(u8::from(s)), Ok(s));
        }
        assert_eq!(FitStrategy::try_from(3), Err(UnknownStrategy(3)));
    }

    #[test]
    fn ties_go_to_the_lower_offset() {
        assert!(!FitStrategy::Best.prefers(64, 0x200, 64, 0x100));
        assert!(!FitStrategy::Worst.prefers(64, 0x200, 64, 0x100));
        assert!(FitStrategy::Best.prefers(64, 0x100, 64, 0x200));
        assert!(FitStrategy::Worst.prefers(64, 0x100, 64, 0x200));
        assert!(FitStrategy::Best.prefers(48, 0x200, 64, 0x100));
        assert!(FitStrategy::Worst.prefers(80, 0x200, 64, 0x100));
        assert!(!FitStrategy::Best.prefers(80, 0x100, 64, 0x200));
        assert!(!FitStrategy::First.prefers(48, 0x100, 64, 0x200));
    }
}
