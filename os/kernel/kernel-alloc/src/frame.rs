//! Physical addresses, page frames and frame ranges.

use core::fmt;
use core::ops::Add;
use kernel_info::memory::FRAME_SIZE;

/// Physical memory address.
///
/// A thin wrapper around `u64` that carries physical-address intent and
/// keeps raw integers and virtual addresses from being mixed up with it.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this address sits on a frame boundary.
    #[inline]
    #[must_use]
    pub const fn is_frame_aligned(self) -> bool {
        self.0.is_multiple_of(FRAME_SIZE)
    }

    /// Round up to the next frame boundary (identity if already aligned).
    ///
    /// Saturates at the highest frame boundary instead of wrapping.
    #[inline]
    #[must_use]
    pub const fn align_up(self) -> Self {
        match self.0.checked_add(FRAME_SIZE - 1) {
            Some(v) => Self(v & !(FRAME_SIZE - 1)),
            None => Self(u64::MAX & !(FRAME_SIZE - 1)),
        }
    }

    /// Round down to the containing frame boundary.
    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !(FRAME_SIZE - 1))
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<Frame> for PhysicalAddress {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.base()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// One physical page frame, identified by its frame-aligned base address.
///
/// ### Invariants
/// - The low `FRAME_SHIFT` bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Frame(PhysicalAddress);

impl Frame {
    /// The frame starting exactly at `pa`, or `None` if `pa` is misaligned.
    #[inline]
    #[must_use]
    pub const fn from_base(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_frame_aligned() {
            Some(Self(pa))
        } else {
            None
        }
    }

    /// The frame containing `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(pa.align_down())
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }

    /// First address past the end of this frame.
    #[inline]
    #[must_use]
    pub const fn end(self) -> PhysicalAddress {
        PhysicalAddress(self.0.0 + FRAME_SIZE)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#018X})", self.0.0)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A run of whole frames `[start, start + count * FRAME_SIZE)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameRange {
    start: PhysicalAddress,
    count: usize,
}

impl FrameRange {
    /// Every whole frame inside `[start, end)`.
    ///
    /// `start` is rounded up to a frame boundary; a trailing partial frame
    /// below `end` is left out. An inverted or too-small range is empty.
    #[must_use]
    pub const fn covering(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let first = start.align_up();
        let count = if end.0 > first.0 {
            ((end.0 - first.0) / FRAME_SIZE) as usize
        } else {
            0
        };
        Self {
            start: first,
            count,
        }
    }

    /// Exactly `count` frames starting at the frame-aligned `start`.
    #[must_use]
    pub const fn from_frames(start: Frame, count: usize) -> Self {
        Self {
            start: start.0,
            count,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    /// First address past the last frame.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress(self.start.0 + self.count as u64 * FRAME_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Index of `frame` within this range, if it belongs to it.
    #[inline]
    #[must_use]
    pub const fn index_of(&self, frame: Frame) -> Option<usize> {
        let pa = frame.0.0;
        if pa < self.start.0 || pa >= self.end().0 {
            return None;
        }
        Some(((pa - self.start.0) / FRAME_SIZE) as usize)
    }

    /// The `index`-th frame of this range.
    #[inline]
    #[must_use]
    pub const fn frame(&self, index: usize) -> Option<Frame> {
        if index < self.count {
            Some(Frame(PhysicalAddress(
                self.start.0 + index as u64 * FRAME_SIZE,
            )))
        } else {
            None
        }
    }

    /// Iterate all frames in ascending address order.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        (0..self.count).filter_map(|i| self.frame(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_rounds_start_up_and_drops_partial_tail() {
        let r = FrameRange::covering(PhysicalAddress::new(0x1001), PhysicalAddress::new(0x5fff));
        assert_eq!(r.start().as_u64(), 0x2000);
        assert_eq!(r.len(), 3);
        assert_eq!(r.end().as_u64(), 0x5000);
    }

    #[test]
    fn covering_inverted_range_is_empty() {
        let r = FrameRange::covering(PhysicalAddress::new(0x9000), PhysicalAddress::new(0x1000));
        assert!(r.is_empty());
        assert_eq!(r.frames().count(), 0);
    }

    #[test]
    fn index_and_frame_agree() {
        let r = FrameRange::covering(PhysicalAddress::new(0x4000), PhysicalAddress::new(0x8000));
        for (i, f) in r.frames().enumerate() {
            assert_eq!(r.index_of(f), Some(i));
        }
        assert_eq!(r.index_of(Frame::containing(PhysicalAddress::new(0x8000))), None);
        assert_eq!(r.index_of(Frame::containing(PhysicalAddress::new(0x3000))), None);
        assert_eq!(r.frame(4), None);
    }

    #[test]
    fn frame_alignment_helpers() {
        let pa = PhysicalAddress::new(0x12345);
        assert!(Frame::from_base(pa).is_none());
        let f = Frame::containing(pa);
        assert_eq!(f.base().as_u64(), 0x12000);
        assert_eq!(f.end().as_u64(), 0x13000);
        assert_eq!(pa.align_up().as_u64(), 0x13000);
        assert_eq!(Frame::from_base(f.base()), Some(f));
        assert_eq!(PhysicalAddress::new(u64::MAX).align_up().as_u64(), u64::MAX & !0xFFF);
    }
}
