//! The heap's backing store and its growth primitive.
//!
//! In user space the arena is the region between the process image and the
//! program break; growing it is an `sbrk` call. [`Arena`] abstracts that so
//! the allocator can run on top of any linear, grow-only region.

extern crate alloc;

use alloc::vec::Vec;
use kernel_info::heap::HEAP_ALIGN;

/// The growth primitive failed; the heap reports this as exhaustion.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum GrowError {
    #[error("arena limit reached: requested {requested} bytes, {available} available")]
    LimitReached { requested: usize, available: usize },
}

/// A contiguous region that only ever grows at its end.
pub trait Arena {
    /// Address the first arena byte is reported at. Diagnostics only.
    fn base(&self) -> usize;

    /// Bytes currently in the arena.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend the arena by `increment` bytes and return the offset at which
    /// the new bytes start (the old length).
    ///
    /// # Errors
    /// [`GrowError`] if the region cannot be extended; the arena is unchanged.
    fn grow(&mut self, increment: usize) -> Result<usize, GrowError>;

    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];
}

/// An owned arena backed by a `Vec<u8>`, bounded by `limit` bytes.
///
/// New bytes are zeroed, as pages fresh from the kernel are.
#[derive(Debug, Clone)]
pub struct VecArena {
    base: usize,
    limit: usize,
    bytes: Vec<u8>,
}

impl VecArena {
    /// Reported base used by [`VecArena::default`].
    pub const DEFAULT_BASE: usize = 0x4000;

    /// An empty arena reported at `base` (rounded up to the block alignment)
    /// that refuses to grow past `limit` bytes.
    #[must_use]
    pub const fn new(base: usize, limit: usize) -> Self {
        Self {
            base: (base + HEAP_ALIGN - 1) & !(HEAP_ALIGN - 1),
            limit,
            bytes: Vec::new(),
        }
    }

    /// An arena with no size limit beyond what the process can allocate.
    #[must_use]
    pub const fn unbounded(base: usize) -> Self {
        Self::new(base, usize::MAX)
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for VecArena {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_BASE)
    }
}

impl Arena for VecArena {
    fn base(&self) -> usize {
        self.base
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn grow(&mut self, increment: usize) -> Result<usize, GrowError> {
        let old = self.bytes.len();
        let available = self.limit.saturating_sub(old);
        if increment > available {
            return Err(GrowError::LimitReached {
                requested: increment,
                available,
            });
        }
        self.bytes.resize(old + increment, 0);
        Ok(old)
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_returns_previous_break() {
        let mut a = VecArena::new(0x1000, 8192);
        assert_eq!(a.grow(4096), Ok(0));
        assert_eq!(a.grow(4096), Ok(4096));
        assert_eq!(a.len(), 8192);
        assert!(a.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn grow_past_limit_leaves_arena_unchanged() {
        let mut a = VecArena::new(0x1000, 6000);
        a.grow(4096).unwrap();
        assert_eq!(
            a.grow(4096),
            Err(GrowError::LimitReached {
                requested: 4096,
                available: 1904
            })
        );
        assert_eq!(a.len(), 4096);
    }

    #[test]
    fn base_is_aligned() {
        assert_eq!(VecArena::new(0x1001, 0).base(), 0x1010);
        assert_eq!(VecArena::default().base(), VecArena::DEFAULT_BASE);
    }
}
