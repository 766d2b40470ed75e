//! Reference-counted physical frame allocator.
//!
//! Free frames form a LIFO stack threaded through a per-frame record table.
//! The stack and the reference counts live behind one [`SpinLock`], so a
//! frame's count and its free-list membership always change together.
//!
//! ```text
//! records:  [0] [1] [2] [3] [4] [5]
//!            A   F   F   A   F   R        A = Allocated { refs }
//!                │   ▲       │            F = Free { next }
//! free_head ─────┼───┼───────┘            R = Releasing
//!                ▼   │
//!              None  └── [4].next
//! ```
//!
//! Sentinel fills ([`ALLOC_FILL`], [`FREE_FILL`]) are written outside the
//! lock. While the last owner scrubs a frame it sits in the `Releasing`
//! state: not free, not allocated, and invisible to every other operation
//! except as an error.

extern crate alloc;

use crate::frame::{Frame, FrameRange, PhysicalAddress};
use crate::phys_mapper::PhysMapper;
use alloc::vec::Vec;
use core::fmt;
use core::num::NonZeroU32;
use kernel_info::memory::{ALLOC_FILL, FRAME_SIZE, FREE_FILL};
use kernel_sync::SpinLock;
use log::{error, trace};

/// Invariant violations detected by the frame allocator.
///
/// Every variant means the caller's bookkeeping is corrupt. The kernel treats
/// any of them as fatal; the allocator itself only reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("address {0} lies outside the managed frame pool")]
    OutOfRange(PhysicalAddress),
    #[error("address {0} is not frame aligned")]
    Misaligned(PhysicalAddress),
    #[error("frame {0} is not allocated (reference count already zero)")]
    NotAllocated(Frame),
    #[error("reference count of frame {0} overflowed")]
    RefCountOverflow(Frame),
}

/// What a successful [`FrameAllocator::free`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FreeOutcome {
    /// Other owners remain; the frame stays allocated.
    StillShared(NonZeroU32),
    /// The last reference was dropped and the frame is back on the free list.
    Released,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum FrameState {
    Free { next: Option<usize> },
    Allocated { refs: NonZeroU32 },
    Releasing,
}

struct FrameTable {
    free_head: Option<usize>,
    records: Vec<FrameState>,
}

impl FrameTable {
    fn push(&mut self, idx: usize) {
        self.records[idx] = FrameState::Free {
            next: self.free_head,
        };
        self.free_head = Some(idx);
    }

    fn pop(&mut self) -> Option<usize> {
        let idx = self.free_head?;
        let FrameState::Free { next } = self.records[idx] else {
            // The head is always a free record; anything else is a logic error
            // in this module, not in the caller.
            unreachable!("free list head {idx} is not a free frame");
        };
        self.free_head = next;
        self.records[idx] = FrameState::Allocated { refs: NonZeroU32::MIN };
        Some(idx)
    }

    fn free_len(&self) -> usize {
        let mut n = 0;
        let mut cursor = self.free_head;
        while let Some(idx) = cursor {
            n += 1;
            cursor = match self.records[idx] {
                FrameState::Free { next } => next,
                _ => None,
            };
        }
        n
    }
}

/// Physical page frame allocator with per-frame reference counts.
///
/// Construct exactly one per frame pool (the kernel keeps a single instance
/// for all of RAM). All methods take `&self` and are safe to call from any
/// number of cores.
pub struct FrameAllocator<M: PhysMapper> {
    range: FrameRange,
    mapper: M,
    table: SpinLock<FrameTable>,
}

impl<M: PhysMapper> FrameAllocator<M> {
    /// Seed the allocator with every frame of `range`.
    ///
    /// Frames are pushed in ascending order, so the first allocation returns
    /// the highest frame. All reference counts start at zero.
    #[must_use]
    pub fn new(range: FrameRange, mapper: M) -> Self {
        let mut table = FrameTable {
            free_head: None,
            records: alloc::vec![FrameState::Free { next: None }; range.len()],
        };
        for idx in 0..range.len() {
            table.push(idx);
        }
        log::debug!(
            "frame pool {}..{}: {} frames",
            range.start(),
            range.end(),
            range.len()
        );
        Self {
            range,
            mapper,
            table: SpinLock::new(table),
        }
    }

    /// The frames managed by this allocator.
    #[must_use]
    pub const fn range(&self) -> FrameRange {
        self.range
    }

    /// Number of frames managed, free or not.
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.range.len()
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Take one frame off the free list.
    ///
    /// The frame starts with a reference count of one and is filled with
    /// [`ALLOC_FILL`]. Returns `None` when the pool is exhausted.
    pub fn allocate(&self) -> Option<Frame> {
        let idx = self.table.with_lock(FrameTable::pop)?;
        let frame = self.frame_at(idx);

        // SAFETY: The frame was just removed from the free list and is owned
        // by nobody else.
        unsafe { self.mapper.frame_bytes(frame) }.fill(ALLOC_FILL);

        trace!("allocated frame {frame}");
        Some(frame)
    }

    /// Add one owner to an allocated frame and return the new count.
    ///
    /// # Errors
    /// Any [`FrameError`]; all of them indicate corrupted caller state.
    pub fn increment_reference(&self, pa: impl Into<PhysicalAddress>) -> Result<u32, FrameError> {
        let (frame, idx) = self.checked_index(pa.into())?;
        let refs = self.table.with_lock(|t| match t.records[idx] {
            FrameState::Allocated { refs } => match refs.checked_add(1) {
                Some(refs) => {
                    t.records[idx] = FrameState::Allocated { refs };
                    Ok(refs)
                }
                None => Err(FrameError::RefCountOverflow(frame)),
            },
            FrameState::Free { .. } | FrameState::Releasing => Err(FrameError::NotAllocated(frame)),
        });
        match refs {
            Ok(refs) => {
                trace!("frame {frame} now has {refs} references");
                Ok(refs.get())
            }
            Err(e) => Err(fatal(e)),
        }
    }

    /// Drop one reference to `pa`'s frame.
    ///
    /// When the last reference goes, the frame is filled with [`FREE_FILL`]
    /// and returned to the free list.
    ///
    /// # Errors
    /// Freeing an address outside the pool, a misaligned address, or a frame
    /// whose count is already zero. All are fatal to the caller.
    pub fn free(&self, pa: impl Into<PhysicalAddress>) -> Result<FreeOutcome, FrameError> {
        let (frame, idx) = self.checked_index(pa.into())?;

        let outcome = self.table.with_lock(|t| match t.records[idx] {
            FrameState::Allocated { refs } => match NonZeroU32::new(refs.get() - 1) {
                Some(remaining) => {
                    t.records[idx] = FrameState::Allocated { refs: remaining };
                    Ok(FreeOutcome::StillShared(remaining))
                }
                None => {
                    t.records[idx] = FrameState::Releasing;
                    Ok(FreeOutcome::Released)
                }
            },
            FrameState::Free { .. } | FrameState::Releasing => Err(FrameError::NotAllocated(frame)),
        });

        match outcome {
            Ok(FreeOutcome::Released) => {}
            Ok(shared) => {
                trace!("frame {frame} still shared: {shared:?}");
                return Ok(shared);
            }
            Err(e) => return Err(fatal(e)),
        }

        // SAFETY: The record is `Releasing`; no other path hands this frame
        // out or touches it until we push it below.
        unsafe { self.mapper.frame_bytes(frame) }.fill(FREE_FILL);

        self.table.with_lock(|t| t.push(idx));
        trace!("released frame {frame}");
        Ok(FreeOutcome::Released)
    }

    /// Count the frames on the free list.
    ///
    /// Walks the whole list under the lock: O(free frames). Diagnostics only.
    pub fn free_count(&self) -> usize {
        self.table.with_lock(|t| t.free_len())
    }

    /// Free memory in bytes, as reported to user space.
    pub fn free_bytes(&self) -> u64 {
        self.free_count() as u64 * FRAME_SIZE
    }

    /// Current reference count of `pa`'s frame (zero if free).
    ///
    /// # Errors
    /// If `pa` is misaligned or outside the pool.
    pub fn reference_count(&self, pa: impl Into<PhysicalAddress>) -> Result<u32, FrameError> {
        let (_, idx) = self.checked_index(pa.into())?;
        Ok(self.table.with_lock(|t| match t.records[idx] {
            FrameState::Allocated { refs } => refs.get(),
            FrameState::Free { .. } | FrameState::Releasing => 0,
        }))
    }

    fn checked_index(&self, pa: PhysicalAddress) -> Result<(Frame, usize), FrameError> {
        let Some(frame) = Frame::from_base(pa) else {
            return Err(fatal(FrameError::Misaligned(pa)));
        };
        match self.range.index_of(frame) {
            Some(idx) => Ok((frame, idx)),
            None => Err(fatal(FrameError::OutOfRange(pa))),
        }
    }

    fn frame_at(&self, idx: usize) -> Frame {
        match self.range.frame(idx) {
            Some(frame) => frame,
            None => unreachable!("record index {idx} outside frame range"),
        }
    }
}

impl<M: PhysMapper> fmt::Debug for FrameAllocator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAllocator")
            .field("range", &self.range)
            .field("free", &self.free_count())
            .finish_non_exhaustive()
    }
}

#[inline]
fn fatal(e: FrameError) -> FrameError {
    error!("frame allocator: {e}");
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_mapper::RamPhysMapper;

    fn pool(frames: usize) -> FrameAllocator<RamPhysMapper> {
        let range = FrameRange::covering(
            PhysicalAddress::new(0x8000_0000),
            PhysicalAddress::new(0x8000_0000 + frames as u64 * FRAME_SIZE),
        );
        FrameAllocator::new(range, RamPhysMapper::new(range))
    }

    #[test]
    fn first_allocation_is_highest_frame() {
        let a = pool(3);
        let f = a.allocate().unwrap();
        assert_eq!(f.base().as_u64(), 0x8000_2000);
    }

    #[test]
    fn free_list_is_lifo() {
        let a = pool(4);
        let x = a.allocate().unwrap();
        let y = a.allocate().unwrap();
        a.free(x).unwrap();
        a.free(y).unwrap();
        assert_eq!(a.allocate(), Some(y));
        assert_eq!(a.allocate(), Some(x));
    }

    #[test]
    fn table_walk_matches_state() {
        let a = pool(5);
        let f = a.allocate().unwrap();
        a.increment_reference(f).unwrap();
        a.table.with_lock(|t| {
            let idx = a.range.index_of(f).unwrap();
            assert_eq!(
                t.records[idx],
                FrameState::Allocated {
                    refs: NonZeroU32::new(2).unwrap()
                }
            );
            assert_eq!(t.free_len(), 4);
        });
    }

    #[test]
    fn releasing_frame_rejects_second_free() {
        let a = pool(1);
        let f = a.allocate().unwrap();
        let idx = a.range.index_of(f).unwrap();
        a.table.with_lock(|t| t.records[idx] = FrameState::Releasing);
        assert_eq!(a.free(f), Err(FrameError::NotAllocated(f)));
        assert_eq!(a.increment_reference(f), Err(FrameError::NotAllocated(f)));
        assert_eq!(a.free_count(), 0);
    }

    #[test]
    fn overflowing_reference_count_is_reported() {
        let a = pool(1);
        let f = a.allocate().unwrap();
        let idx = a.range.index_of(f).unwrap();
        a.table.with_lock(|t| {
            t.records[idx] = FrameState::Allocated {
                refs: NonZeroU32::MAX,
            };
        });
        assert_eq!(a.increment_reference(f), Err(FrameError::RefCountOverflow(f)));
    }
}
