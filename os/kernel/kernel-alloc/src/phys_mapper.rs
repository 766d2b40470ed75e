//! # Physical Frame Access
//!
//! The frame allocator never dereferences physical addresses itself. It asks a
//! [`PhysMapper`] for a writable view of a frame whenever it has to stamp a
//! sentinel pattern into one.
//!
//! ## Why is this needed?
//! - Code can only dereference virtual addresses, not physical ones.
//! - The kernel reaches RAM through its higher-half direct map, while hosted
//!   tests and simulators keep "physical memory" in an ordinary buffer.
//!
//! ## Implementations
//! - [`HhdmPhysMapper`]: every frame at `pa` is visible at `HHDM_BASE + pa`.
//! - [`RamPhysMapper`]: frames live in an owned, heap-allocated buffer.

extern crate alloc;

use crate::frame::{Frame, FrameRange};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_info::memory::{FRAME_SIZE, HHDM_BASE};

/// Raw contents of one frame.
pub type FrameBytes = [u8; FRAME_SIZE as usize];

/// Converts a frame into a writable view of its bytes.
pub trait PhysMapper {
    /// Obtain a mutable view of `frame`'s contents.
    ///
    /// # Safety
    /// - The frame must be mapped by this mapper.
    /// - The caller must own the frame exclusively for the lifetime `'a`;
    ///   no other reference to the same bytes may exist concurrently.
    unsafe fn frame_bytes<'a>(&self, frame: Frame) -> &'a mut FrameBytes;
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// - The HHDM mapping must be present and cover every frame handed to it.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    unsafe fn frame_bytes<'a>(&self, frame: Frame) -> &'a mut FrameBytes {
        let va = (HHDM_BASE + frame.base().as_u64()) as *mut FrameBytes;
        // SAFETY: Caller guarantees the frame is HHDM-mapped and exclusively owned.
        unsafe { &mut *va }
    }
}

/// [`PhysMapper`] backed by an owned buffer that stands in for RAM.
///
/// Physical addresses in `range` map onto consecutive 4 KiB cells. Used by
/// hosted tests and simulations of the allocator.
pub struct RamPhysMapper {
    range: FrameRange,
    ram: Box<[UnsafeCell<FrameBytes>]>,
}

// Safety: each cell is only handed out to the exclusive owner of that frame
// (see `PhysMapper::frame_bytes`), so no two threads touch the same bytes.
unsafe impl Sync for RamPhysMapper {}
unsafe impl Send for RamPhysMapper {}

impl RamPhysMapper {
    /// Allocate zeroed backing storage for every frame of `range`.
    #[must_use]
    pub fn new(range: FrameRange) -> Self {
        let ram: Vec<UnsafeCell<FrameBytes>> = (0..range.len())
            .map(|_| UnsafeCell::new([0; FRAME_SIZE as usize]))
            .collect();
        Self {
            range,
            ram: ram.into_boxed_slice(),
        }
    }

    #[must_use]
    pub const fn range(&self) -> FrameRange {
        self.range
    }

    /// Copy out the current contents of `frame`.
    ///
    /// Returns `None` if the frame lies outside the backing range.
    ///
    /// # Safety
    /// No other thread may be writing the frame at the same time.
    #[must_use]
    pub unsafe fn snapshot(&self, frame: Frame) -> Option<FrameBytes> {
        let idx = self.range.index_of(frame)?;
        // SAFETY: Caller guarantees there is no concurrent writer.
        Some(unsafe { *self.ram[idx].get() })
    }
}

impl PhysMapper for RamPhysMapper {
    /// # Panics
    /// If `frame` lies outside the backing range.
    unsafe fn frame_bytes<'a>(&self, frame: Frame) -> &'a mut FrameBytes {
        let Some(idx) = self.range.index_of(frame) else {
            panic!("frame {frame} is not backed by this mapper");
        };
        // SAFETY: The caller owns the frame exclusively; the cell outlives `'a`
        // as long as the mapper does, which the caller also guarantees.
        unsafe { &mut *self.ram[idx].get() }
    }
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    unsafe fn frame_bytes<'a>(&self, frame: Frame) -> &'a mut FrameBytes {
        unsafe { (**self).frame_bytes(frame) }
    }
}
