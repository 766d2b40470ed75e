//! The block allocator.
//!
//! Blocks tile the arena from the first block to the arena's end with no
//! gaps, linked in address order. Free blocks are additionally threaded onto
//! a free list in release order:
//!
//! ```text
//! arena:  ┌──────┬────┬──────┬──────┬──────┬──────────────┬─────┐
//!         │ A    │ B  │ C    │ D    │ E    │ F            │     │
//!         │ used │free│ used │ free │ used │ used         │free │
//!         └──────┴────┴──────┴──────┴──────┴──────────────┴─────┘
//! free list:  tail-remainder ─► B ─► D ─► NULL
//! ```
//!
//! A block that is split off or merged keeps the free-list slot of the free
//! space it came from; a block freed on its own joins at the end.

use crate::arena::Arena;
use crate::block::{self, FreeLinks, HEADER_SIZE, Header, MIN_BLOCK_SIZE};
use crate::strategy::FitStrategy;
use core::fmt;
use kernel_info::heap::{HEAP_ALIGN, HEAP_GROW_MIN};
use log::{debug, error, trace, warn};

/// Fatal heap conditions.
///
/// Exhaustion is not an error: allocation calls return `Ok(None)` for it.
/// Both variants here mean the caller or the heap itself is corrupt, and the
/// process should stop using the heap.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("offset {0:#x} does not address a live heap block")]
    InvalidPointer(usize),
    #[error("heap corrupted at offset {offset:#x}: {reason}")]
    Corrupted { offset: usize, reason: &'static str },
}

/// A payload handed out by [`Heap::malloc`] and friends.
///
/// Stores the payload's offset into the arena; [`Heap::address_of`] turns it
/// into the address a C caller would see.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HeapPtr(pub(crate) usize);

impl HeapPtr {
    /// Rebuild a pointer from an arena offset handed back by a caller.
    ///
    /// Nothing is checked here; operations taking the pointer reject offsets
    /// that do not address a block.
    #[inline]
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    /// Offset of the payload from the start of the arena.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// Counters gathered by [`Heap::validate`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct HeapStats {
    pub blocks: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
}

/// A growable heap carved into variable-size blocks.
///
/// Not internally synchronized; see [`LockedHeap`](crate::LockedHeap) for a
/// thread-safe wrapper.
pub struct Heap<A: Arena> {
    pub(crate) arena: A,
    pub(crate) head: Option<usize>,
    pub(crate) tail: Option<usize>,
    pub(crate) free_head: Option<usize>,
    pub(crate) free_tail: Option<usize>,
    strategy: FitStrategy,
}

impl<A: Arena> Heap<A> {
    /// An empty heap; the arena grows on the first allocation.
    #[must_use]
    pub const fn new(arena: A) -> Self {
        Self::with_strategy(arena, FitStrategy::First)
    }

    #[must_use]
    pub const fn with_strategy(arena: A, strategy: FitStrategy) -> Self {
        Self {
            arena,
            head: None,
            tail: None,
            free_head: None,
            free_tail: None,
            strategy,
        }
    }

    #[must_use]
    pub const fn arena(&self) -> &A {
        &self.arena
    }

    #[must_use]
    pub fn into_arena(self) -> A {
        self.arena
    }

    #[must_use]
    pub const fn strategy(&self) -> FitStrategy {
        self.strategy
    }

    /// Switch the placement strategy for all later searches.
    pub fn set_strategy(&mut self, strategy: FitStrategy) {
        debug!("heap strategy {} -> {}", self.strategy, strategy);
        self.strategy = strategy;
    }

    /// The address `ptr` corresponds to, given the arena's base.
    #[must_use]
    pub fn address_of(&self, ptr: HeapPtr) -> usize {
        self.arena.base() + ptr.0
    }

    /// Allocate at least `size` bytes.
    ///
    /// Returns `Ok(None)` for a zero-sized request or when the arena cannot
    /// grow any further.
    ///
    /// # Errors
    /// [`HeapError::Corrupted`] if the block or free list is found broken.
    pub fn malloc(&mut self, size: usize) -> Result<Option<HeapPtr>, HeapError> {
        if size == 0 {
            return Ok(None);
        }
        let Some(need) = block::block_size_for(size) else {
            return Ok(None);
        };

        let at = match self.find_fit(need)? {
            Some(at) => at,
            None => match self.grow(need)? {
                Some(at) => at,
                None => return Ok(None),
            },
        };
        self.take(at, need)?;

        let ptr = HeapPtr(at + HEADER_SIZE);
        trace!("malloc({size}) = {:#x}", self.address_of(ptr));
        Ok(Some(ptr))
    }

    /// Release `ptr`; `None` is ignored.
    ///
    /// Freeing an already free block is a silent no-op, also after that
    /// block has been merged into a free neighbour. The freed block is
    /// merged with every adjacent free block.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` neither addresses a block nor
    /// lies inside a free one.
    pub fn free(&mut self, ptr: Option<HeapPtr>) -> Result<(), HeapError> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        let Some((at, mut h)) = self.find_block(ptr) else {
            if self.within_free_block(ptr)? {
                warn!("ignoring double free of merged block {:#x}", self.address_of(ptr));
                return Ok(());
            }
            return Err(self.invalid(ptr));
        };
        if h.is_free() {
            warn!("ignoring double free of {:#x}", self.address_of(ptr));
            return Ok(());
        }
        trace!("free({:#x})", self.address_of(ptr));
        h.set_free(true);
        self.put(at, &h);
        self.release(at)
    }

    /// Allocate a zeroed array of `count` elements of `size` bytes.
    ///
    /// An overflowing `count * size` is treated as exhaustion.
    ///
    /// # Errors
    /// As [`Heap::malloc`].
    pub fn calloc(&mut self, count: usize, size: usize) -> Result<Option<HeapPtr>, HeapError> {
        let Some(total) = count.checked_mul(size) else {
            return Ok(None);
        };
        let Some(ptr) = self.malloc(total)? else {
            return Ok(None);
        };
        self.payload_mut(ptr)?.fill(0);
        Ok(Some(ptr))
    }

    /// Resize the allocation at `ptr` to `size` bytes.
    ///
    /// * `ptr == None` behaves as [`Heap::malloc`].
    /// * `size == 0` frees `ptr` and returns `Ok(None)`.
    /// * Shrinking, or growing into a free block that directly follows, keeps
    ///   the pointer; otherwise the payload moves and the old block is freed.
    ///
    /// When no memory is available the old allocation is left untouched and
    /// `Ok(None)` is returned.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` does not address a live block.
    pub fn realloc(
        &mut self,
        ptr: Option<HeapPtr>,
        size: usize,
    ) -> Result<Option<HeapPtr>, HeapError> {
        let Some(ptr) = ptr else {
            return self.malloc(size);
        };
        if size == 0 {
            self.free(Some(ptr))?;
            return Ok(None);
        }
        let (at, h) = self.live_block(ptr)?;
        let Some(need) = block::block_size_for(size) else {
            return Ok(None);
        };
        let cur = h.size();

        if need <= cur {
            if let Some(rest) = self.split(at, need)? {
                self.release(rest)?;
            }
            trace!("realloc({:#x}, {size}) shrunk in place", self.address_of(ptr));
            return Ok(Some(ptr));
        }

        if let Some(next) = h.next {
            let nh = self.header(next)?;
            if nh.is_free() && cur + nh.size() >= need {
                let slot = self.free_unlink(next)?;
                self.absorb(at, next)?;
                if let Some(rest) = self.split(at, need)? {
                    self.free_link_at(rest, slot)?;
                    self.poison(rest)?;
                }
                trace!("realloc({:#x}, {size}) grew in place", self.address_of(ptr));
                return Ok(Some(ptr));
            }
        }

        let Some(moved) = self.malloc(size)? else {
            return Ok(None);
        };
        let keep = (cur - HEADER_SIZE).min(size);
        self.arena
            .bytes_mut()
            .copy_within(ptr.0..ptr.0 + keep, moved.0);
        self.free(Some(ptr))?;
        trace!(
            "realloc({:#x}, {size}) moved to {:#x}",
            self.address_of(ptr),
            self.address_of(moved)
        );
        Ok(Some(moved))
    }

    /// Attach a debug label to the block owning `ptr`.
    ///
    /// The label is cut to fit the header and always NUL-terminated.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` does not address a block.
    pub fn name(&mut self, ptr: HeapPtr, label: &str) -> Result<(), HeapError> {
        let (at, mut h) = self.block_of(ptr)?;
        h.set_name(label);
        self.put(at, &h);
        Ok(())
    }

    /// Bytes usable through `ptr`; at least what was requested.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` does not address a live block.
    pub fn usable_size(&self, ptr: HeapPtr) -> Result<usize, HeapError> {
        let (_, h) = self.live_block(ptr)?;
        Ok(h.size() - HEADER_SIZE)
    }

    /// The payload bytes of a live allocation.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` does not address a live block.
    pub fn payload(&self, ptr: HeapPtr) -> Result<&[u8], HeapError> {
        let (at, h) = self.live_block(ptr)?;
        Ok(&self.arena.bytes()[ptr.0..at + h.size()])
    }

    /// Mutable payload bytes of a live allocation.
    ///
    /// # Errors
    /// [`HeapError::InvalidPointer`] if `ptr` does not address a live block.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8], HeapError> {
        let (at, h) = self.live_block(ptr)?;
        Ok(&mut self.arena.bytes_mut()[ptr.0..at + h.size()])
    }

    /// Walk both lists and check every structural invariant.
    ///
    /// # Errors
    /// [`HeapError::Corrupted`] naming the first inconsistency found.
    pub fn validate(&self) -> Result<HeapStats, HeapError> {
        let mut stats = HeapStats::default();
        let bound = self.walk_bound();

        let mut prev = None;
        let mut expect = self.head;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            if Some(at) != expect {
                return Err(corrupted(at, "gap or overlap between blocks"));
            }
            let h = self.header(at)?;
            if h.prev != prev {
                return Err(corrupted(at, "broken back link"));
            }
            stats.blocks += 1;
            if stats.blocks > bound {
                return Err(corrupted(at, "block list cycle"));
            }
            if h.is_free() {
                stats.free_blocks += 1;
                stats.free_bytes += h.size();
            } else {
                stats.used_bytes += h.size();
            }
            expect = Some(at + h.size());
            prev = Some(at);
            cursor = h.next;
        }
        if self.tail != prev {
            return Err(corrupted(self.tail.unwrap_or_default(), "tail does not end the block list"));
        }
        if let Some(end) = expect
            && end != self.arena.len()
        {
            return Err(corrupted(end, "blocks do not reach the arena end"));
        }

        let mut listed = 0;
        let mut prev = None;
        let mut cursor = self.free_head;
        while let Some(at) = cursor {
            if !self.header(at)?.is_free() {
                return Err(corrupted(at, "used block on the free list"));
            }
            let links = self.links(at)?;
            if links.prev != prev {
                return Err(corrupted(at, "broken free list back link"));
            }
            listed += 1;
            if listed > stats.free_blocks {
                return Err(corrupted(at, "free list longer than the free block count"));
            }
            prev = Some(at);
            cursor = links.next;
        }
        if self.free_tail != prev {
            return Err(corrupted(self.free_tail.unwrap_or_default(), "free list tail mismatch"));
        }
        if listed != stats.free_blocks {
            return Err(corrupted(self.free_head.unwrap_or_default(), "free block missing from the free list"));
        }
        Ok(stats)
    }

    /// Pick a free block of at least `need` bytes under the active strategy.
    fn find_fit(&self, need: usize) -> Result<Option<usize>, HeapError> {
        let bound = self.walk_bound();
        let mut pick: Option<(usize, usize)> = None;
        let mut steps = 0;
        let mut cursor = self.free_head;
        while let Some(at) = cursor {
            steps += 1;
            if steps > bound {
                return Err(corrupted(at, "free list cycle"));
            }
            let h = self.header(at)?;
            if !h.is_free() {
                return Err(corrupted(at, "used block on the free list"));
            }
            let size = h.size();
            if size >= need {
                match pick {
                    None if self.strategy == FitStrategy::First => return Ok(Some(at)),
                    None => pick = Some((at, size)),
                    Some((current_at, current))
                        if self.strategy.prefers(size, at, current, current_at) =>
                    {
                        pick = Some((at, size));
                    }
                    Some(_) => {}
                }
            }
            cursor = self.links(at)?.next;
        }
        Ok(pick.map(|(at, _)| at))
    }

    /// Extend the arena by a chunk big enough for `need` and append it as a
    /// free block. `Ok(None)` when the growth primitive refuses.
    fn grow(&mut self, need: usize) -> Result<Option<usize>, HeapError> {
        let request = need.max(HEAP_GROW_MIN);
        let tail_end = match self.tail {
            Some(t) => Some(t + self.header(t)?.size()),
            None => None,
        };

        let at = match self.arena.grow(request) {
            Ok(at) => at,
            Err(e) => {
                debug!("heap growth by {request} bytes refused: {e}");
                return Ok(None);
            }
        };
        if !at.is_multiple_of(HEAP_ALIGN) || tail_end.is_some_and(|end| end != at) {
            return Err(corrupted(at, "arena grew discontiguously"));
        }

        self.put(at, &Header::new(request, true, self.tail, None));
        match self.tail {
            Some(t) => {
                let mut th = self.header(t)?;
                th.next = Some(at);
                self.put(t, &th);
            }
            None => self.head = Some(at),
        }
        self.tail = Some(at);
        self.free_push_back(at)?;

        debug!(
            "heap grew by {request} bytes at {:#x}",
            self.arena.base() + at
        );
        Ok(Some(at))
    }

    /// Hand the free block `at` out for a `need`-byte allocation.
    fn take(&mut self, at: usize, need: usize) -> Result<(), HeapError> {
        match self.split(at, need)? {
            Some(rest) => self.free_replace(at, rest)?,
            None => {
                self.free_unlink(at)?;
            }
        }
        let mut h = self.header(at)?;
        h.set_free(false);
        h.clear_name();
        self.put(at, &h);
        Ok(())
    }

    /// Cut the tail `[at + need, at + size)` off block `at` as a new free
    /// block, unless it would be too small to stand alone.
    ///
    /// The new block is linked into the block list but not the free list.
    fn split(&mut self, at: usize, need: usize) -> Result<Option<usize>, HeapError> {
        let mut h = self.header(at)?;
        let size = h.size();
        if size < need || size - need < MIN_BLOCK_SIZE {
            return Ok(None);
        }

        let rest = at + need;
        self.put(rest, &Header::new(size - need, true, Some(at), h.next));
        match h.next {
            Some(n) => {
                let mut nh = self.header(n)?;
                nh.prev = Some(rest);
                self.put(n, &nh);
            }
            None => self.tail = Some(rest),
        }
        h.set_size(need);
        h.next = Some(rest);
        self.put(at, &h);

        trace!("split {at:#x}: {need} + {}", size - need);
        Ok(Some(rest))
    }

    /// Fold block `next` into its predecessor `at`.
    fn absorb(&mut self, at: usize, next: usize) -> Result<(), HeapError> {
        let mut h = self.header(at)?;
        let nh = self.header(next)?;
        if h.next != Some(next) || at + h.size() != next {
            return Err(corrupted(next, "merging blocks that are not adjacent"));
        }

        h.set_size(h.size() + nh.size());
        h.next = nh.next;
        match nh.next {
            Some(n) => {
                let mut after = self.header(n)?;
                after.prev = Some(at);
                self.put(n, &after);
            }
            None => self.tail = Some(at),
        }
        self.put(at, &h);

        trace!("merged {next:#x} into {at:#x}: {} bytes", h.size());
        Ok(())
    }

    /// Put the free-flagged, unlisted block `at` on the free list and merge
    /// it with its free neighbours.
    fn release(&mut self, at: usize) -> Result<(), HeapError> {
        let h = self.header(at)?;
        let mut merged = false;
        match h.next {
            Some(next) if self.header(next)?.is_free() => {
                self.free_replace(next, at)?;
                self.absorb(at, next)?;
                merged = true;
            }
            _ => self.free_push_back(at)?,
        }

        let survivor = self.coalesce(at, merged)?;
        self.poison(survivor)
    }

    /// Merge the listed free block `at` with free neighbours on either side
    /// until neither neighbour is free. Returns the surviving block.
    fn coalesce(&mut self, mut at: usize, mut merged: bool) -> Result<usize, HeapError> {
        loop {
            let h = self.header(at)?;
            if let Some(next) = h.next
                && self.header(next)?.is_free()
            {
                self.free_unlink(next)?;
                self.absorb(at, next)?;
                merged = true;
                continue;
            }
            if let Some(prev) = h.prev
                && self.header(prev)?.is_free()
            {
                self.free_unlink(at)?;
                self.absorb(prev, at)?;
                at = prev;
                merged = true;
                continue;
            }
            break;
        }

        if merged {
            let mut h = self.header(at)?;
            h.clear_name();
            self.put(at, &h);
        }
        Ok(at)
    }

    #[cfg(feature = "poison")]
    fn poison(&mut self, at: usize) -> Result<(), HeapError> {
        let size = self.header(at)?.size();
        self.arena.bytes_mut()[at + MIN_BLOCK_SIZE..at + size]
            .fill(kernel_info::heap::HEAP_POISON);
        Ok(())
    }

    #[cfg(not(feature = "poison"))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    const fn poison(&mut self, _at: usize) -> Result<(), HeapError> {
        Ok(())
    }

    fn free_push_back(&mut self, at: usize) -> Result<(), HeapError> {
        let slot = FreeLinks {
            next: None,
            prev: self.free_tail,
        };
        self.free_link_at(at, slot)
    }

    /// Insert `at` between `slot.prev` and `slot.next`, which must be
    /// neighbours on the free list (or list ends).
    fn free_link_at(&mut self, at: usize, slot: FreeLinks) -> Result<(), HeapError> {
        self.put_links(at, slot)?;
        match slot.prev {
            Some(p) => {
                let mut pl = self.links(p)?;
                pl.next = Some(at);
                self.put_links(p, pl)?;
            }
            None => self.free_head = Some(at),
        }
        match slot.next {
            Some(n) => {
                let mut nl = self.links(n)?;
                nl.prev = Some(at);
                self.put_links(n, nl)?;
            }
            None => self.free_tail = Some(at),
        }
        Ok(())
    }

    /// Take `at` off the free list and return the links it had.
    fn free_unlink(&mut self, at: usize) -> Result<FreeLinks, HeapError> {
        let links = self.links(at)?;
        match links.prev {
            Some(p) => {
                let mut pl = self.links(p)?;
                pl.next = links.next;
                self.put_links(p, pl)?;
            }
            None => self.free_head = links.next,
        }
        match links.next {
            Some(n) => {
                let mut nl = self.links(n)?;
                nl.prev = links.prev;
                self.put_links(n, nl)?;
            }
            None => self.free_tail = links.prev,
        }
        Ok(links)
    }

    /// Give `new` the free-list slot of `old`.
    fn free_replace(&mut self, old: usize, new: usize) -> Result<(), HeapError> {
        let slot = self.free_unlink(old)?;
        self.free_link_at(new, slot)
    }

    /// Decode and sanity-check the header at `at`.
    pub(crate) fn header(&self, at: usize) -> Result<Header, HeapError> {
        self.try_header(at)
            .ok_or_else(|| corrupted(at, "invalid block header"))
    }

    fn try_header(&self, at: usize) -> Option<Header> {
        let len = self.arena.len();
        if !at.is_multiple_of(HEAP_ALIGN) || at.checked_add(MIN_BLOCK_SIZE)? > len {
            return None;
        }
        let h = Header::read(self.arena.bytes(), at);
        let size = h.size();
        if size < MIN_BLOCK_SIZE || at.checked_add(size)? > len {
            return None;
        }
        Some(h)
    }

    fn put(&mut self, at: usize, h: &Header) {
        h.write(self.arena.bytes_mut(), at);
    }

    pub(crate) fn links(&self, at: usize) -> Result<FreeLinks, HeapError> {
        if at.checked_add(MIN_BLOCK_SIZE).is_none_or(|end| end > self.arena.len()) {
            return Err(corrupted(at, "free list link out of bounds"));
        }
        Ok(FreeLinks::read(self.arena.bytes(), at))
    }

    fn put_links(&mut self, at: usize, links: FreeLinks) -> Result<(), HeapError> {
        if at.checked_add(MIN_BLOCK_SIZE).is_none_or(|end| end > self.arena.len()) {
            return Err(corrupted(at, "free list link out of bounds"));
        }
        links.write(self.arena.bytes_mut(), at);
        Ok(())
    }

    /// Resolve a payload pointer to its block, free or not.
    ///
    /// The block must be a member of the block list: its predecessor has to
    /// link forward to it, or it must be the head.
    fn block_of(&self, ptr: HeapPtr) -> Result<(usize, Header), HeapError> {
        self.find_block(ptr).ok_or_else(|| self.invalid(ptr))
    }

    fn find_block(&self, ptr: HeapPtr) -> Option<(usize, Header)> {
        let at = ptr.0.checked_sub(HEADER_SIZE)?;
        let h = self.try_header(at)?;
        let linked = match h.prev {
            Some(p) => self.try_header(p).is_some_and(|ph| ph.next == Some(at)),
            None => self.head == Some(at),
        };
        linked.then_some((at, h))
    }

    /// Whether the header `ptr` once had lies strictly inside a free block,
    /// i.e. the block was freed and then absorbed by a free predecessor.
    fn within_free_block(&self, ptr: HeapPtr) -> Result<bool, HeapError> {
        let Some(target) = ptr.0.checked_sub(HEADER_SIZE) else {
            return Ok(false);
        };
        let bound = self.walk_bound();
        let mut steps = 0;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            steps += 1;
            if steps > bound {
                return Err(corrupted(at, "block list cycle"));
            }
            if at > target {
                break;
            }
            let h = self.header(at)?;
            if target < at + h.size() {
                return Ok(at < target && h.is_free());
            }
            cursor = h.next;
        }
        Ok(false)
    }

    fn invalid(&self, ptr: HeapPtr) -> HeapError {
        error!("heap: invalid pointer {:#x}", self.arena.base() + ptr.0);
        HeapError::InvalidPointer(ptr.0)
    }

    /// As [`Heap::block_of`], but the block must be allocated.
    fn live_block(&self, ptr: HeapPtr) -> Result<(usize, Header), HeapError> {
        let (at, h) = self.block_of(ptr)?;
        if h.is_free() {
            error!("heap: use of freed pointer {:#x}", self.address_of(ptr));
            return Err(HeapError::InvalidPointer(ptr.0));
        }
        Ok((at, h))
    }

    /// Upper bound on the number of blocks the arena can hold.
    pub(crate) fn walk_bound(&self) -> usize {
        self.arena.len() / MIN_BLOCK_SIZE + 1
    }
}

impl<A: Arena> fmt::Debug for Heap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("base", &format_args!("{:#x}", self.arena.base()))
            .field("len", &self.arena.len())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

pub(crate) fn corrupted(offset: usize, reason: &'static str) -> HeapError {
    let e = HeapError::Corrupted { offset, reason };
    error!("heap: {e}");
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::VecArena;

    fn heap() -> Heap<VecArena> {
        Heap::new(VecArena::default())
    }

    #[test]
    fn first_allocation_grows_one_page() {
        let mut h = heap();
        let p = h.malloc(1).unwrap().unwrap();
        assert_eq!(p.offset(), HEADER_SIZE);
        assert_eq!(h.arena().len(), HEAP_GROW_MIN);
        let stats = h.validate().unwrap();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.used_bytes, MIN_BLOCK_SIZE);
        assert_eq!(stats.free_bytes, HEAP_GROW_MIN - MIN_BLOCK_SIZE);
    }

    #[test]
    fn large_request_grows_by_its_own_size() {
        let mut h = heap();
        h.malloc(10_000).unwrap().unwrap();
        assert_eq!(h.arena().len(), block::block_size_for(10_000).unwrap());
        assert_eq!(h.validate().unwrap().free_blocks, 0);
    }

    #[test]
    fn small_remainder_is_not_split() {
        let mut h = heap();
        // Leaves exactly 32 bytes after the block: too small to stand alone.
        let need = HEAP_GROW_MIN - 32;
        let p = h.malloc(need - HEADER_SIZE).unwrap().unwrap();
        assert_eq!(h.usable_size(p).unwrap(), HEAP_GROW_MIN - HEADER_SIZE);
        assert_eq!(h.validate().unwrap().blocks, 1);
    }

    #[test]
    fn remainder_of_exactly_min_block_is_split() {
        let mut h = heap();
        let need = HEAP_GROW_MIN - MIN_BLOCK_SIZE;
        h.malloc(need - HEADER_SIZE).unwrap().unwrap();
        let stats = h.validate().unwrap();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.free_bytes, MIN_BLOCK_SIZE);
    }

    #[test]
    fn free_list_tracks_release_order() {
        let mut h = heap();
        let a = h.malloc(16).unwrap();
        let _b = h.malloc(16).unwrap();
        let c = h.malloc(16).unwrap();
        let _d = h.malloc(16).unwrap();
        h.free(c).unwrap();
        h.free(a).unwrap();

        let order = h.free_blocks().unwrap();
        // Page remainder first, then C, then A.
        assert_eq!(order.len(), 3);
        assert_eq!(order[1].payload(), c.unwrap());
        assert_eq!(order[2].payload(), a.unwrap());
    }

    #[test]
    fn corrupted_link_is_detected() {
        let mut h = heap();
        let a = h.malloc(64).unwrap().unwrap();
        let at = a.offset() - HEADER_SIZE;
        let mut hdr = h.header(at).unwrap();
        hdr.next = Some(at + 8);
        h.put(at, &hdr);
        assert!(matches!(h.validate(), Err(HeapError::Corrupted { .. })));
    }

    #[test]
    fn pointer_into_the_middle_of_a_payload_is_rejected() {
        let mut h = heap();
        let a = h.malloc(64).unwrap().unwrap();
        let inside = HeapPtr(a.offset() + 16);
        assert_eq!(h.free(Some(inside)), Err(HeapError::InvalidPointer(inside.offset())));
        assert_eq!(h.name(HeapPtr(1), "x"), Err(HeapError::InvalidPointer(1)));
    }

    #[cfg(feature = "poison")]
    #[test]
    fn freed_payload_is_poisoned() {
        let mut h = heap();
        let a = h.malloc(64).unwrap().unwrap();
        let _guard = h.malloc(16).unwrap();
        h.payload_mut(a).unwrap().fill(0x11);
        h.free(Some(a)).unwrap();
        let at = a.offset() - HEADER_SIZE;
        let bytes = &h.arena().bytes()[at + MIN_BLOCK_SIZE..at + HEADER_SIZE + 64];
        assert!(bytes.iter().all(|&b| b == kernel_info::heap::HEAP_POISON));
    }
}
