//! A heap shared between threads of one address space.

extern crate alloc;

use crate::arena::Arena;
use crate::dump::BlockInfo;
use crate::heap::{Heap, HeapError, HeapPtr, HeapStats};
use crate::strategy::FitStrategy;
use alloc::string::String;
use alloc::vec::Vec;
use kernel_sync::{SpinLock, SpinLockGuard};

/// [`Heap`] behind a single spin lock.
///
/// Every public operation holds the lock from its free-list search to its
/// last header write, so searches and mutations never interleave.
pub struct LockedHeap<A: Arena> {
    inner: SpinLock<Heap<A>>,
}

impl<A: Arena> LockedHeap<A> {
    #[must_use]
    pub const fn new(heap: Heap<A>) -> Self {
        Self {
            inner: SpinLock::new(heap),
        }
    }

    /// Exclusive access for a sequence of operations.
    #[must_use]
    pub fn lock(&self) -> SpinLockGuard<'_, Heap<A>> {
        self.inner.lock()
    }

    #[must_use]
    pub fn into_inner(self) -> Heap<A> {
        self.inner.into_inner()
    }

    /// See [`Heap::malloc`].
    ///
    /// # Errors
    /// As [`Heap::malloc`].
    pub fn malloc(&self, size: usize) -> Result<Option<HeapPtr>, HeapError> {
        self.inner.with_lock(|h| h.malloc(size))
    }

    /// See [`Heap::free`].
    ///
    /// # Errors
    /// As [`Heap::free`].
    pub fn free(&self, ptr: Option<HeapPtr>) -> Result<(), HeapError> {
        self.inner.with_lock(|h| h.free(ptr))
    }

    /// See [`Heap::calloc`].
    ///
    /// # Errors
    /// As [`Heap::calloc`].
    pub fn calloc(&self, count: usize, size: usize) -> Result<Option<HeapPtr>, HeapError> {
        self.inner.with_lock(|h| h.calloc(count, size))
    }

    /// See [`Heap::realloc`].
    ///
    /// # Errors
    /// As [`Heap::realloc`].
    pub fn realloc(&self, ptr: Option<HeapPtr>, size: usize) -> Result<Option<HeapPtr>, HeapError> {
        self.inner.with_lock(|h| h.realloc(ptr, size))
    }

    pub fn set_strategy(&self, strategy: FitStrategy) {
        self.inner.with_lock(|h| h.set_strategy(strategy));
    }

    #[must_use]
    pub fn strategy(&self) -> FitStrategy {
        self.inner.with_lock(|h| h.strategy())
    }

    /// See [`Heap::name`].
    ///
    /// # Errors
    /// As [`Heap::name`].
    pub fn name(&self, ptr: HeapPtr, label: &str) -> Result<(), HeapError> {
        self.inner.with_lock(|h| h.name(ptr, label))
    }

    /// See [`Heap::dump`].
    ///
    /// # Errors
    /// As [`Heap::dump`].
    pub fn dump(&self) -> Result<String, HeapError> {
        self.inner.with_lock(|h| h.dump())
    }

    /// See [`Heap::blocks`].
    ///
    /// # Errors
    /// As [`Heap::blocks`].
    pub fn blocks(&self) -> Result<Vec<BlockInfo>, HeapError> {
        self.inner.with_lock(|h| h.blocks())
    }

    /// See [`Heap::validate`].
    ///
    /// # Errors
    /// As [`Heap::validate`].
    pub fn validate(&self) -> Result<HeapStats, HeapError> {
        self.inner.with_lock(|h| h.validate())
    }
}

impl<A: Arena> From<Heap<A>> for LockedHeap<A> {
    fn from(heap: Heap<A>) -> Self {
        Self::new(heap)
    }
}
