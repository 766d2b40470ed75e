//! # Kernel synchronization primitives
//!
//! The memory subsystem needs exactly one lock flavor: a test-and-test-and-set
//! spin lock whose critical sections are a handful of list and table updates.
//! Both the frame allocator's free list and the locked heap sit behind a
//! [`SpinLock`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
