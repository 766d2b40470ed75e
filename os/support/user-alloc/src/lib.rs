//! # User Heap Allocation
//!
//! `malloc`, `free`, `calloc` and `realloc` for user programs, built on a
//! single arena that only ever grows at its end (the program break).
//!
//! ## Layout
//!
//! The arena is carved into blocks that tile it without gaps. Every block
//! starts with a 32-byte [header](block) holding a debug label, the block's
//! total size with a free flag folded into the low bit, and address-order
//! links to its neighbours. Free blocks additionally thread a free list
//! through their first payload bytes.
//!
//! ```text
//!  base                                                       break
//!   │                                                           │
//!   ▼                                                           ▼
//!   ┌────────┬─────────────┬────────┬──────────┬────────┬───────┐
//!   │ header │ payload     │ header │ (free)   │ header │ ...   │
//!   └────────┴─────────────┴────────┴──────────┴────────┴───────┘
//!     next ───────────────►  next ────────────►
//!           ◄─────────────── prev  ◄──────────── prev
//! ```
//!
//! ## Placement
//!
//! A request is rounded up to 16 bytes plus the header, then satisfied from
//! the free list under the active [`FitStrategy`]. Oversized blocks are split
//! when the remainder can stand alone; freed blocks merge with free
//! neighbours. If nothing fits, the arena grows by at least one page.
//!
//! ## Failure Model
//!
//! * **Exhaustion** is `Ok(None)`.
//! * **Double free** is ignored.
//! * **Invalid pointers** and **corrupted linkage** are [`HeapError`]s; the
//!   caller should treat them as fatal.
//!
//! ## Usage
//! ```rust
//! use user_alloc::{FitStrategy, Heap, VecArena};
//!
//! let mut heap = Heap::with_strategy(VecArena::default(), FitStrategy::Best);
//! let p = heap.malloc(100).unwrap().expect("arena can grow");
//! heap.payload_mut(p).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let p = heap.realloc(Some(p), 400).unwrap().expect("arena can grow");
//! assert_eq!(&heap.payload(p).unwrap()[..5], b"hello");
//!
//! heap.free(Some(p)).unwrap();
//! assert_eq!(heap.validate().unwrap().free_blocks, 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod arena;
pub mod block;
mod dump;
pub mod heap;
mod locked;
pub mod strategy;

pub use arena::{Arena, GrowError, VecArena};
pub use dump::BlockInfo;
pub use heap::{Heap, HeapError, HeapPtr, HeapStats};
pub use locked::LockedHeap;
pub use strategy::{FitStrategy, UnknownStrategy};
