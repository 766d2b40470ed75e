//! # Physical Frame Allocation
//!
//! This crate owns the kernel's pool of physical page frames. Everything that
//! needs RAM (page tables, kernel stacks, user pages mapped lazily on a page
//! fault or requested through `mmap`, pipe buffers) goes through one
//! [`FrameAllocator`] instance built at boot.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Virtual Memory / Process Layer             │
//! │    • maps, unmaps and shares user pages             │
//! │    • grows and shrinks process images               │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ allocate / increment_reference / free
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Frame Allocator ([`frame_alloc`])         │
//! │    • LIFO free list of 4 KiB frames                 │
//! │    • per-frame reference counts                     │
//! │    • one spin lock over both                        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ sentinel fills
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper ([`phys_mapper`])      │
//! │    • HHDM in the kernel, owned buffer when hosted   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reference Counting
//!
//! A frame mapped into several address spaces (copy-on-write after `fork`,
//! shared mappings) carries one reference per mapping. Each unmapping calls
//! [`FrameAllocator::free`]; only the call that drops the count to zero puts
//! the frame back on the free list.
//!
//! ## Failure Model
//!
//! * **Exhaustion** is ordinary: [`FrameAllocator::allocate`] returns `None`.
//! * **Corruption** (freeing a foreign, misaligned, or unreferenced frame) is
//!   reported as a [`FrameError`]. The allocator stays consistent and leaves
//!   the decision to halt to the embedding kernel, which panics.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::{FrameAllocator, FrameRange, FreeOutcome, PhysicalAddress, RamPhysMapper};
//!
//! let range = FrameRange::covering(PhysicalAddress::new(0x8000_0000), PhysicalAddress::new(0x8000_4000));
//! let frames = FrameAllocator::new(range, RamPhysMapper::new(range));
//!
//! let page = frames.allocate().expect("pool has frames");
//! frames.increment_reference(page).unwrap();          // second mapping
//! assert!(matches!(frames.free(page), Ok(FreeOutcome::StillShared(_))));
//! assert_eq!(frames.free(page), Ok(FreeOutcome::Released));
//! assert_eq!(frames.free_count(), 4);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame;
pub mod frame_alloc;
pub mod phys_mapper;

pub use frame::{Frame, FrameRange, PhysicalAddress};
pub use frame_alloc::{FrameAllocator, FrameError, FreeOutcome};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper, RamPhysMapper};
