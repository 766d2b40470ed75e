//! # Memory Subsystem Configuration
//!
//! This crate is the single source of truth for the constants shared by the
//! physical frame allocator (`kernel-alloc`) and the user heap allocator
//! (`user-alloc`). Everything here is a compile-time `const`, checked by
//! `const` assertions so that an inconsistent layout fails the build instead
//! of corrupting memory at runtime.
//!
//! ## Modules
//!
//! ### Physical Memory ([`memory`])
//! * **Frame Size**: The unit handed out by the frame allocator
//! * **Pool Bounds**: `KERNBASE`..`PHYSTOP`, the RAM window the kernel owns
//! * **Direct Map**: `HHDM_BASE`, used to write into physical frames
//! * **Sentinel Patterns**: Bytes written on allocation and on release
//!
//! ### User Heap ([`heap`])
//! * **Alignment**: Every block size is a multiple of [`heap::HEAP_ALIGN`]
//! * **Growth Granularity**: The arena grows by at least one page
//! * **Debug Labels**: Capacity of the per-block name field
//! * **Poisoning**: Byte written into released payloads
//!
//! ## Physical Memory Layout
//!
//! ```text
//! KERNBASE    ┌─────────────────────────────────┐ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! end         ├─────────────────────────────────┤ (first frame boundary after the image)
//!             │    Frame Pool                   │
//!             │  (Managed by kernel-alloc)      │
//! PHYSTOP     └─────────────────────────────────┘ 0x8800_0000
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod heap;
pub mod memory;
