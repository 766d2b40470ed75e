//! # Physical Memory Layout

/// Size of one physical page frame in bytes.
pub const FRAME_SIZE: u64 = 4096;

/// log2([`FRAME_SIZE`]).
pub const FRAME_SHIFT: u32 = 12;

/// First byte of RAM owned by the kernel. The kernel image is loaded here.
pub const KERNBASE: u64 = 0x8000_0000;

/// End of usable RAM (exclusive): 128 MiB above [`KERNBASE`].
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Higher Half Direct Map (HHDM) base.
/// Physical address `pa` is reachable at `HHDM_BASE + pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Byte pattern written over a frame when it is handed out.
///
/// Non-zero so that code reading memory it never initialized sees garbage.
pub const ALLOC_FILL: u8 = 0x05;

/// Byte pattern written over a frame when its last reference is dropped.
///
/// Distinct from [`ALLOC_FILL`] so dangling accesses can be told apart from
/// reads of fresh, uninitialized frames.
pub const FREE_FILL: u8 = 0x01;

const _: () = {
    assert!(FRAME_SIZE == 1 << FRAME_SHIFT);
    assert!(KERNBASE.is_multiple_of(FRAME_SIZE));
    assert!(PHYSTOP.is_multiple_of(FRAME_SIZE));
    assert!(PHYSTOP > KERNBASE);
    assert!(ALLOC_FILL != 0 && FREE_FILL != 0 && ALLOC_FILL != FREE_FILL);
};
