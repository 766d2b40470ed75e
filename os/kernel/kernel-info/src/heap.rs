//! # User Heap Layout

/// Alignment of every heap block and payload, in bytes.
///
/// Block sizes are multiples of this value, which leaves the low bits of the
/// stored size free to carry the block's free flag.
pub const HEAP_ALIGN: usize = 16;

/// Smallest amount the heap arena grows by.
pub const HEAP_GROW_MIN: usize = 4096;

/// Capacity of a block's debug label, including the terminating NUL.
pub const HEAP_NAME_LEN: usize = 8;

/// Smallest payload a split-off remainder block must be able to hold.
pub const HEAP_MIN_PAYLOAD: usize = 16;

/// Byte written over released payloads when poisoning is enabled.
pub const HEAP_POISON: u8 = 0xA5;

const _: () = {
    assert!(HEAP_ALIGN.is_power_of_two());
    assert!(HEAP_GROW_MIN.is_multiple_of(HEAP_ALIGN));
    assert!(HEAP_MIN_PAYLOAD.is_multiple_of(HEAP_ALIGN));
    assert!(HEAP_NAME_LEN >= 2);
};
