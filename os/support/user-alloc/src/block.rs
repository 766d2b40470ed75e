//! On-arena block header layout.
//!
//! ```text
//! block ─► +0  ┌──────────────────────────┐
//!              │ name   [u8; 8]           │ NUL-terminated debug label
//!          +8  ├──────────────────────────┤
//!              │ size   SizeWord (u64)    │ total size | free bit
//!          +16 ├──────────────────────────┤
//!              │ next   u64               │ next block in address order
//!          +24 ├──────────────────────────┤
//!              │ prev   u64               │ previous block in address order
//!          +32 ├──────────────────────────┤ ◄─ payload
//!              │ free_next / free_prev    │ only while the block is free
//!          +48 ├──────────────────────────┤
//!              │ ...                      │
//!              └──────────────────────────┘
//! ```
//!
//! Links are arena offsets; `u64::MAX` encodes "none".

use bitfield_struct::bitfield;
use kernel_info::heap::{HEAP_ALIGN, HEAP_MIN_PAYLOAD, HEAP_NAME_LEN};

/// Bytes taken by a block header in front of every payload.
pub const HEADER_SIZE: usize = 32;

/// Smallest block that can exist on its own: a header plus the minimum payload.
///
/// The minimum payload also has room for the free-list links.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + HEAP_MIN_PAYLOAD;

const NAME_AT: usize = 0;
const SIZE_AT: usize = 8;
const NEXT_AT: usize = 16;
const PREV_AT: usize = 24;
const FREE_NEXT_AT: usize = HEADER_SIZE;
const FREE_PREV_AT: usize = HEADER_SIZE + 8;

const NIL: u64 = u64::MAX;

const _: () = {
    assert!(HEADER_SIZE.is_multiple_of(HEAP_ALIGN));
    assert!(HEAP_NAME_LEN <= SIZE_AT - NAME_AT);
    assert!(FREE_PREV_AT + 8 <= MIN_BLOCK_SIZE);
};

/// The stored size of a block.
///
/// Sizes are multiples of 16, so the low four bits never carry magnitude.
/// Bit 0 is the free flag; the magnitude is kept in 16-byte granules.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct SizeWord {
    /// Block is free (on the free list).
    pub free: bool,
    #[bits(3)]
    __: u8,
    /// Total block size in 16-byte granules.
    #[bits(60)]
    granules: u64,
}

impl SizeWord {
    #[must_use]
    pub const fn sized(bytes: usize, free: bool) -> Self {
        Self::new()
            .with_granules((bytes / HEAP_ALIGN) as u64)
            .with_free(free)
    }

    /// Total block size in bytes, flag bits masked off.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.granules() as usize * HEAP_ALIGN
    }
}

/// Decoded block header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: [u8; HEAP_NAME_LEN],
    pub size: SizeWord,
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl Header {
    /// A fresh, unnamed header.
    #[must_use]
    pub const fn new(size: usize, free: bool, prev: Option<usize>, next: Option<usize>) -> Self {
        Self {
            name: [0; HEAP_NAME_LEN],
            size: SizeWord::sized(size, free),
            next,
            prev,
        }
    }

    /// Decode the header stored at `at`. The caller has bounds-checked `at`.
    #[must_use]
    pub fn read(bytes: &[u8], at: usize) -> Self {
        let mut name = [0; HEAP_NAME_LEN];
        name.copy_from_slice(&bytes[at + NAME_AT..at + NAME_AT + HEAP_NAME_LEN]);
        Self {
            name,
            size: SizeWord::from_bits(read_u64(bytes, at + SIZE_AT)),
            next: decode_link(read_u64(bytes, at + NEXT_AT)),
            prev: decode_link(read_u64(bytes, at + PREV_AT)),
        }
    }

    pub fn write(&self, bytes: &mut [u8], at: usize) {
        bytes[at + NAME_AT..at + NAME_AT + HEAP_NAME_LEN].copy_from_slice(&self.name);
        write_u64(bytes, at + SIZE_AT, self.size.into_bits());
        write_u64(bytes, at + NEXT_AT, encode_link(self.next));
        write_u64(bytes, at + PREV_AT, encode_link(self.prev));
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size.bytes()
    }

    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.size.free()
    }

    /// Change the magnitude, keeping the free flag.
    #[inline]
    pub const fn set_size(&mut self, bytes: usize) {
        self.size = SizeWord::sized(bytes, self.size.free());
    }

    #[inline]
    pub fn set_free(&mut self, free: bool) {
        self.size.set_free(free);
    }

    /// Store `label` truncated to leave room for the terminating NUL.
    pub fn set_name(&mut self, label: &str) {
        self.name = [0; HEAP_NAME_LEN];
        let n = label.len().min(HEAP_NAME_LEN - 1);
        self.name[..n].copy_from_slice(&label.as_bytes()[..n]);
    }

    pub const fn clear_name(&mut self) {
        self.name = [0; HEAP_NAME_LEN];
    }
}

/// Free-list links, kept in the first payload bytes of a free block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeLinks {
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl FreeLinks {
    #[must_use]
    pub fn read(bytes: &[u8], block: usize) -> Self {
        Self {
            next: decode_link(read_u64(bytes, block + FREE_NEXT_AT)),
            prev: decode_link(read_u64(bytes, block + FREE_PREV_AT)),
        }
    }

    pub fn write(&self, bytes: &mut [u8], block: usize) {
        write_u64(bytes, block + FREE_NEXT_AT, encode_link(self.next));
        write_u64(bytes, block + FREE_PREV_AT, encode_link(self.prev));
    }
}

/// The label bytes up to the first NUL, as text.
///
/// A label cut in the middle of a multi-byte character keeps its valid prefix.
#[must_use]
pub fn label_str(name: &[u8]) -> &str {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    match core::str::from_utf8(&name[..end]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&name[..e.valid_up_to()]).unwrap_or_default(),
    }
}

/// Round `n` up to the block alignment; `None` on overflow.
#[inline]
#[must_use]
pub const fn align_up(n: usize) -> Option<usize> {
    match n.checked_add(HEAP_ALIGN - 1) {
        Some(v) => Some(v & !(HEAP_ALIGN - 1)),
        None => None,
    }
}

/// Total block size needed to serve a `request`-byte payload.
#[inline]
#[must_use]
pub const fn block_size_for(request: usize) -> Option<usize> {
    match align_up(request) {
        Some(payload) => payload.checked_add(HEADER_SIZE),
        None => None,
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn write_u64(bytes: &mut [u8], at: usize, v: u64) {
    bytes[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

const fn encode_link(link: Option<usize>) -> u64 {
    match link {
        Some(off) => off as u64,
        None => NIL,
    }
}

const fn decode_link(raw: u64) -> Option<usize> {
    if raw == NIL { None } else { Some(raw as usize) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_word_keeps_flag_out_of_magnitude() {
        let mut w = SizeWord::sized(176, false);
        assert_eq!(w.into_bits(), 176);
        w.set_free(true);
        assert_eq!(w.into_bits(), 177);
        assert_eq!(w.bytes(), 176);
        w.set_free(false);
        assert_eq!(w.into_bits(), 176);
    }

    #[test]
    fn header_encodes_in_place() {
        let mut arena = [0xEE_u8; 96];
        let mut h = Header::new(64, true, None, Some(64));
        h.set_name("block");
        h.write(&mut arena, 0);

        let back = Header::read(&arena, 0);
        assert_eq!(back, h);
        assert_eq!(&arena[8..16], &65_u64.to_le_bytes());
        assert_eq!(&arena[24..32], &u64::MAX.to_le_bytes());
        assert_eq!(label_str(&back.name), "block");
    }

    #[test]
    fn long_names_are_truncated_and_terminated() {
        let mut h = Header::new(48, false, None, None);
        h.set_name("averylonglabel");
        assert_eq!(h.name[HEAP_NAME_LEN - 1], 0);
        assert_eq!(label_str(&h.name), "averylo");
    }

    #[test]
    fn truncated_multibyte_label_keeps_valid_prefix() {
        let mut h = Header::new(48, false, None, None);
        h.set_name("abcdeä");
        // 'ä' is two bytes; only the first fits before the NUL.
        assert_eq!(label_str(&h.name), "abcde");
    }

    #[test]
    fn block_sizes_round_to_sixteen() {
        assert_eq!(block_size_for(1), Some(HEADER_SIZE + 16));
        assert_eq!(block_size_for(42), Some(HEADER_SIZE + 48));
        assert_eq!(block_size_for(132), Some(HEADER_SIZE + 144));
        assert_eq!(block_size_for(3132), Some(HEADER_SIZE + 3136));
        assert_eq!(block_size_for(usize::MAX), None);
    }
}
