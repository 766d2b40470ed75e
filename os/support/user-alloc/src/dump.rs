//! Read-only views of the heap for diagnostics and tests.

extern crate alloc;

use crate::arena::Arena;
use crate::block::{HEADER_SIZE, label_str};
use crate::heap::{Heap, HeapError, HeapPtr, corrupted};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use kernel_info::heap::HEAP_NAME_LEN;

/// A snapshot of one block.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockInfo {
    /// Address of the block header.
    pub start: usize,
    /// One past the last byte of the block.
    pub end: usize,
    /// Total size including the header.
    pub size: usize,
    pub free: bool,
    pub name: [u8; HEAP_NAME_LEN],
    offset: usize,
}

impl BlockInfo {
    /// The debug label, if one was set.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        Some(label_str(&self.name)).filter(|s| !s.is_empty())
    }

    /// The pointer the block's payload was (or would be) handed out as.
    #[must_use]
    pub const fn payload(&self) -> HeapPtr {
        HeapPtr(self.offset + HEADER_SIZE)
    }
}

/// `[BLOCK 0x4000-0x40b0] 176\t[USED] (name)`
impl fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[BLOCK {:#x}-{:#x}] {}\t[{}]",
            self.start,
            self.end,
            self.size,
            if self.free { "FREE" } else { "USED" }
        )?;
        if let Some(label) = self.label() {
            write!(f, " ({label})")?;
        }
        Ok(())
    }
}

struct Dump {
    blocks: Vec<BlockInfo>,
    free: Vec<BlockInfo>,
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        writeln!(f)?;
        for block in &self.free {
            write!(f, "[{:#x}] -> ", block.start)?;
        }
        writeln!(f, "NULL")
    }
}

impl<A: Arena> Heap<A> {
    /// Every block in address order.
    ///
    /// # Errors
    /// [`HeapError::Corrupted`] if the block list is broken.
    pub fn blocks(&self) -> Result<Vec<BlockInfo>, HeapError> {
        let bound = self.walk_bound();
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(at) = cursor {
            if out.len() >= bound {
                return Err(corrupted(at, "block list cycle"));
            }
            out.push(self.info(at)?);
            cursor = self.header(at)?.next;
        }
        Ok(out)
    }

    /// Free blocks in free-list order.
    ///
    /// # Errors
    /// [`HeapError::Corrupted`] if the free list is broken.
    pub fn free_blocks(&self) -> Result<Vec<BlockInfo>, HeapError> {
        let bound = self.walk_bound();
        let mut out = Vec::new();
        let mut cursor = self.free_head;
        while let Some(at) = cursor {
            if out.len() >= bound {
                return Err(corrupted(at, "free list cycle"));
            }
            out.push(self.info(at)?);
            cursor = self.links(at)?.next;
        }
        Ok(out)
    }

    /// Render the heap as text: one line per block, a blank line, then the
    /// free list.
    ///
    /// ```text
    /// [BLOCK 0x4000-0x40b0] 176	[USED] (A)
    /// [BLOCK 0x40b0-0x5000] 3920	[FREE]
    ///
    /// [0x40b0] -> NULL
    /// ```
    ///
    /// # Errors
    /// [`HeapError::Corrupted`] if either list is broken.
    pub fn dump(&self) -> Result<String, HeapError> {
        let dump = Dump {
            blocks: self.blocks()?,
            free: self.free_blocks()?,
        };
        Ok(dump.to_string())
    }

    fn info(&self, at: usize) -> Result<BlockInfo, HeapError> {
        let h = self.header(at)?;
        let start = self.arena.base() + at;
        Ok(BlockInfo {
            start,
            end: start + h.size(),
            size: h.size(),
            free: h.is_free(),
            name: h.name,
            offset: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::VecArena;

    #[test]
    fn empty_heap_dumps_only_the_terminator() {
        let h = Heap::new(VecArena::default());
        assert_eq!(h.dump().unwrap(), "\nNULL\n");
    }

    #[test]
    fn dump_lists_blocks_then_free_list() {
        let mut h = Heap::new(VecArena::new(0x4000, usize::MAX));
        let a = h.malloc(132).unwrap().unwrap();
        h.name(a, "A").unwrap();
        assert_eq!(
            h.dump().unwrap(),
            "[BLOCK 0x4000-0x40b0] 176\t[USED] (A)\n\
             [BLOCK 0x40b0-0x5000] 3920\t[FREE]\n\
             \n\
             [0x40b0] -> NULL\n"
        );
    }

    #[test]
    fn unnamed_block_has_no_label() {
        let mut h = Heap::new(VecArena::default());
        h.malloc(8).unwrap();
        let blocks = h.blocks().unwrap();
        assert_eq!(blocks[0].label(), None);
        assert!(!blocks[0].to_string().contains('('));
    }
}
