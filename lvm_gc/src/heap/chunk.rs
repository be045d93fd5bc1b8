//! Memory chunks backing the major heap.
//!
//! A chunk is a contiguous run of words filled front to back with blocks
//! (header followed by fields). Because every header records its size, a
//! chunk can be walked object by object, which is how the sweeper and the
//! heap verifier visit the major heap.

use crate::header::Header;
use crate::value::Value;

use std::alloc::Layout;
use std::ptr::NonNull;

/// Chunk state for allocation and sweep logic.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Nothing allocated.
    Empty = 0,
    /// Some words allocated, room left.
    Partial = 1,
    /// Too little room left for any block.
    Full = 2,
}

/// Smallest block a chunk can hold: a header and one field.
const MIN_BLOCK_WORDS: usize = 2;

/// A chunk of the major heap.
pub struct Chunk {
    /// First word of the chunk.
    start: NonNull<usize>,
    /// Capacity in words.
    wsize: usize,
    /// Words handed out so far.
    used: usize,
    /// Allocation state.
    state: ChunkState,
}

impl Chunk {
    /// Allocate a zeroed chunk of `wsize` words.
    pub fn new(wsize: usize) -> Option<Self> {
        let layout = Layout::array::<usize>(wsize).ok()?;
        let start = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) } as *mut usize)?;

        Some(Self {
            start,
            wsize,
            used: 0,
            state: ChunkState::Empty,
        })
    }

    /// Carve `words` words from the chunk.
    ///
    /// Returns None if there's not enough space. A failed request leaves
    /// the chunk open for smaller ones.
    pub fn alloc(&mut self, words: usize) -> Option<NonNull<usize>> {
        if self.free_words() < words {
            return None;
        }

        let ptr = unsafe { self.start.as_ptr().add(self.used) };
        self.used += words;
        self.state = if self.free_words() < MIN_BLOCK_WORDS {
            ChunkState::Full
        } else {
            ChunkState::Partial
        };
        NonNull::new(ptr)
    }

    /// Check if an address is within the chunk.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.start.as_ptr() as usize;
        let end = start + self.wsize * crate::value::WORD_SIZE;
        addr >= start && addr < end
    }

    /// Capacity in words.
    #[inline]
    pub fn wsize(&self) -> usize {
        self.wsize
    }

    /// Words handed out.
    #[inline]
    pub fn used_words(&self) -> usize {
        self.used
    }

    /// Words left.
    #[inline]
    pub fn free_words(&self) -> usize {
        self.wsize - self.used
    }

    /// Allocation state.
    #[inline]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Walk the blocks of this chunk in address order.
    pub fn objects(&self) -> ChunkObjects<'_> {
        ChunkObjects {
            chunk: self,
            offset: 0,
        }
    }

    /// Forget every block and zero the memory for reuse.
    pub fn reset(&mut self) {
        unsafe {
            std::ptr::write_bytes(self.start.as_ptr(), 0, self.used);
        }
        self.used = 0;
        self.state = ChunkState::Empty;
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::array::<usize>(self.wsize) {
            unsafe {
                std::alloc::dealloc(self.start.as_ptr() as *mut u8, layout);
            }
        }
    }
}

/// Iterator over the blocks of a chunk, yielding block values.
pub struct ChunkObjects<'a> {
    chunk: &'a Chunk,
    offset: usize,
}

impl Iterator for ChunkObjects<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.offset >= self.chunk.used {
            return None;
        }

        // SAFETY: offset is below `used`, and every used word belongs to a
        // block whose header starts at a block boundary.
        let header_ptr = unsafe { self.chunk.start.as_ptr().add(self.offset) };
        let header = Header::from_raw(unsafe { *header_ptr });
        self.offset += header.whsize();

        let field_ptr = unsafe { NonNull::new_unchecked(header_ptr.add(1)) };
        Some(Value::from_field_ptr(field_ptr))
    }
}
