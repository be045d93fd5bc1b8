//! Major heap (old generation).
//!
//! The major heap is a list of chunks carved front to back. It never moves
//! objects. Besides handing out memory it keeps the pacing state that
//! decides when a major collection becomes urgent:
//!
//! - words allocated since the last major collection, directly or by
//!   promotion, compared against `major_urgent_wsize`;
//! - the accumulated `used / max` resource ratio of custom blocks,
//!   compared against `custom_resource_limit`.

use super::chunk::{Chunk, ChunkState};
use crate::config::GcConfig;
use crate::value::Value;

use std::ptr::NonNull;

/// The old generation.
pub struct MajorHeap {
    /// Chunks in allocation order.
    chunks: Vec<Chunk>,
    /// Chunk tried first.
    current_chunk: usize,
    /// Size of new chunks, in words.
    chunk_wsize: usize,
    /// Cap on total capacity, in words. 0 means unlimited.
    max_wsize: usize,
    /// Total capacity of all chunks, in words.
    capacity: usize,
    /// Words allocated since the last major collection.
    allocated_since_major: usize,
    /// Watermark for `allocated_since_major`.
    urgent_wsize: usize,
    /// Accumulated custom block resource ratio.
    extra_resources: f64,
    /// Watermark for `extra_resources`.
    resource_limit: f64,
    /// A major collection was requested and has not run yet.
    urgent: bool,
}

impl MajorHeap {
    /// Create an empty major heap paced by `config`.
    ///
    /// Chunks are added on first use.
    pub fn new(config: &GcConfig) -> Self {
        Self {
            chunks: Vec::new(),
            current_chunk: 0,
            chunk_wsize: config.major_chunk_wsize,
            max_wsize: config.max_major_wsize,
            capacity: 0,
            allocated_since_major: 0,
            urgent_wsize: config.major_urgent_wsize,
            extra_resources: 0.0,
            resource_limit: config.custom_resource_limit,
            urgent: false,
        }
    }

    /// Carve `words` words for a block, header included.
    ///
    /// Returns None when the heap cannot grow any further.
    pub fn alloc(&mut self, words: usize) -> Option<NonNull<usize>> {
        let ptr = match self.chunks.get_mut(self.current_chunk) {
            Some(chunk) => chunk.alloc(words),
            None => None,
        };
        let ptr = match ptr {
            Some(ptr) => ptr,
            None => self.alloc_slow(words)?,
        };

        self.allocated_since_major += words;
        if self.allocated_since_major >= self.urgent_wsize {
            self.urgent = true;
        }
        Some(ptr)
    }

    /// Slow path: search for a chunk with room or add a new one.
    fn alloc_slow(&mut self, words: usize) -> Option<NonNull<usize>> {
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            if chunk.state() != ChunkState::Full {
                if let Some(ptr) = chunk.alloc(words) {
                    self.current_chunk = i;
                    return Some(ptr);
                }
            }
        }

        let wsize = self.chunk_wsize.max(words);
        if self.max_wsize != 0 && self.capacity + wsize > self.max_wsize {
            log::warn!(
                "major heap limit reached: {} + {} words exceeds {}",
                self.capacity,
                wsize,
                self.max_wsize
            );
            return None;
        }

        let mut chunk = Chunk::new(wsize)?;
        let ptr = chunk.alloc(words)?;
        log::trace!("major heap grew by a chunk of {} words", wsize);

        self.capacity += wsize;
        self.current_chunk = self.chunks.len();
        self.chunks.push(chunk);
        Some(ptr)
    }

    /// Account for the external resources held by a custom block.
    ///
    /// `used / max` of the budget is consumed; once the budget exceeds the
    /// configured limit a major collection becomes urgent.
    pub fn adjust_gc_speed(&mut self, used: usize, max: usize) {
        let max = max.max(1);
        let used = used.min(max);
        self.extra_resources += used as f64 / max as f64;
        if self.extra_resources > self.resource_limit {
            self.extra_resources = self.resource_limit;
            self.urgent = true;
        }
    }

    /// Check if a major collection should run before returning to the
    /// mutator.
    #[inline]
    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    /// Reset pacing after a major collection.
    pub fn clear_urgent(&mut self) {
        self.urgent = false;
        self.allocated_since_major = 0;
        self.extra_resources = 0.0;
    }

    /// Check if an address is in the major heap.
    pub fn contains(&self, addr: usize) -> bool {
        self.chunks.iter().any(|chunk| chunk.contains(addr))
    }

    /// Total capacity in words.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Words in use, free blocks included.
    pub fn used_words(&self) -> usize {
        self.chunks.iter().map(Chunk::used_words).sum()
    }

    /// Words allocated since the last major collection.
    #[inline]
    pub fn allocated_since_major(&self) -> usize {
        self.allocated_since_major
    }

    /// Accumulated custom resource ratio.
    #[inline]
    pub fn extra_resources(&self) -> f64 {
        self.extra_resources
    }

    /// Number of chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Iterate over every block of every chunk.
    pub fn objects(&self) -> impl Iterator<Item = Value> + '_ {
        self.chunks.iter().flat_map(Chunk::objects)
    }

    /// Iterate over all chunks mutably.
    pub fn for_each_chunk_mut<F>(&mut self, f: F)
    where
        F: FnMut(&mut Chunk),
    {
        self.chunks.iter_mut().for_each(f);
        self.current_chunk = 0;
    }
}
