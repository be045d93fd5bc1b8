//! Major (full) garbage collection.
//!
//! Major GC uses a non-moving tri-color mark-sweep algorithm over the major
//! heap. It expects the minor heap to be empty, so every live block is old:
//! 1. Mark phase: trace from roots, marking reachable blocks black
//! 2. Finalize: run finalizers of registered custom blocks left white
//! 3. Sweep phase: turn white blocks blue (free), black blocks back to
//!    white, and release chunks with no live block left
//!
//! # Tri-Color Invariant
//!
//! - **White**: not yet visited (potentially unreachable)
//! - **Gray**: reachable, fields not yet scanned
//! - **Black**: reachable and all fields scanned
//! - **Blue**: free, left behind by an earlier sweep
//!
//! No black block points directly to a white one once marking finishes.
//!
//! ```text
//!   chunk:  [hdr|A ....][hdr|B ..][hdr|C ......][hdr|D .]
//!   mark:     black       white      black        white
//!   sweep:    white       blue       white        blue
//! ```
//!
//! A chunk whose blocks all end up blue is reset and its memory reused.

use super::minor::MinorResult;
use crate::custom::finalise;
use crate::header::{is_scannable, Header};
use crate::heap::GcHeap;
use crate::roots::RootStack;
use crate::value::Value;
use crate::GcColor;

use std::collections::VecDeque;

/// Result of a major collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MajorResult {
    /// The minor collection that preceded marking.
    pub minor: MinorResult,
    /// Blocks found reachable.
    pub objects_marked: usize,
    /// Words in reachable blocks, headers included.
    pub live_words: usize,
    /// Blocks reclaimed.
    pub objects_freed: usize,
    /// Words reclaimed, headers included.
    pub words_freed: usize,
    /// Custom block finalizers run.
    pub finalised: usize,
    /// Chunks emptied by the sweep.
    pub chunks_released: usize,
}

/// Mark-sweep collector for the major heap.
pub struct MajorCollector {
    /// Gray blocks: discovered but not yet scanned.
    worklist: VecDeque<Value>,
}

impl MajorCollector {
    /// Create a new major collector.
    #[inline]
    pub fn new() -> Self {
        Self {
            worklist: VecDeque::with_capacity(1024),
        }
    }

    /// Perform a full mark-sweep collection of the major heap.
    ///
    /// The minor heap must be empty.
    pub fn collect(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MajorResult {
        debug_assert!(heap.minor().is_empty(), "major collection with live young blocks");

        let mut result = MajorResult::default();
        self.worklist.clear();

        // Phase 1: mark from roots
        roots.for_each(|value| self.mark_gray(heap, value));

        // Phase 2: process worklist (gray → black)
        while let Some(block) = self.worklist.pop_front() {
            let header = unsafe { heap.header(block) };
            if is_scannable(header.tag()) {
                for i in 0..header.wosize() {
                    let field = unsafe { heap.read_field(block, i) };
                    self.mark_gray(heap, field);
                }
            }
            unsafe { heap.set_header(block, header.with_color(GcColor::Black)) };
            result.objects_marked += 1;
            result.live_words += header.whsize();
        }

        // Phase 3: finalize dead custom blocks before their memory goes
        let registered = heap.take_finalisable();
        let mut survivors = Vec::with_capacity(registered.len());
        for block in registered {
            if unsafe { heap.header(block) }.color() == GcColor::Black {
                survivors.push(block);
            } else if unsafe { finalise(block) } {
                result.finalised += 1;
            }
        }
        heap.restore_finalisable(survivors);

        // Phase 4: sweep
        heap.major_mut().for_each_chunk_mut(|chunk| {
            let mut live = 0;
            for block in chunk.objects() {
                // SAFETY: the chunk walk only yields block boundaries.
                let header_ptr = unsafe { block.header_ptr() };
                let header = Header::from_raw(unsafe { *header_ptr });
                match header.color() {
                    GcColor::Black => {
                        live += 1;
                        unsafe { *header_ptr = header.with_color(GcColor::White).raw() };
                    }
                    GcColor::White => {
                        result.objects_freed += 1;
                        result.words_freed += header.whsize();
                        unsafe { *header_ptr = header.with_color(GcColor::Blue).raw() };
                    }
                    GcColor::Blue | GcColor::Gray => {}
                }
            }
            if live == 0 && chunk.used_words() > 0 {
                chunk.reset();
                result.chunks_released += 1;
            }
        });

        heap.major_mut().clear_urgent();
        result
    }

    /// Mark an old block gray and queue it for scanning.
    ///
    /// Immediates, atoms and already marked blocks are ignored.
    #[inline]
    fn mark_gray(&mut self, heap: &mut GcHeap, value: Value) {
        if !heap.is_old(value) {
            return;
        }

        let header = unsafe { heap.header(value) };
        if header.color() != GcColor::White {
            return;
        }

        unsafe { heap.set_header(value, header.with_color(GcColor::Gray)) };
        self.worklist.push_back(value);
    }
}

impl Default for MajorCollector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
