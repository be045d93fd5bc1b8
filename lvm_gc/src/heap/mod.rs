//! Heap memory management.
//!
//! The heap is divided into two generations plus static atoms:
//! - Minor heap: young generation with bump-pointer allocation
//! - Major heap: old generation carved from chunks, never moved
//! - Atom table: one zero-size block per tag, outside both generations
//!
//! [`GcHeap`] owns all of it, together with the remembered set, the
//! finalization table and statistics. It is an explicit context object:
//! two heaps never share state.

mod chunk;
mod major;
mod minor;

pub use chunk::{Chunk, ChunkObjects, ChunkState};
pub use major::MajorHeap;
pub use minor::{MinorHeap, Reservation};

use crate::barrier::RememberedSet;
use crate::config::{ConfigError, GcConfig};
use crate::error::{fatal_error, FatalError};
use crate::header::{is_scannable, AtomTable, Header, Tag};
use crate::stats::GcStats;
use crate::value::Value;
use crate::{GcColor, Generation};

use rustc_hash::FxHashSet;

/// Main heap structure managing all memory spaces.
pub struct GcHeap {
    /// Configuration parameters.
    config: GcConfig,

    /// Young generation.
    minor: MinorHeap,

    /// Old generation.
    major: MajorHeap,

    /// Shared zero-size blocks.
    atoms: AtomTable,

    /// Old-generation fields that hold young pointers.
    /// Filled by the write barrier and drained by minor collection.
    remembered_set: RememberedSet,

    /// Major custom blocks whose finalizer must run when they die.
    finalisable: Vec<Value>,

    /// GC statistics.
    stats: GcStats,
}

impl GcHeap {
    /// Create a new heap with the given configuration.
    pub fn new(config: GcConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let minor = MinorHeap::new(config.minor_heap_wsize, config.max_young_wosize)
            .unwrap_or_else(|| {
                fatal_error(FatalError::OutOfMemory {
                    space: Generation::Minor,
                    words: config.minor_heap_wsize,
                })
            });
        let major = MajorHeap::new(&config);

        Ok(Self {
            config,
            minor,
            major,
            atoms: AtomTable::new(),
            remembered_set: RememberedSet::new(),
            finalisable: Vec::new(),
            stats: GcStats::new(),
        })
    }

    // =========================================================================
    // Space Queries
    // =========================================================================

    /// Check if a value points into the minor heap.
    #[inline]
    pub fn is_young(&self, value: Value) -> bool {
        value.is_block() && self.minor.contains(value.raw())
    }

    /// Check if a value points into the major heap.
    #[inline]
    pub fn is_old(&self, value: Value) -> bool {
        value.is_block() && self.major.contains(value.raw())
    }

    /// Get the generation of a value, or None for immediates and atoms.
    pub fn generation_of(&self, value: Value) -> Option<Generation> {
        if self.is_young(value) {
            Some(Generation::Minor)
        } else if self.is_old(value) {
            Some(Generation::Major)
        } else {
            None
        }
    }

    /// Check if a value is a block managed by this heap, atoms included.
    pub fn owns(&self, value: Value) -> bool {
        self.is_young(value) || self.is_old(value) || self.atoms.contains(value)
    }

    /// The shared zero-size block for `tag`.
    #[inline]
    pub fn atom(&self, tag: Tag) -> Value {
        self.atoms.get(tag)
    }

    // =========================================================================
    // Raw Block Access
    // =========================================================================

    /// Read the header of a block.
    ///
    /// # Safety
    ///
    /// `value` must be a block owned by this heap.
    #[inline]
    pub(crate) unsafe fn header(&self, value: Value) -> Header {
        Header::from_raw(*value.header_ptr())
    }

    /// Overwrite the header of a block.
    ///
    /// # Safety
    ///
    /// `value` must be a block of the minor or major heap, and the new
    /// header must describe the same number of words.
    #[inline]
    pub(crate) unsafe fn set_header(&mut self, value: Value, header: Header) {
        debug_assert!(!self.atoms.contains(value), "atoms are immutable");
        *value.header_ptr() = header.raw();
    }

    /// Read field `index` of a block.
    ///
    /// # Safety
    ///
    /// `value` must be a block owned by this heap with more than `index`
    /// fields.
    #[inline]
    pub(crate) unsafe fn read_field(&self, value: Value, index: usize) -> Value {
        Value::from_raw(*value.field_ptr(index))
    }

    /// Store into a field without the write barrier.
    ///
    /// Only legal while initializing a block that nothing else references
    /// yet, or for the collector itself.
    ///
    /// # Safety
    ///
    /// `value` must be a block owned by this heap with more than `index`
    /// fields.
    #[inline]
    pub(crate) unsafe fn init_field(&mut self, value: Value, index: usize, field: Value) {
        *value.field_ptr(index) = field.raw();
    }

    /// Register a major custom block for finalization.
    pub(crate) fn register_finalisable(&mut self, value: Value) {
        debug_assert!(self.is_old(value));
        self.finalisable.push(value);
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Walk the major heap and check its invariants.
    ///
    /// Panics if a block is left gray, or if a live old block holds a young
    /// pointer in a field the remembered set does not know about.
    pub fn verify(&self) -> HeapCensus {
        let remembered: FxHashSet<usize> = self
            .remembered_set
            .entries()
            .iter()
            .map(|entry| entry.slot)
            .collect();

        let mut census = HeapCensus::default();
        for block in self.major.objects() {
            let header = unsafe { self.header(block) };
            assert_ne!(header.color(), GcColor::Gray, "gray block {:?} outside a collection", block);
            assert!(header.wosize() > 0, "zero-size block {:?} in the major heap", block);

            if header.color() == GcColor::Blue {
                census.free_words += header.whsize();
                continue;
            }

            census.live_blocks += 1;
            census.live_words += header.whsize();

            if is_scannable(header.tag()) {
                for i in 0..header.wosize() {
                    let field = unsafe { self.read_field(block, i) };
                    if self.is_young(field) {
                        let slot = unsafe { block.field_ptr(i) } as usize;
                        assert!(
                            remembered.contains(&slot),
                            "old block {:?} field {} points to young {:?} without a remembered entry",
                            block,
                            i,
                            field
                        );
                    }
                }
            }
        }
        census
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Get GC statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Get the minor heap.
    pub fn minor(&self) -> &MinorHeap {
        &self.minor
    }

    /// Get mutable minor heap access.
    pub fn minor_mut(&mut self) -> &mut MinorHeap {
        &mut self.minor
    }

    /// Get the major heap.
    pub fn major(&self) -> &MajorHeap {
        &self.major
    }

    /// Get mutable major heap access.
    pub fn major_mut(&mut self) -> &mut MajorHeap {
        &mut self.major
    }

    /// Get the remembered set.
    #[inline]
    pub fn remembered_set(&self) -> &RememberedSet {
        &self.remembered_set
    }

    /// Get mutable remembered set access.
    #[inline]
    pub fn remembered_set_mut(&mut self) -> &mut RememberedSet {
        &mut self.remembered_set
    }

    /// Major custom blocks awaiting finalization.
    pub fn finalisable(&self) -> &[Value] {
        &self.finalisable
    }

    /// Take the finalization table, leaving it empty.
    pub fn take_finalisable(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.finalisable)
    }

    /// Put back the finalization table after a collection.
    pub fn restore_finalisable(&mut self, survivors: Vec<Value>) {
        debug_assert!(self.finalisable.is_empty());
        self.finalisable = survivors;
    }
}

/// Summary of the major heap produced by [`GcHeap::verify`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapCensus {
    /// Blocks not marked free.
    pub live_blocks: usize,
    /// Words in live blocks, headers included.
    pub live_words: usize,
    /// Words in free blocks, headers included.
    pub free_words: usize,
}
