//! The allocation protocol.
//!
//! [`Allocator`] is the heap context the runtime allocates through. It owns
//! the spaces, the root stack and the collector, and decides per request
//! where a block goes:
//!
//! - size 0: the shared atom for the tag, nothing is allocated;
//! - up to `max_young_wosize` fields: bump allocation in the minor heap,
//!   running a minor collection first if the minor heap is exhausted;
//! - larger: carved directly from the major heap, followed by the urgent
//!   collection check.
//!
//! Any allocating call may move every young block. References that must
//! survive one have to be registered in a [`RootScope`] first.

use crate::barrier::write_barrier;
use crate::collector::{
    CollectionKind, Collector, GenerationalCollector, MajorResult, MinorResult,
};
use crate::config::{ConfigError, GcConfig};
use crate::custom::{operations_of, payload_of, CustomOperations};
use crate::error::{fatal_error, FatalError};
use crate::header::{
    encode_header, is_scannable, string_length, Header, Tag, CUSTOM_TAG, STRING_TAG,
};
use crate::heap::{GcHeap, Reservation};
use crate::roots::{RootScope, RootStack};
use crate::stats::{GcStats, GcTimer};
use crate::value::{FieldAddr, Value, WORD_SIZE};
use crate::Generation;

use std::ptr::NonNull;
use std::rc::Rc;

/// A freshly allocated block, with the collection it triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocated {
    /// The new block.
    pub value: Value,
    /// The collection that ran inside the allocating call, if any.
    pub collection: Option<CollectionKind>,
}

/// Heap context: spaces, roots and collector of one independent heap.
///
/// Single-mutator by construction: the root stack is shared through an
/// `Rc`, so an allocator is neither `Send` nor `Sync`.
pub struct Allocator<C: Collector = GenerationalCollector> {
    pub(crate) heap: GcHeap,
    pub(crate) roots: Rc<RootStack>,
    pub(crate) collector: C,
}

impl Allocator<GenerationalCollector> {
    /// Create an allocator with the default collector.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid; see [`Allocator::try_new`].
    pub fn new(config: GcConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|err| panic!("invalid GC configuration: {}", err))
    }

    /// Create an allocator with the default collector, rejecting an
    /// invalid configuration.
    pub fn try_new(config: GcConfig) -> Result<Self, ConfigError> {
        Self::with_collector(config, GenerationalCollector::new())
    }
}

impl<C: Collector> Allocator<C> {
    /// Create an allocator driving a custom collector.
    pub fn with_collector(config: GcConfig, collector: C) -> Result<Self, ConfigError> {
        Ok(Self {
            heap: GcHeap::new(config)?,
            roots: Rc::new(RootStack::new()),
            collector,
        })
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a block of `wosize` fields tagged `tag`.
    ///
    /// Fields of scannable blocks read as [`Value::ZERO`]; the contents of
    /// no-scan blocks are unspecified. Out of memory is fatal.
    #[inline]
    pub fn allocate(&mut self, wosize: usize, tag: Tag) -> Value {
        self.alloc_reported(wosize, tag).value
    }

    /// Like [`allocate`](Self::allocate), also reporting whether a
    /// collection ran inside the call.
    pub fn alloc_reported(&mut self, wosize: usize, tag: Tag) -> Allocated {
        if wosize == 0 {
            return Allocated {
                value: self.heap.atom(tag),
                collection: None,
            };
        }

        if wosize <= self.heap.minor().max_young_wosize() {
            let (value, collection) = self.alloc_young(wosize, tag);
            if is_scannable(tag) {
                self.zero_fields(value, wosize);
            }
            Allocated { value, collection }
        } else {
            let value = self.alloc_shr(wosize, tag);
            if is_scannable(tag) {
                self.zero_fields(value, wosize);
            }
            let (value, collection) = self.check_urgent_gc(value);
            Allocated { value, collection }
        }
    }

    /// Allocate a young block without initializing its fields.
    ///
    /// # Safety
    ///
    /// `0 < wosize <= max_young_wosize`, and every field of a scannable
    /// block must be initialized before the next allocating call.
    #[inline]
    pub unsafe fn alloc_small(&mut self, wosize: usize, tag: Tag) -> Value {
        debug_assert!(wosize > 0, "alloc_small of an empty block");
        debug_assert!(
            wosize <= self.heap.minor().max_young_wosize(),
            "alloc_small of {} fields exceeds the young size limit",
            wosize
        );
        self.alloc_young(wosize, tag).0
    }

    /// Fast path: bump allocate `wosize + 1` words in the minor heap.
    ///
    /// An exhausted minor heap triggers a minor collection, followed by a
    /// major one if promotion made the major heap urgent.
    pub(crate) fn alloc_young(&mut self, wosize: usize, tag: Tag) -> (Value, Option<CollectionKind>) {
        let words = wosize + 1;
        let mut collection = None;

        let ptr = match self.heap.minor_mut().reserve(words) {
            Reservation::Reserved(ptr) => ptr,
            Reservation::Exhausted => {
                self.minor_collection();
                collection = Some(CollectionKind::Minor);
                if self.heap.major().is_urgent() {
                    self.major_collection();
                    collection = Some(CollectionKind::Major);
                }
                match self.heap.minor_mut().reserve(words) {
                    Reservation::Reserved(ptr) => ptr,
                    Reservation::Exhausted => fatal_error(FatalError::OutOfMemory {
                        space: Generation::Minor,
                        words,
                    }),
                }
            }
        };

        self.heap.stats().record_allocation(Generation::Minor, words);
        (self.stamp(ptr, wosize, tag), collection)
    }

    /// Slow path: carve `wosize + 1` words from the major heap.
    ///
    /// The caller must initialize the block and then run
    /// [`check_urgent_gc`](Self::check_urgent_gc).
    pub(crate) fn alloc_shr(&mut self, wosize: usize, tag: Tag) -> Value {
        let words = wosize + 1;
        let ptr = self.heap.major_mut().alloc(words).unwrap_or_else(|| {
            fatal_error(FatalError::OutOfMemory {
                space: Generation::Major,
                words,
            })
        });
        log::trace!("allocated {} words in the major heap (tag {})", words, tag);

        self.heap.stats().record_allocation(Generation::Major, words);
        self.stamp(ptr, wosize, tag)
    }

    /// Run a major collection if one became urgent, keeping `value` alive.
    ///
    /// `value` must be an initialized major block; it does not move, but is
    /// returned for symmetry with the young path.
    pub(crate) fn check_urgent_gc(&mut self, value: Value) -> (Value, Option<CollectionKind>) {
        if !self.heap.major().is_urgent() {
            return (value, None);
        }

        let scope = self.root_scope();
        let local = scope.root(value);
        self.major_collection();
        (scope.get(local), Some(CollectionKind::Major))
    }

    fn stamp(&mut self, ptr: NonNull<usize>, wosize: usize, tag: Tag) -> Value {
        // SAFETY: `ptr` heads a freshly reserved region of `wosize + 1` words.
        unsafe {
            *ptr.as_ptr() = encode_header(wosize, tag).raw();
            Value::from_field_ptr(NonNull::new_unchecked(ptr.as_ptr().add(1)))
        }
    }

    fn zero_fields(&mut self, value: Value, wosize: usize) {
        // SAFETY: `value` is a freshly stamped block of `wosize` fields.
        unsafe { std::ptr::write_bytes(value.field_ptr(0), 0, wosize) };
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Empty the minor heap now.
    pub fn minor_collection(&mut self) -> MinorResult {
        log::debug!(
            "minor collection: {} words in use, {} remembered fields",
            self.heap.minor().allocated_words(),
            self.heap.remembered_set().len()
        );

        let timer = GcTimer::start("minor");
        let result = self.collector.minor_collection(&mut self.heap, &self.roots);
        let elapsed = timer.stop();

        self.heap.stats().record_minor_gc(elapsed, result.words_promoted);
        log::debug!(
            "minor collection done: {} words promoted, {} freed in {:?}",
            result.words_promoted,
            result.words_freed(),
            elapsed
        );

        self.verify_after_collection();
        result
    }

    /// Empty the minor heap and collect the major heap now.
    pub fn major_collection(&mut self) -> MajorResult {
        log::debug!(
            "major collection: {} words allocated since the last one, {} chunks",
            self.heap.major().allocated_since_major(),
            self.heap.major().chunk_count()
        );

        let timer = GcTimer::start("major");
        let result = self.collector.major_collection(&mut self.heap, &self.roots);
        let elapsed = timer.stop();

        let stats = self.heap.stats();
        stats.record_promotion(result.minor.words_promoted);
        stats.record_major_gc(elapsed, result.words_freed, result.finalised);
        log::debug!(
            "major collection done: {} live words, {} freed, {} finalised in {:?}",
            result.live_words,
            result.words_freed,
            result.finalised,
            elapsed
        );

        self.verify_after_collection();
        result
    }

    fn verify_after_collection(&self) {
        if self.heap.config().verify_heap {
            let census = self.heap.verify();
            log::trace!("heap verified: {:?}", census);
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Store `value` into a field of an existing block.
    ///
    /// This is the only way to overwrite a field of a block that may
    /// already be shared; it records old→young stores in the remembered
    /// set.
    pub fn mutate_field(&mut self, addr: FieldAddr, value: Value) {
        let block = addr.block();
        let header = self.block_header(block);
        assert!(
            addr.index() < header.wosize(),
            "field {} out of bounds for a block of {} fields",
            addr.index(),
            header.wosize()
        );
        debug_assert!(
            is_scannable(header.tag()),
            "mutate_field on a no-scan block (tag {})",
            header.tag()
        );

        // SAFETY: bounds and ownership checked above.
        unsafe {
            let slot = NonNull::new_unchecked(block.field_ptr(addr.index()));
            write_barrier(&mut self.heap, slot, value);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Header of a block owned by this heap.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a block of this heap.
    fn block_header(&self, value: Value) -> Header {
        assert!(self.heap.owns(value), "{:?} is not a block of this heap", value);
        // SAFETY: ownership checked above.
        unsafe { self.heap.header(value) }
    }

    /// Number of fields of a block.
    pub fn wosize_of(&self, value: Value) -> usize {
        self.block_header(value).wosize()
    }

    /// Tag of a block.
    pub fn tag_of(&self, value: Value) -> Tag {
        self.block_header(value).tag()
    }

    /// Field `index` of a block.
    pub fn field(&self, value: Value, index: usize) -> Value {
        let wosize = self.wosize_of(value);
        assert!(index < wosize, "field {} out of bounds for a block of {} fields", index, wosize);
        // SAFETY: bounds and ownership checked above.
        unsafe { self.heap.read_field(value, index) }
    }

    /// Byte length of a string block.
    pub fn string_length(&self, value: Value) -> usize {
        let header = self.block_header(value);
        assert_eq!(header.tag(), STRING_TAG, "{:?} is not a string", value);
        let wosize = header.wosize();
        // SAFETY: a string's last byte holds its pad count.
        let pad = unsafe { *(value.field_ptr(0) as *const u8).add(wosize * WORD_SIZE - 1) };
        string_length(wosize, pad)
    }

    /// Contents of a string block.
    pub fn string_bytes(&self, value: Value) -> &[u8] {
        let len = self.string_length(value);
        // SAFETY: the first `len` bytes of a string are its contents, and
        // nothing can move or write it while `self` is borrowed.
        unsafe { std::slice::from_raw_parts(value.field_ptr(0) as *const u8, len) }
    }

    /// Operations table of a custom block.
    pub fn custom_ops(&self, value: Value) -> &'static CustomOperations {
        self.check_custom(value);
        // SAFETY: custom blocks hold their table in field 0.
        unsafe { operations_of(value) }
    }

    /// Payload of a custom block.
    pub fn custom_data(&self, value: Value) -> &[u8] {
        self.check_custom(value);
        // SAFETY: tag checked; the borrow of `self` excludes any writer.
        unsafe { payload_of(value) }
    }

    /// Mutable payload of a custom block.
    pub fn custom_data_mut(&mut self, value: Value) -> &mut [u8] {
        self.check_custom(value);
        // SAFETY: tag checked; the exclusive borrow of `self` excludes any
        // other access.
        unsafe { payload_of(value) }
    }

    fn check_custom(&self, value: Value) {
        let header = self.block_header(value);
        assert_eq!(header.tag(), CUSTOM_TAG, "{:?} is not a custom block", value);
        assert!(header.wosize() > 0, "custom atom has no operations");
    }

    /// Generation of a value, or None for immediates and atoms.
    #[inline]
    pub fn generation_of(&self, value: Value) -> Option<Generation> {
        self.heap.generation_of(value)
    }

    /// Check if a value points into the minor heap.
    #[inline]
    pub fn is_young(&self, value: Value) -> bool {
        self.heap.is_young(value)
    }

    /// The shared zero-size block for `tag`.
    #[inline]
    pub fn atom(&self, tag: Tag) -> Value {
        self.heap.atom(tag)
    }

    /// Open a root scope on this allocator's root stack.
    #[inline]
    pub fn root_scope(&self) -> RootScope {
        RootScope::new(&self.roots)
    }

    /// The root stack.
    pub fn roots(&self) -> &Rc<RootStack> {
        &self.roots
    }

    /// The heap spaces.
    pub fn heap(&self) -> &GcHeap {
        &self.heap
    }

    /// GC statistics.
    pub fn stats(&self) -> &GcStats {
        self.heap.stats()
    }

    /// The collector.
    pub fn collector(&self) -> &C {
        &self.collector
    }

    /// Mutable access to the collector.
    pub fn collector_mut(&mut self) -> &mut C {
        &mut self.collector
    }
}
