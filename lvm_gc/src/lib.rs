//! LVM Garbage Collector
//!
//! The allocation front end of a generational, moving garbage collector for
//! a runtime whose values are tagged machine words.
//!
//! # Architecture
//!
//! The heap has two generations plus static atoms:
//!
//! - **Minor heap (young generation)**: bump-pointer allocation for blocks of
//!   up to `max_young_wosize` fields. When it fills up, a minor collection
//!   promotes every reachable young block into the major heap.
//!
//! - **Major heap (old generation)**: blocks carved from chunks, never
//!   moved. Large blocks are allocated here directly.
//!
//! - **Atoms**: one shared zero-size block per tag, returned for every
//!   zero-size request.
//!
//! # Safety discipline
//!
//! Any allocating call may run a collection and move young blocks. Two
//! rules keep the heap consistent:
//!
//! - References that must survive an allocating call live in a
//!   [`RootScope`] and are re-read through their [`Local`] handle.
//! - Fields of existing blocks are only overwritten with
//!   [`Allocator::mutate_field`], which records old→young pointers in the
//!   remembered set.
//!
//! # Usage
//!
//! ```
//! use lvm_gc::{Allocator, GcConfig, Value};
//!
//! let mut heap = Allocator::new(GcConfig::default());
//! let scope = heap.root_scope();
//!
//! let list = scope.root(heap.tuple(2));
//! let name = heap.copy_str(Some("lvm"));
//! heap.mutate_field(scope.get(list).field(0), name);
//! heap.mutate_field(scope.get(list).field(1), Value::int(0));
//!
//! assert_eq!(heap.string_bytes(heap.field(scope.get(list), 0)), b"lvm");
//! ```
//!
//! Out of memory and a mismatched [`Allocator::patch`] are fatal: they are
//! logged and the process panics (aborting in release builds).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod collector;
pub mod config;
pub mod custom;
pub mod error;
pub mod header;
pub mod heap;
pub mod roots;
pub mod value;

mod alloc;
mod construct;
mod stats;

// Re-exports for convenient access
pub use alloc::{Allocated, Allocator};
pub use collector::{CollectionKind, Collector, GenerationalCollector, MajorResult, MinorResult};
pub use config::{ConfigError, GcConfig};
pub use custom::{finalizer_operations, CustomOperations};
pub use error::FatalError;
pub use header::{
    Tag, ABSTRACT_TAG, CLOSURE_TAG, CUSTOM_TAG, DOUBLE_ARRAY_TAG, DOUBLE_TAG, FORWARD_TAG,
    NO_SCAN_TAG, STRING_TAG, TUPLE_TAG,
};
pub use heap::GcHeap;
pub use roots::{Local, RootScope, RootStack};
pub use stats::GcStats;
pub use value::{FieldAddr, Value, WORD_SIZE};

/// GC color stored in the two header bits above the tag.
///
/// Marking moves reachable blocks White → Gray → Black; sweeping turns
/// Black back to White and leaves unreachable blocks Blue (free).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcColor {
    /// Not yet visited (potentially dead).
    White = 0,
    /// In the work queue (reachable, children not yet scanned).
    Gray = 1,
    /// Free memory left by a sweep.
    Blue = 2,
    /// Fully scanned (reachable, all children processed).
    Black = 3,
}

impl GcColor {
    /// Decode the two color bits of a header.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => GcColor::White,
            1 => GcColor::Gray,
            2 => GcColor::Blue,
            _ => GcColor::Black,
        }
    }
}

/// Generation identifier for generational collection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generation {
    /// Young generation: bump allocation, promoting collection.
    Minor = 0,
    /// Old generation: chunk allocation, mark-sweep.
    Major = 1,
}

impl Generation {
    /// Check if this generation is the young one.
    #[inline]
    pub fn is_young(self) -> bool {
        matches!(self, Generation::Minor)
    }

    /// Check if this generation is the old one.
    #[inline]
    pub fn is_old(self) -> bool {
        matches!(self, Generation::Major)
    }
}
