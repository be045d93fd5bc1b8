//! Garbage collection algorithms.
//!
//! The allocator drives collection through the [`Collector`] trait: it
//! decides *when* a collection runs, the collector decides *how*. Both
//! methods run synchronously to completion, stop-the-world, and may move
//! any young block; callers must keep every reference they still need in a
//! [`RootScope`](crate::RootScope).
//!
//! [`GenerationalCollector`] is the default implementation:
//!
//! - [`MinorCollector`]: promote-all copying collection of the minor heap
//!   into the major heap, driven by roots and the remembered set.
//! - [`MajorCollector`]: non-moving mark/sweep of the major heap that runs
//!   custom-block finalizers and releases dead chunks.

mod major;
mod minor;

pub use major::{MajorCollector, MajorResult};
pub use minor::{MinorCollector, MinorResult};

use crate::heap::GcHeap;
use crate::roots::RootStack;

/// Which collection an allocation triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// The minor heap was emptied.
    Minor,
    /// The minor heap was emptied and the major heap was collected.
    Major,
}

/// A collection algorithm the allocator can drive.
///
/// Contract shared by both methods:
///
/// - every root in `roots` that referenced a young block references the
///   same object at its new address afterwards;
/// - every remembered field is updated the same way, and the remembered set
///   is left empty;
/// - the minor heap is empty on return.
///
/// `major_collection` additionally reclaims unreachable major blocks,
/// finalizing the registered custom blocks among them, and clears the
/// major heap's urgency flag.
pub trait Collector {
    /// Empty the minor heap.
    fn minor_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MinorResult;

    /// Empty the minor heap, then collect the major heap.
    fn major_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MajorResult;
}

/// Default two-generation collector.
#[derive(Default)]
pub struct GenerationalCollector {
    minor: MinorCollector,
    major: MajorCollector,
}

impl GenerationalCollector {
    /// Create a new collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collector for GenerationalCollector {
    fn minor_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MinorResult {
        self.minor.collect(heap, roots)
    }

    fn major_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MajorResult {
        let minor = self.minor.collect(heap, roots);
        let mut result = self.major.collect(heap, roots);
        result.minor = minor;
        result
    }
}
