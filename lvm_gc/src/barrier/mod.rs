//! Write barrier for the generational heap.
//!
//! Minor collection only scans the young generation plus the remembered
//! set. A young object referenced solely from an old one is therefore
//! invisible unless the store that created the reference was recorded.
//! [`write_barrier`] performs the store and the recording together; it is
//! the only store the crate performs on blocks that may already be shared,
//! and [`Allocator::mutate_field`](crate::Allocator::mutate_field) is its
//! only public entry point.

mod remembered_set;

pub use remembered_set::{RememberedEntry, RememberedSet};

use crate::heap::GcHeap;
use crate::value::Value;

use std::ptr::NonNull;

/// Store `value` into `slot`, recording the slot if it now holds an
/// old→young pointer.
///
/// Duplicate entries are tolerated, omissions are not: every qualifying
/// store appends, even if the slot was recorded before.
///
/// # Safety
///
/// `slot` must be a field of a block owned by `heap`.
#[inline(always)]
pub(crate) unsafe fn write_barrier(heap: &mut GcHeap, slot: NonNull<usize>, value: Value) {
    *slot.as_ptr() = value.raw();

    // Fast path: fields of young blocks are scanned anyway.
    if heap.minor().contains(slot.as_ptr() as usize) {
        return;
    }

    if heap.is_young(value) {
        heap.remembered_set_mut().insert(slot.as_ptr());
    }
}
