//! Integration tests for the allocator.
//!
//! Every test uses `GcConfig::testing()`: a 256-word minor heap, a young
//! size limit of 16 fields and heap verification after each collection, so
//! ordinary workloads run through many collections.

use lvm_gc::{
    Allocator, CollectionKind, Collector, GcConfig, GcHeap, GenerationalCollector, MajorResult,
    MinorResult, RootStack, Value, STRING_TAG, TUPLE_TAG,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

fn allocator() -> Allocator {
    Allocator::new(GcConfig::testing())
}

fn max_young(heap: &Allocator) -> usize {
    heap.heap().config().max_young_wosize
}

// =============================================================================
// Relocation
// =============================================================================

#[test]
fn test_rooted_value_survives_and_moves() {
    let mut heap = allocator();
    let scope = heap.root_scope();

    let pair = scope.root(heap.tuple(2));
    let original = scope.get(pair);
    let text = heap.copy_str(Some("hello"));
    heap.mutate_field(scope.get(pair).field(0), text);
    heap.mutate_field(scope.get(pair).field(1), Value::int(7));

    heap.minor_collection();

    let moved = scope.get(pair);
    assert_ne!(moved, original);
    assert!(!heap.is_young(moved));
    assert_eq!(heap.field(moved, 1), Value::int(7));
    assert_eq!(heap.string_bytes(heap.field(moved, 0)), b"hello");
}

#[test]
fn test_unrooted_young_values_are_not_promoted() {
    let mut heap = allocator();
    for _ in 0..4 {
        heap.tuple(3);
    }

    let result = heap.minor_collection();
    assert_eq!(result.objects_promoted, 0);
    assert_eq!(result.words_freed(), 16);
    assert!(heap.heap().minor().is_empty());
}

#[test]
fn test_linked_list_across_many_collections() {
    let mut heap = allocator();
    let scope = heap.root_scope();
    let list = scope.root(Value::int(0));

    for i in 0..500 {
        let cell = heap.tuple(2);
        heap.mutate_field(cell.field(0), Value::int(i));
        heap.mutate_field(cell.field(1), scope.get(list));
        scope.set(list, cell);
    }
    assert!(heap.stats().minor_count() > 1);

    let mut expected = 499;
    let mut cell = scope.get(list);
    while cell != Value::int(0) {
        assert_eq!(heap.field(cell, 0), Value::int(expected));
        expected -= 1;
        cell = heap.field(cell, 1);
    }
    assert_eq!(expected, -1);
}

#[test]
fn test_exhausted_minor_heap_reports_collection() {
    let mut heap = allocator();
    let wosize = max_young(&heap);

    let mut first = None;
    for _ in 0..100 {
        let allocated = heap.alloc_reported(wosize, TUPLE_TAG);
        if allocated.collection.is_some() {
            first = Some(allocated);
            break;
        }
    }

    let allocated = first.expect("the minor heap never filled up");
    assert_eq!(allocated.collection, Some(CollectionKind::Minor));
    assert!(heap.is_young(allocated.value));
    assert_eq!(heap.stats().minor_count(), 1);
}

#[test]
fn test_alloc_small_blocks_survive_collection_once_filled() {
    let mut heap = allocator();
    let scope = heap.root_scope();

    let pair = unsafe { heap.alloc_small(2, TUPLE_TAG) };
    heap.mutate_field(pair.field(0), Value::int(1));
    heap.mutate_field(pair.field(1), Value::int(2));
    let pair = scope.root(pair);

    heap.minor_collection();
    let moved = scope.get(pair);
    assert!(!heap.is_young(moved));
    assert_eq!(heap.tag_of(moved), TUPLE_TAG);
    assert_eq!(heap.field(moved, 0), Value::int(1));
    assert_eq!(heap.field(moved, 1), Value::int(2));
}

// =============================================================================
// Write barrier
// =============================================================================

#[test]
fn test_remembered_field_keeps_young_value_alive() {
    let mut heap = allocator();
    let scope = heap.root_scope();

    let holder = scope.root(heap.tuple(max_young(&heap) + 1));
    assert!(!heap.is_young(scope.get(holder)));

    let young = heap.copy_str(Some("only referenced from an old block"));
    heap.mutate_field(scope.get(holder).field(3), young);
    assert!(heap.heap().remembered_set().len() >= 1);

    heap.minor_collection();

    let field = heap.field(scope.get(holder), 3);
    assert!(!heap.is_young(field));
    assert_eq!(heap.string_bytes(field), b"only referenced from an old block");
    assert!(heap.heap().remembered_set().is_empty());
}

#[test]
fn test_array_from_into_major_tuple() {
    let mut heap = allocator();
    let inputs: Vec<String> = (0..40).map(|i| format!("item {}", i)).collect();

    let array = heap.array_from(&inputs, |heap, s| heap.copy_str(Some(s.as_str())));
    let scope = heap.root_scope();
    let array = scope.root(array);

    heap.major_collection();
    for (i, expected) in inputs.iter().enumerate() {
        let item = heap.field(scope.get(array), i);
        assert_eq!(heap.tag_of(item), STRING_TAG);
        assert_eq!(heap.string_bytes(item), expected.as_bytes());
    }
}

#[test]
fn test_array_from_survives_collections_inside_convert() {
    let mut heap = allocator();
    let inputs: Vec<usize> = (0..12).collect();

    let array = heap.array_from(&inputs, |heap, &n| {
        // Enough garbage to force a minor collection on every element.
        for _ in 0..16 {
            heap.tuple(16);
        }
        let cell = heap.tuple(1);
        heap.mutate_field(cell.field(0), Value::int(n as isize));
        cell
    });

    assert!(heap.stats().minor_count() >= inputs.len() as u64);
    assert_eq!(heap.wosize_of(array), inputs.len());
    for n in inputs {
        let cell = heap.field(array, n);
        assert_eq!(heap.field(cell, 0), Value::int(n as isize));
    }
}

// =============================================================================
// Root scopes
// =============================================================================

#[test]
fn test_roots_unwind_on_panic_in_convert() {
    let mut heap = allocator();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        heap.array_from(&[1, 2, 3], |heap, &n| {
            if n == 3 {
                panic!("conversion failed");
            }
            heap.copy_str(Some("ok"))
        })
    }));

    assert!(outcome.is_err());
    assert!(heap.roots().is_empty());
    assert_eq!(heap.roots().depth(), 0);

    // The heap is still consistent.
    heap.major_collection();
    let s = heap.copy_str(Some("after"));
    assert_eq!(heap.string_bytes(s), b"after");
}

#[test]
fn test_nested_scopes_release_in_order() {
    let heap = allocator();
    let outer = heap.root_scope();
    outer.root(Value::int(1));
    {
        let inner = heap.root_scope();
        inner.root(Value::int(2));
        inner.root(Value::int(3));
        assert_eq!(heap.roots().len(), 3);
        assert_eq!(heap.roots().depth(), 2);
    }
    assert_eq!(heap.roots().len(), 1);
    assert_eq!(heap.roots().depth(), 1);
}

// =============================================================================
// Major heap pacing and finalization
// =============================================================================

static FINALISED: AtomicUsize = AtomicUsize::new(0);

fn count_finalise(_: &mut [u8]) {
    FINALISED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_finalisers_run_for_unreachable_blocks_only() {
    let mut heap = allocator();
    let scope = heap.root_scope();

    let before = FINALISED.load(Ordering::SeqCst);
    let kept = scope.root(heap.alloc_final(1, count_finalise, 0, 1000));
    heap.alloc_final(1, count_finalise, 0, 1000);
    heap.alloc_final(1, count_finalise, 0, 1000);

    let result = heap.major_collection();
    assert_eq!(result.finalised, 2);
    assert!(FINALISED.load(Ordering::SeqCst) >= before + 2);
    assert_eq!(heap.heap().finalisable(), &[scope.get(kept)]);
    assert_eq!(heap.stats().finalised.load(Ordering::Relaxed), 2);
}

#[test]
fn test_custom_resources_trigger_major_collection() {
    let mut heap = allocator();

    heap.alloc_final(1, count_finalise, 10, 10);
    assert_eq!(heap.stats().major_count(), 0);

    heap.alloc_final(1, count_finalise, 10, 10);
    assert_eq!(heap.stats().major_count(), 1);
    assert!(!heap.heap().major().is_urgent());
}

#[test]
fn test_major_allocations_trigger_major_collection() {
    let mut heap = allocator();
    let urgent = heap.heap().config().major_urgent_wsize;

    let mut triggered = None;
    for i in 0..urgent {
        let allocated = heap.alloc_reported(100, TUPLE_TAG);
        if allocated.collection.is_some() {
            triggered = Some((i, allocated));
            break;
        }
    }

    let (count, allocated) = triggered.expect("no major collection was triggered");
    assert_eq!(allocated.collection, Some(CollectionKind::Major));
    assert_eq!((count + 1) * 101 / urgent, 1);
    // The block that triggered the collection survives it.
    assert_eq!(heap.wosize_of(allocated.value), 100);
    assert_eq!(heap.field(allocated.value, 99), Value::ZERO);
}

// =============================================================================
// Fatal errors
// =============================================================================

#[test]
#[should_panic(expected = "out of memory")]
fn test_bounded_major_heap_runs_out() {
    let mut heap = Allocator::new(GcConfig {
        major_chunk_wsize: 64,
        max_major_wsize: 256,
        ..GcConfig::testing()
    });
    let scope = heap.root_scope();
    for _ in 0..10 {
        scope.root(heap.tuple(100));
    }
}

#[test]
#[should_panic(expected = "dummy size mismatch")]
fn test_patch_mismatch_is_fatal() {
    let mut heap = allocator();
    let dummy = heap.dummy(3);
    let value = heap.tuple(2);
    heap.patch(dummy, value);
}

#[test]
fn test_recursive_value_through_dummy() {
    let mut heap = allocator();
    let scope = heap.root_scope();

    // let rec ones = 1 :: ones
    let dummy = scope.root(heap.dummy(2));
    let cell = heap.tuple(2);
    heap.mutate_field(cell.field(0), Value::int(1));
    heap.mutate_field(cell.field(1), scope.get(dummy));
    heap.patch(scope.get(dummy), cell);

    heap.major_collection();
    let ones = scope.get(dummy);
    assert_eq!(heap.field(ones, 0), Value::int(1));
    assert_eq!(heap.field(ones, 1), ones);
}

// =============================================================================
// Collector seam
// =============================================================================

#[derive(Default)]
struct CountingCollector {
    inner: GenerationalCollector,
    minor_calls: usize,
    major_calls: usize,
}

impl Collector for CountingCollector {
    fn minor_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MinorResult {
        self.minor_calls += 1;
        self.inner.minor_collection(heap, roots)
    }

    fn major_collection(&mut self, heap: &mut GcHeap, roots: &RootStack) -> MajorResult {
        self.major_calls += 1;
        self.inner.major_collection(heap, roots)
    }
}

#[test]
fn test_custom_collector_is_driven_by_allocation() {
    let mut heap = Allocator::with_collector(GcConfig::testing(), CountingCollector::default())
        .expect("valid config");

    for _ in 0..100 {
        heap.tuple(8);
    }
    assert!(heap.collector().minor_calls >= 3);
    assert_eq!(heap.collector().major_calls, 0);

    heap.major_collection();
    assert_eq!(heap.collector().major_calls, 1);
    assert_eq!(heap.stats().minor_count() as usize, heap.collector().minor_calls);
}

#[test]
fn test_invalid_config_is_reported() {
    let config = GcConfig {
        minor_heap_wsize: 8,
        ..GcConfig::testing()
    };
    assert!(Allocator::try_new(config).is_err());
}

#[test]
fn test_stats_summary() {
    let mut heap = allocator();
    heap.tuple(4);
    heap.minor_collection();
    let summary = heap.stats().summary();
    assert!(summary.contains("collections: 1 minor, 0 major"));
}
