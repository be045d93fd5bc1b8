//! Property-based tests for the allocator.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use lvm_gc::header::is_scannable;
use lvm_gc::{Allocator, GcConfig, Tag, Value, TUPLE_TAG};
use proptest::prelude::*;

fn allocator() -> Allocator {
    Allocator::new(GcConfig::testing())
}

/// Strategy for sizes on the fast path of the testing configuration.
fn young_size() -> impl Strategy<Value = usize> {
    1usize..=GcConfig::testing().max_young_wosize
}

/// Strategy for tags whose fields are values.
fn scannable_tag() -> impl Strategy<Value = Tag> {
    0u8..=246
}

proptest! {
    /// Headers report exactly the requested size and tag; scannable fields start zeroed
    #[test]
    fn allocate_stamps_header(size in young_size(), tag in any::<u8>()) {
        let mut heap = allocator();
        let block = heap.allocate(size, tag);

        prop_assert_eq!(heap.wosize_of(block), size);
        prop_assert_eq!(heap.tag_of(block), tag);
        if is_scannable(tag) {
            for i in 0..size {
                prop_assert_eq!(heap.field(block, i), Value::ZERO);
            }
        }
    }

    /// The same holds for blocks carved from the major heap
    #[test]
    fn allocate_large_stamps_header(extra in 1usize..200, tag in scannable_tag()) {
        let mut heap = allocator();
        let size = heap.heap().config().max_young_wosize + extra;
        let block = heap.allocate(size, tag);

        prop_assert!(!heap.is_young(block));
        prop_assert_eq!(heap.wosize_of(block), size);
        prop_assert_eq!(heap.tag_of(block), tag);
        prop_assert!((0..size).all(|i| heap.field(block, i) == Value::ZERO));
    }

    /// Zero-size requests return one identity-stable atom per tag
    #[test]
    fn atoms_are_identity_stable(tag in any::<u8>(), garbage in 0usize..64) {
        let mut heap = allocator();
        let first = heap.allocate(0, tag);
        for _ in 0..garbage {
            heap.tuple(8);
        }
        heap.major_collection();

        prop_assert_eq!(heap.allocate(0, tag), first);
        prop_assert_eq!(heap.wosize_of(first), 0);
        prop_assert_eq!(heap.tag_of(first), tag);
    }

    /// Strings keep their length and contents, wherever they are allocated
    #[test]
    fn strings_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..400)) {
        let mut heap = allocator();
        let s = heap.copy_string(Some(&bytes[..]));

        prop_assert_eq!(heap.string_length(s), bytes.len());
        prop_assert_eq!(heap.string_bytes(s), &bytes[..]);
    }

    /// Strings stay intact across collections
    #[test]
    fn strings_survive_collections(texts in prop::collection::vec("[a-z]{0,40}", 1..20)) {
        let mut heap = allocator();
        let array = heap.copy_string_array(&texts);
        let scope = heap.root_scope();
        let array = scope.root(array);

        heap.major_collection();
        for (i, text) in texts.iter().enumerate() {
            let s = heap.field(scope.get(array), i);
            prop_assert_eq!(heap.string_bytes(s), text.as_bytes());
        }
    }

    /// Patching a dummy gives it the value's tag and fields at the dummy's address
    #[test]
    fn patch_preserves_address(
        fields in prop::collection::vec(-1000isize..1000, 1..40),
        tag in scannable_tag(),
    ) {
        let mut heap = allocator();
        let scope = heap.root_scope();
        let dummy = scope.root(heap.dummy(fields.len()));

        let value = heap.allocate(fields.len(), tag);
        for (i, &n) in fields.iter().enumerate() {
            heap.mutate_field(value.field(i), Value::int(n));
        }
        let address = scope.get(dummy);
        heap.patch(scope.get(dummy), value);

        prop_assert_eq!(scope.get(dummy), address);
        prop_assert_eq!(heap.tag_of(address), tag);
        for (i, &n) in fields.iter().enumerate() {
            prop_assert_eq!(heap.field(address, i), Value::int(n));
        }
    }

    /// array_from applies the conversion in order
    #[test]
    fn array_from_preserves_order(inputs in prop::collection::vec(any::<i32>(), 0..60)) {
        let mut heap = allocator();
        let array = heap.array_from(&inputs, |heap, &n| {
            let cell = heap.tuple(1);
            heap.mutate_field(cell.field(0), Value::int(n as isize));
            cell
        });

        if inputs.is_empty() {
            prop_assert_eq!(array, heap.atom(TUPLE_TAG));
        } else {
            prop_assert_eq!(heap.wosize_of(array), inputs.len());
            for (i, &n) in inputs.iter().enumerate() {
                let cell = heap.field(array, i);
                prop_assert_eq!(heap.field(cell, 0), Value::int(n as isize));
            }
        }
        prop_assert!(heap.roots().is_empty());
    }

    /// Storing a young value into an old block always leaves a remembered entry
    #[test]
    fn old_to_young_store_is_remembered(index in 0usize..20, repeats in 1usize..5) {
        let mut heap = allocator();
        let scope = heap.root_scope();
        let holder = scope.root(heap.tuple(20));
        let young = heap.tuple(1);

        for _ in 0..repeats {
            heap.mutate_field(scope.get(holder).field(index), young);
        }

        let entries = heap.heap().remembered_set().entries();
        let expected = field_address(scope.get(holder), index);
        prop_assert!(entries.iter().filter(|e| e.slot == expected).count() >= 1);
    }

    /// Rooted values keep their contents through arbitrary allocation sequences
    #[test]
    fn rooted_values_survive(sizes in prop::collection::vec(1usize..40, 1..80)) {
        let mut heap = allocator();
        let scope = heap.root_scope();
        let mut locals = Vec::new();

        for (n, &size) in sizes.iter().enumerate() {
            let block = heap.tuple(size);
            heap.mutate_field(block.field(0), Value::int(n as isize));
            if n % 3 == 0 {
                locals.push((scope.root(block), n));
            }
        }

        for (local, n) in locals {
            prop_assert_eq!(heap.field(scope.get(local), 0), Value::int(n as isize));
        }
    }
}

/// Address of field `index` of `block`, as the remembered set records it.
fn field_address(block: Value, index: usize) -> usize {
    block.raw() + index * lvm_gc::WORD_SIZE
}
