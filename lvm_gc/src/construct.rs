//! Typed constructors built on the allocation protocol.
//!
//! Every constructor returns a fully initialized block. Constructors that
//! call back into user code (`array_from` and friends) keep their partial
//! results registered in a root scope across every callback.

use crate::alloc::Allocator;
use crate::collector::Collector;
use crate::custom::{custom_wosize, finalizer_operations, CustomOperations};
use crate::error::{fatal_error, FatalError};
use crate::header::{is_scannable, string_pad, string_wosize, CUSTOM_TAG, STRING_TAG, TUPLE_TAG};
use crate::value::{Value, WORD_SIZE};

impl<C: Collector> Allocator<C> {
    /// Allocate a tuple of `n` fields, all [`Value::ZERO`].
    #[inline]
    pub fn tuple(&mut self, n: usize) -> Value {
        self.allocate(n, TUPLE_TAG)
    }

    /// Allocate a string of `len` zero bytes.
    pub fn alloc_string(&mut self, len: usize) -> Value {
        let wosize = string_wosize(len);
        let value = self.allocate(wosize, STRING_TAG);
        // SAFETY: a fresh string block of `wosize` words.
        unsafe {
            let bytes = value.field_ptr(0) as *mut u8;
            std::ptr::write_bytes(bytes, 0, wosize * WORD_SIZE);
            *bytes.add(wosize * WORD_SIZE - 1) = string_pad(len);
        }
        value
    }

    /// Copy `bytes` into a new string. `None` gives the empty string.
    pub fn copy_string(&mut self, bytes: Option<&[u8]>) -> Value {
        let bytes = bytes.unwrap_or_default();
        let value = self.alloc_string(bytes.len());
        // SAFETY: the string was sized for `bytes`, which lives outside the heap.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), value.field_ptr(0) as *mut u8, bytes.len());
        }
        value
    }

    /// Copy UTF-8 text into a new string. `None` gives the empty string.
    #[inline]
    pub fn copy_str(&mut self, text: Option<&str>) -> Value {
        self.copy_string(text.map(str::as_bytes))
    }

    /// Allocate a custom block with a `len`-byte zeroed payload.
    ///
    /// `used` and `max` describe the external resources the block holds;
    /// they pace major collections. Blocks with a finalizer, or too large
    /// for the minor heap, go to the major heap and are registered for
    /// finalization.
    pub fn alloc_custom(
        &mut self,
        ops: &'static CustomOperations,
        len: usize,
        used: usize,
        max: usize,
    ) -> Value {
        let wosize = custom_wosize(len);

        if ops.finalize.is_none() && wosize <= self.heap.minor().max_young_wosize() {
            let (value, _) = self.alloc_young(wosize, CUSTOM_TAG);
            self.init_custom(value, ops, wosize);
            return value;
        }

        let value = self.alloc_shr(wosize, CUSTOM_TAG);
        self.init_custom(value, ops, wosize);
        if ops.finalize.is_some() {
            self.heap.register_finalisable(value);
        }
        self.heap.major_mut().adjust_gc_speed(used, max);
        self.check_urgent_gc(value).0
    }

    fn init_custom(&mut self, value: Value, ops: &'static CustomOperations, wosize: usize) {
        // SAFETY: a fresh custom block of `wosize` fields.
        unsafe {
            *value.field_ptr(0) = ops as *const CustomOperations as usize;
            std::ptr::write_bytes(value.field_ptr(1), 0, wosize - 1);
        }
    }

    /// Allocate a custom block of `words` payload words whose only
    /// operation is `finalize`.
    pub fn alloc_final(&mut self, words: usize, finalize: fn(&mut [u8]), used: usize, max: usize) -> Value {
        let ops = finalizer_operations(finalize);
        self.alloc_custom(ops, words * WORD_SIZE, used, max)
    }

    /// Build a tuple from `inputs`, converting each with `convert`.
    ///
    /// `convert` may allocate; the partial tuple and the latest converted
    /// value stay rooted throughout. No inputs gives the tag-0 atom.
    pub fn array_from<T, F>(&mut self, inputs: &[T], mut convert: F) -> Value
    where
        F: FnMut(&mut Self, &T) -> Value,
    {
        match self.try_array_from(inputs, |heap, input| Ok::<_, std::convert::Infallible>(convert(heap, input))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible [`array_from`](Self::array_from).
    ///
    /// The first error from `convert` is returned as is; the roots opened
    /// here are released on every path.
    pub fn try_array_from<T, E, F>(&mut self, inputs: &[T], mut convert: F) -> Result<Value, E>
    where
        F: FnMut(&mut Self, &T) -> Result<Value, E>,
    {
        if inputs.is_empty() {
            return Ok(self.atom(TUPLE_TAG));
        }

        let scope = self.root_scope();
        let result = scope.root(self.tuple(inputs.len()));
        let item = scope.root(Value::UNIT);

        for (i, input) in inputs.iter().enumerate() {
            let value = convert(self, input)?;
            scope.set(item, value);
            // The result may have moved during `convert`; re-read it.
            self.mutate_field(scope.get(result).field(i), scope.get(item));
        }

        Ok(scope.get(result))
    }

    /// Build a tuple of strings.
    pub fn copy_string_array<S: AsRef<[u8]>>(&mut self, strings: &[S]) -> Value {
        self.array_from(strings, |heap, s| heap.copy_string(Some(s.as_ref())))
    }

    /// Allocate a placeholder of `size` zero fields for a recursive
    /// definition, to be filled in later by [`patch`](Self::patch).
    #[inline]
    pub fn dummy(&mut self, size: usize) -> Value {
        self.allocate(size, TUPLE_TAG)
    }

    /// Give a placeholder from [`dummy`](Self::dummy) the tag and fields of
    /// `value`, keeping its address.
    ///
    /// A size mismatch is fatal.
    pub fn patch(&mut self, dummy: Value, value: Value) {
        let size = self.wosize_of(value);
        let dummy_size = self.wosize_of(dummy);
        if size != dummy_size {
            fatal_error(FatalError::DummySizeMismatch {
                dummy: dummy_size,
                value: size,
            });
        }
        if size == 0 {
            return;
        }

        let tag = self.tag_of(value);
        // SAFETY: both blocks belong to this heap and have `size` fields.
        unsafe {
            let header = self.heap.header(dummy).with_tag(tag);
            self.heap.set_header(dummy, header);
        }

        if is_scannable(tag) {
            for i in 0..size {
                let field = self.field(value, i);
                self.mutate_field(dummy.field(i), field);
            }
        } else {
            // Raw words are not values; the barrier must not see them.
            unsafe { std::ptr::copy(value.field_ptr(0), dummy.field_ptr(0), size) };
        }
    }

    /// Fold a list of constructor indices into a bit set.
    ///
    /// The list is either the immediate 0 or a pair `(index, tail)`; each
    /// index selects a bit pattern from `flags`.
    pub fn convert_flag_list(&self, list: Value, flags: &[u32]) -> u32 {
        let mut bits = 0;
        let mut cell = list;
        while cell != Value::int(0) {
            let entry = self.field(cell, 0);
            let flag = entry
                .as_int()
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| flags.get(index));
            let Some(&flag) = flag else {
                panic!(
                    "flag list entry {:?} is not an index into {} flags",
                    entry,
                    flags.len()
                );
            };
            bits |= flag;
            cell = self.field(cell, 1);
        }
        bits
    }
}
