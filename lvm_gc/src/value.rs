//! Uniform tagged-word value representation.
//!
//! Every runtime value is one machine word:
//!
//! ```text
//! ┌──────────────────────────────────────────────┬───┐
//! │ 63-bit signed integer                        │ 1 │  immediate
//! ├──────────────────────────────────────────────┼───┤
//! │ address of field 0 (word aligned)            │ 0 │  block
//! └──────────────────────────────────────────────┴───┘
//! ```
//!
//! A block value points just past its header word, so the header lives at
//! `ptr[-1]` and field `i` at `ptr[i]`.

use std::fmt;
use std::ptr::NonNull;

/// Size of a machine word in bytes.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// A runtime value: either an immediate integer or a pointer to a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(usize);

impl Value {
    /// The all-zero word written into freshly allocated scannable fields.
    ///
    /// It is neither an immediate nor a block, and the collector skips it.
    pub const ZERO: Value = Value(0);

    /// The unit value (immediate `0`), also used as the empty list.
    pub const UNIT: Value = Value::int(0);

    /// Create an immediate integer value.
    #[inline]
    pub const fn int(n: isize) -> Self {
        Value(((n as usize) << 1) | 1)
    }

    /// Create a value from its raw word.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Value(raw)
    }

    /// Create a block value from a pointer to its first field.
    #[inline]
    pub fn from_field_ptr(ptr: NonNull<usize>) -> Self {
        Value(ptr.as_ptr() as usize)
    }

    /// Get the raw word.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Check if this value is an immediate integer.
    #[inline]
    pub const fn is_int(self) -> bool {
        self.0 & 1 == 1
    }

    /// Check if this value is a pointer to a block.
    #[inline]
    pub const fn is_block(self) -> bool {
        self.0 & 1 == 0 && self.0 != 0
    }

    /// Decode an immediate integer.
    #[inline]
    pub const fn as_int(self) -> Option<isize> {
        if self.is_int() {
            Some((self.0 as isize) >> 1)
        } else {
            None
        }
    }

    /// Get the pointer to field 0 if this is a block.
    #[inline]
    pub fn as_ptr(self) -> Option<NonNull<usize>> {
        if self.is_block() {
            NonNull::new(self.0 as *mut usize)
        } else {
            None
        }
    }

    /// Name field `index` of this block, for use with the write barrier.
    ///
    /// The address is resolved only when the store happens, so a
    /// `FieldAddr` never goes stale across an allocating call as long as
    /// `self` was read from a registered root after that call.
    #[inline]
    pub const fn field(self, index: usize) -> FieldAddr {
        FieldAddr { block: self, index }
    }

    /// Pointer to the header word of this block.
    ///
    /// # Safety
    ///
    /// `self` must be a block value.
    #[inline]
    pub(crate) unsafe fn header_ptr(self) -> *mut usize {
        (self.0 as *mut usize).sub(1)
    }

    /// Pointer to field `index` of this block.
    ///
    /// # Safety
    ///
    /// `self` must be a block value with more than `index` fields.
    #[inline]
    pub(crate) unsafe fn field_ptr(self, index: usize) -> *mut usize {
        (self.0 as *mut usize).add(index)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.as_int() {
            write!(f, "Int({})", n)
        } else if self.is_block() {
            write!(f, "Block({:#x})", self.0)
        } else {
            write!(f, "Zero")
        }
    }
}

/// The address of one field of a block.
///
/// This is the only way to name a field for mutation; the store itself
/// goes through [`Allocator::mutate_field`](crate::Allocator::mutate_field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAddr {
    block: Value,
    index: usize,
}

impl FieldAddr {
    /// The block containing the field.
    #[inline]
    pub const fn block(self) -> Value {
        self.block
    }

    /// The field index within the block.
    #[inline]
    pub const fn index(self) -> usize {
        self.index
    }
}
