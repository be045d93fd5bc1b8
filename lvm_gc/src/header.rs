//! Object header encoding.
//!
//! Every heap block starts with one header word:
//!
//! ```text
//! ┌───────────────────────────────────────┬───────┬──────────┐
//! │ wosize (word count, excluding header) │ color │   tag    │
//! │            bits 10..64                │ 8..10 │  0..8    │
//! └───────────────────────────────────────┴───────┴──────────┘
//! ```
//!
//! Tags at or above [`NO_SCAN_TAG`] mark blocks whose fields hold raw data;
//! every field of a block below it is a value the collector may follow.

use crate::value::WORD_SIZE;
use crate::GcColor;

use std::fmt;

/// A block tag. Tags are bytes, so `tag < 256` holds by construction.
pub type Tag = u8;

/// Tuples, records, arrays and placeholders.
pub const TUPLE_TAG: Tag = 0;
/// Closures.
pub const CLOSURE_TAG: Tag = 247;
/// Forwarding indirections.
pub const FORWARD_TAG: Tag = 250;
/// First tag whose fields are not scanned by the collector.
pub const NO_SCAN_TAG: Tag = 251;
/// Opaque blocks of raw words.
pub const ABSTRACT_TAG: Tag = 251;
/// Byte strings.
pub const STRING_TAG: Tag = 252;
/// Boxed floats.
pub const DOUBLE_TAG: Tag = 253;
/// Unboxed float arrays.
pub const DOUBLE_ARRAY_TAG: Tag = 254;
/// Custom blocks; field 0 points to a `CustomOperations` table.
pub const CUSTOM_TAG: Tag = 255;

/// Number of distinct tags, and so the number of atoms.
pub const NUM_TAGS: usize = 256;

const TAG_BITS: u32 = 8;
const COLOR_BITS: u32 = 2;
const WOSIZE_SHIFT: u32 = TAG_BITS + COLOR_BITS;
const COLOR_MASK: usize = 0b11 << TAG_BITS;

/// Largest word size a header can describe.
pub const MAX_WOSIZE: usize = usize::MAX >> WOSIZE_SHIFT;

/// Check whether the collector scans the fields of blocks with this tag.
#[inline]
pub const fn is_scannable(tag: Tag) -> bool {
    tag < NO_SCAN_TAG
}

/// An encoded header word.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Header(usize);

impl Header {
    /// Encode a header from its parts.
    #[inline]
    pub const fn new(wosize: usize, tag: Tag, color: GcColor) -> Self {
        Header((wosize << WOSIZE_SHIFT) | ((color as usize) << TAG_BITS) | tag as usize)
    }

    /// Decode a header from a raw word.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Header(raw)
    }

    /// Get the raw word.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Number of fields, excluding the header.
    #[inline]
    pub const fn wosize(self) -> usize {
        self.0 >> WOSIZE_SHIFT
    }

    /// Block tag.
    #[inline]
    pub const fn tag(self) -> Tag {
        self.0 as Tag
    }

    /// Collector color bits.
    #[inline]
    pub const fn color(self) -> GcColor {
        GcColor::from_bits(((self.0 & COLOR_MASK) >> TAG_BITS) as u8)
    }

    /// Same header with a different color.
    #[inline]
    pub const fn with_color(self, color: GcColor) -> Self {
        Header((self.0 & !COLOR_MASK) | ((color as usize) << TAG_BITS))
    }

    /// Same header with a different tag.
    #[inline]
    pub const fn with_tag(self, tag: Tag) -> Self {
        Header((self.0 & !0xff) | tag as usize)
    }

    /// Total words occupied by the block, header included.
    #[inline]
    pub const fn whsize(self) -> usize {
        self.wosize() + 1
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("wosize", &self.wosize())
            .field("tag", &self.tag())
            .field("color", &self.color())
            .finish()
    }
}

/// Encode the header of a freshly allocated block.
///
/// Size 0 is only legal for atoms; callers that allocate check that.
#[inline]
pub fn encode_header(wosize: usize, tag: Tag) -> Header {
    debug_assert!(wosize <= MAX_WOSIZE, "wosize {} overflows the header", wosize);
    Header::new(wosize, tag, GcColor::White)
}

// =============================================================================
// String length encoding
// =============================================================================

/// Word count of a string of `len` bytes: `ceil((len + 1) / WORD_SIZE)`.
///
/// There is always at least one byte of padding, which holds the pad count.
#[inline]
pub const fn string_wosize(len: usize) -> usize {
    (len + WORD_SIZE) / WORD_SIZE
}

/// The pad byte stored in the last byte of a string's final word.
#[inline]
pub const fn string_pad(len: usize) -> u8 {
    (string_wosize(len) * WORD_SIZE - 1 - len) as u8
}

/// Recover a string's byte length from its word count and pad byte.
#[inline]
pub const fn string_length(wosize: usize, pad: u8) -> usize {
    wosize * WORD_SIZE - 1 - pad as usize
}

// =============================================================================
// Atoms
// =============================================================================

/// One shared zero-field block per tag.
///
/// The atom for tag `t` is the header word at slot `t`; its value points to
/// slot `t + 1`. Atoms live outside both generations and are never moved,
/// collected, or written.
pub struct AtomTable {
    words: Box<[usize]>,
}

impl AtomTable {
    /// Build the table with one black, zero-size header per tag.
    pub fn new() -> Self {
        let words = (0..NUM_TAGS)
            .map(|tag| Header::new(0, tag as Tag, GcColor::Black).raw())
            .chain(std::iter::once(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { words }
    }

    /// The atom for `tag`.
    #[inline]
    pub fn get(&self, tag: Tag) -> crate::Value {
        let addr = self.words.as_ptr() as usize + (tag as usize + 1) * WORD_SIZE;
        crate::Value::from_raw(addr)
    }

    /// Check whether `value` is one of this table's atoms.
    #[inline]
    pub fn contains(&self, value: crate::Value) -> bool {
        let start = self.words.as_ptr() as usize + WORD_SIZE;
        let end = start + NUM_TAGS * WORD_SIZE;
        value.is_block() && (start..end).contains(&value.raw())
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let h = Header::new(5, STRING_TAG, GcColor::Black);
        assert_eq!(h.wosize(), 5);
        assert_eq!(h.tag(), STRING_TAG);
        assert_eq!(h.color(), GcColor::Black);
        assert_eq!(h.whsize(), 6);
    }

    #[test]
    fn test_encode_header_is_white() {
        let h = encode_header(3, TUPLE_TAG);
        assert_eq!(h.color(), GcColor::White);
        assert_eq!(h.wosize(), 3);
        assert_eq!(h.tag(), TUPLE_TAG);
    }

    #[test]
    fn test_with_color_and_tag() {
        let h = Header::new(7, 12, GcColor::White);
        let h = h.with_color(GcColor::Blue).with_tag(CUSTOM_TAG);
        assert_eq!(h.wosize(), 7);
        assert_eq!(h.tag(), CUSTOM_TAG);
        assert_eq!(h.color(), GcColor::Blue);
    }

    #[test]
    fn test_max_wosize() {
        let h = Header::new(MAX_WOSIZE, 255, GcColor::Black);
        assert_eq!(h.wosize(), MAX_WOSIZE);
        assert_eq!(h.tag(), 255);
    }

    #[test]
    fn test_scannable_threshold() {
        assert!(is_scannable(TUPLE_TAG));
        assert!(is_scannable(CLOSURE_TAG));
        assert!(is_scannable(FORWARD_TAG));
        assert!(!is_scannable(ABSTRACT_TAG));
        assert!(!is_scannable(STRING_TAG));
        assert!(!is_scannable(CUSTOM_TAG));
    }

    #[test]
    fn test_string_word_math() {
        for len in 0..(4 * WORD_SIZE) {
            let wosize = string_wosize(len);
            assert_eq!(wosize, (len + 1).div_ceil(WORD_SIZE));
            assert_eq!(string_length(wosize, string_pad(len)), len);
        }
    }

    #[test]
    fn test_empty_string_takes_one_word() {
        assert_eq!(string_wosize(0), 1);
        assert_eq!(string_pad(0) as usize, WORD_SIZE - 1);
        assert_eq!(string_wosize(WORD_SIZE - 1), 1);
        assert_eq!(string_pad(WORD_SIZE - 1), 0);
        assert_eq!(string_wosize(WORD_SIZE), 2);
    }

    #[test]
    fn test_atoms_are_distinct_and_stable() {
        let atoms = AtomTable::new();
        assert_eq!(atoms.get(0), atoms.get(0));
        assert_ne!(atoms.get(0), atoms.get(1));
        assert!(atoms.contains(atoms.get(CUSTOM_TAG)));
        assert!(!atoms.contains(crate::Value::int(3)));
    }

    #[test]
    fn test_atom_headers() {
        let atoms = AtomTable::new();
        for tag in [0u8, 17, 252, 255] {
            let header = unsafe { Header::from_raw(*atoms.get(tag).header_ptr()) };
            assert_eq!(header.wosize(), 0);
            assert_eq!(header.tag(), tag);
        }
    }
}
