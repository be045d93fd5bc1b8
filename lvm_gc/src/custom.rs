//! Custom blocks: foreign data owned by the heap.
//!
//! A custom block is tagged [`CUSTOM_TAG`](crate::header::CUSTOM_TAG). Its
//! field 0 holds a pointer to a static [`CustomOperations`] table and the
//! remaining fields hold the payload as raw bytes, which the collector
//! never scans. The operations table is provided by whoever defines the
//! custom type; this crate only stores the pointer and calls `finalize`
//! when a block registered for finalization dies.

use crate::header::Header;
use crate::value::{Value, WORD_SIZE};

use parking_lot::{const_mutex, Mutex};
use std::cmp::Ordering;
use std::fmt;

/// Callbacks describing one kind of custom block.
///
/// Every callback receives the payload bytes of the block.
pub struct CustomOperations {
    /// Name identifying the custom type.
    pub identifier: &'static str,
    /// Release external resources when the block dies.
    pub finalize: Option<fn(&mut [u8])>,
    /// Total order between two payloads of this type.
    pub compare: Option<fn(&[u8], &[u8]) -> Ordering>,
    /// Hash of a payload.
    pub hash: Option<fn(&[u8]) -> u64>,
    /// Append the serialized payload to a buffer.
    pub serialize: Option<fn(&[u8], &mut Vec<u8>)>,
}

impl CustomOperations {
    /// A table with only an identifier.
    pub const fn new(identifier: &'static str) -> Self {
        Self {
            identifier,
            finalize: None,
            compare: None,
            hash: None,
            serialize: None,
        }
    }

    /// Same table with a finalizer.
    pub const fn with_finalize(mut self, finalize: fn(&mut [u8])) -> Self {
        self.finalize = Some(finalize);
        self
    }

    /// Same table with a comparison function.
    pub const fn with_compare(mut self, compare: fn(&[u8], &[u8]) -> Ordering) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Same table with a hash function.
    pub const fn with_hash(mut self, hash: fn(&[u8]) -> u64) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Same table with a serializer.
    pub const fn with_serialize(mut self, serialize: fn(&[u8], &mut Vec<u8>)) -> Self {
        self.serialize = Some(serialize);
        self
    }
}

impl fmt::Debug for CustomOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperations")
            .field("identifier", &self.identifier)
            .field("finalize", &self.finalize.is_some())
            .field("compare", &self.compare.is_some())
            .field("hash", &self.hash.is_some())
            .field("serialize", &self.serialize.is_some())
            .finish()
    }
}

/// Identifier of the tables built by [`finalizer_operations`].
pub const FINAL_IDENTIFIER: &str = "_final";

/// Tables created for plain finalizers, keyed by function address.
///
/// Shared by every heap in the process; entries are leaked on purpose since
/// blocks anywhere may point at them.
static FINAL_TABLES: Mutex<Vec<(usize, &'static CustomOperations)>> = const_mutex(Vec::new());

/// The operations table for blocks that only need `finalize`.
///
/// One table is created per distinct function and reused afterwards.
pub fn finalizer_operations(finalize: fn(&mut [u8])) -> &'static CustomOperations {
    let key = finalize as usize;
    let mut tables = FINAL_TABLES.lock();
    if let Some((_, ops)) = tables.iter().find(|(k, _)| *k == key) {
        return ops;
    }

    let ops: &'static CustomOperations =
        Box::leak(Box::new(CustomOperations::new(FINAL_IDENTIFIER).with_finalize(finalize)));
    tables.push((key, ops));
    ops
}

/// Word count of a custom block holding `len` payload bytes.
#[inline]
pub(crate) const fn custom_wosize(len: usize) -> usize {
    1 + (len + WORD_SIZE - 1) / WORD_SIZE
}

/// The operations table of a custom block.
///
/// # Safety
///
/// `block` must be an initialized custom block.
#[inline]
pub(crate) unsafe fn operations_of(block: Value) -> &'static CustomOperations {
    &*(*block.field_ptr(0) as *const CustomOperations)
}

/// The payload of a custom block: every field after the operations pointer.
///
/// # Safety
///
/// `block` must be a custom block, and no other reference to its payload
/// may be alive for `'a`.
pub(crate) unsafe fn payload_of<'a>(block: Value) -> &'a mut [u8] {
    let wosize = Header::from_raw(*block.header_ptr()).wosize();
    std::slice::from_raw_parts_mut(block.field_ptr(1) as *mut u8, (wosize - 1) * WORD_SIZE)
}

/// Run the finalizer of a dead custom block, if it has one.
///
/// Returns true if a finalizer ran.
///
/// # Safety
///
/// `block` must be an initialized custom block that is no longer reachable.
pub(crate) unsafe fn finalise(block: Value) -> bool {
    match operations_of(block).finalize {
        Some(finalize) => {
            finalize(payload_of(block));
            true
        }
        None => false,
    }
}
