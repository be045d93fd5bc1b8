//! Minor heap (young generation) with bump-pointer allocation.
//!
//! Allocation is O(1):
//! ```text
//! alloc_ptr += words;
//! return alloc_ptr - words;
//! ```
//!
//! Running past the limit does not allocate; it reports
//! [`Reservation::Exhausted`] so the caller can run a minor collection and
//! retry.

use crate::value::WORD_SIZE;

use std::alloc::Layout;
use std::ptr::NonNull;

/// Outcome of a bump reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The words were reserved; the pointer is the first of them.
    Reserved(NonNull<usize>),
    /// The reservation would cross the limit. Nothing was reserved.
    Exhausted,
}

/// The young generation.
pub struct MinorHeap {
    /// First word of the space.
    start: NonNull<usize>,
    /// One past the last word (the limit).
    end: *mut usize,
    /// Next free word.
    alloc_ptr: *mut usize,
    /// Capacity in words.
    wsize: usize,
    /// Largest object, in fields, that may be allocated here.
    max_young_wosize: usize,
}

impl MinorHeap {
    /// Allocate a minor heap of `wsize` words.
    ///
    /// Returns `None` if the system allocator refuses.
    pub fn new(wsize: usize, max_young_wosize: usize) -> Option<Self> {
        let layout = Self::layout(wsize)?;
        let start = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) } as *mut usize)?;
        let end = unsafe { start.as_ptr().add(wsize) };

        Some(Self {
            start,
            end,
            alloc_ptr: start.as_ptr(),
            wsize,
            max_young_wosize,
        })
    }

    fn layout(wsize: usize) -> Option<Layout> {
        Layout::array::<usize>(wsize.max(1)).ok()
    }

    /// Reserve `words` contiguous words.
    #[inline]
    pub fn reserve(&mut self, words: usize) -> Reservation {
        let current = self.alloc_ptr;
        if self.free_words() < words {
            return Reservation::Exhausted;
        }

        self.alloc_ptr = unsafe { current.add(words) };
        // SAFETY: current is inside [start, end] and never null.
        Reservation::Reserved(unsafe { NonNull::new_unchecked(current) })
    }

    /// Check if an address is inside the minor heap.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self.start.as_ptr() as usize;
        let end = self.end as usize;
        addr >= start && addr < end
    }

    /// Words handed out since the last reset.
    #[inline]
    pub fn allocated_words(&self) -> usize {
        (self.alloc_ptr as usize - self.start.as_ptr() as usize) / WORD_SIZE
    }

    /// Words left before the limit.
    #[inline]
    pub fn free_words(&self) -> usize {
        self.wsize - self.allocated_words()
    }

    /// Capacity in words.
    #[inline]
    pub fn wsize(&self) -> usize {
        self.wsize
    }

    /// The `MaxYoungWosize` threshold.
    #[inline]
    pub fn max_young_wosize(&self) -> usize {
        self.max_young_wosize
    }

    /// Check if nothing has been allocated since the last reset.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alloc_ptr == self.start.as_ptr()
    }

    /// Empty the space after its survivors have been promoted.
    pub fn reset(&mut self) {
        // Poison stale memory so a missing root shows up as garbage fast.
        #[cfg(debug_assertions)]
        unsafe {
            std::ptr::write_bytes(self.start.as_ptr(), 0, self.allocated_words());
        }

        self.alloc_ptr = self.start.as_ptr();
    }
}

impl Drop for MinorHeap {
    fn drop(&mut self) {
        if let Some(layout) = Self::layout(self.wsize) {
            unsafe {
                std::alloc::dealloc(self.start.as_ptr() as *mut u8, layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved(r: Reservation) -> NonNull<usize> {
        match r {
            Reservation::Reserved(ptr) => ptr,
            Reservation::Exhausted => panic!("reservation failed"),
        }
    }

    #[test]
    fn test_minor_heap_creation() {
        let minor = MinorHeap::new(1024, 16).expect("minor heap");
        assert_eq!(minor.wsize(), 1024);
        assert_eq!(minor.max_young_wosize(), 16);
        assert_eq!(minor.allocated_words(), 0);
        assert!(minor.is_empty());
    }

    #[test]
    fn test_bump_reservation() {
        let mut minor = MinorHeap::new(64, 8).expect("minor heap");

        let p1 = reserved(minor.reserve(4));
        assert_eq!(minor.allocated_words(), 4);

        let p2 = reserved(minor.reserve(4));
        assert_eq!(minor.allocated_words(), 8);

        assert_eq!(p2.as_ptr() as usize - p1.as_ptr() as usize, 4 * WORD_SIZE);
    }

    #[test]
    fn test_exhaustion_reserves_nothing() {
        let mut minor = MinorHeap::new(16, 4).expect("minor heap");

        reserved(minor.reserve(10));
        assert_eq!(minor.reserve(7), Reservation::Exhausted);
        assert_eq!(minor.allocated_words(), 10);

        // An exact fit still succeeds.
        reserved(minor.reserve(6));
        assert_eq!(minor.free_words(), 0);
    }

    #[test]
    fn test_contains() {
        let mut minor = MinorHeap::new(32, 4).expect("minor heap");
        let p = reserved(minor.reserve(2));

        assert!(minor.contains(p.as_ptr() as usize));
        assert!(!minor.contains(0));
        assert!(!minor.contains(minor.end as usize));
    }

    #[test]
    fn test_reset() {
        let mut minor = MinorHeap::new(32, 4).expect("minor heap");
        let first = reserved(minor.reserve(3));
        minor.reset();

        assert!(minor.is_empty());
        assert_eq!(reserved(minor.reserve(3)), first);
    }
}
