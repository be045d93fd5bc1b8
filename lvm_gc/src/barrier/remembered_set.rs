//! Remembered set for tracking old→young cross-generational references.
//!
//! The remembered set is a precise list of old-generation fields that
//! contain pointers into the young generation. During minor collection,
//! the collector treats every remembered field as a root and updates it
//! in place when the young object it points to is promoted.
//!
//! # Design
//!
//! An append-only buffer. The write barrier appends in O(1) without
//! checking for duplicates; the collector deduplicates when it drains.

/// Initial buffer capacity.
const BUFFER_CAPACITY: usize = 1024;

/// One remembered field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RememberedEntry {
    /// Address of the field (in an old-generation block).
    pub slot: usize,
}

/// Append buffer of old→young fields.
pub struct RememberedSet {
    entries: Vec<RememberedEntry>,
}

impl RememberedSet {
    /// Create a new empty remembered set.
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(BUFFER_CAPACITY),
        }
    }

    /// Record a field that now holds a young pointer.
    ///
    /// Called by the write barrier. Duplicates are accepted.
    #[inline]
    pub fn insert(&mut self, slot: *const usize) {
        self.entries.push(RememberedEntry {
            slot: slot as usize,
        });
        if self.entries.len().is_power_of_two() && self.entries.len() >= BUFFER_CAPACITY {
            log::trace!("remembered set grew to {} entries", self.entries.len());
        }
    }

    /// Drain all entries for root scanning, deduplicated and in address
    /// order.
    pub fn drain(&mut self) -> Vec<RememberedEntry> {
        let mut entries = std::mem::replace(&mut self.entries, Vec::with_capacity(BUFFER_CAPACITY));
        entries.sort_unstable();
        entries.dedup();
        entries
    }

    /// All entries, in insertion order, duplicates included.
    #[inline]
    pub fn entries(&self) -> &[RememberedEntry] {
        &self.entries
    }

    /// Check if a field address has been recorded.
    pub fn contains(&self, slot: usize) -> bool {
        self.entries.iter().any(|entry| entry.slot == slot)
    }

    /// Number of entries, duplicates included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the remembered set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RememberedSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remembered_set_creation() {
        let rs = RememberedSet::new();
        assert!(rs.is_empty());
        assert_eq!(rs.len(), 0);
    }

    #[test]
    fn test_insert_single() {
        let mut rs = RememberedSet::new();
        rs.insert(0x1000 as *const usize);
        assert_eq!(rs.len(), 1);
        assert!(rs.contains(0x1000));
        assert!(!rs.contains(0x1008));
    }

    #[test]
    fn test_duplicates_are_kept_until_drain() {
        let mut rs = RememberedSet::new();
        for _ in 0..50 {
            rs.insert(0x2000 as *const usize);
        }
        assert_eq!(rs.len(), 50);

        let entries = rs.drain();
        assert_eq!(entries, vec![RememberedEntry { slot: 0x2000 }]);
        assert!(rs.is_empty());
    }

    #[test]
    fn test_drain_preserves_unique_entries() {
        let mut rs = RememberedSet::new();
        for i in 0..5 {
            let slot = (0x1000 + i * 512) as *const usize;
            rs.insert(slot);
            rs.insert(slot);
        }

        let entries = rs.drain();
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn test_drain_sorted_order() {
        let mut rs = RememberedSet::new();
        rs.insert(0x3000 as *const usize);
        rs.insert(0x1000 as *const usize);
        rs.insert(0x2000 as *const usize);

        let slots: Vec<usize> = rs.drain().iter().map(|e| e.slot).collect();
        assert_eq!(slots, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_drain_then_insert() {
        let mut rs = RememberedSet::new();
        rs.insert(0x1000 as *const usize);
        rs.insert(0x2000 as *const usize);
        assert_eq!(rs.drain().len(), 2);

        rs.insert(0x3000 as *const usize);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.drain()[0].slot, 0x3000);
    }

    #[test]
    fn test_large_volume() {
        let mut rs = RememberedSet::new();
        for i in 0..10_000 {
            rs.insert((0x10000 + i * 8) as *const usize);
        }
        assert_eq!(rs.len(), 10_000);
        assert_eq!(rs.drain().len(), 10_000);
    }
}
