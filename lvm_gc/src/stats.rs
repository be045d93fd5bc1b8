//! GC statistics and metrics.
//!
//! Tracks allocation volume per generation, collection counts and pause
//! times for monitoring and tuning.

use crate::value::WORD_SIZE;
use crate::Generation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics about allocation and collection activity.
#[derive(Debug)]
pub struct GcStats {
    // =========================================================================
    // Allocation Statistics
    // =========================================================================
    /// Words allocated in the minor heap, headers included.
    pub minor_words: AtomicU64,
    /// Words allocated directly in the major heap, headers included.
    pub major_words: AtomicU64,
    /// Blocks allocated in either heap.
    pub objects_allocated: AtomicU64,

    // =========================================================================
    // Collection Statistics
    // =========================================================================
    /// Number of minor collections.
    pub minor_collections: AtomicU64,
    /// Number of major collections.
    pub major_collections: AtomicU64,
    /// Total time spent in minor collection (nanoseconds).
    pub minor_gc_time_ns: AtomicU64,
    /// Total time spent in major collection (nanoseconds).
    pub major_gc_time_ns: AtomicU64,

    // =========================================================================
    // Promotion and Reclamation
    // =========================================================================
    /// Words promoted from the minor to the major heap.
    pub promoted_words: AtomicU64,
    /// Words reclaimed by major sweeps.
    pub swept_words: AtomicU64,
    /// Custom block finalizers run.
    pub finalised: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            minor_words: AtomicU64::new(0),
            major_words: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            minor_collections: AtomicU64::new(0),
            major_collections: AtomicU64::new(0),
            minor_gc_time_ns: AtomicU64::new(0),
            major_gc_time_ns: AtomicU64::new(0),
            promoted_words: AtomicU64::new(0),
            swept_words: AtomicU64::new(0),
            finalised: AtomicU64::new(0),
        }
    }

    /// Record an allocation of `words` words in `generation`.
    #[inline]
    pub fn record_allocation(&self, generation: Generation, words: usize) {
        let counter = match generation {
            Generation::Minor => &self.minor_words,
            Generation::Major => &self.major_words,
        };
        counter.fetch_add(words as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a minor collection.
    pub fn record_minor_gc(&self, duration: Duration, promoted_words: usize) {
        self.minor_collections.fetch_add(1, Ordering::Relaxed);
        self.minor_gc_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.promoted_words
            .fetch_add(promoted_words as u64, Ordering::Relaxed);
    }

    /// Record words promoted outside a standalone minor collection.
    #[inline]
    pub fn record_promotion(&self, words: usize) {
        self.promoted_words.fetch_add(words as u64, Ordering::Relaxed);
    }

    /// Record a major collection.
    pub fn record_major_gc(&self, duration: Duration, swept_words: usize, finalised: usize) {
        self.major_collections.fetch_add(1, Ordering::Relaxed);
        self.major_gc_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.swept_words
            .fetch_add(swept_words as u64, Ordering::Relaxed);
        self.finalised.fetch_add(finalised as u64, Ordering::Relaxed);
    }

    /// Number of minor collections so far.
    #[inline]
    pub fn minor_count(&self) -> u64 {
        self.minor_collections.load(Ordering::Relaxed)
    }

    /// Number of major collections so far.
    #[inline]
    pub fn major_count(&self) -> u64 {
        self.major_collections.load(Ordering::Relaxed)
    }

    /// Get total GC time.
    pub fn total_gc_time(&self) -> Duration {
        let minor_ns = self.minor_gc_time_ns.load(Ordering::Relaxed);
        let major_ns = self.major_gc_time_ns.load(Ordering::Relaxed);
        Duration::from_nanos(minor_ns + major_ns)
    }

    /// Get average minor GC pause time.
    pub fn avg_minor_pause(&self) -> Duration {
        let count = self.minor_count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.minor_gc_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Get average major GC pause time.
    pub fn avg_major_pause(&self) -> Duration {
        let count = self.major_count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.major_gc_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.minor_words,
            &self.major_words,
            &self.objects_allocated,
            &self.minor_collections,
            &self.major_collections,
            &self.minor_gc_time_ns,
            &self.major_gc_time_ns,
            &self.promoted_words,
            &self.swept_words,
            &self.finalised,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Render a summary of GC statistics.
    pub fn summary(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        format!(
            "allocated: {} minor, {} major ({} objects)\n\
             collections: {} minor, {} major\n\
             gc time: {:?} total ({:?} avg minor, {:?} avg major)\n\
             promoted: {}, swept: {}, finalised: {}",
            format_words(load(&self.minor_words)),
            format_words(load(&self.major_words)),
            load(&self.objects_allocated),
            self.minor_count(),
            self.major_count(),
            self.total_gc_time(),
            self.avg_minor_pause(),
            self.avg_major_pause(),
            format_words(load(&self.promoted_words)),
            format_words(load(&self.swept_words)),
            load(&self.finalised),
        )
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a word count in human-readable bytes.
fn format_words(words: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let bytes = words * WORD_SIZE as u64;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Timer for measuring collection pauses.
pub(crate) struct GcTimer {
    start: Instant,
    label: &'static str,
}

impl GcTimer {
    /// Start a new timer with the given label.
    pub(crate) fn start(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    /// Stop the timer and return the elapsed duration.
    pub(crate) fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        log::trace!("{} collection took {:?}", self.label, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_recording() {
        let stats = GcStats::new();

        stats.record_allocation(Generation::Minor, 3);
        stats.record_allocation(Generation::Minor, 5);
        stats.record_allocation(Generation::Major, 300);

        assert_eq!(stats.minor_words.load(Ordering::Relaxed), 8);
        assert_eq!(stats.major_words.load(Ordering::Relaxed), 300);
        assert_eq!(stats.objects_allocated.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_gc_timing() {
        let stats = GcStats::new();

        stats.record_minor_gc(Duration::from_micros(100), 10);
        stats.record_minor_gc(Duration::from_micros(200), 20);

        assert_eq!(stats.minor_count(), 2);
        assert_eq!(stats.avg_minor_pause(), Duration::from_micros(150));
        assert_eq!(stats.promoted_words.load(Ordering::Relaxed), 30);
        assert_eq!(stats.avg_major_pause(), Duration::ZERO);
    }

    #[test]
    fn test_reset() {
        let stats = GcStats::new();
        stats.record_allocation(Generation::Major, 10);
        stats.record_major_gc(Duration::from_micros(5), 4, 1);
        stats.reset();

        assert_eq!(stats.major_words.load(Ordering::Relaxed), 0);
        assert_eq!(stats.major_count(), 0);
        assert_eq!(stats.finalised.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_format_words() {
        let w = WORD_SIZE as u64;
        assert_eq!(format_words(1), format!("{} bytes", w));
        assert_eq!(format_words(2048 / w), "2.00 KB");
        assert_eq!(format_words(1048576 / w), "1.00 MB");
    }

    #[test]
    fn test_summary_mentions_counts() {
        let stats = GcStats::new();
        stats.record_minor_gc(Duration::from_micros(1), 0);
        assert!(stats.summary().contains("collections: 1 minor, 0 major"));
    }
}
