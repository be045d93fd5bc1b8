//! GC configuration parameters.
//!
//! All sizes are in machine words so the same configuration describes the
//! same number of objects on 32- and 64-bit targets.

use thiserror::Error;

/// Hard upper bound for [`GcConfig::max_young_wosize`].
pub const MAX_YOUNG_WOSIZE_LIMIT: usize = 256;

/// Configuration for the allocator and its heap.
///
/// # Example
///
/// ```
/// use lvm_gc::GcConfig;
///
/// let config = GcConfig {
///     minor_heap_wsize: 64 * 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    // =========================================================================
    // Minor Heap (Young Generation)
    // =========================================================================
    /// Capacity of the minor heap in words.
    ///
    /// Exhausting it triggers a minor collection inside the allocating call.
    ///
    /// Default: 32K words
    pub minor_heap_wsize: usize,

    /// Largest object, in fields, allocated in the minor heap.
    ///
    /// Anything bigger is carved directly from the major heap.
    ///
    /// Default: 256
    pub max_young_wosize: usize,

    // =========================================================================
    // Major Heap (Old Generation)
    // =========================================================================
    /// Size of each chunk the major heap grows by, in words.
    ///
    /// Objects larger than a chunk get a chunk of their own.
    ///
    /// Default: 64K words
    pub major_chunk_wsize: usize,

    /// Maximum major heap size in words.
    ///
    /// Growing past it is an out-of-memory fault. 0 means unlimited.
    ///
    /// Default: 0 (unlimited)
    pub max_major_wsize: usize,

    // =========================================================================
    // Collection Triggers
    // =========================================================================
    /// Words allocated in the major heap, directly or by promotion, after
    /// which a major collection becomes urgent.
    ///
    /// Default: 1M words
    pub major_urgent_wsize: usize,

    /// Accumulated `used / max` ratio of custom blocks after which a major
    /// collection becomes urgent.
    ///
    /// Default: 1.0
    pub custom_resource_limit: f64,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Verify heap integrity after each collection.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            minor_heap_wsize: 32 * 1024,
            max_young_wosize: MAX_YOUNG_WOSIZE_LIMIT,

            major_chunk_wsize: 64 * 1024,
            max_major_wsize: 0,

            major_urgent_wsize: 1024 * 1024,
            custom_resource_limit: 1.0,

            verify_heap: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Create a configuration optimized for low memory usage.
    pub fn low_memory() -> Self {
        Self {
            minor_heap_wsize: 8 * 1024,
            major_chunk_wsize: 16 * 1024,
            major_urgent_wsize: 256 * 1024,
            ..Default::default()
        }
    }

    /// Create a configuration optimized for high throughput.
    pub fn high_throughput() -> Self {
        Self {
            minor_heap_wsize: 256 * 1024,
            major_chunk_wsize: 256 * 1024,
            major_urgent_wsize: 4 * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Create a configuration with tiny heaps that collect constantly.
    ///
    /// Useful for shaking out missing roots and barriers.
    pub fn testing() -> Self {
        Self {
            minor_heap_wsize: 256,
            max_young_wosize: 16,
            major_chunk_wsize: 256,
            max_major_wsize: 0,
            major_urgent_wsize: 2048,
            custom_resource_limit: 1.0,
            verify_heap: true,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_young_wosize == 0 {
            return Err(ConfigError::MaxYoungTooSmall);
        }
        if self.max_young_wosize > MAX_YOUNG_WOSIZE_LIMIT {
            return Err(ConfigError::MaxYoungTooLarge(self.max_young_wosize));
        }
        if self.minor_heap_wsize < 2 * (self.max_young_wosize + 1) {
            return Err(ConfigError::MinorHeapTooSmall {
                minor_heap_wsize: self.minor_heap_wsize,
                required: 2 * (self.max_young_wosize + 1),
            });
        }
        if self.major_chunk_wsize < 64 {
            return Err(ConfigError::ChunkTooSmall(self.major_chunk_wsize));
        }
        if self.custom_resource_limit.is_nan() || self.custom_resource_limit <= 0.0 {
            return Err(ConfigError::InvalidResourceLimit);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The young object size limit must be at least one field.
    #[error("max young wosize must be at least 1")]
    MaxYoungTooSmall,
    /// The young object size limit is above the supported maximum.
    #[error("max young wosize {0} exceeds the limit of 256")]
    MaxYoungTooLarge(usize),
    /// The minor heap cannot hold two maximal young objects.
    #[error("minor heap of {minor_heap_wsize} words is too small, need at least {required}")]
    MinorHeapTooSmall {
        /// Configured minor heap size.
        minor_heap_wsize: usize,
        /// Minimum size for the configured young object limit.
        required: usize,
    },
    /// Major heap chunks are too small.
    #[error("major chunk of {0} words is too small, minimum 64")]
    ChunkTooSmall(usize),
    /// The custom resource limit must be a positive number.
    #[error("custom resource limit must be positive")]
    InvalidResourceLimit,
}
