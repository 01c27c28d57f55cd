use std::time::Duration;

/// Which victim-selection policy the buffer pool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Second-chance clock sweep.
    Clock,
    /// Least-recently-unpinned queue.
    Lru,
}

/// Process-wide engine configuration, set once at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of frames in the buffer pool.
    pub buffer_pool_size: usize,

    /// Size in bytes of each of the two log buffers.
    pub log_buffer_size: usize,

    /// Upper bound on how long a partially filled log buffer waits
    /// before the flush thread writes it out.
    pub log_timeout: Duration,

    /// Whether mutations are logged and recovery runs at startup.
    pub enable_logging: bool,

    pub replacement_policy: ReplacementPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_pool_size: 1024,
            log_buffer_size: 64 * 1024,
            log_timeout: Duration::from_millis(300),
            enable_logging: true,
            replacement_policy: ReplacementPolicy::Clock,
        }
    }
}
