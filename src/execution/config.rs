//! Session configuration

/// Default size below which a join input is broadcast automatically (10 MiB)
pub const DEFAULT_BROADCAST_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Default number of rows per in-memory batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Tunables of an execution session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of partitions for scans and shuffles
    pub target_partitions: usize,
    /// Estimated size in bytes at or below which the build side is broadcast
    /// without a hint; 0 disables automatic broadcasting
    pub broadcast_threshold: u64,
    /// Rows per batch when registering in-memory data
    pub batch_size: usize,
    /// Maximum rows per data file when writing tables
    pub max_rows_per_file: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_partitions: rayon::current_num_threads().max(1),
            broadcast_threshold: DEFAULT_BROADCAST_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            max_rows_per_file: 1_000_000,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions.max(1);
        self
    }

    pub fn with_broadcast_threshold(mut self, bytes: u64) -> Self {
        self.broadcast_threshold = bytes;
        self
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows.max(1);
        self
    }
}
