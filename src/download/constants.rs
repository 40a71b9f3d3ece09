//! Constants for the download module (timeouts, chunking, progress).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large media segments).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default block size for chunked range downloads (0.5 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

/// Default interval between progress snapshots, in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Base delay before falling over to the next mirror.
pub const MIRROR_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Maximum jitter added to the mirror fallover delay.
pub const MIRROR_RETRY_MAX_JITTER: Duration = Duration::from_millis(250);
