//! Error types for the download module.
//!
//! This module defines structured errors for all download operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching streams to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (open, seek, write, flush).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Every source for a byte range failed; the last error is attached.
    #[error("all {attempts} sources exhausted for {url}: {last}")]
    MirrorsExhausted {
        /// The primary URL of the range that could not be fetched.
        url: String,
        /// Number of URLs tried (primary + mirrors).
        attempts: usize,
        /// The error from the final attempt.
        #[source]
        last: Box<DownloadError>,
    },

    /// Resume offset lies beyond the known total size.
    ///
    /// This is a precondition failure: callers must not silently clamp.
    #[error("resume offset {resume} exceeds total size {total}")]
    ResumeBeyondTotal {
        /// The resume offset derived from the partial file.
        resume: u64,
        /// The known total object size.
        total: u64,
    },

    /// A completed buffer does not hold the expected number of bytes.
    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The buffer file that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected: u64,
        /// Actual persisted size in bytes.
        actual: u64,
    },

    /// A write or close was issued against an already-closed buffer.
    #[error("buffer for {path} is closed")]
    BufferClosed {
        /// The buffer file path.
        path: PathBuf,
    },

    /// The shared connection limiter was closed while a fetch waited on it.
    #[error("connection limiter closed unexpectedly")]
    LimiterClosed,
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a mirrors-exhausted error wrapping the final attempt's error.
    pub fn mirrors_exhausted(url: impl Into<String>, attempts: usize, last: DownloadError) -> Self {
        Self::MirrorsExhausted {
            url: url.into(),
            attempts,
            last: Box::new(last),
        }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(path: impl Into<PathBuf>, expected: u64, actual: u64) -> Self {
        Self::SizeMismatch {
            path: path.into(),
            expected,
            actual,
        }
    }

    /// Creates a buffer-closed error.
    pub fn buffer_closed(path: impl Into<PathBuf>) -> Self {
        Self::BufferClosed { path: path.into() }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide. The helper constructor methods are the pattern here.
