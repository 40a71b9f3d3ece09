//! Resumable, block-parallel stream download engine.
//!
//! This module provides the building blocks for fetching remote media
//! objects over HTTP: block planning, an offset-addressed resumable file
//! buffer, a range fetcher with mirror fallback under a shared connection
//! limiter, and cross-stream progress aggregation.
//!
//! # Overview
//!
//! A download is planned as disjoint byte [`Block`]s over the remaining span
//! of a [`FileBuffer`], fetched concurrently by [`Fetcher::fetch_range`]
//! tasks, and observed by a progress poller. Resume works purely off the
//! persisted contiguous prefix reported by [`FileBuffer::written_size`].

mod block;
mod buffer;
pub mod constants;
mod error;
mod fetcher;
mod progress;

pub use block::{Block, plan_blocks};
pub use buffer::FileBuffer;
pub use error::DownloadError;
pub use fetcher::Fetcher;
pub use progress::{ProgressSnapshot, spawn_progress_poller};
