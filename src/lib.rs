//! avget Core Library
//!
//! This library provides the core of the avget tool: a resumable,
//! block-parallel downloader for DASH elementary streams with
//! mirror fallback, and the merge step that hands the finished
//! files to an external muxer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - block planning, resumable buffers, range fetching, progress
//! - [`stream`] - typed stream metadata and quality/codec selection
//! - [`merge`] - merge-argument construction and muxer invocation
//! - [`engine`] - per-episode orchestration (select → download → merge)
//! - [`job`] - the episode job handed over by the extractor layer
//! - [`options`] - configuration loading and defaults
//! - [`sidecar`] - persistence of opaque subtitle/danmaku/description payloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod engine;
pub mod job;
pub mod merge;
pub mod options;
pub mod sidecar;
pub mod stream;

// Re-export commonly used types
pub use download::{
    Block, DownloadError, Fetcher, FileBuffer, ProgressSnapshot, plan_blocks,
    spawn_progress_poller,
};
pub use engine::{DownloadEngine, EngineError, JobOutcome, MAX_WORKERS, MIN_WORKERS};
pub use job::{EpisodeJob, JobError};
pub use merge::{
    AudioSaveCodec, FfmpegMuxer, MergeError, MergeInput, MergeSpec, Muxer, VideoSaveCodec,
};
pub use options::{DEFAULT_NUM_WORKERS, DownloadOptions, OptionsError, OutputFormat};
pub use sidecar::{SidecarError, SidecarPayload};
pub use stream::{
    AudioCodec, AudioStreamMeta, VideoCodec, VideoStreamMeta, select_audio, select_video,
};
