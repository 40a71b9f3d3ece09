//! Download configuration: defaults, file loading, and CLI-merged options.
//!
//! `DownloadOptions` is the single configuration struct consumed by the
//! engine. It deserializes from a JSON config file with every field
//! optional; the binary layers CLI overrides on top.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BLOCK_SIZE, DEFAULT_PROGRESS_INTERVAL_MS, READ_TIMEOUT_SECS,
};
use crate::merge::{AudioSaveCodec, VideoSaveCodec};
use crate::stream::{AudioCodec, VideoCodec};

/// Default global concurrent-connection cap.
pub const DEFAULT_NUM_WORKERS: usize = 8;

/// Errors loading an options file.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `DownloadOptions`.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Output container selection: inferred from the downloaded codecs, or an
/// explicit extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Infer the extension from what was downloaded.
    #[default]
    Infer,
    /// Use this extension (without the leading dot).
    Ext(String),
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.eq_ignore_ascii_case("infer") {
            Ok(Self::Infer)
        } else {
            Ok(Self::Ext(value.trim_start_matches('.').to_string()))
        }
    }
}

/// Configuration for one engine run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadOptions {
    /// Global cap on simultaneous connections across all streams.
    pub num_workers: usize,
    /// Bytes per chunk; `null` disables chunking (one request per stream).
    pub block_size: Option<u64>,
    /// Discard existing output and partial files instead of resuming.
    pub overwrite: bool,
    /// Highest acceptable video quality tier.
    pub video_quality: u32,
    /// Highest acceptable audio quality tier.
    pub audio_quality: u32,
    /// Video codec preference order for selection.
    pub video_codec_preference: Vec<VideoCodec>,
    /// Audio codec preference order for selection.
    pub audio_codec_preference: Vec<AudioCodec>,
    /// Save directive for the video track (`copy` or a codec).
    pub video_save_codec: VideoSaveCodec,
    /// Save directive for the audio track (`copy` or a codec).
    pub audio_save_codec: AudioSaveCodec,
    /// Output container when video is downloaded.
    pub output_format: OutputFormat,
    /// Output container when only audio is downloaded.
    pub output_format_audio_only: OutputFormat,
    /// Whether the video stream should be downloaded when available.
    pub require_video: bool,
    /// Whether the audio stream should be downloaded when available.
    pub require_audio: bool,
    /// Referer header attached to stream requests, when the host needs one.
    pub referer: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Milliseconds between progress snapshots.
    pub progress_interval_ms: u64,
    /// Muxer binary, resolved via `PATH` when relative.
    pub ffmpeg_path: PathBuf,
    /// Muxer thread-count hint; defaults to the machine's parallelism.
    pub ffmpeg_threads: Option<usize>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            block_size: Some(DEFAULT_BLOCK_SIZE),
            overwrite: false,
            video_quality: u32::MAX,
            audio_quality: u32::MAX,
            video_codec_preference: vec![VideoCodec::Avc, VideoCodec::Hevc, VideoCodec::Av1],
            audio_codec_preference: vec![AudioCodec::Aac, AudioCodec::Flac, AudioCodec::Eac3],
            video_save_codec: VideoSaveCodec::Copy,
            audio_save_codec: AudioSaveCodec::Copy,
            output_format: OutputFormat::Infer,
            output_format_audio_only: OutputFormat::Infer,
            require_video: true,
            require_audio: true,
            referer: None,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_threads: None,
        }
    }
}

impl DownloadOptions {
    /// Loads options from a JSON file; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Thread count passed to the muxer.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.ffmpeg_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}
