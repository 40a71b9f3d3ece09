//! Episode jobs: the unit of work handed over by the extractor layer.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::sidecar::SidecarPayload;
use crate::stream::{AudioStreamMeta, VideoStreamMeta};

/// Errors loading a job file.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job file could not be read.
    #[error("failed to read job {path}: {source}")]
    Io {
        /// The job file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The job file is not valid JSON for `EpisodeJob`.
    #[error("failed to parse job {path}: {source}")]
    Parse {
        /// The job file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// One logical episode to download and merge.
///
/// Stream candidates and sidecar payloads are produced upstream and are
/// read-only here. The job is discarded after orchestration completes or
/// fails.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeJob {
    /// Output filename stem (no extension).
    pub filename: String,
    /// Directory for the final container and sidecar files.
    pub output_dir: PathBuf,
    /// Directory holding the raw per-stream partials during download.
    pub tmp_dir: PathBuf,
    /// Video stream candidates.
    #[serde(default)]
    pub videos: Vec<VideoStreamMeta>,
    /// Audio stream candidates.
    #[serde(default)]
    pub audios: Vec<AudioStreamMeta>,
    /// Opaque subtitle/danmaku/description payloads to persist alongside
    /// the output.
    #[serde(default)]
    pub sidecars: Vec<SidecarPayload>,
}

impl EpisodeJob {
    /// Loads a job from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| JobError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Temp path of the raw video stream.
    #[must_use]
    pub fn video_temp_path(&self) -> PathBuf {
        self.tmp_dir.join(format!("{}_video.m4s", self.filename))
    }

    /// Temp path of the raw audio stream.
    #[must_use]
    pub fn audio_temp_path(&self) -> PathBuf {
        self.tmp_dir.join(format!("{}_audio.m4s", self.filename))
    }

    /// Final container path for `extension` (no leading dot).
    #[must_use]
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{extension}", self.filename))
    }
}
