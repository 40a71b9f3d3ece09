//! Merge-argument construction and muxer invocation contract.
//!
//! Downloaded elementary streams are combined into one container by an
//! external muxer. This module builds the [`MergeSpec`] — the resolved
//! per-stream codec directives, compatibility tag, and argument list — and
//! defines the [`Muxer`] seam behind which the process runs.

mod ffmpeg;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::stream::{AudioCodec, AudioStreamMeta, VideoCodec, VideoStreamMeta};

pub use ffmpeg::{FfmpegMuxer, Muxer};

/// Errors from the external muxer invocation.
///
/// Muxer failures are structural (codec/container problems), not transient;
/// they are never retried and the source files are preserved for
/// inspection.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The muxer binary could not be launched.
    #[error("failed to launch muxer {binary}: {source}")]
    Spawn {
        /// The binary that failed to start.
        binary: PathBuf,
        /// The underlying process error.
        #[source]
        source: std::io::Error,
    },

    /// The muxer ran but exited non-zero.
    #[error("muxer exited with status {status}: {stderr}")]
    MuxerFailed {
        /// Exit code, or -1 when terminated by a signal.
        status: i32,
        /// Captured diagnostic output.
        stderr: String,
    },
}

/// Requested save codec for the video track.
///
/// Deserializes from `"copy"` or a codec name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSaveCodec {
    /// Pass the compressed stream through unchanged.
    #[default]
    Copy,
    /// Re-encode to the named codec.
    Encode(VideoCodec),
}

impl<'de> serde::Deserialize<'de> for VideoSaveCodec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.eq_ignore_ascii_case("copy") {
            return Ok(Self::Copy);
        }
        value
            .parse()
            .map(Self::Encode)
            .map_err(serde::de::Error::custom)
    }
}

/// Requested save codec for the audio track.
///
/// Deserializes from `"copy"` or a codec name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioSaveCodec {
    /// Pass the compressed stream through unchanged.
    #[default]
    Copy,
    /// Re-encode to the named codec.
    Encode(AudioCodec),
}

impl<'de> serde::Deserialize<'de> for AudioSaveCodec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.eq_ignore_ascii_case("copy") {
            return Ok(Self::Copy);
        }
        value
            .parse()
            .map(Self::Encode)
            .map_err(serde::de::Error::custom)
    }
}

/// One input stream entry of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInput {
    /// Path of the downloaded elementary stream.
    pub path: PathBuf,
    /// Muxer codec directive: `copy` or a named codec.
    pub directive: String,
}

/// Ephemeral, fully resolved description of one muxer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSpec {
    /// Video input, when a video stream was downloaded.
    pub video: Option<MergeInput>,
    /// Audio input, when an audio stream was downloaded.
    pub audio: Option<MergeInput>,
    /// Container tag for the video track (`hvc1` for Apple-compatible
    /// HEVC), when applicable.
    pub video_tag: Option<&'static str>,
    /// Thread-count hint passed to the muxer.
    pub threads: usize,
    /// Final container path. Always overwritten.
    pub output: PathBuf,
}

impl MergeSpec {
    /// Resolves directives and builds the spec for one merge.
    ///
    /// A stream whose source codec already equals the requested save codec
    /// is rewritten to `copy`, avoiding a pointless re-encode. The `hvc1`
    /// tag is applied exactly when the video directive resolves to a copy
    /// of an HEVC source.
    #[must_use]
    pub fn build(
        video: Option<(&VideoStreamMeta, &Path)>,
        audio: Option<(&AudioStreamMeta, &Path)>,
        video_save: VideoSaveCodec,
        audio_save: AudioSaveCodec,
        threads: usize,
        output: &Path,
    ) -> Self {
        let video_input = video.map(|(meta, path)| {
            let effective = match video_save {
                VideoSaveCodec::Encode(requested) if requested == meta.codec => {
                    VideoSaveCodec::Copy
                }
                other => other,
            };
            let directive = match effective {
                VideoSaveCodec::Copy => "copy".to_string(),
                VideoSaveCodec::Encode(codec) => codec.as_str().to_string(),
            };
            MergeInput {
                path: path.to_path_buf(),
                directive,
            }
        });
        let video_tag = match (video, &video_input) {
            (Some((meta, _)), Some(input))
                if meta.codec == VideoCodec::Hevc && input.directive == "copy" =>
            {
                Some("hvc1")
            }
            _ => None,
        };

        let audio_input = audio.map(|(meta, path)| {
            let effective = match audio_save {
                AudioSaveCodec::Encode(requested) if requested == meta.codec => {
                    AudioSaveCodec::Copy
                }
                other => other,
            };
            let directive = match effective {
                AudioSaveCodec::Copy => "copy".to_string(),
                AudioSaveCodec::Encode(codec) => codec.as_str().to_string(),
            };
            MergeInput {
                path: path.to_path_buf(),
                directive,
            }
        });

        Self {
            video: video_input,
            audio: audio_input,
            video_tag,
            threads,
            output: output.to_path_buf(),
        }
    }

    /// The ordered muxer argument list: inputs, codec directives, strict
    /// compatibility flag, optional video tag, thread hint, and the
    /// always-overwrite output.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(video) = &self.video {
            args.push("-i".into());
            args.push(video.path.clone().into_os_string());
        }
        if let Some(audio) = &self.audio {
            args.push("-i".into());
            args.push(audio.path.clone().into_os_string());
        }
        if let Some(video) = &self.video {
            args.push("-vcodec".into());
            args.push(video.directive.clone().into());
        }
        if let Some(audio) = &self.audio {
            args.push("-acodec".into());
            args.push(audio.directive.clone().into());
        }
        args.push("-strict".into());
        args.push("unofficial".into());
        if let Some(tag) = self.video_tag {
            args.push("-tag:v".into());
            args.push(tag.into());
        }
        args.push("-threads".into());
        args.push(self.threads.to_string().into());
        args.push("-y".into());
        args.push(self.output.clone().into_os_string());
        args
    }
}
