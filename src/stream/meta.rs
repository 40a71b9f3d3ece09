//! Typed stream metadata handed over by the extractor layer.
//!
//! Variants carry only the fields each stream kind needs; records are
//! immutable once obtained. Codec identifiers deserialize from the common
//! spellings found in playlist payloads.

use serde::Deserialize;
use thiserror::Error;

/// A codec identifier that matches no known spelling.
#[derive(Debug, Error)]
#[error("unknown codec: {0}")]
pub struct UnknownCodec(String);

/// Video codec of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[serde(alias = "h264")]
    Avc,
    /// H.265 / HEVC.
    #[serde(alias = "h265")]
    Hevc,
    /// AV1.
    Av1,
}

impl VideoCodec {
    /// The muxer-facing codec name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avc => "avc",
            Self::Hevc => "hevc",
            Self::Av1 => "av1",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avc" | "h264" => Ok(Self::Avc),
            "hevc" | "h265" => Ok(Self::Hevc),
            "av1" => Ok(Self::Av1),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

/// Audio codec of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// AAC (including the `mp4a` payload spelling).
    #[serde(alias = "mp4a")]
    Aac,
    /// FLAC (payloads spell it `fLaC`).
    #[serde(alias = "fLaC")]
    Flac,
    /// Dolby Digital Plus.
    #[serde(alias = "ec-3")]
    Eac3,
}

impl AudioCodec {
    /// The muxer-facing codec name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Eac3 => "eac3",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aac" | "mp4a" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "eac3" | "ec-3" => Ok(Self::Eac3),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

/// One downloadable video stream candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoStreamMeta {
    /// Codec of the elementary stream.
    pub codec: VideoCodec,
    /// Quality tier; higher is better. Tier numbering is defined by the
    /// extractor layer.
    pub quality: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Primary source URL.
    pub url: String,
    /// Ordered fallback URLs serving identical content.
    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// One downloadable audio stream candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AudioStreamMeta {
    /// Codec of the elementary stream.
    pub codec: AudioCodec,
    /// Quality tier; higher is better.
    pub quality: u32,
    /// Primary source URL.
    pub url: String,
    /// Ordered fallback URLs serving identical content.
    #[serde(default)]
    pub mirrors: Vec<String>,
}

impl VideoStreamMeta {
    /// Primary URL followed by every mirror, the order fetch attempts use.
    #[must_use]
    pub fn all_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.mirrors.len());
        urls.push(self.url.clone());
        urls.extend(self.mirrors.iter().cloned());
        urls
    }
}

impl AudioStreamMeta {
    /// Primary URL followed by every mirror, the order fetch attempts use.
    #[must_use]
    pub fn all_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.mirrors.len());
        urls.push(self.url.clone());
        urls.extend(self.mirrors.iter().cloned());
        urls
    }
}
