//! Stream selection against quality and codec preferences.
//!
//! Selection walks quality tiers from the requested tier downward, never
//! above it. Within a tier, the candidate whose codec appears earliest in
//! the preference order wins; candidates with codecs outside the order rank
//! last. All ties break by original candidate order, keeping the choice
//! stable.

use tracing::debug;

use super::meta::{AudioCodec, AudioStreamMeta, VideoCodec, VideoStreamMeta};

/// Picks at most one video stream.
///
/// Returns `None` when no candidate sits at or below the requested tier;
/// callers treat that as "video not available".
#[must_use]
pub fn select_video<'a>(
    candidates: &'a [VideoStreamMeta],
    quality: u32,
    codec_preference: &[VideoCodec],
) -> Option<&'a VideoStreamMeta> {
    let selected = select_by(
        candidates,
        quality,
        |meta| meta.quality,
        |meta| codec_rank(codec_preference, meta.codec),
    );
    if let Some(meta) = selected {
        debug!(
            codec = %meta.codec,
            quality = meta.quality,
            width = meta.width,
            height = meta.height,
            "selected video stream"
        );
    }
    selected
}

/// Picks at most one audio stream.
///
/// Returns `None` when no candidate sits at or below the requested tier;
/// callers treat that as "audio not available".
#[must_use]
pub fn select_audio<'a>(
    candidates: &'a [AudioStreamMeta],
    quality: u32,
    codec_preference: &[AudioCodec],
) -> Option<&'a AudioStreamMeta> {
    let selected = select_by(
        candidates,
        quality,
        |meta| meta.quality,
        |meta| codec_rank(codec_preference, meta.codec),
    );
    if let Some(meta) = selected {
        debug!(codec = %meta.codec, quality = meta.quality, "selected audio stream");
    }
    selected
}

/// Rank of `codec` in the preference order; unlisted codecs sort last.
fn codec_rank<C: PartialEq>(preference: &[C], codec: C) -> usize {
    preference
        .iter()
        .position(|preferred| *preferred == codec)
        .unwrap_or(preference.len())
}

fn select_by<'a, T>(
    candidates: &'a [T],
    quality: u32,
    tier_of: impl Fn(&T) -> u32,
    rank_of: impl Fn(&T) -> usize,
) -> Option<&'a T> {
    // Best tier at or below the request; candidates above it are never
    // silently picked.
    let tier = candidates
        .iter()
        .map(&tier_of)
        .filter(|&t| t <= quality)
        .max()?;
    candidates
        .iter()
        .enumerate()
        .filter(|(_, meta)| tier_of(meta) == tier)
        .min_by_key(|(index, meta)| (rank_of(meta), *index))
        .map(|(_, meta)| meta)
}
