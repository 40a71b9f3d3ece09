//! Stream metadata types and selection policy.

mod meta;
mod select;

pub use meta::{AudioCodec, AudioStreamMeta, UnknownCodec, VideoCodec, VideoStreamMeta};
pub use select::{select_audio, select_video};
