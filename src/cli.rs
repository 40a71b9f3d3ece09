//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download and merge DASH media streams.
///
/// avget fetches the video/audio elementary streams described by one or
/// more episode job files, with resumable block-parallel transfers and
/// mirror fallback, then muxes them into a single playable file.
#[derive(Parser, Debug)]
#[command(name = "avget")]
#[command(author, version, about)]
pub struct Args {
    /// Episode job files (JSON) produced by the extractor layer
    #[arg(required = true, value_name = "JOB")]
    pub jobs: Vec<PathBuf>,

    /// Options file (JSON); CLI flags override its values
    #[arg(short = 'C', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum concurrent connections (1-100, default 8)
    #[arg(short = 'n', long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub num_workers: Option<u8>,

    /// Block size per chunk in MiB (0 disables chunking)
    #[arg(short = 'b', long, value_name = "MIB")]
    pub block_size_mib: Option<f64>,

    /// Discard existing output and partial files instead of resuming
    #[arg(short = 'w', long)]
    pub overwrite: bool,

    /// Skip the video stream even when one is offered
    #[arg(long)]
    pub no_video: bool,

    /// Skip the audio stream even when one is offered
    #[arg(long)]
    pub no_audio: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// The block size in bytes, when given on the command line.
    /// `Some(None)` means chunking explicitly disabled.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn block_size_bytes(&self) -> Option<Option<u64>> {
        self.block_size_mib.map(|mib| {
            if mib <= 0.0 {
                None
            } else {
                Some((mib * 1024.0 * 1024.0) as u64)
            }
        })
    }
}
