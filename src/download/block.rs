//! Block planning for chunked range downloads.
//!
//! A [`Block`] is a contiguous byte range of a remote object fetched in one
//! request. [`plan_blocks`] turns (already-written bytes, total size, block
//! size) into the ordered list of ranges still needing transfer. It is pure
//! and side-effect free.

use super::error::DownloadError;

/// A contiguous byte range of a remote object.
///
/// `size == None` means "read until the connection closes" and is only
/// produced when the total object size is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Absolute byte offset where this block starts.
    pub start: u64,
    /// Number of bytes in this block, or `None` for an unbounded read.
    pub size: Option<u64>,
}

impl Block {
    /// Creates a bounded block.
    #[must_use]
    pub fn bounded(start: u64, size: u64) -> Self {
        Self {
            start,
            size: Some(size),
        }
    }

    /// Creates an unbounded block starting at offset 0.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            start: 0,
            size: None,
        }
    }
}

/// Plans the byte ranges still needing transfer.
///
/// - Unknown `total_size` yields a single unbounded block `(0, None)`; the
///   caller must special-case "unknown length, no resume".
/// - A `None` `block_size` yields a single block covering the whole object
///   from offset 0 (no resume granularity; `resume_from` is ignored).
/// - Otherwise, contiguous `block_size` blocks from `resume_from` up to
///   `total_size`, with the final block shrunk to the remainder.
///
/// # Errors
///
/// Returns [`DownloadError::ResumeBeyondTotal`] when `resume_from` exceeds
/// the known total size. Callers must not clamp.
pub fn plan_blocks(
    resume_from: u64,
    total_size: Option<u64>,
    block_size: Option<u64>,
) -> Result<Vec<Block>, DownloadError> {
    let Some(total) = total_size else {
        return Ok(vec![Block::unbounded()]);
    };
    let Some(block) = block_size else {
        // Whole object in one request; the resume offset does not apply
        // here (see tests).
        return Ok(vec![Block::bounded(0, total.saturating_sub(1))]);
    };
    if resume_from > total {
        return Err(DownloadError::ResumeBeyondTotal {
            resume: resume_from,
            total,
        });
    }

    let mut blocks = Vec::new();
    let mut start = resume_from;
    while start < total {
        let size = block.min(total - start);
        blocks.push(Block::bounded(start, size));
        start += size;
    }
    Ok(blocks)
}
