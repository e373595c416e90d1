//! Smart chunk skipper.
//!
//! Cheap screening before any inference call. Conservative by construction:
//! a chunk carrying a single indicator line is always retained.

use serde::{Deserialize, Serialize};

use super::ContentChunk;
use crate::pipeline::signatures::{count_admin_lines, count_indicator_lines};

/// Why a chunk was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    Administrative,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipStats {
    pub chunks_in: usize,
    pub chunks_retained: usize,
    pub skipped_empty: usize,
    pub skipped_administrative: usize,
    /// Estimated tokens that will not be sent for inference.
    pub tokens_saved: usize,
}

impl SkipStats {
    pub fn skipped(&self) -> usize {
        self.skipped_empty + self.skipped_administrative
    }
}

/// Decide whether one chunk can be skipped.
pub fn skip_reason(
    chunk: &ContentChunk,
    admin_pattern_threshold: usize,
    confidence_threshold: f32,
) -> Option<SkipReason> {
    if chunk.text.trim().is_empty() {
        return Some(SkipReason::Empty);
    }
    if count_indicator_lines(&chunk.text) > 0 {
        return None;
    }
    let admin_hits = count_admin_lines(&chunk.text);
    if admin_hits > admin_pattern_threshold && chunk.confidence < confidence_threshold {
        return Some(SkipReason::Administrative);
    }
    None
}

/// Filter `chunks`, returning the retained ones in order plus statistics.
pub fn skip_chunks(
    chunks: Vec<ContentChunk>,
    admin_pattern_threshold: usize,
    confidence_threshold: f32,
) -> (Vec<ContentChunk>, SkipStats) {
    let mut stats = SkipStats {
        chunks_in: chunks.len(),
        ..SkipStats::default()
    };
    let mut retained = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match skip_reason(&chunk, admin_pattern_threshold, confidence_threshold) {
            Some(reason) => {
                tracing::debug!(
                    chunk = chunk.index,
                    page = chunk.page_number,
                    reason = ?reason,
                    "Skipping chunk"
                );
                stats.tokens_saved += chunk.token_estimate;
                match reason {
                    SkipReason::Empty => stats.skipped_empty += 1,
                    SkipReason::Administrative => stats.skipped_administrative += 1,
                }
            }
            None => retained.push(chunk),
        }
    }

    stats.chunks_retained = retained.len();
    tracing::info!(
        chunks_in = stats.chunks_in,
        retained = stats.chunks_retained,
        skipped = stats.skipped(),
        tokens_saved = stats.tokens_saved,
        "Chunk skipping complete"
    );
    (retained, stats)
}
