//! Safe chunk compression.
//!
//! Indicator lines (number + unit, result flags, reference-range wording)
//! are copied through untouched at every level. A pass that removes more
//! than the configured fraction of tokens is discarded and the original
//! text is kept.

use serde::{Deserialize, Serialize};

use super::tokens::estimate_tokens;
use crate::pipeline::signatures::{is_indicator_line, ADMIN_PATTERNS};
use crate::pipeline_config::CompressionLevel;

/// Token accounting for one compression pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompressionStats {
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// The pass exceeded the cap and the original text was restored.
    pub reverted: bool,
}

impl CompressionStats {
    pub fn ratio(&self) -> f32 {
        if self.tokens_before == 0 {
            return 0.0;
        }
        1.0 - self.tokens_after as f32 / self.tokens_before as f32
    }
}

/// Compress `text` at `level`, reverting when the reduction exceeds
/// `max_ratio` of the original token estimate.
pub fn compress(text: &str, level: CompressionLevel, max_ratio: f32) -> (String, CompressionStats) {
    let tokens_before = estimate_tokens(text);
    let compressed = match level {
        CompressionLevel::None => text.to_string(),
        CompressionLevel::Minimal => minimal_cleanup(text),
        CompressionLevel::Aggressive => minimal_cleanup(&strip_boilerplate(text)),
    };
    let tokens_after = estimate_tokens(&compressed);

    let removed = tokens_before.saturating_sub(tokens_after);
    if removed as f32 > max_ratio * tokens_before as f32 {
        tracing::debug!(
            tokens_before,
            tokens_after,
            max_ratio,
            "Compression exceeded cap, keeping original chunk"
        );
        return (
            text.to_string(),
            CompressionStats {
                tokens_before,
                tokens_after: tokens_before,
                reverted: true,
            },
        );
    }

    (
        compressed,
        CompressionStats {
            tokens_before,
            tokens_after,
            reverted: false,
        },
    )
}

/// Trim line ends and collapse runs of blank lines. Column spacing inside a
/// line is left alone since table alignment depends on it. Indicator lines
/// pass through untouched.
fn minimal_cleanup(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = true;
    for line in text.lines() {
        if is_indicator_line(line) {
            out.push(line);
            previous_blank = false;
            continue;
        }
        let line = line.trim_end();
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(if blank { "" } else { line });
        previous_blank = blank;
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Remove strippable administrative content from non-indicator lines.
fn strip_boilerplate(text: &str) -> String {
    let mut out = Vec::new();
    for line in text.lines() {
        if is_indicator_line(line) {
            out.push(line.to_string());
            continue;
        }
        if let Some(stripped) = strip_line(line) {
            out.push(stripped);
        }
    }
    out.join("\n")
}

/// `None` when the whole line is boilerplate.
fn strip_line(line: &str) -> Option<String> {
    let mut current = line.to_string();
    let mut touched = false;
    for pattern in ADMIN_PATTERNS.iter().filter(|p| p.kind.is_strippable()) {
        if !pattern.regex.is_match(&current) {
            continue;
        }
        if pattern.whole_line {
            return None;
        }
        current = pattern.regex.replace_all(&current, "").into_owned();
        touched = true;
    }
    if touched && is_residue(&current) {
        return None;
    }
    Some(current)
}

/// What is left of a line after stripping: labels and punctuation only.
fn is_residue(line: &str) -> bool {
    let meaningful = line
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_lowercase();
    meaningful.is_empty()
        || matches!(
            meaningful.as_str(),
            "tel" | "phone" | "fax" | "email" | "e-mail" | "web" | "website" | "visit" | "contact"
        )
}
