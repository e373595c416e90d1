//! Noise filtering for extracted entries.
//!
//! Rejects administrative values that look like measurements (phone and fax
//! numbers, addresses, page/version metadata), qualitative-only results and
//! implausible names.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{BiomarkerRecord, RawBiomarker};

/// Plausibility cap on entries accepted from one chunk.
pub const MAX_RESULTS_PER_CHUNK: usize = 40;

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 60;

/// Values at or above this with no unit are identifiers, not measurements.
const IDENTIFIER_MAGNITUDE: f64 = 1e7;

static ADMIN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:phone|tel|telephone|fax|mobile|e-?mail|address|street|suite|zip|postal|page|version|rev|revision|account|accession|npi|clia|mrn|dob|date|id|specimen|requisition|patient|physician|doctor|dr|client|ref\s*no)\b",
    )
    .expect("valid regex")
});

static URL_OR_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.|@").expect("valid regex"));

/// Why an entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    InvalidName,
    AdministrativeName,
    QualitativeValue,
    IdentifierValue,
    LowConfidence,
}

fn check_name(name: &str) -> Result<(), Rejection> {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&chars)
        || !trimmed.chars().any(char::is_alphabetic)
    {
        return Err(Rejection::InvalidName);
    }
    if ADMIN_NAME_RE.is_match(trimmed) || URL_OR_EMAIL_RE.is_match(trimmed) {
        return Err(Rejection::AdministrativeName);
    }
    Ok(())
}

/// Screen a raw entry before standardization.
pub fn check_raw(raw: &RawBiomarker) -> Result<(), Rejection> {
    check_name(&raw.name)?;
    match &raw.value {
        serde_json::Value::Number(_) => Ok(()),
        serde_json::Value::String(s) if s.chars().any(|c| c.is_ascii_digit()) => Ok(()),
        // "Normal", "High", "Negative", null: no attached measurement
        _ => Err(Rejection::QualitativeValue),
    }
}

/// Screen a standardized record.
pub fn check_record(record: &BiomarkerRecord, min_confidence: f32) -> Result<(), Rejection> {
    check_name(&record.original_name)?;
    check_name(&record.standardized_name)?;
    if record.unit.is_empty() && record.value.abs() >= IDENTIFIER_MAGNITUDE {
        return Err(Rejection::IdentifierValue);
    }
    if record.confidence < min_confidence {
        return Err(Rejection::LowConfidence);
    }
    Ok(())
}
