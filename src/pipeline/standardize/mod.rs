//! Record standardization, noise validation and deduplication.

pub mod dedup;
pub mod range;
pub mod units;
pub mod validate;
pub mod value;

pub use dedup::deduplicate;
pub use range::{parse_reference_range, ParsedRange};
pub use units::normalize_unit;
pub use validate::{check_raw, check_record, Rejection, MAX_RESULTS_PER_CHUNK};
pub use value::safe_float;

use super::biomarkers::{category_for, standardize_name};
use super::types::{BiomarkerRecord, ExtractionMethod, RawBiomarker, SourceRef};

/// Confidence multiplier applied when a value could not be converted.
const CONVERSION_PENALTY: f32 = 0.5;

/// Standardize one raw entry. Never fails.
///
/// `default_confidence` applies when the producer reported none.
pub fn standardize(
    raw: &RawBiomarker,
    default_confidence: f32,
    method: ExtractionMethod,
    source: SourceRef,
) -> BiomarkerRecord {
    let conversion = safe_float(&raw.value);
    let mut confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(default_confidence)
        .clamp(0.0, 1.0);
    if !conversion.converted {
        confidence *= CONVERSION_PENALTY;
    }

    let unit = raw.unit.as_deref().map(normalize_unit).unwrap_or_default();

    let text_range = raw
        .reference_range
        .as_deref()
        .and_then(parse_reference_range)
        .unwrap_or_default();
    let range = ParsedRange {
        low: raw.reference_range_low.or(text_range.low),
        high: raw.reference_range_high.or(text_range.high),
    };

    let is_abnormal = if conversion.converted && !range.is_empty() {
        range.is_outside(conversion.value)
    } else {
        raw.flag
            .as_deref()
            .and_then(range::flag_is_abnormal)
            .unwrap_or(false)
    };

    let standardized_name = standardize_name(&raw.name);
    let category = category_for(&standardized_name).to_string();

    BiomarkerRecord {
        standardized_name,
        original_name: raw.name.trim().to_string(),
        value: conversion.value,
        unit,
        reference_range_low: range.low,
        reference_range_high: range.high,
        reference_range_text: raw
            .reference_range
            .as_ref()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        category,
        is_abnormal,
        confidence,
        source,
        method,
    }
}

/// Outcome of screening and standardizing a batch.
#[derive(Debug, Default)]
pub struct Screened {
    pub accepted: Vec<BiomarkerRecord>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Screen raw entries for noise, standardize the survivors and drop those
/// below `min_confidence`. At most [`MAX_RESULTS_PER_CHUNK`] entries are
/// considered.
pub fn screen_raw(
    raws: &[RawBiomarker],
    default_confidence: f32,
    min_confidence: f32,
    method: ExtractionMethod,
    source: SourceRef,
) -> Screened {
    let mut screened = Screened::default();
    if raws.len() > MAX_RESULTS_PER_CHUNK {
        tracing::warn!(
            count = raws.len(),
            cap = MAX_RESULTS_PER_CHUNK,
            "Entry count exceeds plausibility cap, truncating"
        );
    }
    for raw in raws.iter().take(MAX_RESULTS_PER_CHUNK) {
        if let Err(rejection) = check_raw(raw) {
            screened.rejected.push((raw.name.clone(), rejection));
            continue;
        }
        let record = standardize(raw, default_confidence, method, source);
        match check_record(&record, min_confidence) {
            Ok(()) => screened.accepted.push(record),
            Err(rejection) => screened.rejected.push((raw.name.clone(), rejection)),
        }
    }
    screened
}

/// Apply record-level screening to already standardized records.
pub fn screen_records(records: Vec<BiomarkerRecord>, min_confidence: f32) -> Screened {
    let mut screened = Screened::default();
    for record in records {
        match check_record(&record, min_confidence) {
            Ok(()) => screened.accepted.push(record),
            Err(rejection) => screened.rejected.push((record.original_name.clone(), rejection)),
        }
    }
    screened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::biomarkers::{LIPIDS, METABOLIC, OTHER};
    use serde_json::json;

    fn raw(name: &str, value: serde_json::Value, unit: &str) -> RawBiomarker {
        RawBiomarker {
            name: name.into(),
            value,
            unit: Some(unit.into()),
            ..RawBiomarker::default()
        }
    }

    #[test]
    fn standardizes_name_unit_and_category() {
        let record = standardize(
            &raw("Fasting Glucose", json!("105"), "MG/DL"),
            0.9,
            ExtractionMethod::Inference,
            SourceRef::default(),
        );
        assert_eq!(record.standardized_name, "Glucose");
        assert_eq!(record.original_name, "Fasting Glucose");
        assert_eq!(record.value, 105.0);
        assert_eq!(record.unit, "mg/dL");
        assert_eq!(record.category, METABOLIC);
        assert_eq!(record.confidence, 0.9);
    }

    #[test]
    fn abnormal_from_range_overrides_flag() {
        let mut entry = raw("LDL", json!(120), "mg/dL");
        entry.reference_range = Some("0-99".into());
        entry.flag = Some("normal".into());
        let record = standardize(&entry, 0.9, ExtractionMethod::Inference, SourceRef::default());
        assert!(record.is_abnormal);
        assert_eq!(record.reference_range_high, Some(99.0));
        assert_eq!(record.reference_range_text.as_deref(), Some("0-99"));
        assert_eq!(record.category, LIPIDS);
    }

    #[test]
    fn abnormal_from_flag_without_range() {
        let mut entry = raw("Mystery Analyte", json!(3), "U/L");
        entry.flag = Some("H".into());
        let record = standardize(&entry, 0.9, ExtractionMethod::Inference, SourceRef::default());
        assert!(record.is_abnormal);
        assert_eq!(record.category, OTHER);
    }

    #[test]
    fn explicit_bounds_take_precedence() {
        let mut entry = raw("Glucose", json!(65), "mg/dL");
        entry.reference_range_low = Some(70.0);
        entry.reference_range = Some("<99".into());
        let record = standardize(&entry, 0.9, ExtractionMethod::Inference, SourceRef::default());
        assert_eq!(record.reference_range_low, Some(70.0));
        assert_eq!(record.reference_range_high, Some(99.0));
        assert!(record.is_abnormal);
    }

    #[test]
    fn unconvertible_value_lowers_confidence() {
        let record = standardize(
            &raw("Glucose", json!("pending"), "mg/dL"),
            0.9,
            ExtractionMethod::Inference,
            SourceRef::default(),
        );
        assert_eq!(record.value, 0.0);
        assert!(record.confidence < 0.6);
    }

    #[test]
    fn reported_confidence_used_and_clamped() {
        let mut entry = raw("Glucose", json!(98), "mg/dL");
        entry.confidence = Some(1.7);
        let record = standardize(&entry, 0.5, ExtractionMethod::Inference, SourceRef::default());
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn screening_excludes_low_confidence_and_noise() {
        let mut low = raw("LDL", json!(120), "mg/dL");
        low.confidence = Some(0.4);
        let raws = vec![
            raw("Fax", json!(9876543210u64), ""),
            raw("Glucose", json!(105), "mg/dL"),
            raw("Glucose", json!("Normal"), ""),
            low,
        ];
        let screened = screen_raw(&raws, 0.85, 0.6, ExtractionMethod::Inference, SourceRef::default());
        assert_eq!(screened.accepted.len(), 1);
        assert_eq!(screened.accepted[0].standardized_name, "Glucose");
        assert_eq!(screened.rejected.len(), 3);
        assert!(screened
            .rejected
            .iter()
            .any(|(_, r)| *r == Rejection::LowConfidence));
    }

    #[test]
    fn screening_caps_entry_count() {
        let raws: Vec<RawBiomarker> = (0..MAX_RESULTS_PER_CHUNK + 10)
            .map(|i| raw(&format!("Analyte {i}"), json!(i), "U/L"))
            .collect();
        let screened = screen_raw(&raws, 0.9, 0.6, ExtractionMethod::Inference, SourceRef::default());
        assert_eq!(screened.accepted.len(), MAX_RESULTS_PER_CHUNK);
    }
}
