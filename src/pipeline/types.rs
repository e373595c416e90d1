use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::structure::DocumentStructure;

/// Raw text of one page, as produced by the text-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
    /// Optional layout hints from the text extractor.
    #[serde(default)]
    pub hints: Option<LayoutHints>,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            hints: None,
        }
    }
}

/// Table line ranges reported by the text extractor (0-based, inclusive).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutHints {
    pub table_line_ranges: Vec<(usize, usize)>,
}

/// Build pages from a `page_number → text` map.
pub fn pages_from_map(page_texts: &BTreeMap<u32, String>) -> Vec<PageText> {
    page_texts
        .iter()
        .map(|(number, text)| PageText::new(*number, text.clone()))
        .collect()
}

/// How a record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Cache,
    Inference,
    Fallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Cache => "cache",
            ExtractionMethod::Inference => "inference",
            ExtractionMethod::Fallback => "fallback",
        }
    }
}

/// Loosely typed biomarker entry, as returned by inference or the fallback
/// parser. Every field except the name may be absent or mistyped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBiomarker {
    #[serde(alias = "test_name", alias = "biomarker")]
    pub name: String,
    /// Number or string, depending on what the producer emitted.
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default)]
    pub reference_range_low: Option<f64>,
    #[serde(default)]
    pub reference_range_high: Option<f64>,
    /// "high" / "low" / "normal" / "abnormal" / "H" / "L".
    #[serde(default, alias = "abnormal_flag")]
    pub flag: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// A standardized biomarker measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerRecord {
    pub standardized_name: String,
    pub original_name: String,
    pub value: f64,
    pub unit: String,
    pub reference_range_low: Option<f64>,
    pub reference_range_high: Option<f64>,
    pub reference_range_text: Option<String>,
    pub category: String,
    pub is_abnormal: bool,
    pub confidence: f32,
    pub source: SourceRef,
    pub method: ExtractionMethod,
}

/// Where in the document a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRef {
    pub page_number: u32,
    pub chunk_index: usize,
}

/// Counters collected over one document run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages_total: usize,
    pub pages_relevant: usize,
    pub chunks_total: usize,
    pub chunks_skipped: usize,
    pub cache_hits: usize,
    pub inference_calls: u32,
    pub fallbacks_used: usize,
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub records_rejected: usize,
    pub duplicates_merged: usize,
}

/// Final output of one document run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_id: Uuid,
    pub records: Vec<BiomarkerRecord>,
    /// Mean confidence of accepted records, 0.0 when none.
    pub confidence: f32,
    pub structure: DocumentStructure,
    pub stats: RunStats,
}

/// Mean of record confidences.
pub fn aggregate_confidence(records: &[BiomarkerRecord]) -> f32 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.confidence).sum::<f32>() / records.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, confidence: f32) -> BiomarkerRecord {
        BiomarkerRecord {
            standardized_name: name.into(),
            original_name: name.into(),
            value: 1.0,
            unit: "mg/dL".into(),
            reference_range_low: None,
            reference_range_high: None,
            reference_range_text: None,
            category: "Other".into(),
            is_abnormal: false,
            confidence,
            source: SourceRef::default(),
            method: ExtractionMethod::Inference,
        }
    }

    #[test]
    fn aggregate_confidence_is_mean() {
        let records = vec![record("A", 0.8), record("B", 0.6)];
        assert!((aggregate_confidence(&records) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn aggregate_confidence_empty_is_zero() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
    }

    #[test]
    fn pages_from_map_keeps_order() {
        let mut map = BTreeMap::new();
        map.insert(2, "second".to_string());
        map.insert(1, "first".to_string());
        let pages = pages_from_map(&map);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].text, "second");
    }

    #[test]
    fn raw_biomarker_accepts_aliases_and_string_values() {
        let json = r#"{"test_name": "Glucose", "value": "105", "abnormal_flag": "H"}"#;
        let raw: RawBiomarker = serde_json::from_str(json).unwrap();
        assert_eq!(raw.name, "Glucose");
        assert_eq!(raw.value, serde_json::json!("105"));
        assert_eq!(raw.flag.as_deref(), Some("H"));
        assert!(raw.unit.is_none());
    }

    #[test]
    fn method_serializes_snake_case() {
        let json = serde_json::to_string(&ExtractionMethod::Fallback).unwrap();
        assert_eq!(json, "\"fallback\"");
    }
}
