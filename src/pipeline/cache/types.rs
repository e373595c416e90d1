use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::variations::build_variations;
use crate::pipeline::biomarkers::normalize_name;
use crate::pipeline::standardize::units::same_unit;
use crate::pipeline::types::{BiomarkerRecord, ExtractionMethod};

/// Base confidence of a cache match before unit and range evidence.
const BASE_MATCH_CONFIDENCE: f32 = 0.7;
const UNIT_MATCH_BONUS: f32 = 0.15;
const RANGE_MATCH_BONUS: f32 = 0.1;
const HIT_BONUS: f32 = 0.005;
const MAX_HIT_BONUS_HITS: u64 = 10;
const MAX_MATCH_CONFIDENCE: f32 = 0.99;

/// Observed values for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRange {
    pub unit: String,
    pub low: f64,
    pub high: f64,
}

impl UnitRange {
    fn new(unit: &str, low: f64, high: f64) -> Self {
        Self {
            unit: unit.to_string(),
            low: low.min(high),
            high: low.max(high),
        }
    }

    pub fn widen(&mut self, value: f64) {
        self.low = self.low.min(value);
        self.high = self.high.max(value);
    }

    /// Within the observed span plus half its magnitude on either side.
    pub fn is_typical(&self, value: f64) -> bool {
        let tolerance = 0.5 * (self.high - self.low).max(self.high.abs()).max(self.low.abs());
        value >= self.low - tolerance && value <= self.high + tolerance
    }
}

/// Usage statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Chunks resolved from the cache with this pattern.
    pub hits: u64,
    /// Observations merged from inference or fallback results.
    pub observations: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PatternStats {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            hits: 0,
            observations: 1,
            created_at: now,
            last_updated: now,
        }
    }
}

/// A learned biomarker pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerPattern {
    /// First observed spelling.
    pub name: String,
    pub standardized_name: String,
    /// Spellings the variations match, the standardized name included.
    pub aliases: Vec<String>,
    pub units: Vec<String>,
    pub typical_ranges: Vec<UnitRange>,
    /// Regex sources, one per layout.
    pub variations: Vec<String>,
    pub confidence_threshold: f32,
    /// Producer of the first observation.
    pub source: ExtractionMethod,
    pub stats: PatternStats,
}

impl BiomarkerPattern {
    /// Minimum match confidence for a pattern first learned from `method`.
    /// Fallback-derived patterns start stricter.
    pub fn threshold_for(method: ExtractionMethod) -> f32 {
        match method {
            ExtractionMethod::Fallback => 0.8,
            ExtractionMethod::Inference | ExtractionMethod::Cache => 0.7,
        }
    }

    /// New pattern from an accepted record. `aliases` must be non-empty.
    pub fn from_observation(
        record: &BiomarkerRecord,
        mut aliases: Vec<String>,
        method: ExtractionMethod,
    ) -> Self {
        if !aliases
            .iter()
            .any(|a| normalize_name(a) == normalize_name(&record.standardized_name))
        {
            aliases.push(record.standardized_name.clone());
        }
        let (low, high) = match (record.reference_range_low, record.reference_range_high) {
            (Some(low), Some(high)) => (low.min(record.value), high.max(record.value)),
            _ => (record.value, record.value),
        };
        Self {
            name: record.original_name.clone(),
            standardized_name: record.standardized_name.clone(),
            variations: build_variations(&aliases),
            aliases,
            units: vec![record.unit.clone()],
            typical_ranges: vec![UnitRange::new(&record.unit, low, high)],
            confidence_threshold: Self::threshold_for(method),
            source: method,
            stats: PatternStats::new(),
        }
    }

    /// Bootstrap pattern for a known biomarker.
    pub fn seeded(
        standardized_name: &str,
        aliases: &[&str],
        unit: &str,
        typical_low: f64,
        typical_high: f64,
    ) -> Self {
        let mut all: Vec<String> = aliases.iter().map(|a| a.to_string()).collect();
        if !all.iter().any(|a| a == standardized_name) {
            all.insert(0, standardized_name.to_string());
        }
        Self {
            name: standardized_name.to_string(),
            standardized_name: standardized_name.to_string(),
            variations: build_variations(&all),
            aliases: all,
            units: vec![unit.to_string()],
            typical_ranges: vec![UnitRange::new(unit, typical_low, typical_high)],
            confidence_threshold: Self::threshold_for(ExtractionMethod::Inference),
            source: ExtractionMethod::Inference,
            stats: PatternStats::new(),
        }
    }

    pub fn has_unit(&self, unit: &str) -> bool {
        self.units.iter().any(|u| same_unit(u, unit))
    }

    pub fn range_for(&self, unit: &str) -> Option<&UnitRange> {
        self.typical_ranges.iter().find(|r| same_unit(&r.unit, unit))
    }

    /// Confidence of a match carrying `value` in `unit`.
    pub fn match_confidence(&self, value: Option<f64>, unit: &str) -> f32 {
        let mut confidence = BASE_MATCH_CONFIDENCE;
        if self.has_unit(unit) {
            confidence += UNIT_MATCH_BONUS;
        }
        if let (Some(value), Some(range)) = (value, self.range_for(unit)) {
            if range.is_typical(value) {
                confidence += RANGE_MATCH_BONUS;
            }
        }
        confidence += self.stats.hits.min(MAX_HIT_BONUS_HITS) as f32 * HIT_BONUS;
        confidence.min(MAX_MATCH_CONFIDENCE)
    }

    /// Merge one accepted observation. Returns true when the alias set
    /// changed and the variations were regenerated.
    pub fn observe(&mut self, record: &BiomarkerRecord, alias: Option<&str>) -> bool {
        if !self.has_unit(&record.unit) {
            self.units.push(record.unit.clone());
        }
        match self
            .typical_ranges
            .iter_mut()
            .find(|r| same_unit(&r.unit, &record.unit))
        {
            Some(range) => range.widen(record.value),
            None => self
                .typical_ranges
                .push(UnitRange::new(&record.unit, record.value, record.value)),
        }
        self.stats.observations += 1;
        self.stats.last_updated = Utc::now();

        let Some(alias) = alias else {
            return false;
        };
        let normalized = normalize_name(alias);
        if normalized.is_empty() || self.aliases.iter().any(|a| normalize_name(a) == normalized) {
            return false;
        }
        self.aliases.push(alias.trim().to_string());
        self.variations = build_variations(&self.aliases);
        true
    }

    pub fn record_hit(&mut self) {
        self.stats.hits += 1;
        self.stats.last_updated = Utc::now();
    }
}

/// Snapshot of cache size and usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub patterns: usize,
    pub total_hits: u64,
    pub total_observations: u64,
    /// False when running without a backing store.
    pub persistent: bool,
    /// Patterns whose last write failed and await `flush`.
    pub unsaved: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SourceRef;

    fn record(name: &str, value: f64, unit: &str) -> BiomarkerRecord {
        BiomarkerRecord {
            standardized_name: name.into(),
            original_name: name.into(),
            value,
            unit: unit.into(),
            reference_range_low: None,
            reference_range_high: None,
            reference_range_text: None,
            category: "Other".into(),
            is_abnormal: false,
            confidence: 0.9,
            source: SourceRef::default(),
            method: ExtractionMethod::Inference,
        }
    }

    #[test]
    fn new_pattern_from_inference() {
        let pattern = BiomarkerPattern::from_observation(
            &record("Glucose", 105.0, "mg/dL"),
            vec!["Glucose".into()],
            ExtractionMethod::Inference,
        );
        assert_eq!(pattern.aliases, vec!["Glucose"]);
        assert_eq!(pattern.variations.len(), 4);
        assert_eq!(pattern.confidence_threshold, 0.7);
        assert_eq!(pattern.typical_ranges[0].low, 105.0);
    }

    #[test]
    fn fallback_patterns_start_stricter() {
        let pattern = BiomarkerPattern::from_observation(
            &record("Glucose", 105.0, "mg/dL"),
            vec!["Glucose".into()],
            ExtractionMethod::Fallback,
        );
        assert_eq!(pattern.confidence_threshold, 0.8);
    }

    #[test]
    fn reference_bounds_seed_the_range() {
        let mut observed = record("LDL Cholesterol", 120.0, "mg/dL");
        observed.reference_range_low = Some(0.0);
        observed.reference_range_high = Some(99.0);
        let pattern =
            BiomarkerPattern::from_observation(&observed, vec!["LDL".into()], ExtractionMethod::Inference);
        assert_eq!(pattern.typical_ranges[0].low, 0.0);
        assert_eq!(pattern.typical_ranges[0].high, 120.0);
        assert!(pattern.aliases.contains(&"LDL Cholesterol".to_string()));
    }

    #[test]
    fn observe_merges_units_ranges_and_aliases() {
        let mut pattern = BiomarkerPattern::from_observation(
            &record("Glucose", 105.0, "mg/dL"),
            vec!["Glucose".into()],
            ExtractionMethod::Inference,
        );
        assert!(!pattern.observe(&record("Glucose", 80.0, "mg/dL"), None));
        assert_eq!(pattern.typical_ranges[0].low, 80.0);

        assert!(pattern.observe(&record("Glucose", 5.4, "mmol/L"), Some("Fasting Glucose")));
        assert_eq!(pattern.units, vec!["mg/dL", "mmol/L"]);
        assert_eq!(pattern.typical_ranges.len(), 2);
        assert!(pattern.variations[0].contains("Fasting"));
        assert_eq!(pattern.stats.observations, 3);

        // same spelling, different case: no new alias
        assert!(!pattern.observe(&record("Glucose", 90.0, "mg/dL"), Some("GLUCOSE")));
    }

    #[test]
    fn match_confidence_rewards_unit_range_and_hits() {
        let mut pattern = BiomarkerPattern::seeded("Glucose", &["Glucose"], "mg/dL", 70.0, 99.0);
        let typical = pattern.match_confidence(Some(90.0), "mg/dL");
        assert!((typical - 0.95).abs() < 1e-6);
        let odd_unit = pattern.match_confidence(Some(90.0), "g/L");
        assert!((odd_unit - 0.7).abs() < 1e-6);
        for _ in 0..20 {
            pattern.record_hit();
        }
        assert!((pattern.match_confidence(Some(90.0), "mg/dL") - 0.99).abs() < 1e-6);
    }

    #[test]
    fn typical_range_tolerance() {
        let range = UnitRange::new("mg/dL", 70.0, 99.0);
        assert!(range.is_typical(120.0));
        assert!(!range.is_typical(400.0));
    }
}
