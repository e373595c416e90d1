//! Biomarker pattern cache.
//!
//! Process-wide, shared behind an `Arc`. Patterns sit under an `RwLock`, the
//! backing store under a `Mutex`. Learning takes the pattern write lock, then
//! the store lock, and persists inside that critical section. Always in that
//! order.

pub mod store;
pub mod types;
pub mod variations;

pub use store::SqlitePatternStore;
pub use types::{BiomarkerPattern, CacheStats, PatternStats, UnitRange};

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use regex::Regex;
use thiserror::Error;

use self::variations::build_variations;
use super::biomarkers::category_for;
use super::standardize::range::scan_trailing;
use super::standardize::standardize;
use super::standardize::value::parse_number;
use super::types::{BiomarkerRecord, ExtractionMethod, RawBiomarker, SourceRef};
use crate::pipeline::signatures::is_measurement_line;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pattern serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Invalid pattern {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern cache lock poisoned")]
    LockPoisoned,
}

/// A pattern with its variations compiled.
struct CompiledPattern {
    pattern: BiomarkerPattern,
    regexes: Vec<Regex>,
}

impl CompiledPattern {
    fn compile(mut pattern: BiomarkerPattern) -> Result<Self, CacheError> {
        if pattern.variations.is_empty() {
            pattern.variations = build_variations(&pattern.aliases);
        }
        if pattern.variations.is_empty() {
            return Err(CacheError::InvalidPattern {
                name: pattern.standardized_name.clone(),
                reason: "no usable alias".into(),
            });
        }
        let regexes = pattern
            .variations
            .iter()
            .map(|source| Regex::new(source))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::InvalidPattern {
                name: pattern.standardized_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { pattern, regexes })
    }
}

struct StoreState {
    store: Option<SqlitePatternStore>,
    /// Patterns whose last write failed.
    unsaved: BTreeSet<String>,
}

impl StoreState {
    fn persist(&mut self, pattern: &BiomarkerPattern) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.upsert(pattern) {
            Ok(()) => {
                self.unsaved.remove(&pattern.standardized_name);
            }
            Err(e) => {
                tracing::error!(
                    pattern = %pattern.standardized_name,
                    error = %e,
                    "Pattern cache write failed, keeping in-memory copy"
                );
                self.unsaved.insert(pattern.standardized_name.clone());
            }
        }
    }
}

/// Result of scanning one chunk against the cache.
#[derive(Debug, Clone, Default)]
pub struct CacheScan {
    /// Matches at or above their pattern's threshold.
    pub records: Vec<BiomarkerRecord>,
    /// Lines carrying a number-plus-unit measurement.
    pub measurement_lines: usize,
    /// Measurement lines without an accepted match.
    pub uncovered_lines: usize,
}

impl CacheScan {
    pub fn covers_all_measurements(&self) -> bool {
        !self.records.is_empty() && self.uncovered_lines == 0
    }

    /// Lowest record confidence, 0.0 when empty.
    pub fn min_confidence(&self) -> f32 {
        self.records
            .iter()
            .map(|r| r.confidence)
            .reduce(f32::min)
            .unwrap_or(0.0)
    }
}

struct Candidate<'t> {
    key: String,
    start: usize,
    end: usize,
    name: &'t str,
    value: &'t str,
    unit: &'t str,
}

pub struct PatternCache {
    patterns: RwLock<BTreeMap<String, CompiledPattern>>,
    store: Mutex<StoreState>,
}

impl PatternCache {
    /// Load the cache from `path`. Never fails: an unreadable file is moved
    /// aside and a fresh store created; if that fails too the cache runs
    /// without persistence.
    pub fn open(path: &Path) -> Self {
        match Self::try_open(path) {
            Ok(cache) => cache,
            Err(e) => {
                let aside = corrupt_path(path);
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Pattern cache unreadable, starting empty"
                );
                if let Err(e) = std::fs::rename(path, &aside) {
                    tracing::warn!(error = %e, "Could not move unreadable pattern cache aside");
                }
                match Self::try_open(path) {
                    Ok(cache) => cache,
                    Err(e) => {
                        tracing::error!(
                            path = %path.display(),
                            error = %e,
                            "Pattern cache store unavailable, running in memory only"
                        );
                        Self::in_memory()
                    }
                }
            }
        }
    }

    fn try_open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = SqlitePatternStore::open(path)?;
        let cache = Self::with_store(store)?;
        tracing::info!(
            path = %path.display(),
            patterns = cache.len(),
            "Pattern cache loaded"
        );
        Ok(cache)
    }

    /// Cache backed by `store`, loaded from its current contents.
    pub fn with_store(store: SqlitePatternStore) -> Result<Self, CacheError> {
        let mut patterns = BTreeMap::new();
        for pattern in store.load_all()? {
            let key = pattern.standardized_name.clone();
            match CompiledPattern::compile(pattern) {
                Ok(compiled) => {
                    patterns.insert(key, compiled);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping stored pattern"),
            }
        }
        Ok(Self {
            patterns: RwLock::new(patterns),
            store: Mutex::new(StoreState {
                store: Some(store),
                unsaved: BTreeSet::new(),
            }),
        })
    }

    /// Cache without a backing store.
    pub fn in_memory() -> Self {
        Self {
            patterns: RwLock::new(BTreeMap::new()),
            store: Mutex::new(StoreState {
                store: None,
                unsaved: BTreeSet::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, standardized_name: &str) -> Option<BiomarkerPattern> {
        self.patterns
            .read()
            .ok()?
            .get(standardized_name)
            .map(|c| c.pattern.clone())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        if let Ok(patterns) = self.patterns.read() {
            stats.patterns = patterns.len();
            for compiled in patterns.values() {
                stats.total_hits += compiled.pattern.stats.hits;
                stats.total_observations += compiled.pattern.stats.observations;
            }
        }
        if let Ok(state) = self.store.lock() {
            stats.persistent = state.store.is_some();
            stats.unsaved = state.unsaved.len();
        }
        stats
    }

    /// Add bootstrap patterns for names not yet present.
    pub fn seed(&self, seeds: Vec<BiomarkerPattern>) -> Result<usize, CacheError> {
        let mut patterns = self.patterns.write().map_err(|_| CacheError::LockPoisoned)?;
        let mut state = self.store.lock().map_err(|_| CacheError::LockPoisoned)?;
        let mut added = 0;
        for seed in seeds {
            if patterns.contains_key(&seed.standardized_name) {
                continue;
            }
            let compiled = CompiledPattern::compile(seed)?;
            state.persist(&compiled.pattern);
            patterns.insert(compiled.pattern.standardized_name.clone(), compiled);
            added += 1;
        }
        Ok(added)
    }

    /// Extract records from `chunk_text` using learned patterns.
    pub fn extract(&self, chunk_text: &str) -> Vec<BiomarkerRecord> {
        self.scan(chunk_text, SourceRef::default()).records
    }

    /// Apply every pattern's variations to `chunk_text`. Overlapping matches
    /// resolve to the earliest, then the longest. Matches below their
    /// pattern's threshold are dropped.
    pub fn scan(&self, chunk_text: &str, source: SourceRef) -> CacheScan {
        let patterns = match self.patterns.read() {
            Ok(patterns) => patterns,
            Err(_) => {
                tracing::error!("Pattern cache lock poisoned, treating as miss");
                return CacheScan::default();
            }
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for (key, compiled) in patterns.iter() {
            for re in &compiled.regexes {
                for caps in re.captures_iter(chunk_text) {
                    let (Some(name), Some(value), Some(unit)) =
                        (caps.name("name"), caps.name("value"), caps.name("unit"))
                    else {
                        continue;
                    };
                    candidates.push(Candidate {
                        key: key.clone(),
                        start: name.start().min(value.start()),
                        end: name.end().max(unit.end()),
                        name: name.as_str(),
                        value: value.as_str(),
                        unit: unit.as_str(),
                    });
                }
            }
        }
        candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        let mut selected: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if selected.last().is_some_and(|last| candidate.start < last.end) {
                continue;
            }
            selected.push(candidate);
        }

        let mut scan = CacheScan::default();
        let mut accepted_starts: Vec<usize> = Vec::new();
        for (i, candidate) in selected.iter().enumerate() {
            let Some(compiled) = patterns.get(&candidate.key) else {
                continue;
            };
            let pattern = &compiled.pattern;
            let confidence = pattern.match_confidence(parse_number(candidate.value), candidate.unit);
            if confidence < pattern.confidence_threshold {
                continue;
            }

            let line_end = chunk_text[candidate.end..]
                .find('\n')
                .map_or(chunk_text.len(), |p| candidate.end + p);
            let next_start = selected.get(i + 1).map_or(chunk_text.len(), |c| c.start);
            let trailing = scan_trailing(&chunk_text[candidate.end..line_end.min(next_start)]);

            let raw = RawBiomarker {
                name: candidate.name.trim().to_string(),
                value: serde_json::Value::String(candidate.value.trim().to_string()),
                unit: Some(candidate.unit.to_string()),
                reference_range: trailing.reference_range,
                flag: trailing.flag,
                confidence: Some(confidence),
                ..RawBiomarker::default()
            };
            let mut record = standardize(&raw, confidence, ExtractionMethod::Cache, source);
            record.standardized_name = pattern.standardized_name.clone();
            record.category = category_for(&record.standardized_name).to_string();
            scan.records.push(record);
            accepted_starts.push(candidate.start);
        }

        let mut offset = 0;
        for line in chunk_text.split('\n') {
            let line_start = offset;
            let line_end = offset + line.len();
            offset = line_end + 1;
            if !is_measurement_line(line) {
                continue;
            }
            scan.measurement_lines += 1;
            if !accepted_starts
                .iter()
                .any(|s| (line_start..line_end).contains(s))
            {
                scan.uncovered_lines += 1;
            }
        }
        scan
    }

    /// Merge accepted records into the cache.
    ///
    /// `method == Cache` only counts hits on the matching patterns. Otherwise
    /// new standardized names become patterns and known ones merge units,
    /// typical ranges and new spellings found in `source_text`. Every change
    /// is persisted before the write lock is released. Records without a
    /// unit are not learned.
    pub fn learn(&self, records: &[BiomarkerRecord], source_text: &str, method: ExtractionMethod) {
        if records.is_empty() {
            return;
        }
        let mut patterns = match self.patterns.write() {
            Ok(patterns) => patterns,
            Err(_) => {
                tracing::error!("Pattern cache lock poisoned, skipping learn");
                return;
            }
        };
        let mut state = match self.store.lock() {
            Ok(state) => state,
            Err(_) => {
                tracing::error!("Pattern store lock poisoned, skipping learn");
                return;
            }
        };

        let lowered_source = source_text.to_lowercase();
        let mut created = 0usize;
        let mut updated = 0usize;

        for record in records {
            if method == ExtractionMethod::Cache {
                if let Some(compiled) = patterns.get_mut(&record.standardized_name) {
                    compiled.pattern.record_hit();
                    state.persist(&compiled.pattern);
                }
                continue;
            }
            if record.unit.trim().is_empty() {
                continue;
            }

            let original = record.original_name.trim();
            let seen_in_source =
                !original.is_empty() && lowered_source.contains(&original.to_lowercase());

            match patterns.get_mut(&record.standardized_name) {
                Some(compiled) => {
                    let aliases_changed = compiled
                        .pattern
                        .observe(record, seen_in_source.then_some(original));
                    if aliases_changed {
                        match CompiledPattern::compile(compiled.pattern.clone()) {
                            Ok(recompiled) => *compiled = recompiled,
                            Err(e) => tracing::warn!(error = %e, "Keeping previous variations"),
                        }
                    }
                    state.persist(&compiled.pattern);
                    updated += 1;
                }
                None => {
                    let aliases = if seen_in_source {
                        vec![original.to_string()]
                    } else {
                        Vec::new()
                    };
                    let pattern = BiomarkerPattern::from_observation(record, aliases, method);
                    match CompiledPattern::compile(pattern) {
                        Ok(compiled) => {
                            state.persist(&compiled.pattern);
                            patterns.insert(record.standardized_name.clone(), compiled);
                            created += 1;
                        }
                        Err(e) => tracing::warn!(error = %e, "Could not learn pattern"),
                    }
                }
            }
        }

        if created + updated > 0 {
            tracing::debug!(
                created,
                updated,
                method = method.as_str(),
                total = patterns.len(),
                "Pattern cache learned"
            );
        }
    }

    /// Write every pattern whose earlier write failed. Call at shutdown.
    pub fn flush(&self) -> Result<usize, CacheError> {
        let patterns = self.patterns.read().map_err(|_| CacheError::LockPoisoned)?;
        let mut state = self.store.lock().map_err(|_| CacheError::LockPoisoned)?;
        if state.unsaved.is_empty() {
            return Ok(0);
        }
        let pending: Vec<&BiomarkerPattern> = state
            .unsaved
            .iter()
            .filter_map(|name| patterns.get(name).map(|c| &c.pattern))
            .collect();
        let Some(store) = state.store.as_mut() else {
            return Ok(0);
        };
        let written = store.upsert_many(pending)?;
        state.unsaved.clear();
        tracing::info!(written, "Pattern cache flushed");
        Ok(written)
    }
}

/// `<path>.corrupt`
fn corrupt_path(path: &Path) -> PathBuf {
    let mut aside = OsString::from(path.as_os_str());
    aside.push(".corrupt");
    PathBuf::from(aside)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(original: &str, standardized: &str, value: f64, unit: &str) -> BiomarkerRecord {
        BiomarkerRecord {
            standardized_name: standardized.into(),
            original_name: original.into(),
            value,
            unit: unit.into(),
            reference_range_low: None,
            reference_range_high: None,
            reference_range_text: None,
            category: category_for(standardized).into(),
            is_abnormal: false,
            confidence: 0.9,
            source: SourceRef::default(),
            method: ExtractionMethod::Inference,
        }
    }

    #[test]
    fn empty_cache_extracts_nothing() {
        let cache = PatternCache::in_memory();
        assert!(cache.is_empty());
        assert!(cache.extract("Glucose: 105 mg/dL").is_empty());
    }

    #[test]
    fn learned_pattern_matches_equivalently() {
        let cache = PatternCache::in_memory();
        let text = "Glucose: 105 mg/dL";
        cache.learn(&[record("Glucose", "Glucose", 105.0, "mg/dL")], text, ExtractionMethod::Inference);

        let records = cache.extract(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].standardized_name, "Glucose");
        assert_eq!(records[0].value, 105.0);
        assert_eq!(records[0].unit, "mg/dL");
        assert_eq!(records[0].method, ExtractionMethod::Cache);
        assert!(records[0].confidence >= 0.7);
    }

    #[test]
    fn records_without_unit_not_learned() {
        let cache = PatternCache::in_memory();
        cache.learn(&[record("Ratio", "Ratio", 3.1, "")], "Ratio 3.1", ExtractionMethod::Inference);
        assert!(cache.is_empty());
    }

    #[test]
    fn alias_learned_only_when_in_source() {
        let cache = PatternCache::in_memory();
        cache.learn(
            &[record("Fasting Glucose", "Glucose", 92.0, "mg/dL")],
            "Fasting Glucose 92 mg/dL",
            ExtractionMethod::Inference,
        );
        cache.learn(
            &[record("Blood Sugar Level", "Glucose", 95.0, "mg/dL")],
            "Glucose 95 mg/dL",
            ExtractionMethod::Inference,
        );
        let pattern = cache.get("Glucose").unwrap();
        assert!(pattern.aliases.contains(&"Fasting Glucose".to_string()));
        assert!(!pattern.aliases.contains(&"Blood Sugar Level".to_string()));
        assert_eq!(pattern.typical_ranges[0].low, 92.0);
        assert_eq!(pattern.typical_ranges[0].high, 95.0);
    }

    #[test]
    fn cache_method_only_counts_hits() {
        let cache = PatternCache::in_memory();
        cache.learn(&[record("LDL", "LDL Cholesterol", 120.0, "mg/dL")], "LDL 120 mg/dL", ExtractionMethod::Inference);
        let mut hit = record("LDL", "LDL Cholesterol", 300.0, "g/L");
        hit.method = ExtractionMethod::Cache;
        cache.learn(&[hit], "LDL 300 g/L", ExtractionMethod::Cache);
        let pattern = cache.get("LDL Cholesterol").unwrap();
        assert_eq!(pattern.stats.hits, 1);
        assert_eq!(pattern.units, vec!["mg/dL"]);
    }

    #[test]
    fn overlapping_matches_resolve_to_longest() {
        let cache = PatternCache::in_memory();
        cache
            .seed(vec![
                BiomarkerPattern::seeded("LDL Cholesterol", &["LDL Cholesterol", "LDL"], "mg/dL", 0.0, 130.0),
                BiomarkerPattern::seeded("Total Cholesterol", &["Cholesterol"], "mg/dL", 100.0, 200.0),
            ])
            .unwrap();
        let records = cache.extract("LDL Cholesterol: 120 mg/dL\nCholesterol: 190 mg/dL");
        let names: Vec<&str> = records.iter().map(|r| r.standardized_name.as_str()).collect();
        assert_eq!(names, vec!["LDL Cholesterol", "Total Cholesterol"]);
        assert_eq!(records[0].value, 120.0);
    }

    #[test]
    fn trailing_range_and_flag_read() {
        let cache = PatternCache::in_memory();
        cache
            .seed(vec![BiomarkerPattern::seeded("Triglycerides", &["Triglycerides"], "mg/dL", 0.0, 150.0)])
            .unwrap();
        let records = cache.extract("Triglycerides    210    mg/dL    0-149    H");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference_range_high, Some(149.0));
        assert!(records[0].is_abnormal);
    }

    #[test]
    fn coverage_counts_unmatched_measurement_lines() {
        let cache = PatternCache::in_memory();
        cache
            .seed(vec![BiomarkerPattern::seeded("Glucose", &["Glucose"], "mg/dL", 70.0, 99.0)])
            .unwrap();
        let full = cache.scan("Glucose: 90 mg/dL\nComments follow", SourceRef::default());
        assert!(full.covers_all_measurements());

        let partial = cache.scan("Glucose: 90 mg/dL\nFerritin: 80 ng/mL", SourceRef::default());
        assert_eq!(partial.records.len(), 1);
        assert_eq!(partial.measurement_lines, 2);
        assert_eq!(partial.uncovered_lines, 1);
        assert!(!partial.covers_all_measurements());
    }

    #[test]
    fn below_threshold_match_dropped() {
        let cache = PatternCache::in_memory();
        let mut strict = BiomarkerPattern::seeded("Glucose", &["Glucose"], "mg/dL", 70.0, 99.0);
        strict.confidence_threshold = 0.9;
        cache.seed(vec![strict]).unwrap();
        // unexpected unit: 0.7 base only
        assert!(cache.extract("Glucose: 5.1 mmol/L").is_empty());
        assert_eq!(cache.extract("Glucose: 90 mg/dL").len(), 1);
    }

    #[test]
    fn seed_skips_existing() {
        let cache = PatternCache::in_memory();
        let seeds = || vec![BiomarkerPattern::seeded("Glucose", &["Glucose"], "mg/dL", 70.0, 99.0)];
        assert_eq!(cache.seed(seeds()).unwrap(), 1);
        assert_eq!(cache.seed(seeds()).unwrap(), 0);
        assert!(!cache.stats().persistent);
    }

    #[test]
    fn learned_pattern_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("patterns.db");
        {
            let cache = PatternCache::open(&path);
            cache.learn(
                &[record("Ferritin", "Ferritin", 80.0, "ng/mL")],
                "Ferritin: 80 ng/mL",
                ExtractionMethod::Inference,
            );
            assert!(cache.stats().persistent);
        }
        let reopened = PatternCache::open(&path);
        assert_eq!(reopened.len(), 1);
        let records = reopened.extract("Ferritin: 75 ng/mL");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 75.0);
    }

    #[test]
    fn concurrent_learning_keeps_every_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");
        let names = [
            "Glucose", "Sodium", "Potassium", "Ferritin", "Calcium", "Creatinine", "Albumin",
            "Magnesium",
        ];
        {
            let cache = PatternCache::open(&path);
            std::thread::scope(|scope| {
                for (i, name) in names.iter().enumerate() {
                    let cache = &cache;
                    scope.spawn(move || {
                        let value = 10.0 + i as f64;
                        let text = format!("{name}: {value} mg/dL");
                        cache.learn(
                            &[record(name, name, value, "mg/dL")],
                            &text,
                            ExtractionMethod::Inference,
                        );
                    });
                }
            });
            assert_eq!(cache.len(), names.len());
        }

        let reopened = PatternCache::open(&path);
        assert_eq!(reopened.len(), names.len());
        for name in names {
            assert!(reopened.get(name).is_some(), "{name} lost");
        }
    }

    #[test]
    fn corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");
        std::fs::write(&path, "this is not a database ".repeat(200)).unwrap();

        let cache = PatternCache::open(&path);
        assert!(cache.is_empty());
        assert!(cache.stats().persistent);
        assert!(corrupt_path(&path).exists());

        cache.learn(&[record("TSH", "TSH", 2.1, "mIU/L")], "TSH: 2.1 mIU/L", ExtractionMethod::Inference);
        assert_eq!(PatternCache::open(&path).len(), 1);
    }

    #[test]
    fn flush_without_pending_writes_is_noop() {
        let cache = PatternCache::with_store(SqlitePatternStore::open_in_memory().unwrap()).unwrap();
        cache.learn(&[record("HDL", "HDL Cholesterol", 55.0, "mg/dL")], "HDL 55 mg/dL", ExtractionMethod::Inference);
        assert_eq!(cache.flush().unwrap(), 0);
        assert_eq!(cache.stats().unsaved, 0);
    }
}
