//! Per-chunk extraction: cache first, then inference, then the regex
//! fallback. Chunks are processed strictly in order as a fold over one
//! [`ExtractionContext`] per document.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::biomarkers::standardize_name;
use super::cache::{CacheScan, PatternCache};
use super::chunking::ContentChunk;
use super::inference::{
    fallback_parse, invoke, repair_malformed, InferenceOutcome, InferenceRequest, LlmClient,
    PromptStyle, TokenUsage,
};
use super::standardize::units::same_unit;
use super::standardize::{screen_raw, screen_records, Screened};
use super::types::{BiomarkerRecord, ExtractionMethod, RawBiomarker, SourceRef};
use crate::pipeline_config::PipelineConfig;

/// Confidence given to inference entries that report none.
const INFERENCE_DEFAULT_CONFIDENCE: f32 = 0.8;
/// Adaptive cache threshold step.
const THRESHOLD_STEP: f32 = 0.05;
const MAX_CACHE_THRESHOLD: f32 = 0.99;

/// States a chunk passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStage {
    CacheAttempt,
    InferenceAttempt,
    FallbackParse,
    Accepted,
    Rejected,
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub chunk_index: usize,
    pub page_number: u32,
    pub stages: Vec<ChunkStage>,
    /// Producer of the accepted records, `None` when nothing was accepted.
    pub method: Option<ExtractionMethod>,
    pub accepted: usize,
    pub rejected: usize,
}

impl ChunkReport {
    fn new(chunk: &ContentChunk) -> Self {
        Self {
            chunk_index: chunk.index,
            page_number: chunk.page_number,
            stages: vec![ChunkStage::CacheAttempt],
            method: None,
            accepted: 0,
            rejected: 0,
        }
    }
}

/// Accumulator for one document run. Never shared between documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionContext {
    /// Standardized names extracted so far.
    pub extracted: BTreeSet<String>,
    /// Standardized name to the method that first produced it.
    pub patterns: BTreeMap<String, ExtractionMethod>,
    pub inference_calls: u32,
    pub usage: TokenUsage,
    /// Minimum cache match confidence for a cache-only chunk.
    pub cache_threshold: f32,
    pub cache_hits: usize,
    pub fallbacks_used: usize,
    pub records_rejected: usize,
    /// Accepted records in chunk order, duplicates included.
    pub records: Vec<BiomarkerRecord>,
    pub reports: Vec<ChunkReport>,
}

impl ExtractionContext {
    pub fn new(cache_threshold: f32) -> Self {
        Self {
            extracted: BTreeSet::new(),
            patterns: BTreeMap::new(),
            inference_calls: 0,
            usage: TokenUsage::default(),
            cache_threshold,
            cache_hits: 0,
            fallbacks_used: 0,
            records_rejected: 0,
            records: Vec::new(),
            reports: Vec::new(),
        }
    }

    fn absorb(&mut self, accepted: Vec<BiomarkerRecord>, method: ExtractionMethod) {
        for record in &accepted {
            self.extracted.insert(record.standardized_name.clone());
            self.patterns
                .entry(record.standardized_name.clone())
                .or_insert(method);
        }
        self.records.extend(accepted);
    }

    fn adjust_cache_threshold(&mut self, agreement: Agreement, floor: f32) {
        let previous = self.cache_threshold;
        self.cache_threshold = match agreement {
            Agreement::Confirmed => self.cache_threshold - THRESHOLD_STEP,
            Agreement::Contradicted => self.cache_threshold + THRESHOLD_STEP,
            Agreement::Unknown => return,
        }
        .clamp(floor.min(MAX_CACHE_THRESHOLD), MAX_CACHE_THRESHOLD);
        tracing::debug!(
            previous,
            current = self.cache_threshold,
            agreement = ?agreement,
            "Adaptive cache threshold adjusted"
        );
    }
}

/// How inference results compare with the cache's partial matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agreement {
    Confirmed,
    Contradicted,
    Unknown,
}

fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

fn compare_with_cache(cache: &[BiomarkerRecord], inferred: &[BiomarkerRecord]) -> Agreement {
    let mut confirmed = false;
    for cached in cache {
        let Some(found) = inferred
            .iter()
            .find(|r| r.standardized_name == cached.standardized_name)
        else {
            continue;
        };
        if same_value(found.value, cached.value) && same_unit(&found.unit, &cached.unit) {
            confirmed = true;
        } else {
            return Agreement::Contradicted;
        }
    }
    if confirmed {
        Agreement::Confirmed
    } else {
        Agreement::Unknown
    }
}

/// Drives chunks through cache, inference and fallback.
pub struct ChunkExtractor<'a> {
    cache: &'a PatternCache,
    llm: &'a dyn LlmClient,
    config: &'a PipelineConfig,
    doc_id: &'a str,
}

impl<'a> ChunkExtractor<'a> {
    pub fn new(
        cache: &'a PatternCache,
        llm: &'a dyn LlmClient,
        config: &'a PipelineConfig,
        doc_id: &'a str,
    ) -> Self {
        Self {
            cache,
            llm,
            config,
            doc_id,
        }
    }

    /// Fold every chunk into a fresh context.
    pub fn run(&self, chunks: &[ContentChunk]) -> ExtractionContext {
        let initial = ExtractionContext::new(self.config.cache_confidence_threshold);
        chunks
            .iter()
            .fold(initial, |context, chunk| self.process_chunk(context, chunk))
    }

    /// Process one chunk. Never fails: every failure path ends in the
    /// fallback parser or a rejected chunk.
    pub fn process_chunk(
        &self,
        mut context: ExtractionContext,
        chunk: &ContentChunk,
    ) -> ExtractionContext {
        let source = SourceRef {
            page_number: chunk.page_number,
            chunk_index: chunk.index,
        };
        let mut report = ChunkReport::new(chunk);

        // CacheAttempt
        let scan = self.cache.scan(&chunk.text, source);
        if let Some(screened) = self.cache_resolution(&scan, context.cache_threshold) {
            tracing::debug!(
                doc_id = %self.doc_id,
                page = chunk.page_number,
                chunk = chunk.index,
                records = screened.accepted.len(),
                "Chunk resolved from pattern cache"
            );
            context.cache_hits += 1;
            self.finish(&mut context, &mut report, chunk, screened, ExtractionMethod::Cache);
            context.reports.push(report);
            return context;
        }

        // InferenceAttempt
        report.stages.push(ChunkStage::InferenceAttempt);
        let already: Vec<String> = context.extracted.iter().cloned().collect();
        let request = InferenceRequest {
            doc_id: self.doc_id,
            chunk_text: &chunk.text,
            context_note: &chunk.context_note,
            already_extracted: &already,
        };
        let inferred = self.infer(&mut context, &request, chunk);

        let (raws, method) = match inferred {
            Some(raws) => (raws, ExtractionMethod::Inference),
            None => {
                // FallbackParse
                report.stages.push(ChunkStage::FallbackParse);
                context.fallbacks_used += 1;
                (fallback_parse(&chunk.text), ExtractionMethod::Fallback)
            }
        };

        let reported_again = raws
            .iter()
            .filter(|r| context.extracted.contains(&standardize_name(&r.name)))
            .count();
        if reported_again > 0 {
            tracing::debug!(
                doc_id = %self.doc_id,
                chunk = chunk.index,
                reported_again,
                "Entries repeat already-extracted names, deduplication decides"
            );
        }

        let screened = screen_raw(
            &raws,
            INFERENCE_DEFAULT_CONFIDENCE,
            self.config.min_confidence,
            method,
            source,
        );

        if method == ExtractionMethod::Inference && !scan.records.is_empty() {
            let agreement = compare_with_cache(&scan.records, &screened.accepted);
            context.adjust_cache_threshold(agreement, self.config.min_confidence);
        }

        self.finish(&mut context, &mut report, chunk, screened, method);
        context.reports.push(report);
        context
    }

    /// Cache records screened and ready to accept, when the cache alone
    /// resolves the chunk.
    fn cache_resolution(&self, scan: &CacheScan, threshold: f32) -> Option<Screened> {
        if !scan.covers_all_measurements() || scan.min_confidence() < threshold {
            return None;
        }
        let screened = screen_records(scan.records.clone(), self.config.min_confidence);
        if screened.accepted.is_empty() || !screened.rejected.is_empty() {
            return None;
        }
        Some(screened)
    }

    /// Adaptive call, repair of malformed output, one simplified retry.
    /// `None` sends the chunk to the fallback parser.
    fn infer(
        &self,
        context: &mut ExtractionContext,
        request: &InferenceRequest<'_>,
        chunk: &ContentChunk,
    ) -> Option<Vec<RawBiomarker>> {
        let outcome = self.call(context, request, PromptStyle::Adaptive);
        match outcome {
            InferenceOutcome::Parsed(entries) => return Some(entries),
            InferenceOutcome::Timeout => return None,
            InferenceOutcome::Malformed(text) => {
                if let Some(entries) = repaired(&text) {
                    tracing::info!(
                        doc_id = %self.doc_id,
                        chunk = chunk.index,
                        entries = entries.len(),
                        "Repaired malformed inference output"
                    );
                    return Some(entries);
                }
            }
            InferenceOutcome::Unavailable(_) => {}
        }

        tracing::info!(
            doc_id = %self.doc_id,
            chunk = chunk.index,
            "Retrying chunk with simplified prompt"
        );
        match self.call(context, request, PromptStyle::Simplified) {
            InferenceOutcome::Parsed(entries) => Some(entries),
            InferenceOutcome::Malformed(text) => repaired(&text),
            InferenceOutcome::Timeout | InferenceOutcome::Unavailable(_) => None,
        }
    }

    fn call(
        &self,
        context: &mut ExtractionContext,
        request: &InferenceRequest<'_>,
        style: PromptStyle,
    ) -> InferenceOutcome {
        let (outcome, usage) = invoke(self.llm, &self.config.inference.model, request, style);
        context.inference_calls += 1;
        context.usage.add(usage);
        outcome
    }

    fn finish(
        &self,
        context: &mut ExtractionContext,
        report: &mut ChunkReport,
        chunk: &ContentChunk,
        screened: Screened,
        method: ExtractionMethod,
    ) {
        for (name, rejection) in &screened.rejected {
            tracing::debug!(
                doc_id = %self.doc_id,
                chunk = chunk.index,
                name = %name,
                reason = ?rejection,
                "Entry rejected"
            );
        }
        report.rejected = screened.rejected.len();
        report.accepted = screened.accepted.len();
        context.records_rejected += screened.rejected.len();

        if screened.accepted.is_empty() {
            report.stages.push(ChunkStage::Rejected);
            tracing::debug!(
                doc_id = %self.doc_id,
                page = chunk.page_number,
                chunk = chunk.index,
                method = method.as_str(),
                "No records accepted from chunk"
            );
            return;
        }

        self.cache.learn(&screened.accepted, &chunk.text, method);
        report.stages.push(ChunkStage::Accepted);
        report.method = Some(method);
        context.absorb(screened.accepted, method);
    }
}

/// Repair output, treating an empty salvage as a failure.
fn repaired(text: &str) -> Option<Vec<RawBiomarker>> {
    repair_malformed(text).filter(|entries| !entries.is_empty())
}
