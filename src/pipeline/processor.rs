//! Document processing entry point.
//!
//! Drives one document through the full pipeline:
//! structure → relevance → chunking → skipping → per-chunk extraction →
//! deduplication.
//!
//! Engines are injected (`PatternCache`, `LlmClient`) so the processor is
//! fully testable with mock implementations.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::cache::{CacheError, PatternCache};
use super::chunking::{build_chunks, skip_chunks};
use super::inference::{InferenceError, LlmClient, OllamaClient};
use super::orchestrator::ChunkExtractor;
use super::relevance::filter_relevant_pages;
use super::standardize::deduplicate;
use super::structure::analyze_structure;
use super::types::{aggregate_confidence, DocumentExtraction, PageText, RunStats};
use crate::pipeline_config::{ConfigError, PipelineConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end a document run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Document has no extractable text")]
    NoExtractableText,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pattern cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Inference client setup failed: {0}")]
    Inference(#[from] InferenceError),
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct DocumentProcessor {
    cache: Arc<PatternCache>,
    llm: Box<dyn LlmClient + Send + Sync>,
    config: PipelineConfig,
}

impl DocumentProcessor {
    pub fn new(
        cache: Arc<PatternCache>,
        llm: Box<dyn LlmClient + Send + Sync>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { cache, llm, config })
    }

    /// Processor backed by the configured pattern-cache file and Ollama.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache = Arc::new(PatternCache::open(&config.pattern_cache_path()));
        let llm = OllamaClient::from_config(&config.inference)?;
        Self::new(cache, Box::new(llm), config)
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract biomarker records from one document's page texts.
    ///
    /// Per-chunk failures never abort the run. The only fatal case is a
    /// document without any text.
    pub fn process(
        &self,
        document_id: Uuid,
        pages: &[PageText],
    ) -> Result<DocumentExtraction, PipelineError> {
        let _span = tracing::info_span!("process_document", doc_id = %document_id).entered();

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            tracing::warn!(page_count = pages.len(), "No extractable text in document");
            return Err(PipelineError::NoExtractableText);
        }

        // Stage 1: structure
        let structure = analyze_structure(pages);

        // Stage 2: page relevance
        let relevant = filter_relevant_pages(pages, &structure);

        // Stage 3: chunking + compression
        let chunks = build_chunks(&relevant, &structure, &self.config);
        let chunks_total = chunks.len();

        // Stage 4: skip administrative chunks
        let (retained, skip_stats) = skip_chunks(
            chunks,
            self.config.admin_pattern_threshold,
            self.config.profile().chunk_confidence_threshold,
        );

        // Stage 5: per-chunk extraction fold
        let doc_id = document_id.to_string();
        let extractor = ChunkExtractor::new(&self.cache, self.llm.as_ref(), &self.config, &doc_id);
        let context = extractor.run(&retained);

        // Stage 6: deduplicate
        let (records, duplicates_merged) = deduplicate(context.records);
        let confidence = aggregate_confidence(&records);

        let stats = RunStats {
            pages_total: pages.len(),
            pages_relevant: relevant.len(),
            chunks_total,
            chunks_skipped: skip_stats.skipped(),
            cache_hits: context.cache_hits,
            inference_calls: context.inference_calls,
            fallbacks_used: context.fallbacks_used,
            prompt_tokens: context.usage.prompt_tokens,
            response_tokens: context.usage.response_tokens,
            records_rejected: context.records_rejected,
            duplicates_merged,
        };

        tracing::info!(
            records = records.len(),
            confidence,
            chunks = stats.chunks_total,
            skipped = stats.chunks_skipped,
            cache_hits = stats.cache_hits,
            inference_calls = stats.inference_calls,
            fallbacks = stats.fallbacks_used,
            duplicates = stats.duplicates_merged,
            "Document extraction complete"
        );

        Ok(DocumentExtraction {
            document_id,
            records,
            confidence,
            structure,
            stats,
        })
    }

    /// Write pending pattern-cache changes. Call before shutdown.
    pub fn shutdown(&self) -> Result<usize, PipelineError> {
        Ok(self.cache.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::pipeline::cache::BiomarkerPattern;
    use crate::pipeline::inference::{MockLlmClient, ScriptedLlmClient};
    use crate::pipeline::types::ExtractionMethod;

    fn processor(llm: impl LlmClient + Send + Sync + 'static, config: PipelineConfig) -> DocumentProcessor {
        DocumentProcessor::new(Arc::new(PatternCache::in_memory()), Box::new(llm), config).unwrap()
    }

    fn timeout_client() -> ScriptedLlmClient {
        ScriptedLlmClient::new(vec![Err(InferenceError::Timeout(600))])
    }

    fn names(extraction: &DocumentExtraction) -> Vec<&str> {
        extraction
            .records
            .iter()
            .map(|r| r.standardized_name.as_str())
            .collect()
    }

    #[test]
    fn empty_document_is_fatal() {
        let processor = processor(MockLlmClient::new("{}"), PipelineConfig::default());
        let pages = vec![PageText::new(1, ""), PageText::new(2, "   \n")];
        assert!(matches!(
            processor.process(Uuid::new_v4(), &pages),
            Err(PipelineError::NoExtractableText)
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = PipelineConfig {
            min_confidence: 1.5,
            ..PipelineConfig::default()
        };
        let result = DocumentProcessor::new(
            Arc::new(PatternCache::in_memory()),
            Box::new(MockLlmClient::new("{}")),
            config,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn fax_and_normal_text_not_extracted() {
        let llm = MockLlmClient::new(
            r#"{"biomarkers": [
                {"name": "Fax", "value": "5551234567", "unit": ""},
                {"name": "Glucose", "value": 98, "unit": "mg/dL", "reference_range": "70-99"},
                {"name": "Result", "value": "Normal", "unit": ""},
                {"name": "Hemoglobin", "value": 13.5, "unit": "g/dL", "reference_range": "12.0-15.5"}
            ]}"#,
        );
        let processor = processor(llm, PipelineConfig::default());
        let page = PageText::new(
            1,
            "Fax: 555-123-4567\nPhone: (555) 987-6543\nGlucose 98 mg/dL 70-99 Normal\nHemoglobin 13.5 g/dL 12.0-15.5",
        );
        let extraction = processor.process(Uuid::new_v4(), &[page]).unwrap();
        assert_eq!(names(&extraction), vec!["Glucose", "Hemoglobin"]);
        assert_eq!(extraction.stats.records_rejected, 2);
        assert!(extraction.records.iter().all(|r| !r.is_abnormal));
    }

    #[test]
    fn duplicate_cholesterol_reported_once() {
        let llm = MockLlmClient::new(
            r#"{"biomarkers": [
                {"name": "Cholesterol", "value": 190, "unit": "mg/dL", "confidence": 0.85},
                {"name": "Total Cholesterol", "value": 190, "unit": "mg/dL", "confidence": 0.9},
                {"name": "HDL Cholesterol", "value": 55, "unit": "mg/dL", "confidence": 0.9}
            ]}"#,
        );
        let processor = processor(llm, PipelineConfig::default());
        let page = PageText::new(
            1,
            "Cholesterol 190 mg/dL\nTotal Cholesterol 190 mg/dL\nHDL Cholesterol 55 mg/dL",
        );
        let extraction = processor.process(Uuid::new_v4(), &[page]).unwrap();

        let total: Vec<_> = extraction
            .records
            .iter()
            .filter(|r| r.standardized_name == "Total Cholesterol")
            .collect();
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].original_name, "Cholesterol");
        assert_eq!(extraction.stats.duplicates_merged, 1);
        assert_eq!(extraction.records.len(), 2);
    }

    #[test]
    fn chunk_boundary_overlap_deduplicated() {
        let config = PipelineConfig {
            chunk_token_budget: Some(30),
            chunk_overlap_tokens: Some(8),
            ..PipelineConfig::default()
        };
        let processor = processor(timeout_client(), config);
        let text = [
            "Glucose 98 mg/dL",
            "Sodium 140 mmol/L",
            "Potassium 4.2 mmol/L",
            "Hemoglobin 13.5 g/dL",
            "Hematocrit 41 %",
            "Platelets 250 K/uL",
            "Creatinine 0.9 mg/dL",
            "Calcium 9.4 mg/dL",
            "TSH 2.1 mIU/L",
            "Ferritin 80 ng/mL",
        ]
        .join("\n");
        let extraction = processor
            .process(Uuid::new_v4(), &[PageText::new(1, text)])
            .unwrap();

        assert!(extraction.stats.chunks_total > 1);
        assert!(extraction.stats.duplicates_merged > 0);
        let unique: BTreeSet<&str> = names(&extraction).into_iter().collect();
        assert_eq!(unique.len(), extraction.records.len());
        assert_eq!(extraction.records.len(), 10);
    }

    #[test]
    fn inference_timeout_falls_back_per_chunk() {
        let processor = processor(timeout_client(), PipelineConfig::default());
        let page = PageText::new(1, "Glucose: 105 mg/dL\nLDL Cholesterol: 120 mg/dL 0-99 H");
        let extraction = processor.process(Uuid::new_v4(), &[page]).unwrap();

        assert_eq!(extraction.stats.inference_calls, 1);
        assert_eq!(extraction.stats.fallbacks_used, 1);
        assert_eq!(names(&extraction), vec!["Glucose", "LDL Cholesterol"]);
        assert!(extraction
            .records
            .iter()
            .all(|r| r.method == ExtractionMethod::Fallback));
        assert!(extraction.records[1].is_abnormal);
    }

    #[test]
    fn learned_document_served_from_cache() {
        let cache = Arc::new(PatternCache::in_memory());
        let page = || {
            PageText::new(1, "Glucose: 98 mg/dL\nHemoglobin: 13.5 g/dL")
        };

        let learner = DocumentProcessor::new(
            Arc::clone(&cache),
            Box::new(MockLlmClient::new(
                r#"{"biomarkers": [
                    {"name": "Glucose", "value": 98, "unit": "mg/dL", "confidence": 0.95},
                    {"name": "Hemoglobin", "value": 13.5, "unit": "g/dL", "confidence": 0.95}
                ]}"#,
            )),
            PipelineConfig::default(),
        )
        .unwrap();
        let first = learner.process(Uuid::new_v4(), &[page()]).unwrap();
        assert_eq!(first.stats.inference_calls, 1);

        let unreachable = ScriptedLlmClient::new(vec![Err(InferenceError::Connection(
            "http://localhost:11434".into(),
        ))]);
        let cached = DocumentProcessor::new(cache, Box::new(unreachable), PipelineConfig::default())
            .unwrap();
        let second = cached.process(Uuid::new_v4(), &[page()]).unwrap();

        assert_eq!(second.stats.inference_calls, 0);
        assert_eq!(second.stats.cache_hits, 1);
        assert_eq!(names(&second), names(&first));
        assert!(second.records.iter().all(|r| r.method == ExtractionMethod::Cache));
        assert_eq!(second.records[0].value, 98.0);
    }

    #[test]
    fn fax_number_and_normal_word_on_one_line() {
        let processor = processor(timeout_client(), PipelineConfig::default());
        let page = PageText::new(1, "Fax: 9876543210, Glucose: 105 mg/dL, Normal");
        let extraction = processor.process(Uuid::new_v4(), &[page]).unwrap();

        assert_eq!(names(&extraction), vec!["Glucose"]);
        let glucose = &extraction.records[0];
        assert_eq!(glucose.value, 105.0);
        assert_eq!(glucose.unit, "mg/dL");
        assert!(glucose.confidence >= 0.7);
    }

    #[test]
    fn seeded_pattern_needs_no_inference() {
        let cache = Arc::new(PatternCache::in_memory());
        let added = cache
            .seed(vec![BiomarkerPattern::seeded("Glucose", &["Glucose"], "mg/dL", 70.0, 99.0)])
            .unwrap();
        assert_eq!(added, 1);

        let unreachable = ScriptedLlmClient::new(vec![Err(InferenceError::Connection(
            "http://localhost:11434".into(),
        ))]);
        let processor =
            DocumentProcessor::new(cache, Box::new(unreachable), PipelineConfig::default()).unwrap();
        let extraction = processor
            .process(Uuid::new_v4(), &[PageText::new(1, "Glucose 98 mg/dL")])
            .unwrap();

        assert_eq!(extraction.stats.inference_calls, 0);
        assert_eq!(extraction.stats.cache_hits, 1);
        assert_eq!(names(&extraction), vec!["Glucose"]);
        assert_eq!(extraction.records[0].value, 98.0);
        assert_eq!(extraction.records[0].method, ExtractionMethod::Cache);
    }

    #[test]
    fn administrative_pages_dropped() {
        let processor = processor(timeout_client(), PipelineConfig::default());
        let pages = vec![
            PageText::new(1, "Patient Name: Jane Doe\nAccount: 12345\nPage 1 of 2"),
            PageText::new(2, "Glucose 98 mg/dL"),
        ];
        let extraction = processor.process(Uuid::new_v4(), &pages).unwrap();
        assert_eq!(extraction.stats.pages_total, 2);
        assert_eq!(extraction.stats.pages_relevant, 1);
        assert_eq!(names(&extraction), vec!["Glucose"]);
        assert!(extraction.records.iter().all(|r| r.source.page_number == 2));
    }

    #[test]
    fn shutdown_flushes_cleanly() {
        let processor = processor(MockLlmClient::new("{}"), PipelineConfig::default());
        assert_eq!(processor.shutdown().unwrap(), 0);
    }
}
