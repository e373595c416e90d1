pub mod background; // Fire-and-forget document runs
pub mod biomarkers;
pub mod cache; // Learned biomarker patterns, SQLite-backed
pub mod chunking;
pub mod inference;
pub mod orchestrator; // Per-chunk cache → inference → fallback fold
pub mod processor; // Document processing entry point
pub mod relevance;
pub mod signatures;
pub mod standardize;
pub mod structure;
pub mod types;

pub use background::{spawn_document_run, DocumentRunReport, ExtractionSink, RunStatus};
pub use cache::PatternCache;
pub use processor::{DocumentProcessor, PipelineError};
pub use types::{BiomarkerRecord, DocumentExtraction, ExtractionMethod, PageText, RunStats};
