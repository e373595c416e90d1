//! Lab-report biomarker extraction.
//!
//! Page texts in, standardized and deduplicated biomarker records out. The
//! pipeline answers from a learned pattern cache where it can and calls the
//! inference service only for what the cache does not cover.

pub mod config;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::{
    spawn_document_run, BiomarkerRecord, DocumentExtraction, DocumentProcessor, DocumentRunReport,
    ExtractionMethod, ExtractionSink, PageText, PatternCache, PipelineError, RunStats, RunStatus,
};
pub use pipeline_config::{load_config, ExtractionMode, PipelineConfig};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
