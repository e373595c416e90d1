//! Fire-and-forget document runs.
//!
//! A run executes on the tokio blocking pool (inference calls are blocking
//! HTTP), reports its result to an [`ExtractionSink`] and never blocks the
//! caller. Each run owns its extraction context; only the pattern cache is
//! shared.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::processor::DocumentProcessor;
use super::types::{DocumentExtraction, PageText};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Failed to store records: {0}")]
    Storage(String),
}

/// Receives the outcome of a document run (record persistence and the
/// document's status field live with the caller).
pub trait ExtractionSink: Send + Sync {
    fn store_records(&self, extraction: &DocumentExtraction) -> Result<(), SinkError>;
    fn mark_failed(&self, document_id: Uuid, error: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Summary of one run for the caller's status field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRunReport {
    pub document_id: Uuid,
    pub status: RunStatus,
    pub confidence: f32,
    pub record_count: usize,
    pub error: Option<String>,
}

impl DocumentRunReport {
    fn failed(document_id: Uuid, error: String) -> Self {
        Self {
            document_id,
            status: RunStatus::Failed,
            confidence: 0.0,
            record_count: 0,
            error: Some(error),
        }
    }
}

/// Process one document and hand the result to `sink`. Blocking.
pub fn run_document(
    processor: &DocumentProcessor,
    sink: &dyn ExtractionSink,
    document_id: Uuid,
    pages: &[PageText],
) -> DocumentRunReport {
    let extraction = match processor.process(document_id, pages) {
        Ok(extraction) => extraction,
        Err(e) => {
            tracing::error!(doc_id = %document_id, error = %e, "Document extraction failed");
            let message = e.to_string();
            sink.mark_failed(document_id, &message);
            return DocumentRunReport::failed(document_id, message);
        }
    };

    if let Err(e) = sink.store_records(&extraction) {
        tracing::error!(doc_id = %document_id, error = %e, "Storing extracted records failed");
        let message = e.to_string();
        sink.mark_failed(document_id, &message);
        return DocumentRunReport::failed(document_id, message);
    }

    DocumentRunReport {
        document_id,
        status: RunStatus::Completed,
        confidence: extraction.confidence,
        record_count: extraction.records.len(),
        error: None,
    }
}

/// Start a document run on the blocking pool and return immediately. The
/// handle may be dropped; the run still completes and reports to `sink`.
pub fn spawn_document_run(
    processor: Arc<DocumentProcessor>,
    sink: Arc<dyn ExtractionSink>,
    document_id: Uuid,
    pages: Vec<PageText>,
) -> JoinHandle<DocumentRunReport> {
    tracing::info!(doc_id = %document_id, pages = pages.len(), "Document run queued");
    tokio::task::spawn_blocking(move || {
        run_document(processor.as_ref(), sink.as_ref(), document_id, &pages)
    })
}
