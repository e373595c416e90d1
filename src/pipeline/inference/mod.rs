//! Inference seam: client trait, Ollama client, prompts, the response
//! boundary parser with repair, and the deterministic fallback parser.

pub mod fallback;
pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod sanitize;
pub mod types;

pub use fallback::fallback_parse;
pub use ollama::{MockLlmClient, OllamaClient, ScriptedLlmClient};
pub use parser::{parse_response, repair_malformed};
pub use types::{InferenceOutcome, LlmClient, PromptStyle, TokenUsage};

use thiserror::Error;

use self::prompt::{build_extraction_prompt, build_simplified_prompt, EXTRACTION_SYSTEM_PROMPT};
use self::sanitize::{sanitize_for_llm_with_audit, sanitize_llm_output};
use super::chunking::tokens::estimate_tokens;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference service is not reachable at {0}")]
    Connection(String),

    #[error("Inference request timed out after {0}s")]
    Timeout(u64),

    #[error("Inference service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// One chunk to send for extraction.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub doc_id: &'a str,
    pub chunk_text: &'a str,
    pub context_note: &'a str,
    /// Standardized names already extracted earlier in the document.
    pub already_extracted: &'a [String],
}

/// Call the inference service once and classify the result.
///
/// Chunk text is sanitized before it leaves the process and the response is
/// stripped of model artifacts before parsing. Never fails: transport errors
/// become `Timeout` or `Unavailable`.
pub fn invoke(
    client: &dyn LlmClient,
    model: &str,
    request: &InferenceRequest<'_>,
    style: PromptStyle,
) -> (InferenceOutcome, TokenUsage) {
    let clean_text = sanitize_for_llm_with_audit(request.chunk_text, Some(request.doc_id));
    let prompt = match style {
        PromptStyle::Adaptive => {
            build_extraction_prompt(&clean_text, request.context_note, request.already_extracted)
        }
        PromptStyle::Simplified => build_simplified_prompt(&clean_text),
    };

    let mut usage = TokenUsage {
        prompt_tokens: estimate_tokens(EXTRACTION_SYSTEM_PROMPT) + estimate_tokens(&prompt),
        response_tokens: 0,
    };

    let response = match client.generate(model, &prompt, EXTRACTION_SYSTEM_PROMPT) {
        Ok(response) => response,
        Err(InferenceError::Timeout(secs)) => {
            tracing::warn!(doc_id = %request.doc_id, timeout_secs = secs, "Inference call timed out");
            return (InferenceOutcome::Timeout, usage);
        }
        Err(e) => {
            tracing::warn!(doc_id = %request.doc_id, error = %e, "Inference call failed");
            return (InferenceOutcome::Unavailable(e.to_string()), usage);
        }
    };
    usage.response_tokens = estimate_tokens(&response);

    let cleaned = sanitize_llm_output(&response);
    let outcome = match parse_response(&cleaned) {
        Some(entries) => InferenceOutcome::Parsed(entries),
        None => InferenceOutcome::Malformed(cleaned),
    };
    tracing::debug!(
        doc_id = %request.doc_id,
        style = ?style,
        outcome = outcome.label(),
        prompt_tokens = usage.prompt_tokens,
        response_tokens = usage.response_tokens,
        "Inference call complete"
    );
    (outcome, usage)
}
