use serde::{Deserialize, Serialize};

use super::InferenceError;
use crate::pipeline::types::RawBiomarker;

/// Text-generation backend abstraction (allows mocking).
pub trait LlmClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, InferenceError>;
}

/// Tagged result of one inference call, decided at the service boundary.
/// Repair only ever runs on `Malformed`.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Parsed(Vec<RawBiomarker>),
    /// Raw response text that could not be parsed.
    Malformed(String),
    Timeout,
    /// Service error or unreachable service.
    Unavailable(String),
}

impl InferenceOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InferenceOutcome::Parsed(_) => "parsed",
            InferenceOutcome::Malformed(_) => "malformed",
            InferenceOutcome::Timeout => "timeout",
            InferenceOutcome::Unavailable(_) => "unavailable",
        }
    }
}

/// Prompt variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Full instructions with the already-extracted name list.
    Adaptive,
    /// Short instructions for the single retry after a bad response.
    Simplified,
}

/// Estimated token usage of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.response_tokens += other.response_tokens;
    }
}
