//! AI summarization of extracted document text.
//!
//! [`SummaryProvider`] is the seam between the pipeline and the hosted model;
//! [`GeminiClient`] is the production implementation.

use async_trait::async_trait;
use thiserror::Error;

pub mod gemini;
pub mod parse;
pub mod prompts;
pub mod types;

pub use gemini::GeminiClient;
pub use types::{DetailedSummary, Difficulty, Importance, SummarySection};

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("AI API key is not configured")]
    NotConfigured,
    #[error("AI request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("AI API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("AI API blocked the prompt: {0}")]
    Blocked(String),
    #[error("AI API returned an empty answer")]
    EmptyResponse,
    #[error("invalid AI response: {0}")]
    InvalidResponse(String),
}

impl SummarizeError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SummarizeError::Transport(_)
            | SummarizeError::EmptyResponse
            | SummarizeError::InvalidResponse(_) => true,
            SummarizeError::Api { status, .. } => *status == 429 || *status >= 500,
            SummarizeError::NotConfigured | SummarizeError::Blocked(_) => false,
        }
    }
}

#[async_trait]
pub trait SummaryProvider: Send + Sync + 'static {
    async fn generate_detailed_summary(
        &self,
        content: &str,
        file_name: &str,
    ) -> Result<DetailedSummary, SummarizeError>;

    async fn generate_quick_summary(&self, content: &str) -> Result<String, SummarizeError>;
}
