pub mod json;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use json::extract_object;
pub use openai::{LlmConfig, OpenAiClient};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingCredential,
    #[error("http error: {0}")]
    Http(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("completion returned no content")]
    EmptyContent,
}

impl LlmError {
    /// Transport failures, throttling and server errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// A chat-completion backend: one system instruction plus one user prompt in,
/// raw model text out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Whether credentials are present. Checked before any network call.
    fn is_configured(&self) -> bool;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}
