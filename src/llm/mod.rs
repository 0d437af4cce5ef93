//! Text-generation capability
//!
//! Defines the trait the generator calls and two implementations:
//! - `GeminiClient`: Google Generative Language REST API (production)
//! - `MockGenerator`: scripted responses with recorded prompts (testing)

mod gemini;

pub use gemini::{GeminiClient, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Errors from a text-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not configured (set {0})")]
    MissingApiKey(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("mock failure: {0}")]
    Mock(String),
}

/// Produces a completion for a prompt.
///
/// Abstracts over transport (HTTP, mock) so the generator does not depend on
/// which model answers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Mock generator for testing: answers from a queue of scripted responses.
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        locked(&self.responses).push_back(Ok(response.into()));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        locked(&self.responses).push_back(Err(message.into()));
        self
    }

    /// Response returned once the queue is exhausted.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Sleep before answering (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        locked(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.prompts).len()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        locked(&self.prompts).push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = locked(&self.responses).pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LlmError::Mock(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Mock("no scripted response left".to_string())),
        }
    }
}
