//! Context-grounded generation of test cases and automation scripts
//!
//! Both operations retrieve context from the knowledge base, render a prompt,
//! call the text generator under a timeout and post-process the answer. No
//! retries: one call per request.

mod extract;
mod prompts;

pub use extract::{parse_test_cases, strip_code_fences};
pub use prompts::{script_prompt, test_cases_prompt};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::llm::{LlmError, TextGenerator};
use crate::retrieve::{join_context, Retriever};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default bound on a single generation call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Prefix of the text returned when script generation fails
pub const SCRIPT_ERROR_PREFIX: &str = "# Error generating script:";

/// A single generated test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TestCase {
    /// Identifier such as "TC-001"
    pub test_id: String,
    /// The feature under test
    pub feature: String,
    /// What the test does
    pub scenario: String,
    /// The observable outcome that makes the test pass
    pub expected_result: String,
    /// Source document the rule was taken from
    #[serde(default)]
    pub grounded_in: Option<String>,
}

impl TestCase {
    /// Validate one record of a model response.
    ///
    /// The four text fields are required and must be non-blank. `grounded_in`
    /// may be absent, null or a string; a blank string counts as null.
    pub fn from_json(record: Value) -> Result<Self, String> {
        if !record.is_object() {
            return Err("record is not an object".to_string());
        }
        let case: TestCase = serde_json::from_value(record).map_err(|e| e.to_string())?;
        case.validated()
    }

    /// Apply the `from_json` field rules to an already deserialized case.
    pub fn validated(mut self) -> Result<Self, String> {
        for (field, value) in [
            ("test_id", &self.test_id),
            ("feature", &self.feature),
            ("scenario", &self.scenario),
            ("expected_result", &self.expected_result),
        ] {
            if value.trim().is_empty() {
                return Err(format!("field `{}` is empty", field));
            }
        }

        if self.grounded_in.as_deref().is_some_and(|g| g.trim().is_empty()) {
            self.grounded_in = None;
        }
        Ok(self)
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("text generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("test case {index} failed validation: {reason}")]
    Schema { index: usize, reason: String },
}

impl GenerationError {
    fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            GenerationError::Timeout(_) => DiagnosticKind::GenerationTimeout,
            _ => DiagnosticKind::Generation,
        }
    }
}

/// Generates test cases and scripts grounded in retrieved context.
pub struct Generator {
    retriever: Retriever,
    llm: Arc<dyn TextGenerator>,
    diagnostics: Arc<Diagnostics>,
    top_k: usize,
    timeout: Duration,
}

impl Generator {
    pub fn new(
        retriever: Retriever,
        llm: Arc<dyn TextGenerator>,
        diagnostics: Arc<Diagnostics>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            llm,
            diagnostics,
            top_k,
            timeout,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(prompt_chars = prompt.chars().count(), "sending prompt");
        match tokio::time::timeout(self.timeout, self.llm.generate(prompt)).await {
            Ok(Ok(text)) => Ok(text),
            // A transport deadline that fires first is still a timeout
            Ok(Err(LlmError::Http(e))) if e.is_timeout() => Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }

    fn report(&self, operation: &str, err: &GenerationError) {
        warn!(operation, error = %err, "generation failed");
        self.diagnostics
            .record(err.diagnostic_kind(), operation, err.to_string());
    }

    /// Test cases for `feature`, or the error that prevented them.
    pub async fn try_generate_test_cases(&self, feature: &str) -> Result<Vec<TestCase>, GenerationError> {
        let hits = self.retriever.retrieve_chunks(feature, self.top_k);

        let mut sources: Vec<String> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.chunk.source) {
                sources.push(hit.chunk.source.clone());
            }
        }

        let prompt = test_cases_prompt(feature, &join_context(&hits), &sources);
        let response = self.call(&prompt).await?;
        let cases = parse_test_cases(&response)?;
        info!(feature, cases = cases.len(), context_chunks = hits.len(), "generated test cases");
        Ok(cases)
    }

    /// Test cases for `feature`. Failures are logged, recorded, and yield an
    /// empty list.
    pub async fn generate_test_cases(&self, feature: &str) -> Vec<TestCase> {
        match self.try_generate_test_cases(feature).await {
            Ok(cases) => cases,
            Err(e) => {
                self.report("generate_test_cases", &e);
                Vec::new()
            }
        }
    }

    /// Script source for `test_case`, or the error that prevented it.
    pub async fn try_generate_script(
        &self,
        test_case: &TestCase,
        page_markup: Option<&str>,
    ) -> Result<String, GenerationError> {
        let context = self.retriever.retrieve(&test_case.scenario, self.top_k);
        let prompt = script_prompt(test_case, page_markup, &context);
        let response = self.call(&prompt).await?;
        let script = strip_code_fences(&response).to_string();
        info!(test_id = %test_case.test_id, script_chars = script.len(), "generated script");
        Ok(script)
    }

    /// Script source for `test_case`. On failure returns a placeholder that
    /// starts with [`SCRIPT_ERROR_PREFIX`].
    pub async fn generate_script(&self, test_case: &TestCase, page_markup: Option<&str>) -> String {
        match self.try_generate_script(test_case, page_markup).await {
            Ok(script) => script,
            Err(e) => {
                self.report("generate_script", &e);
                format!("{} {}", SCRIPT_ERROR_PREFIX, e)
            }
        }
    }
}
