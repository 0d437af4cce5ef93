//! Gemini `generateContent` client

use super::{LlmError, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    /// A client without an API key fails on `generate`, not on construction,
    /// so commands that never call the model still work.
    ///
    /// `connect_timeout` bounds connection setup only. The overall deadline
    /// of a call belongs to the caller (`Generator` wraps every call).
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        })
    }

    /// Read the API key from the environment variable `api_key_env`.
    pub fn from_env(
        base_url: &str,
        model: &str,
        api_key_env: &str,
        connect_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut client = Self::new(base_url, model, std::env::var(api_key_env).ok(), connect_timeout)?;
        client.api_key_env = api_key_env.to_string();
        Ok(client)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(payload: GenerateContentResponse) -> Result<String, LlmError> {
    let text: String = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))?;

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "calling generateContent");
        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GenerateContentResponse = res.json().await?;
        response_text(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<String, LlmError> {
        response_text(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn joins_parts_of_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "[{\"test_id\":"}, {"text": " \"TC-001\"}]"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"totalTokenCount": 12}
        }"#;
        assert_eq!(parse(raw).unwrap(), r#"[{"test_id": "TC-001"}]"#);
    }

    #[test]
    fn no_candidates_is_empty_response() {
        assert!(matches!(parse(r#"{"candidates": []}"#), Err(LlmError::EmptyResponse)));
        assert!(matches!(parse(r#"{}"#), Err(LlmError::EmptyResponse)));
        assert!(matches!(
            parse(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(
            "https://example.test/v1beta/",
            "gemini-2.0-flash",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(!client.has_api_key());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GeminiClient::new(DEFAULT_BASE_URL, DEFAULT_MODEL, Some("  ".into()), Duration::from_secs(5)).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey(ref var) if var == "GEMINI_API_KEY"));
    }
}
