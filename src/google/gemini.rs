//! Gemini generateContent client — the AI classification collaborator.
//!
//! The wire envelope is candidates → content → parts → text; the payload
//! text inside may still be code-fenced, which the classify layer strips.

use async_trait::async_trait;
use serde::Deserialize;

use super::{send_with_retry, RetryPolicy};
use crate::classify::ai::{ExtractionModel, ModelError};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Gemini-backed extraction model.
pub struct GeminiClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String, max_attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy: RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            model,
            api_key,
        }
    }
}

#[async_trait]
impl ExtractionModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE, self.model);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = send_with_retry(
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
            &self.policy,
        )
        .await
        .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_deserialization() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "```json\n"},
                        {"text": "{\"company_name\": \"Acme\"}\n```"}
                    ]
                }
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert!(text.contains("company_name"));
    }

    #[test]
    fn test_envelope_without_candidates() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {}}"#).unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
