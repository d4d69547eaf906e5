//! AI extraction stage: prompt construction, response unfencing, and the
//! tagged outcome the chain handles exhaustively.
//!
//! The model collaborator returns raw payload text; everything about the
//! wire (auth, retry, rate limiting) lives behind `ExtractionModel`. A
//! malformed or key-incomplete response degrades to "no result" for this
//! stage — it never aborts the message.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AiConfig;
use crate::types::{RawMessage, MANUAL_REVIEW_SENTINEL};

/// Transport-level failure of the model collaborator.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("rate limited")]
    RateLimited,
    #[error("transport: {0}")]
    Transport(String),
    #[error("empty response")]
    EmptyResponse,
}

/// Synchronous request/response text-classification collaborator.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    /// Send a prompt, return the raw payload text (possibly code-fenced).
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// The strict-JSON object the prompt demands.
#[derive(Debug, Clone, Deserialize)]
pub struct AiExtraction {
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Tagged outcome of one AI extraction attempt.
#[derive(Debug)]
pub enum AiOutcome {
    Resolved(AiExtraction),
    /// Parseable JSON that doesn't carry the required keys.
    SchemaMismatch,
    /// Unreachable, rate-limited past the retry budget, or unparseable.
    TransportError(String),
}

/// Build the single-record extraction prompt. The closed status
/// enumeration and the unknown-value sentinel are embedded directly in the
/// instruction text.
pub fn build_extraction_prompt(message: &RawMessage, config: &AiConfig) -> String {
    let body_end = message
        .body_text
        .char_indices()
        .nth(config.max_body_chars)
        .map(|(i, _)| i)
        .unwrap_or(message.body_text.len());

    format!(
        "You are extracting job-application data from one email.\n\
         Return ONLY a JSON object with exactly these keys:\n\
         {{\"company_name\": \"...\", \"job_title\": \"...\", \"status\": \"...\"}}\n\
         Allowed status values: Applied, Application Viewed, Assessment, Interview, \
         Offer, Rejected, Update/Other.\n\
         If a value cannot be determined, use exactly \"{sentinel}\".\n\
         No markdown fences, no commentary.\n\n\
         Subject: {subject}\n\n\
         Body:\n{body}",
        sentinel = MANUAL_REVIEW_SENTINEL,
        subject = message.subject,
        body = &message.body_text[..body_end],
    )
}

/// Run the AI extractor for one message.
pub async fn extract(
    model: &dyn ExtractionModel,
    config: &AiConfig,
    message: &RawMessage,
) -> AiOutcome {
    let prompt = build_extraction_prompt(message, config);
    match model.generate(&prompt).await {
        Ok(payload) => parse_extraction(&payload),
        Err(e) => AiOutcome::TransportError(e.to_string()),
    }
}

/// Parse a payload into the tagged outcome. Fences are stripped first.
pub fn parse_extraction(payload: &str) -> AiOutcome {
    let unfenced = strip_code_fences(payload);
    let value: serde_json::Value = match serde_json::from_str(unfenced) {
        Ok(v) => v,
        Err(e) => return AiOutcome::TransportError(format!("unparseable JSON: {}", e)),
    };

    let Some(object) = value.as_object() else {
        return AiOutcome::SchemaMismatch;
    };
    if !object.contains_key("company_name") || !object.contains_key("job_title") {
        return AiOutcome::SchemaMismatch;
    }

    match serde_json::from_value::<AiExtraction>(value) {
        Ok(extraction) => AiOutcome::Resolved(extraction),
        Err(_) => AiOutcome::SchemaMismatch,
    }
}

/// Strip optional triple-backtick fencing (with or without a `json` tag)
/// from a model payload.
pub fn strip_code_fences(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// Map a model-supplied field to a usable value: absent, empty, and the
/// sentinel all mean "not resolved".
pub fn field_value(raw: Option<&str>) -> Option<&str> {
    let value = raw?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(MANUAL_REVIEW_SENTINEL) {
        None
    } else {
        Some(value)
    }
}
