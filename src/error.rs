//! Error types for engine runs.
//!
//! Errors are classified by blast radius:
//! - Per-message: classification failures, ambiguous extraction — caught
//!   locally, the batch continues.
//! - Per-run: configuration errors — the run aborts before any message is
//!   touched.
//! Store write failures sit in between: the message stays eligible for the
//! next run while its thread is routed to manual review.

use thiserror::Error;

use crate::google::GoogleApiError;

/// Error taxonomy for the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// AI unreachable, rate-limited past the retry budget, or unparseable
    /// JSON. Non-fatal; the extractor chain proceeds to fallbacks.
    #[error("classification failed: {0}")]
    ClassificationFailure(String),

    /// Transient rate limiting, bounded retry exhausted.
    #[error("rate limited by {service}")]
    RateLimited { service: &'static str },

    /// A batched store write was rejected or raised. The affected messages
    /// are not marked processed and will be retried next run.
    #[error("store write failed: {0}")]
    StoreWriteFailure(String),

    /// Required label, sheet tab, or column mapping missing at run start.
    /// Fatal for the entire run; no partial side effects.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mailbox collaborator failure outside the write path.
    #[error("mailbox error: {0}")]
    Mailbox(String),

    /// Local processed-message log failure.
    #[error("processed log error: {0}")]
    ProcessedLog(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a retry on the next scheduled run can succeed without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ClassificationFailure(_)
                | EngineError::RateLimited { .. }
                | EngineError::StoreWriteFailure(_)
                | EngineError::Mailbox(_)
        )
    }

    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_) | EngineError::ProcessedLog(_) | EngineError::Io(_)
        )
    }
}

impl From<GoogleApiError> for EngineError {
    fn from(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::ApiError { status: 429, .. } => {
                EngineError::RateLimited { service: "google" }
            }
            other => EngineError::Mailbox(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::ClassificationFailure("429".into()).is_retryable());
        assert!(EngineError::StoreWriteFailure("quota".into()).is_retryable());
        assert!(!EngineError::Configuration("label missing".into()).is_retryable());
    }

    #[test]
    fn test_configuration_is_fatal() {
        assert!(EngineError::Configuration("no tab".into()).is_fatal());
        assert!(!EngineError::RateLimited { service: "gemini" }.is_fatal());
    }
}
