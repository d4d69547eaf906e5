//! Tiered message classification.
//!
//! Strategies run in fixed priority order — AI, platform rules, subject
//! patterns, body scan, sender identity — each filling only fields still
//! missing, until both company and title are resolved or the chain is
//! exhausted. Status is resolved independently by the keyword normalizer,
//! which also arbitrates ambiguous AI statuses.

pub mod ai;
pub mod clean;
pub mod patterns;
pub mod sender;

use crate::config::AiConfig;
use crate::status::detect_status;
use crate::types::{ApplicationStatus, ExtractedRecord, RawMessage};

use ai::{AiOutcome, ExtractionModel};
use clean::{clean_company, clean_title};

/// What one fallback strategy resolved. Fields the strategy couldn't
/// resolve stay `None` and remain open for later strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub company: Option<String>,
    pub title: Option<String>,
}

/// Drives the extractor chain for one message at a time.
pub struct Classifier<'a> {
    model: &'a dyn ExtractionModel,
    ai_config: &'a AiConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(model: &'a dyn ExtractionModel, ai_config: &'a AiConfig) -> Self {
        Self { model, ai_config }
    }

    /// Classify one message into an `ExtractedRecord`.
    ///
    /// Never fails: exhausted fields stay unresolved and surface as the
    /// manual-review sentinel downstream.
    pub async fn classify(&self, message: &RawMessage) -> ExtractedRecord {
        let platform = sender::platform_tag(&message.sender);
        let mut record = ExtractedRecord {
            platform: platform.map(str::to_string),
            ..ExtractedRecord::default()
        };

        // 1. AI extractor. Degrades to "no result" on any failure.
        let mut ai_status: Option<String> = None;
        match ai::extract(self.model, self.ai_config, message).await {
            AiOutcome::Resolved(extraction) => {
                record.company = ai::field_value(extraction.company_name.as_deref())
                    .and_then(clean_company);
                record.title =
                    ai::field_value(extraction.job_title.as_deref()).and_then(clean_title);
                ai_status = ai::field_value(extraction.status.as_deref()).map(str::to_string);
            }
            AiOutcome::SchemaMismatch => {
                log::debug!("ai extraction schema mismatch for message {}", message.id);
            }
            AiOutcome::TransportError(e) => {
                log::warn!("ai extraction unavailable for message {}: {}", message.id, e);
            }
        }

        // 2–4. Deterministic fallbacks, first-match-wins per field.
        if !record.is_resolved() {
            if let Some(tag) = platform {
                merge(&mut record, patterns::platform_rules(message, tag));
            }
        }
        if !record.is_resolved() {
            merge(&mut record, patterns::subject_patterns(message));
        }
        if !record.is_resolved() {
            merge(&mut record, patterns::body_scan(message));
        }

        // 5. Sender identity can still rescue the company.
        if record.company.is_none() {
            record.company = sender::company_from_sender(&message.sender);
        }

        record.status = resolve_status(ai_status.as_deref(), &message.body_text);
        record
    }
}

fn merge(record: &mut ExtractedRecord, partial: PartialRecord) {
    if record.company.is_none() {
        record.company = partial.company;
    }
    if record.title.is_none() {
        record.title = partial.title;
    }
}

/// Arbitrate between the AI-supplied status and the keyword normalizer.
///
/// An AI status inside the closed enum and unambiguous wins outright. An
/// ambiguous one (Update/Other, Manual Review) or one outside the enum is
/// enhanced by the normalizer over the body, which may overwrite it.
fn resolve_status(ai_status: Option<&str>, body: &str) -> Option<ApplicationStatus> {
    match ai_status.map(ApplicationStatus::parse) {
        Some(Some(parsed))
            if !matches!(
                parsed,
                ApplicationStatus::UpdateOther | ApplicationStatus::ManualReview
            ) =>
        {
            Some(parsed)
        }
        Some(ambiguous) => detect_status(body).or(ambiguous.or(Some(ApplicationStatus::UpdateOther))),
        None => detect_status(body),
    }
}
