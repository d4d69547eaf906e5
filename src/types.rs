//! Core domain types: messages, statuses, extracted records, tracked rows.
//!
//! The status enum is a closed total order; `rank()` is the merge lattice
//! the reconciliation engine compares against. Rejected and Offer are
//! override-terminal: they land on a row regardless of rank.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed cell value meaning "extraction could not resolve this field".
///
/// Distinct from an empty string so downstream logic can tell "unresolved"
/// apart from "no value present".
pub const MANUAL_REVIEW_SENTINEL: &str = "NEEDS MANUAL REVIEW";

// ============================================================================
// Messages
// ============================================================================

/// One email, as handed over by the mailbox collaborator. Immutable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub body_text: String,
    /// Raw "From" header, e.g. `Greenhouse <no-reply@greenhouse.io>`.
    pub sender: String,
    pub received_at: DateTime<Utc>,
}

// ============================================================================
// Status lattice
// ============================================================================

/// Closed set of application statuses, totally ordered by `rank()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    ManualReview,
    UpdateOther,
    Rejected,
    Applied,
    ApplicationViewed,
    Assessment,
    Interview,
    Offer,
}

impl ApplicationStatus {
    /// Merge-lattice rank. A non-terminal update only lands on a row when
    /// its rank is >= the current rank. Rejected ranks below Applied so the
    /// only path to a rejection is the override-terminal rule.
    pub fn rank(self) -> u8 {
        match self {
            ApplicationStatus::ManualReview => 0,
            ApplicationStatus::UpdateOther => 1,
            ApplicationStatus::Rejected => 2,
            ApplicationStatus::Applied => 3,
            ApplicationStatus::ApplicationViewed => 4,
            ApplicationStatus::Assessment => 5,
            ApplicationStatus::Interview => 6,
            ApplicationStatus::Offer => 7,
        }
    }

    /// Rejected and Offer represent real-world finality: they overwrite the
    /// current status unconditionally.
    pub fn is_override_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Rejected | ApplicationStatus::Offer
        )
    }

    /// The cell value written to the store.
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::ManualReview => "Manual Review",
            ApplicationStatus::UpdateOther => "Update/Other",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::ApplicationViewed => "Application Viewed",
            ApplicationStatus::Assessment => "Assessment",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::Offer => "Offer",
        }
    }

    /// Parse a cell or model-supplied status string. Unknown values map to
    /// `None`, never to a default.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim();
        if v.is_empty() {
            return None;
        }
        match v.to_lowercase().as_str() {
            "manual review" | "needs manual review" => Some(ApplicationStatus::ManualReview),
            "update/other" | "update" | "other" => Some(ApplicationStatus::UpdateOther),
            "rejected" | "rejection" => Some(ApplicationStatus::Rejected),
            "applied" => Some(ApplicationStatus::Applied),
            "application viewed" | "viewed" => Some(ApplicationStatus::ApplicationViewed),
            "assessment" => Some(ApplicationStatus::Assessment),
            "interview" => Some(ApplicationStatus::Interview),
            "offer" | "offer/accepted" => Some(ApplicationStatus::Offer),
            _ => None,
        }
    }

    /// Max-by-rank of two statuses; used to recompute the peak.
    pub fn max_by_rank(a: Self, b: Self) -> Self {
        if b.rank() > a.rank() {
            b
        } else {
            a
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Extraction output
// ============================================================================

/// What the classifier resolved for one message.
///
/// `None` in company/title means the extractor chain was exhausted; the
/// store codec writes the manual-review sentinel for such fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: Option<ApplicationStatus>,
    /// Coarse platform tag derived from the sender domain (e.g. "linkedin").
    pub platform: Option<String>,
}

impl ExtractedRecord {
    /// Both identity fields resolved — the extractor chain can stop.
    pub fn is_resolved(&self) -> bool {
        self.company.is_some() && self.title.is_some()
    }

    /// True when any field must fall back to the manual-review sentinel.
    pub fn needs_manual_review(&self) -> bool {
        self.company.is_none() || self.title.is_none()
    }

    /// Cell value for the company field.
    pub fn company_cell(&self) -> &str {
        self.company.as_deref().unwrap_or(MANUAL_REVIEW_SENTINEL)
    }

    /// Cell value for the title field.
    pub fn title_cell(&self) -> &str {
        self.title.as_deref().unwrap_or(MANUAL_REVIEW_SENTINEL)
    }
}

// ============================================================================
// Tracked rows
// ============================================================================

/// One store row: a single application and its status history endpoints.
///
/// Invariant: `rank(peak_status) >= rank(status)`. The peak only ever
/// increases over the row's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedApplication {
    /// 1-based row position in the store tab (header is row 1).
    pub row: u32,
    pub company: String,
    pub title: String,
    pub status: ApplicationStatus,
    pub peak_status: ApplicationStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub source_subject: String,
    pub source_link: String,
    pub source_message_id: String,
}

impl TrackedApplication {
    /// Lookup key into the company index. Simple lowercasing — the same
    /// keying every extraction path uses, so "Acme Corp" and "Acme" from
    /// the same employer can legitimately occupy two rows.
    pub fn company_key(&self) -> String {
        self.company.to_lowercase()
    }

    /// Rows whose company never resolved are excluded from the index.
    pub fn is_manual_review_row(&self) -> bool {
        self.company == MANUAL_REVIEW_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_total_order() {
        let all = [
            ApplicationStatus::ManualReview,
            ApplicationStatus::UpdateOther,
            ApplicationStatus::Rejected,
            ApplicationStatus::Applied,
            ApplicationStatus::ApplicationViewed,
            ApplicationStatus::Assessment,
            ApplicationStatus::Interview,
            ApplicationStatus::Offer,
        ];
        let mut ranks: Vec<u8> = all.iter().map(|s| s.rank()).collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), all.len(), "ranks must be distinct");
    }

    #[test]
    fn test_rejected_ranks_below_interview() {
        assert!(ApplicationStatus::Rejected.rank() < ApplicationStatus::Interview.rank());
        assert!(ApplicationStatus::Rejected.is_override_terminal());
    }

    #[test]
    fn test_offer_is_override_terminal() {
        assert!(ApplicationStatus::Offer.is_override_terminal());
        assert!(!ApplicationStatus::Interview.is_override_terminal());
        assert!(!ApplicationStatus::Applied.is_override_terminal());
    }

    #[test]
    fn test_parse_round_trip() {
        for status in [
            ApplicationStatus::ManualReview,
            ApplicationStatus::UpdateOther,
            ApplicationStatus::Rejected,
            ApplicationStatus::Applied,
            ApplicationStatus::ApplicationViewed,
            ApplicationStatus::Assessment,
            ApplicationStatus::Interview,
            ApplicationStatus::Offer,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_parse_unknown_is_none() {
        assert_eq!(ApplicationStatus::parse("Ghosted"), None);
        assert_eq!(ApplicationStatus::parse(""), None);
        assert_eq!(ApplicationStatus::parse("   "), None);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            ApplicationStatus::parse("APPLICATION VIEWED"),
            Some(ApplicationStatus::ApplicationViewed)
        );
        assert_eq!(
            ApplicationStatus::parse("offer"),
            Some(ApplicationStatus::Offer)
        );
    }

    #[test]
    fn test_max_by_rank() {
        assert_eq!(
            ApplicationStatus::max_by_rank(
                ApplicationStatus::Interview,
                ApplicationStatus::Rejected
            ),
            ApplicationStatus::Interview
        );
        assert_eq!(
            ApplicationStatus::max_by_rank(ApplicationStatus::Applied, ApplicationStatus::Offer),
            ApplicationStatus::Offer
        );
    }

    #[test]
    fn test_record_sentinel_cells() {
        let record = ExtractedRecord {
            company: None,
            title: Some("Backend Engineer".to_string()),
            status: Some(ApplicationStatus::Applied),
            platform: None,
        };
        assert!(record.needs_manual_review());
        assert_eq!(record.company_cell(), MANUAL_REVIEW_SENTINEL);
        assert_eq!(record.title_cell(), "Backend Engineer");
    }
}
