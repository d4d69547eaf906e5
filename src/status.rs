//! Status detection from email body text.
//!
//! Four fixed keyword lists checked in fixed precedence — offer first,
//! rejection last. Offer/interview phrasing is the least ambiguous;
//! rejection phrases ("other candidates", "unfortunately") show up inside
//! otherwise-positive mail, so they only win when nothing stronger matched.

use crate::types::ApplicationStatus;

/// Offer / acceptance phrases. Checked first.
const OFFER_KEYWORDS: &[&str] = &[
    "pleased to offer",
    "excited to offer",
    "offer of employment",
    "extend an offer",
    "offer letter",
    "job offer",
    "formal offer",
];

/// Interview phrases.
const INTERVIEW_KEYWORDS: &[&str] = &[
    "schedule an interview",
    "schedule your interview",
    "interview invitation",
    "invite you to interview",
    "invited to interview",
    "like to interview you",
    "move forward with an interview",
    "phone screen",
    "technical interview",
    "interview availability",
    "next round of interviews",
    "schedule a call with",
];

/// Assessment / screening-exercise phrases.
const ASSESSMENT_KEYWORDS: &[&str] = &[
    "online assessment",
    "coding challenge",
    "coding test",
    "technical assessment",
    "take home assignment",
    "take home exercise",
    "complete the assessment",
    "skills assessment",
    "hackerrank",
    "codility",
];

/// Rejection phrases. Checked last.
const REJECTION_KEYWORDS: &[&str] = &[
    "unfortunately",
    "not to move forward",
    "will not be moving forward",
    "decided not to proceed",
    "move forward with other candidates",
    "pursue other candidates",
    "other candidates whose",
    "no longer under consideration",
    "not selected",
    "position has been filled",
    "regret to inform",
];

/// Detect an application status from body text.
///
/// Returns `None` when no list matches, signaling the caller to keep any
/// already-known status rather than overwrite it.
pub fn detect_status(body: &str) -> Option<ApplicationStatus> {
    let haystack = normalize(body);

    let checks: [(&[&str], ApplicationStatus); 4] = [
        (OFFER_KEYWORDS, ApplicationStatus::Offer),
        (INTERVIEW_KEYWORDS, ApplicationStatus::Interview),
        (ASSESSMENT_KEYWORDS, ApplicationStatus::Assessment),
        (REJECTION_KEYWORDS, ApplicationStatus::Rejected),
    ];

    for (keywords, status) in checks {
        if keywords.iter().any(|kw| contains_phrase(&haystack, kw)) {
            return Some(status);
        }
    }

    None
}

/// Lowercase and strip punctuation so keyword phrases match across
/// "Unfortunately," / "unfortunately —" / "UNFORTUNATELY".
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars() {
        let mapped = if c.is_alphanumeric() {
            Some(c.to_ascii_lowercase())
        } else {
            None
        };
        match mapped {
            Some(c) => {
                out.push(c);
                last_space = false;
            }
            None => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Whole-token/phrase containment, never a raw substring match.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.contains(&format!(" {} ", phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_detected() {
        let body = "We are pleased to offer you the position of Backend Engineer.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Offer));
    }

    #[test]
    fn test_interview_detected() {
        let body = "We'd like to schedule an interview with you next week.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Interview));
    }

    #[test]
    fn test_assessment_detected() {
        let body = "Please complete the following coding challenge within 7 days.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Assessment));
    }

    #[test]
    fn test_rejection_detected() {
        let body = "Unfortunately, we have decided to move forward with other candidates.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Rejected));
    }

    #[test]
    fn test_precedence_offer_beats_rejection_wording() {
        // "unfortunately" appears, but the offer list is checked first.
        let body = "Unfortunately the start date moved, but we are pleased to offer you the role.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Offer));
    }

    #[test]
    fn test_precedence_interview_beats_rejection_wording() {
        let body = "We reviewed many other candidates but would like to schedule an interview.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Interview));
    }

    #[test]
    fn test_no_match_returns_none() {
        assert_eq!(detect_status("Thanks for applying. We received your application."), None);
        assert_eq!(detect_status(""), None);
    }

    #[test]
    fn test_word_boundary_no_substring_match() {
        // "unfortunatelyish" must not trigger the rejection keyword.
        assert_eq!(detect_status("the unfortunatelyish situation resolved"), None);
    }

    #[test]
    fn test_punctuation_stripped() {
        let body = "Unfortunately... we won't proceed.";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Rejected));
    }

    #[test]
    fn test_phrase_across_punctuation() {
        let body = "invite you to interview - please pick a slot";
        assert_eq!(detect_status(body), Some(ApplicationStatus::Interview));
    }
}
