//! Deterministic extraction fallbacks: platform structural rules,
//! subject-line patterns, and the body contextual scan.
//!
//! Each strategy is a plain function returning a `PartialRecord` so it can
//! be unit-tested with literal email fixtures; the classifier composes them
//! first-match-wins per field.

use std::sync::OnceLock;

use regex::Regex;

use crate::classify::clean::{clean_company, clean_title};
use crate::classify::PartialRecord;
use crate::types::RawMessage;

/// Words that mark a span as a job title rather than a company.
const TITLE_WORDS: &[&str] = &[
    "engineer",
    "developer",
    "manager",
    "analyst",
    "designer",
    "scientist",
    "architect",
    "consultant",
    "specialist",
    "coordinator",
    "director",
    "lead",
    "intern",
    "administrator",
    "technician",
    "recruiter",
    "researcher",
];

/// Words that mark a span as process vocabulary, not an identity field.
const STATUS_WORDS: &[&str] = &[
    "application",
    "applied",
    "interview",
    "assessment",
    "offer",
    "rejected",
    "update",
    "status",
];

/// Body prefix scanned by the contextual extractor.
const BODY_SCAN_WINDOW: usize = 750;

fn has_word_from(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| words.contains(&token.to_lowercase().as_str()))
}

/// A captured span headed for the company field is rejected when it reads
/// like a title or status keyword, and vice versa. Prevents field swapping
/// on subjects like "Interview for Software Engineer".
fn accept_company(span: &str) -> Option<String> {
    if has_word_from(span, TITLE_WORDS) || has_word_from(span, STATUS_WORDS) {
        return None;
    }
    clean_company(span)
}

fn accept_title(span: &str) -> Option<String> {
    if has_word_from(span, STATUS_WORDS) {
        return None;
    }
    clean_title(span)
}

// ============================================================================
// Subject-line patterns
// ============================================================================

struct SubjectPattern {
    regex: fn() -> &'static Regex,
    /// Capture-group indices mapped to fields.
    title_group: Option<usize>,
    company_group: Option<usize>,
}

fn re_application_for_at() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Your application for Backend Engineer at Acme Corp"
    RE.get_or_init(|| {
        Regex::new(r"(?i)application (?:for|to) (?:the )?(.+?) (?:at|with) (.+?)(?:\s*[-|–].*)?$")
            .unwrap()
    })
}

fn re_interview_at() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Interview invitation — Backend Engineer at Acme Corp"
    RE.get_or_init(|| {
        Regex::new(r"(?i)interview (?:invitation|request)?\s*[-—–:]?\s*(.+?) (?:at|with) (.+?)$")
            .unwrap()
    })
}

fn re_thanks_for_applying() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Thank you for applying to Acme Corp"
    RE.get_or_init(|| {
        Regex::new(r"(?i)thank you for (?:applying|your application) (?:to|at|with) (.+?)(?:\s*[-|!–].*)?$")
            .unwrap()
    })
}

fn re_application_to() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Your application to Acme Corp"
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:re:\s*)?your application (?:to|at|with) (.+?)$").unwrap()
    })
}

fn re_company_pipe_application() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Acme Corp | Application Received"
    RE.get_or_init(|| Regex::new(r"(?i)^(.+?)\s*\|\s*(?:your )?application\b").unwrap())
}

/// Ordered subject-line patterns with explicit capture-to-field mapping.
fn subject_pattern_table() -> &'static [SubjectPattern] {
    &[
        SubjectPattern {
            regex: re_application_for_at,
            title_group: Some(1),
            company_group: Some(2),
        },
        SubjectPattern {
            regex: re_interview_at,
            title_group: Some(1),
            company_group: Some(2),
        },
        SubjectPattern {
            regex: re_thanks_for_applying,
            title_group: None,
            company_group: Some(1),
        },
        SubjectPattern {
            regex: re_application_to,
            title_group: None,
            company_group: Some(1),
        },
        SubjectPattern {
            regex: re_company_pipe_application,
            title_group: None,
            company_group: Some(1),
        },
    ]
}

/// Try the ordered subject-line patterns. First pattern that yields at
/// least one accepted field wins.
pub fn subject_patterns(message: &RawMessage) -> PartialRecord {
    for pattern in subject_pattern_table() {
        let Some(captures) = (pattern.regex)().captures(&message.subject) else {
            continue;
        };
        let title = pattern
            .title_group
            .and_then(|g| captures.get(g))
            .and_then(|m| accept_title(m.as_str()));
        let company = pattern
            .company_group
            .and_then(|g| captures.get(g))
            .and_then(|m| accept_company(m.as_str()));
        if title.is_some() || company.is_some() {
            return PartialRecord { company, title };
        }
    }
    PartialRecord::default()
}

// ============================================================================
// Platform-specific structural rules
// ============================================================================

fn re_linkedin_sent_to() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Your application was sent to Acme Corp"
    RE.get_or_init(|| {
        Regex::new(r"(?i)your application (?:was sent|has been sent|went) to ([^\r\n.]+)").unwrap()
    })
}

/// Apply hand-tuned structural rules for a known platform tag.
///
/// ATS notification mails put the employer on a short capitalized line near
/// the top of the body, with the role on one of the following lines.
pub fn platform_rules(message: &RawMessage, tag: &str) -> PartialRecord {
    match tag {
        "linkedin" => linkedin_rules(message),
        "greenhouse" | "lever" | "workday" | "icims" | "ashby" | "smartrecruiters"
        | "jobvite" | "taleo" | "workable" => ats_header_rules(message),
        _ => PartialRecord::default(),
    }
}

fn linkedin_rules(message: &RawMessage) -> PartialRecord {
    let company = re_linkedin_sent_to()
        .captures(&message.body_text)
        .and_then(|c| c.get(1))
        .and_then(|m| accept_company(m.as_str()));
    // The role rides on its own line right under the banner.
    let title = message
        .body_text
        .lines()
        .take(12)
        .map(str::trim)
        .find(|line| {
            line.len() < 80 && !line.is_empty() && has_word_from(line, TITLE_WORDS)
        })
        .and_then(accept_title);
    PartialRecord { company, title }
}

fn ats_header_rules(message: &RawMessage) -> PartialRecord {
    let lines: Vec<&str> = message
        .body_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(8)
        .collect();

    let mut company = None;
    let mut company_line = 0usize;
    for (idx, line) in lines.iter().enumerate() {
        if line.len() > 40 || !starts_capitalized(line) {
            continue;
        }
        if is_greeting(line) || has_word_from(line, TITLE_WORDS) {
            continue;
        }
        if let Some(value) = accept_company(line) {
            company = Some(value);
            company_line = idx;
            break;
        }
    }

    // A plausible title within the few lines after the company line.
    let title = lines
        .iter()
        .skip(company_line.saturating_add(1))
        .take(4)
        .find(|line| line.len() < 80 && has_word_from(line, TITLE_WORDS))
        .and_then(|line| accept_title(line));

    PartialRecord { company, title }
}

fn starts_capitalized(line: &str) -> bool {
    line.chars().next().is_some_and(|c| c.is_uppercase())
}

fn is_greeting(line: &str) -> bool {
    let lowered = line.to_lowercase();
    ["hi ", "hi,", "hello", "dear ", "thank", "thanks"]
        .iter()
        .any(|g| lowered.starts_with(g))
}

// ============================================================================
// Body contextual scan
// ============================================================================

fn re_body_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "the position of Backend Engineer", "role of Data Analyst",
    // "applying for Staff Engineer"
    RE.get_or_init(|| {
        Regex::new(
            r"(?:position of|role of|applying for|application for) (?:the )?([A-Z][A-Za-z0-9&/'. -]{1,60})",
        )
        .unwrap()
    })
}

fn re_body_company() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "applying to Acme Corp", "applied to Globex"
    RE.get_or_init(|| {
        Regex::new(r"(?:applying to|applied to|joining) ([A-Z][A-Za-z0-9&'. -]{1,60})").unwrap()
    })
}

/// Scan the first ~750 body characters for fixed contextual phrases.
pub fn body_scan(message: &RawMessage) -> PartialRecord {
    let window_end = message
        .body_text
        .char_indices()
        .nth(BODY_SCAN_WINDOW)
        .map(|(i, _)| i)
        .unwrap_or(message.body_text.len());
    let window = &message.body_text[..window_end];

    let title = re_body_title()
        .captures(window)
        .and_then(|c| c.get(1))
        .map(|m| truncate_span(m.as_str()))
        .and_then(|span| accept_title(&span));

    let company = re_body_company()
        .captures(window)
        .and_then(|c| c.get(1))
        .map(|m| truncate_span(m.as_str()))
        .and_then(|span| accept_company(&span));

    PartialRecord { company, title }
}

/// Cut a captured span at the first sentence break and keep it word-sane.
fn truncate_span(span: &str) -> String {
    let cut = span
        .find(['.', ',', '!', '?', '\n'])
        .unwrap_or(span.len());
    span[..cut].trim().to_string()
}
