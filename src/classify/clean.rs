//! Final cleaning and validation of extracted fields.
//!
//! Every resolved company/title passes through here before it reaches the
//! store. If cleaning collapses a value to empty or below the minimum
//! length, the field reverts to unresolved (the caller writes the sentinel).

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Values shorter than this after cleaning are considered noise.
const MIN_FIELD_LEN: usize = 2;

/// Tokens kept fully uppercase when title-casing.
const PRESERVED_ACRONYMS: &[&str] = &[
    "AI", "API", "AWS", "CTO", "HR", "IBM", "IT", "ML", "NYC", "QA", "SDE", "SRE", "SWE", "UI",
    "USA", "UX",
];

/// Legal suffixes stripped from trailing position. "Corp" and "Co" stay —
/// they are routinely part of the colloquial company name.
const LEGAL_SUFFIXES: &[&str] = &["inc", "llc", "ltd", "limited", "gmbh", "plc", "pllc"];

/// Trailing job-posting qualifiers stripped from titles.
const TITLE_QUALIFIERS: &[&str] = &[
    "remote",
    "hybrid",
    "onsite",
    "on site",
    "contract",
    "full time",
    "part time",
    "w2",
    "us",
];

fn re_parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[(\[][^)\]]*[)\]]").unwrap())
}

fn re_req_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Req #12345", "R-12345", "Job ID 9876", "JR0034821" at the tail
    RE.get_or_init(|| {
        Regex::new(r"(?i)[-–—|,]?\s*(req(uisition)?\s*#?\s*\w+|job\s*id\s*#?\s*\w+|jr\d{4,}|r-\d{3,})\s*$")
            .unwrap()
    })
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Clean a resolved company name. Returns `None` when the value collapses
/// below the minimum length.
pub fn clean_company(raw: &str) -> Option<String> {
    let mut value = base_clean(raw)?;

    // Strip trailing legal suffixes, possibly comma/period-joined:
    // "Acme Ltd." / "Acme, Inc" / "Acme Inc".
    loop {
        let lowered = value.to_lowercase();
        let Some(stripped) = LEGAL_SUFFIXES.iter().find_map(|suffix| {
            let tail = lowered
                .strip_suffix(&format!(" {}", suffix))
                .or_else(|| lowered.strip_suffix(&format!(", {}", suffix)))
                .or_else(|| lowered.strip_suffix(&format!(" {}.", suffix)))
                .or_else(|| lowered.strip_suffix(&format!(", {}.", suffix)))?;
            Some(tail.len())
        }) else {
            break;
        };
        value.truncate(stripped);
        value = value.trim_end_matches([',', '.', ' ']).to_string();
    }

    finish(value)
}

/// Clean a resolved job title, additionally stripping trailing
/// remote/hybrid/contract qualifiers.
pub fn clean_title(raw: &str) -> Option<String> {
    let mut value = base_clean(raw)?;

    loop {
        let lowered = value.to_lowercase();
        let Some(stripped) = TITLE_QUALIFIERS.iter().find_map(|qualifier| {
            let tail = lowered
                .strip_suffix(&format!(" - {}", qualifier))
                .or_else(|| lowered.strip_suffix(&format!(", {}", qualifier)))
                .or_else(|| lowered.strip_suffix(&format!(" {}", qualifier)))?;
            Some(tail.len())
        }) else {
            break;
        };
        value.truncate(stripped);
        value = value.trim_end_matches([',', '-', '–', ' ']).to_string();
    }

    finish(value)
}

/// Shared first pass: NFKC normalization, parenthetical/req-code removal,
/// whitespace collapse.
fn base_clean(raw: &str) -> Option<String> {
    let normalized: String = raw.nfkc().collect();
    let no_parens = re_parenthetical().replace_all(&normalized, " ");
    let no_req = re_req_code().replace_all(&no_parens, "");
    let collapsed = re_whitespace().replace_all(no_req.trim(), " ").to_string();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Length gate + case repair.
fn finish(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.chars().filter(|c| c.is_alphanumeric()).count() < MIN_FIELD_LEN {
        return None;
    }
    Some(repair_case(&value))
}

/// Title-case shouting or all-lowercase values; leave mixed case alone.
/// Preserved acronyms stay uppercase either way.
fn repair_case(value: &str) -> String {
    let has_lower = value.chars().any(|c| c.is_lowercase());
    let has_upper = value.chars().any(|c| c.is_uppercase());
    if has_lower && has_upper {
        return value.to_string();
    }

    value
        .split(' ')
        .map(|word| {
            let upper = word.to_uppercase();
            if PRESERVED_ACRONYMS.contains(&upper.as_str()) {
                return upper;
            }
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_keeps_corp() {
        assert_eq!(clean_company("Acme Corp"), Some("Acme Corp".to_string()));
    }

    #[test]
    fn test_company_strips_inc() {
        assert_eq!(clean_company("Acme, Inc."), Some("Acme".to_string()));
        assert_eq!(clean_company("Acme Inc"), Some("Acme".to_string()));
        assert_eq!(clean_company("Globex Ltd."), Some("Globex".to_string()));
    }

    #[test]
    fn test_company_strips_parenthetical() {
        assert_eq!(
            clean_company("Acme Corp (via Greenhouse)"),
            Some("Acme Corp".to_string())
        );
    }

    #[test]
    fn test_company_collapses_whitespace() {
        assert_eq!(
            clean_company("  Acme\t  Corp  "),
            Some("Acme Corp".to_string())
        );
    }

    #[test]
    fn test_company_too_short_reverts() {
        assert_eq!(clean_company("A"), None);
        assert_eq!(clean_company("(x)"), None);
        assert_eq!(clean_company(""), None);
    }

    #[test]
    fn test_company_shouting_title_cased() {
        assert_eq!(clean_company("ACME CORP"), Some("Acme Corp".to_string()));
    }

    #[test]
    fn test_company_acronym_preserved() {
        assert_eq!(clean_company("IBM"), Some("IBM".to_string()));
    }

    #[test]
    fn test_company_mixed_case_untouched() {
        assert_eq!(clean_company("McKinsey"), Some("McKinsey".to_string()));
    }

    #[test]
    fn test_title_strips_req_code() {
        assert_eq!(
            clean_title("Backend Engineer - Req #12345"),
            Some("Backend Engineer".to_string())
        );
        assert_eq!(
            clean_title("Data Analyst JR0034821"),
            Some("Data Analyst".to_string())
        );
    }

    #[test]
    fn test_title_strips_remote_qualifier() {
        assert_eq!(
            clean_title("Backend Engineer (Remote)"),
            Some("Backend Engineer".to_string())
        );
        assert_eq!(
            clean_title("Backend Engineer - Remote"),
            Some("Backend Engineer".to_string())
        );
        assert_eq!(
            clean_title("Platform Engineer, Hybrid"),
            Some("Platform Engineer".to_string())
        );
    }

    #[test]
    fn test_title_strips_stacked_qualifiers() {
        assert_eq!(
            clean_title("Site Reliability Engineer - Remote, Contract"),
            Some("Site Reliability Engineer".to_string())
        );
    }

    #[test]
    fn test_title_all_lowercase_repaired() {
        assert_eq!(
            clean_title("backend engineer"),
            Some("Backend Engineer".to_string())
        );
    }

    #[test]
    fn test_title_acronym_in_title() {
        assert_eq!(clean_title("SRE MANAGER"), Some("SRE Manager".to_string()));
    }
}
