//! Sender-identity parsing: platform tagging and the last-resort company
//! fallback derived from the "From" header.

use crate::classify::clean::clean_company;

/// ATS / job-board / mail-provider domains. These identify a platform, not
/// an employer, and are never used as a company name.
const IGNORED_COMPANY_DOMAINS: &[&str] = &[
    "linkedin.com",
    "indeed.com",
    "greenhouse.io",
    "greenhouse-mail.io",
    "lever.co",
    "hire.lever.co",
    "myworkday.com",
    "myworkdayjobs.com",
    "icims.com",
    "smartrecruiters.com",
    "ashbyhq.com",
    "wellfound.com",
    "ziprecruiter.com",
    "glassdoor.com",
    "jobvite.com",
    "bamboohr.com",
    "taleo.net",
    "successfactors.com",
    "workablemail.com",
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "yahoo.com",
];

/// Sender domain suffix → coarse platform tag.
const PLATFORM_DOMAINS: &[(&str, &str)] = &[
    ("linkedin.com", "linkedin"),
    ("indeed.com", "indeed"),
    ("greenhouse.io", "greenhouse"),
    ("greenhouse-mail.io", "greenhouse"),
    ("lever.co", "lever"),
    ("myworkday.com", "workday"),
    ("myworkdayjobs.com", "workday"),
    ("icims.com", "icims"),
    ("smartrecruiters.com", "smartrecruiters"),
    ("ashbyhq.com", "ashby"),
    ("wellfound.com", "wellfound"),
    ("ziprecruiter.com", "ziprecruiter"),
    ("glassdoor.com", "glassdoor"),
    ("jobvite.com", "jobvite"),
    ("taleo.net", "taleo"),
    ("workablemail.com", "workable"),
];

/// Display-name tokens that describe the mail stream rather than the
/// employer ("Acme Careers", "Jobs via Lever").
const DISPLAY_NOISE_WORDS: &[&str] = &[
    "careers",
    "career",
    "jobs",
    "job",
    "recruiting",
    "recruitment",
    "talent",
    "hiring",
    "team",
    "hr",
    "notifications",
    "notification",
    "noreply",
    "no-reply",
    "via",
    "linkedin",
    "indeed",
    "greenhouse",
    "lever",
    "workday",
    "icims",
    "ashby",
    "ziprecruiter",
];

/// Subdomain prefixes dropped before deriving a company from a domain.
const SUBDOMAIN_PREFIXES: &[&str] = &[
    "mail", "email", "e", "careers", "jobs", "hello", "notify", "notifications", "news",
    "updates", "info", "smtp", "mailer", "boards", "apply", "talent", "hire", "www",
];

/// TLD labels trimmed from the right of a domain.
const TLD_LABELS: &[&str] = &[
    "com", "net", "org", "io", "co", "ai", "dev", "app", "uk", "us", "de", "fr", "ca", "au",
    "in", "jobs",
];

/// Extract the bare address from a "From" header like `Name <a@b.com>`.
pub fn extract_email_address(from: &str) -> String {
    if let Some(start) = from.find('<') {
        if let Some(end) = from.find('>') {
            if end > start {
                return from[start + 1..end].trim().to_lowercase();
            }
        }
    }
    from.trim().to_lowercase()
}

/// Extract the display name from a "From" header, if present.
pub fn extract_display_name(from: &str) -> Option<String> {
    let trimmed = from.trim();
    let angle_start = trimmed.find('<')?;
    if angle_start == 0 {
        return None;
    }
    let name = trimmed[..angle_start].trim().trim_matches('"').trim();
    if name.is_empty() || name.contains('@') {
        return None;
    }
    Some(name.to_string())
}

/// Domain of the sender address, lowercased. Empty when malformed.
pub fn sender_domain(from: &str) -> String {
    let addr = extract_email_address(from);
    match addr.rfind('@') {
        Some(at) => addr[at + 1..].to_string(),
        None => String::new(),
    }
}

/// Coarse platform tag from the sender domain, e.g. "linkedin".
pub fn platform_tag(from: &str) -> Option<&'static str> {
    let domain = sender_domain(from);
    if domain.is_empty() {
        return None;
    }
    PLATFORM_DOMAINS
        .iter()
        .find(|(suffix, _)| domain == *suffix || domain.ends_with(&format!(".{}", suffix)))
        .map(|(_, tag)| *tag)
}

fn is_ignored_domain(domain: &str) -> bool {
    IGNORED_COMPANY_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
}

/// Derive a company name from the sender identity.
///
/// Tries the display name first (minus stream-noise words), then the
/// domain (minus subdomain prefixes and TLD). Platform domains never
/// yield a company.
pub fn company_from_sender(from: &str) -> Option<String> {
    if let Some(name) = extract_display_name(from) {
        if let Some(company) = company_from_display_name(&name) {
            return Some(company);
        }
    }

    let domain = sender_domain(from);
    if domain.is_empty() || is_ignored_domain(&domain) {
        return None;
    }
    company_from_domain(&domain)
}

fn company_from_display_name(name: &str) -> Option<String> {
    let kept: Vec<&str> = name
        .split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !bare.is_empty() && !DISPLAY_NOISE_WORDS.contains(&bare.as_str())
        })
        .collect();
    if kept.is_empty() {
        return None;
    }
    clean_company(&kept.join(" "))
}

fn company_from_domain(domain: &str) -> Option<String> {
    let mut labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();

    while labels.len() > 1 && TLD_LABELS.contains(labels.last().unwrap_or(&"")) {
        labels.pop();
    }
    while labels.len() > 1 && SUBDOMAIN_PREFIXES.contains(&labels[0]) {
        labels.remove(0);
    }
    // Whatever remains closest to the TLD is the organization label.
    let org = labels.last()?;

    let spaced = org
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>();
    let title_cased = spaced
        .split_whitespace()
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    clean_company(&title_cased)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_email_address() {
        assert_eq!(
            extract_email_address("Acme Careers <careers@acme.com>"),
            "careers@acme.com"
        );
        assert_eq!(extract_email_address("  JOBS@ACME.COM  "), "jobs@acme.com");
    }

    #[test]
    fn test_platform_tag_linkedin() {
        assert_eq!(
            platform_tag("LinkedIn <jobs-noreply@linkedin.com>"),
            Some("linkedin")
        );
        assert_eq!(
            platform_tag("Acme <no-reply@mail.greenhouse.io>"),
            Some("greenhouse")
        );
        assert_eq!(platform_tag("Jane <jane@acme.com>"), None);
    }

    #[test]
    fn test_company_from_display_name() {
        assert_eq!(
            company_from_sender("Acme Careers <no-reply@greenhouse.io>"),
            Some("Acme".to_string())
        );
        assert_eq!(
            company_from_sender("Globex Recruiting Team <talent@globex.com>"),
            Some("Globex".to_string())
        );
    }

    #[test]
    fn test_display_name_all_noise_falls_to_domain() {
        assert_eq!(
            company_from_sender("Careers Team <jobs@initech.com>"),
            Some("Initech".to_string())
        );
    }

    #[test]
    fn test_platform_domain_never_company() {
        assert_eq!(company_from_sender("Jobs <jobs-noreply@linkedin.com>"), None);
        assert_eq!(company_from_sender("no-reply@greenhouse.io"), None);
        assert_eq!(company_from_sender("someone@gmail.com"), None);
    }

    #[test]
    fn test_company_from_subdomained_domain() {
        assert_eq!(
            company_from_sender("no-reply <noreply@mail.acme-robotics.com>"),
            Some("Acme Robotics".to_string())
        );
    }

    #[test]
    fn test_company_from_cctld_domain() {
        assert_eq!(
            company_from_sender("x <hello@initech.co.uk>"),
            Some("Initech".to_string())
        );
    }

    #[test]
    fn test_malformed_sender() {
        assert_eq!(company_from_sender("not-an-address"), None);
        assert_eq!(sender_domain("not-an-address"), "");
    }
}
