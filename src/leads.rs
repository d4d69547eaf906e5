//! Job-lead digest extraction.
//!
//! A separate intake label collects job-alert digest emails. Each message
//! goes to the model with the array-variant prompt; parsed postings are
//! appended to the leads tab in a fixed column order. An unparseable
//! response routes the thread to manual review instead of guessing.

use serde::{Deserialize, Serialize};

use crate::classify::ai::{strip_code_fences, ExtractionModel};
use crate::config::TrackerConfig;
use crate::error::EngineError;
use crate::labels::{plan_transition, LabelStateMachine};
use crate::mailbox::Mailbox;
use crate::store::RowStore;
use crate::types::RawMessage;

/// One extracted job posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLead {
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub job_url: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default)]
pub struct LeadsReport {
    pub threads: usize,
    pub leads: usize,
    pub manual_threads: usize,
}

/// Build the multi-listing prompt. The fixed key set is embedded in the
/// instruction text; an empty array is a valid answer.
pub fn build_leads_prompt(message: &RawMessage, max_body_chars: usize) -> String {
    let body_end = message
        .body_text
        .char_indices()
        .nth(max_body_chars)
        .map(|(i, _)| i)
        .unwrap_or(message.body_text.len());

    format!(
        "This email is a job-alert digest. Extract every distinct job posting.\n\
         Return ONLY a JSON array; each element must have exactly these keys:\n\
         {{\"jobTitle\": \"...\", \"company\": \"...\", \"location\": \"...\", \
         \"source\": \"...\", \"jobUrl\": \"...\", \"notes\": \"...\"}}\n\
         Use \"\" for anything not present. Return [] if there are no postings.\n\
         No markdown fences, no commentary.\n\n\
         Subject: {subject}\n\n\
         Body:\n{body}",
        subject = message.subject,
        body = &message.body_text[..body_end],
    )
}

/// Parse the array payload. `None` means the response was unusable and the
/// thread should go to manual review.
pub fn parse_leads(payload: &str) -> Option<Vec<JobLead>> {
    let unfenced = strip_code_fences(payload);
    let mut leads: Vec<JobLead> = serde_json::from_str(unfenced).ok()?;
    for lead in &mut leads {
        // A bad URL is blanked, not fatal.
        if !lead.job_url.is_empty() && url::Url::parse(&lead.job_url).is_err() {
            lead.job_url.clear();
        }
    }
    leads.retain(|lead| !lead.job_title.trim().is_empty() || !lead.company.trim().is_empty());
    Some(leads)
}

/// Fixed column order of the leads tab.
pub fn lead_to_row(lead: &JobLead, captured: &str) -> Vec<String> {
    vec![
        lead.job_title.clone(),
        lead.company.clone(),
        lead.location.clone(),
        lead.source.clone(),
        lead.job_url.clone(),
        lead.notes.clone(),
        captured.to_string(),
    ]
}

/// Process every thread under the leads intake label.
pub async fn run_leads(
    config: &TrackerConfig,
    mailbox: &dyn Mailbox,
    store: &dyn RowStore,
    model: &dyn ExtractionModel,
) -> Result<LeadsReport, EngineError> {
    let known = mailbox
        .list_labels()
        .await
        .map_err(|e| EngineError::Configuration(format!("cannot list labels: {}", e)))?;
    if !known.iter().any(|l| l == &config.labels.leads_to_process) {
        return Err(EngineError::Configuration(format!(
            "label {:?} does not exist",
            config.labels.leads_to_process
        )));
    }

    let mut report = LeadsReport::default();
    let mut machine = LabelStateMachine::new();
    let mut thread_labels = std::collections::HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    let mut page_token: Option<String> = None;
    loop {
        let page = mailbox
            .threads_with_label(
                &config.labels.leads_to_process,
                page_token.as_deref(),
                config.run.thread_page_size,
            )
            .await
            .map_err(|e| EngineError::Mailbox(e.to_string()))?;

        for thread_id in &page.thread_ids {
            let detail = match mailbox.thread(thread_id).await {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("cannot fetch leads thread {}: {}", thread_id, e);
                    continue;
                }
            };
            report.threads += 1;
            machine.note_thread(&detail.id);
            thread_labels.insert(detail.id.clone(), detail.labels.clone());

            for message in &detail.messages {
                let prompt = build_leads_prompt(message, config.ai.max_body_chars);
                let payload = match model.generate(&prompt).await {
                    Ok(p) => p,
                    Err(e) => {
                        log::warn!("lead extraction unavailable for {}: {}", message.id, e);
                        machine.mark_manual(&detail.id);
                        continue;
                    }
                };
                match parse_leads(&payload) {
                    Some(leads) => {
                        let captured = message.received_at.format("%Y-%m-%d").to_string();
                        for lead in &leads {
                            rows.push(lead_to_row(lead, &captured));
                        }
                        report.leads += leads.len();
                    }
                    None => {
                        log::debug!("unparseable lead payload for message {}", message.id);
                        machine.mark_manual(&detail.id);
                    }
                }
            }
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    if !rows.is_empty() {
        store
            .append(&config.sheet.leads_tab, &rows)
            .await
            .map_err(|e| EngineError::StoreWriteFailure(e.to_string()))?;
    }

    for (thread_id, outcome) in machine.threads() {
        let current = thread_labels
            .get(thread_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        // Leads use their own intake label but share the terminal labels.
        let mut plan = plan_transition(current, outcome, &config.labels);
        if current.iter().any(|l| l == &config.labels.leads_to_process) {
            plan.remove = Some(config.labels.leads_to_process.clone());
        }
        if plan.is_noop() {
            continue;
        }
        let add: Vec<String> = plan.add.clone().into_iter().collect();
        let remove: Vec<String> = plan.remove.clone().into_iter().collect();
        if let Err(e) = mailbox
            .modify_thread_labels(thread_id, &add, &remove)
            .await
        {
            log::warn!("label transition failed for leads thread {}: {}", thread_id, e);
        }
    }

    report.manual_threads = machine.manual_count();
    log::info!(
        "leads: {} threads, {} postings captured, {} manual",
        report.threads,
        report.leads,
        report.manual_threads
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(body: &str) -> RawMessage {
        RawMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            subject: "12 new jobs for you".to_string(),
            body_text: body.to_string(),
            sender: "jobs-noreply@linkedin.com".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_embeds_key_set() {
        let prompt = build_leads_prompt(&message("body"), 1000);
        assert!(prompt.contains("jobTitle"));
        assert!(prompt.contains("jobUrl"));
        assert!(prompt.contains("Return [] if there are no postings"));
    }

    #[test]
    fn test_parse_plain_array() {
        let payload = r#"[
            {"jobTitle": "Backend Engineer", "company": "Acme", "location": "Remote",
             "source": "LinkedIn", "jobUrl": "https://example.com/j/1", "notes": ""},
            {"jobTitle": "SRE", "company": "Globex", "location": "", "source": "",
             "jobUrl": "", "notes": "senior"}
        ]"#;
        let leads = parse_leads(payload).unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].job_title, "Backend Engineer");
        assert_eq!(leads[1].company, "Globex");
    }

    #[test]
    fn test_parse_fenced_array() {
        let payload = "```json\n[{\"jobTitle\": \"SRE\", \"company\": \"Acme\"}]\n```";
        let leads = parse_leads(payload).unwrap();
        assert_eq!(leads.len(), 1);
    }

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(parse_leads("[]").unwrap().len(), 0);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_leads("no jobs today, sorry").is_none());
        assert!(parse_leads(r#"{"jobTitle": "not an array"}"#).is_none());
    }

    #[test]
    fn test_invalid_url_blanked() {
        let payload = r#"[{"jobTitle": "SRE", "company": "Acme", "jobUrl": "not a url"}]"#;
        let leads = parse_leads(payload).unwrap();
        assert_eq!(leads[0].job_url, "");
    }

    #[test]
    fn test_identityless_entries_dropped() {
        let payload = r#"[{"location": "Remote", "notes": "no title or company"}]"#;
        let leads = parse_leads(payload).unwrap();
        assert!(leads.is_empty());
    }

    #[test]
    fn test_lead_to_row_fixed_order() {
        let lead = JobLead {
            job_title: "SRE".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            source: "LinkedIn".to_string(),
            job_url: "https://example.com/j/1".to_string(),
            notes: "senior".to_string(),
        };
        let row = lead_to_row(&lead, "2026-07-01");
        assert_eq!(
            row,
            vec!["SRE", "Acme", "Remote", "LinkedIn", "https://example.com/j/1", "senior", "2026-07-01"]
        );
    }
}
