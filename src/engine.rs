//! One bounded engine run: fetch labeled threads, classify each message in
//! receipt order, reconcile into the ledger, flush as two batched writes,
//! then apply the idempotent label transitions.
//!
//! Per-message failures are isolated and never abort the batch; only
//! configuration failures abort a run, and they do so before any message
//! is touched. Partial progress is always safe to persist — correctness
//! under overlapping or interrupted runs comes from the processed-message
//! log, the label-already-correct checks, and the status override rules,
//! not from locking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::classify::ai::ExtractionModel;
use crate::classify::Classifier;
use crate::config::TrackerConfig;
use crate::error::EngineError;
use crate::labels::{plan_transition, LabelStateMachine};
use crate::mailbox::{Mailbox, ThreadDetail};
use crate::reconcile::{decide, merge_update, new_row, CompanyIndex, Decision};
use crate::seen::ProcessedLog;
use crate::store::{ApplicationLedger, RowStore};
use crate::types::{ApplicationStatus, RawMessage, TrackedApplication, MANUAL_REVIEW_SENTINEL};

/// Detail text cap for diagnostic rows.
const DIAGNOSTIC_DETAIL_MAX: usize = 200;

/// End-of-run summary, logged at info level.
#[derive(Debug, Default)]
pub struct RunReport {
    pub run_id: String,
    pub scanned_threads: usize,
    pub scanned_messages: usize,
    pub classified: usize,
    pub updated_rows: usize,
    pub appended_rows: usize,
    pub manual_threads: usize,
    pub errored_messages: usize,
    pub label_mutations: usize,
    pub out_of_time: bool,
    pub elapsed: Duration,
}

/// Wires the collaborators for one run.
pub struct Engine<'a> {
    config: &'a TrackerConfig,
    mailbox: &'a dyn Mailbox,
    store: &'a dyn RowStore,
    model: &'a dyn ExtractionModel,
    processed: &'a ProcessedLog,
}

/// A message whose row mutation is staged and awaiting the flush.
struct StagedMessage {
    message_id: String,
    thread_id: String,
    row: u32,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a TrackerConfig,
        mailbox: &'a dyn Mailbox,
        store: &'a dyn RowStore,
        model: &'a dyn ExtractionModel,
        processed: &'a ProcessedLog,
    ) -> Self {
        Self {
            config,
            mailbox,
            store,
            model,
            processed,
        }
    }

    /// Execute one bounded run.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.run.time_budget_secs);
        let mut report = RunReport {
            run_id: Uuid::new_v4().to_string(),
            ..RunReport::default()
        };

        // Fatal checks up front: no partial side effects on a broken setup.
        self.check_labels().await?;
        let rows = self
            .store
            .read_all(&self.config.sheet.applications_tab)
            .await
            .map_err(|e| {
                EngineError::Configuration(format!(
                    "cannot read tab {:?}: {}",
                    self.config.sheet.applications_tab, e
                ))
            })?;

        let mut ledger = ApplicationLedger::from_snapshot(&rows, self.config.sheet.columns.clone());
        let mut index = CompanyIndex::build(ledger.applications());
        let mut machine = LabelStateMachine::new();

        // Fetch the to-process threads, stopping at the thread cap or the
        // time budget. Unreadable threads become diagnostic rows and keep
        // their label for the next run.
        let (threads, fetch_failures) = self.fetch_threads(deadline, &mut report).await?;
        for (thread_id, detail) in &fetch_failures {
            report.errored_messages += 1;
            // The append assigns the physical row.
            ledger.append(diagnostic_row(&format!("thread {}", thread_id), detail, 0));
        }

        let mut thread_labels: HashMap<String, Vec<String>> = HashMap::new();
        let mut pending_per_thread: HashMap<String, usize> = HashMap::new();
        let mut candidates: Vec<RawMessage> = Vec::new();

        for thread in &threads {
            machine.note_thread(&thread.id);
            thread_labels.insert(thread.id.clone(), thread.labels.clone());
            let mut pending = 0usize;
            for message in &thread.messages {
                report.scanned_messages += 1;
                if self.processed.contains(&message.id)? {
                    continue;
                }
                pending += 1;
                candidates.push(message.clone());
            }
            pending_per_thread.insert(thread.id.clone(), pending);
        }

        // Status-rank merges depend on real-world event order.
        candidates.sort_by_key(|m| m.received_at);

        let classifier = Classifier::new(self.model, &self.config.ai);
        let mut staged: Vec<StagedMessage> = Vec::new();

        for message in &candidates {
            if Instant::now() >= deadline {
                report.out_of_time = true;
                log::info!(
                    "time budget reached after {} messages; leaving the rest for the next run",
                    report.classified
                );
                break;
            }

            let record = classifier.classify(message).await;
            report.classified += 1;
            if let Some(pending) = pending_per_thread.get_mut(&message.thread_id) {
                *pending = pending.saturating_sub(1);
            }

            if record.needs_manual_review() {
                machine.mark_manual(&message.thread_id);
            }

            let row = match decide(&record, &index) {
                Decision::Update(row) => {
                    ledger.update_with(row, |app| merge_update(app, &record, message));
                    if let Some(app) = ledger.get(row) {
                        index.record_update(app);
                    }
                    row
                }
                Decision::Append => {
                    let row = ledger.append(new_row(&record, message, 0));
                    if let Some(app) = ledger.get(row) {
                        index.record_append(app);
                    }
                    row
                }
            };

            staged.push(StagedMessage {
                message_id: message.id.clone(),
                thread_id: message.thread_id.clone(),
                row,
            });
        }

        // Two batched writes; each phase succeeds or fails on its own.
        let (_, appended_rows) = ledger.staged_rows();
        let flush = ledger
            .flush(self.store, &self.config.sheet.applications_tab)
            .await;
        report.updated_rows = flush.updated;
        report.appended_rows = flush.appended;
        if let Some(e) = &flush.update_error {
            log::warn!("batched update failed: {}", e);
        }
        if let Some(e) = &flush.append_error {
            log::warn!("batched append failed: {}", e);
        }

        // A message id enters the processed log only after its write phase
        // succeeded; a failed write leaves it eligible for the next run and
        // routes its thread to manual review.
        for message in &staged {
            let via_append = appended_rows.contains(&message.row);
            let write_ok = if via_append {
                flush.append_error.is_none()
            } else {
                flush.update_error.is_none()
            };
            if write_ok {
                self.processed.mark(&message.message_id, &message.thread_id)?;
            } else {
                report.errored_messages += 1;
                machine.mark_manual(&message.thread_id);
            }
        }

        // Terminal label transitions, idempotent on replay. Threads with
        // messages the budget cut off keep their to-process label.
        for (thread_id, outcome) in machine.threads() {
            if pending_per_thread.get(thread_id).copied().unwrap_or(0) > 0 {
                continue;
            }
            let current = thread_labels
                .get(thread_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let plan = plan_transition(current, outcome, &self.config.labels);
            if plan.is_noop() {
                continue;
            }
            let add: Vec<String> = plan.add.clone().into_iter().collect();
            let remove: Vec<String> = plan.remove.clone().into_iter().collect();
            match self
                .mailbox
                .modify_thread_labels(thread_id, &add, &remove)
                .await
            {
                Ok(()) => report.label_mutations += 1,
                Err(e) => {
                    // The thread stays under to-process and is revisited;
                    // already-marked messages won't be reprocessed.
                    log::warn!("label transition failed for thread {}: {}", thread_id, e);
                }
            }
        }

        report.manual_threads = machine.manual_count();
        report.elapsed = started.elapsed();
        log::info!(
            "run {} finished: {} threads, {} messages classified, {} updated, {} appended, \
             {} manual, {} errored, {:?} elapsed",
            report.run_id,
            report.scanned_threads,
            report.classified,
            report.updated_rows,
            report.appended_rows,
            report.manual_threads,
            report.errored_messages,
            report.elapsed
        );
        Ok(report)
    }

    /// All three engine labels must exist before anything runs.
    async fn check_labels(&self) -> Result<(), EngineError> {
        let known = self
            .mailbox
            .list_labels()
            .await
            .map_err(|e| EngineError::Configuration(format!("cannot list labels: {}", e)))?;
        for required in [
            &self.config.labels.to_process,
            &self.config.labels.processed,
            &self.config.labels.manual_review,
        ] {
            if !known.iter().any(|l| l == required) {
                return Err(EngineError::Configuration(format!(
                    "label {:?} does not exist",
                    required
                )));
            }
        }
        Ok(())
    }

    /// Page through threads carrying the to-process label.
    async fn fetch_threads(
        &self,
        deadline: Instant,
        report: &mut RunReport,
    ) -> Result<(Vec<ThreadDetail>, Vec<(String, String)>), EngineError> {
        let mut threads = Vec::new();
        let mut failures = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if Instant::now() >= deadline {
                report.out_of_time = true;
                break;
            }
            let page = self
                .mailbox
                .threads_with_label(
                    &self.config.labels.to_process,
                    page_token.as_deref(),
                    self.config.run.thread_page_size,
                )
                .await
                .map_err(|e| EngineError::Mailbox(e.to_string()))?;

            for thread_id in &page.thread_ids {
                if threads.len() >= self.config.run.max_threads_per_run {
                    break;
                }
                match self.mailbox.thread(thread_id).await {
                    Ok(detail) => {
                        report.scanned_threads += 1;
                        threads.push(detail);
                    }
                    Err(e) => {
                        // Isolated: one unreadable thread must not sink the
                        // batch. It keeps its label and is retried later.
                        log::warn!("cannot fetch thread {}: {}", thread_id, e);
                        failures.push((thread_id.clone(), e.to_string()));
                    }
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() || threads.len() >= self.config.run.max_threads_per_run {
                break;
            }
        }

        Ok((threads, failures))
    }
}

/// Build the audit row appended when something cannot be processed at all:
/// sentinel identity, manual-review status, truncated failure detail.
pub fn diagnostic_row(source_ref: &str, detail: &str, row: u32) -> TrackedApplication {
    let mut truncated = detail.to_string();
    if truncated.len() > DIAGNOSTIC_DETAIL_MAX {
        let cut = truncated
            .char_indices()
            .nth(DIAGNOSTIC_DETAIL_MAX)
            .map(|(i, _)| i)
            .unwrap_or(truncated.len());
        truncated.truncate(cut);
    }
    TrackedApplication {
        row,
        company: MANUAL_REVIEW_SENTINEL.to_string(),
        title: format!("Processing error: {}", truncated),
        status: ApplicationStatus::ManualReview,
        peak_status: ApplicationStatus::ManualReview,
        last_update: None,
        processed_at: None,
        platform: None,
        source_subject: source_ref.to_string(),
        source_link: String::new(),
        source_message_id: String::new(),
    }
}
