//! Reconciliation: match an extracted record against known applications
//! and merge state under the status-rank and override rules.
//!
//! The company index is rebuilt from the store snapshot once per run and
//! kept current after every decision, so later messages in the same run
//! observe earlier mutations.

use std::collections::HashMap;

use chrono::Utc;

use crate::types::{ApplicationStatus, ExtractedRecord, RawMessage, TrackedApplication};

/// Snapshot of one row kept in the index bucket.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub row: u32,
    pub title: String,
    pub status: ApplicationStatus,
    pub peak_status: ApplicationStatus,
}

/// Lookup from `lowercase(company)` to its known rows, most recent first.
///
/// Recency is row position: rows are appended chronologically, so the
/// highest row number is the newest. Rows whose company never resolved
/// are excluded.
#[derive(Debug, Default)]
pub struct CompanyIndex {
    buckets: HashMap<String, Vec<IndexEntry>>,
}

impl CompanyIndex {
    /// Build the index from a full store snapshot.
    pub fn build(applications: &[TrackedApplication]) -> Self {
        let mut buckets: HashMap<String, Vec<IndexEntry>> = HashMap::new();
        for app in applications {
            if app.is_manual_review_row() {
                continue;
            }
            buckets.entry(app.company_key()).or_default().push(IndexEntry {
                row: app.row,
                title: app.title.clone(),
                status: app.status,
                peak_status: app.peak_status,
            });
        }
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| b.row.cmp(&a.row));
        }
        Self { buckets }
    }

    pub fn bucket(&self, key: &str) -> Option<&[IndexEntry]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Replay an update into the snapshot so later messages see it.
    pub fn record_update(&mut self, app: &TrackedApplication) {
        if let Some(bucket) = self.buckets.get_mut(&app.company_key()) {
            if let Some(entry) = bucket.iter_mut().find(|e| e.row == app.row) {
                entry.title = app.title.clone();
                entry.status = app.status;
                entry.peak_status = app.peak_status;
                return;
            }
        }
        // Key may have shifted case-insensitively equal; fall through to
        // a fresh insert keeps the exactly-one-bucket invariant.
        self.record_append(app);
    }

    /// Insert a freshly appended row at the front of its bucket.
    pub fn record_append(&mut self, app: &TrackedApplication) {
        if app.is_manual_review_row() {
            return;
        }
        let bucket = self.buckets.entry(app.company_key()).or_default();
        bucket.retain(|e| e.row != app.row);
        bucket.insert(
            0,
            IndexEntry {
                row: app.row,
                title: app.title.clone(),
                status: app.status,
                peak_status: app.peak_status,
            },
        );
    }
}

// ============================================================================
// Decision + merge
// ============================================================================

/// Update an existing row, or append a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Update(u32),
    Append,
}

/// Decide update-vs-append for one extracted record.
///
/// A sentinel company always appends (manual review row). Otherwise a
/// resolved title prefers the case-insensitive title match in the bucket;
/// failing that, the most recent entry is updated.
pub fn decide(record: &ExtractedRecord, index: &CompanyIndex) -> Decision {
    let Some(company) = record.company.as_deref() else {
        return Decision::Append;
    };
    let Some(bucket) = index.bucket(&company.to_lowercase()) else {
        return Decision::Append;
    };

    if let Some(title) = record.title.as_deref() {
        if let Some(entry) = bucket.iter().find(|e| e.title.eq_ignore_ascii_case(title)) {
            return Decision::Update(entry.row);
        }
    }
    match bucket.first() {
        Some(entry) => Decision::Update(entry.row),
        None => Decision::Append,
    }
}

/// Permalink recorded in the source-link column.
pub fn message_link(message_id: &str) -> String {
    format!("https://mail.google.com/mail/u/0/#all/{}", message_id)
}

/// Merge an extracted record into an existing row.
///
/// Identity fields never regress to unknown; status moves by rank or by
/// override-terminal; the peak only ever increases. Administrative fields
/// always advance to the newest message, even when nothing else changed.
pub fn merge_update(
    app: &mut TrackedApplication,
    record: &ExtractedRecord,
    message: &RawMessage,
) {
    if let Some(company) = &record.company {
        app.company = company.clone();
    }
    if let Some(title) = &record.title {
        app.title = title.clone();
    }
    if let Some(platform) = &record.platform {
        app.platform = Some(platform.clone());
    }

    if let Some(new_status) = record.status {
        if new_status.rank() >= app.status.rank() || new_status.is_override_terminal() {
            app.status = new_status;
        }
    }
    app.peak_status = ApplicationStatus::max_by_rank(app.peak_status, app.status);

    app.last_update = Some(message.received_at);
    app.processed_at = Some(Utc::now());
    app.source_subject = message.subject.clone();
    app.source_link = message_link(&message.id);
    app.source_message_id = message.id.clone();
}

/// Build a brand-new row for a record with no matching application.
pub fn new_row(record: &ExtractedRecord, message: &RawMessage, row: u32) -> TrackedApplication {
    let status = record.status.unwrap_or(ApplicationStatus::Applied);
    TrackedApplication {
        row,
        company: record.company_cell().to_string(),
        title: record.title_cell().to_string(),
        status,
        peak_status: status,
        last_update: Some(message.received_at),
        processed_at: Some(Utc::now()),
        platform: record.platform.clone(),
        source_subject: message.subject.clone(),
        source_link: message_link(&message.id),
        source_message_id: message.id.clone(),
    }
}
