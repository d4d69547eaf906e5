//! Row store contract and the per-run application ledger.
//!
//! The store is a fixed-width tabular collaborator addressed by 1-based
//! column positions. The column map is externally supplied configuration;
//! the core treats count and position as contract and never invents or
//! reorders columns. The ledger is a snapshot repository: read once per
//! run, mutations staged in memory, flushed as one batched update plus one
//! batched append.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ApplicationStatus, TrackedApplication};

/// Failure of a store read or write.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// One staged in-place row rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    /// 1-based row position.
    pub row: u32,
    pub values: Vec<String>,
}

/// Tabular store collaborator (one spreadsheet tab per call).
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Full snapshot including the header row.
    async fn read_all(&self, tab: &str) -> Result<Vec<Vec<String>>, StoreError>;
    /// One multi-row in-place update.
    async fn batch_update(&self, tab: &str, updates: &[RowUpdate]) -> Result<(), StoreError>;
    /// One multi-row append below the last populated row.
    async fn append(&self, tab: &str, rows: &[Vec<String>]) -> Result<(), StoreError>;
}

// ============================================================================
// Column map
// ============================================================================

/// Named columns to 1-based positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMap {
    #[serde(default = "d1")]
    pub company: u32,
    #[serde(default = "d2")]
    pub title: u32,
    #[serde(default = "d3")]
    pub status: u32,
    #[serde(default = "d4")]
    pub peak_status: u32,
    #[serde(default = "d5")]
    pub last_update: u32,
    #[serde(default = "d6")]
    pub processed_at: u32,
    #[serde(default = "d7")]
    pub platform: u32,
    #[serde(default = "d8")]
    pub source_subject: u32,
    #[serde(default = "d9")]
    pub source_link: u32,
    #[serde(default = "d10")]
    pub source_message_id: u32,
}

fn d1() -> u32 { 1 }
fn d2() -> u32 { 2 }
fn d3() -> u32 { 3 }
fn d4() -> u32 { 4 }
fn d5() -> u32 { 5 }
fn d6() -> u32 { 6 }
fn d7() -> u32 { 7 }
fn d8() -> u32 { 8 }
fn d9() -> u32 { 9 }
fn d10() -> u32 { 10 }

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            company: 1,
            title: 2,
            status: 3,
            peak_status: 4,
            last_update: 5,
            processed_at: 6,
            platform: 7,
            source_subject: 8,
            source_link: 9,
            source_message_id: 10,
        }
    }
}

impl ColumnMap {
    fn positions(&self) -> [u32; 10] {
        [
            self.company,
            self.title,
            self.status,
            self.peak_status,
            self.last_update,
            self.processed_at,
            self.platform,
            self.source_subject,
            self.source_link,
            self.source_message_id,
        ]
    }

    /// Row width implied by the map.
    pub fn width(&self) -> usize {
        self.positions().iter().copied().max().unwrap_or(0) as usize
    }

    pub fn validate(&self) -> Result<(), String> {
        let positions = self.positions();
        if positions.iter().any(|&p| p == 0) {
            return Err("column positions are 1-based; 0 is invalid".to_string());
        }
        let mut seen = BTreeSet::new();
        for p in positions {
            if !seen.insert(p) {
                return Err(format!("column position {} mapped twice", p));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Cell codecs
// ============================================================================

const CELL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_cell_datetime(value: DateTime<Utc>) -> String {
    value.format(CELL_DATETIME_FORMAT).to_string()
}

/// Parse a date cell leniently: RFC 3339, the cell format, or a bare date.
pub fn parse_cell_datetime(cell: &str) -> Option<DateTime<Utc>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(cell) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(cell, CELL_DATETIME_FORMAT) {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(cell, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn cell<'a>(cells: &'a [String], position: u32) -> &'a str {
    cells
        .get((position - 1) as usize)
        .map(String::as_str)
        .unwrap_or("")
}

/// Decode one physical row. Returns `None` for blank/filler rows.
pub fn row_to_application(
    row: u32,
    cells: &[String],
    map: &ColumnMap,
) -> Option<TrackedApplication> {
    let company = cell(cells, map.company).trim();
    if company.is_empty() {
        return None;
    }

    let status = ApplicationStatus::parse(cell(cells, map.status)).unwrap_or_else(|| {
        log::debug!("row {}: unknown status cell {:?}", row, cell(cells, map.status));
        ApplicationStatus::UpdateOther
    });
    let peak_status = ApplicationStatus::parse(cell(cells, map.peak_status)).unwrap_or(status);

    Some(TrackedApplication {
        row,
        company: company.to_string(),
        title: cell(cells, map.title).trim().to_string(),
        status,
        peak_status,
        last_update: parse_cell_datetime(cell(cells, map.last_update)),
        processed_at: parse_cell_datetime(cell(cells, map.processed_at)),
        platform: match cell(cells, map.platform).trim() {
            "" => None,
            p => Some(p.to_string()),
        },
        source_subject: cell(cells, map.source_subject).to_string(),
        source_link: cell(cells, map.source_link).to_string(),
        source_message_id: cell(cells, map.source_message_id).to_string(),
    })
}

/// Encode a row at the width the column map dictates.
pub fn application_to_row(app: &TrackedApplication, map: &ColumnMap) -> Vec<String> {
    let mut cells = vec![String::new(); map.width()];
    let mut set = |position: u32, value: String| {
        cells[(position - 1) as usize] = value;
    };
    set(map.company, app.company.clone());
    set(map.title, app.title.clone());
    set(map.status, app.status.as_str().to_string());
    set(map.peak_status, app.peak_status.as_str().to_string());
    set(
        map.last_update,
        app.last_update.map(format_cell_datetime).unwrap_or_default(),
    );
    set(
        map.processed_at,
        app.processed_at.map(format_cell_datetime).unwrap_or_default(),
    );
    set(map.platform, app.platform.clone().unwrap_or_default());
    set(map.source_subject, app.source_subject.clone());
    set(map.source_link, app.source_link.clone());
    set(map.source_message_id, app.source_message_id.clone());
    cells
}

// ============================================================================
// Ledger
// ============================================================================

/// Result of one flush: the two write phases succeed or fail separately.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub updated: usize,
    pub appended: usize,
    pub update_error: Option<String>,
    pub append_error: Option<String>,
}

impl FlushOutcome {
    pub fn is_clean(&self) -> bool {
        self.update_error.is_none() && self.append_error.is_none()
    }
}

/// Per-run snapshot repository over the row store.
///
/// All mutations replay into the snapshot immediately and flush as one
/// batch at the end of the run. Row numbers are physical positions; blank
/// rows in the tab keep their slots.
pub struct ApplicationLedger {
    map: ColumnMap,
    apps: Vec<TrackedApplication>,
    dirty: BTreeSet<u32>,
    appended: BTreeSet<u32>,
    /// Total physical rows in the tab, header included.
    physical_rows: u32,
}

impl ApplicationLedger {
    /// Build from a full snapshot (header at index 0).
    pub fn from_snapshot(rows: &[Vec<String>], map: ColumnMap) -> Self {
        let mut apps = Vec::new();
        for (idx, cells) in rows.iter().enumerate().skip(1) {
            let row = (idx + 1) as u32;
            if let Some(app) = row_to_application(row, cells, &map) {
                apps.push(app);
            }
        }
        Self {
            map,
            apps,
            dirty: BTreeSet::new(),
            appended: BTreeSet::new(),
            physical_rows: rows.len().max(1) as u32,
        }
    }

    pub fn applications(&self) -> &[TrackedApplication] {
        &self.apps
    }

    pub fn get(&self, row: u32) -> Option<&TrackedApplication> {
        self.apps.iter().find(|a| a.row == row)
    }

    /// Mutate one row in place and stage it for the batched update.
    /// Returns false when the row is unknown.
    pub fn update_with<F>(&mut self, row: u32, mutate: F) -> bool
    where
        F: FnOnce(&mut TrackedApplication),
    {
        let Some(app) = self.apps.iter_mut().find(|a| a.row == row) else {
            return false;
        };
        mutate(app);
        // Rows appended this run go out with the append phase already.
        if !self.appended.contains(&row) {
            self.dirty.insert(row);
        }
        true
    }

    /// Stage a new row. Returns its assigned physical row number.
    pub fn append(&mut self, mut app: TrackedApplication) -> u32 {
        self.physical_rows += 1;
        let row = self.physical_rows;
        app.row = row;
        self.apps.push(app);
        self.appended.insert(row);
        row
    }

    /// Rows staged for either write phase.
    pub fn staged_rows(&self) -> (Vec<u32>, Vec<u32>) {
        (
            self.dirty.iter().copied().collect(),
            self.appended.iter().copied().collect(),
        )
    }

    /// Flush staged mutations: one multi-row update, one multi-row append.
    /// Each phase that succeeds clears its staging; a failed phase keeps it
    /// so the caller can account for the affected messages.
    pub async fn flush(&mut self, store: &dyn RowStore, tab: &str) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        let updates: Vec<RowUpdate> = self
            .dirty
            .iter()
            .filter_map(|row| {
                self.get(*row).map(|app| RowUpdate {
                    row: *row,
                    values: application_to_row(app, &self.map),
                })
            })
            .collect();
        if !updates.is_empty() {
            match store.batch_update(tab, &updates).await {
                Ok(()) => {
                    outcome.updated = updates.len();
                    self.dirty.clear();
                }
                Err(e) => outcome.update_error = Some(e.to_string()),
            }
        }

        let appends: Vec<Vec<String>> = self
            .appended
            .iter()
            .filter_map(|row| self.get(*row).map(|app| application_to_row(app, &self.map)))
            .collect();
        if !appends.is_empty() {
            match store.append(tab, &appends).await {
                Ok(()) => {
                    outcome.appended = appends.len();
                    self.appended.clear();
                }
                Err(e) => outcome.append_error = Some(e.to_string()),
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn map() -> ColumnMap {
        ColumnMap::default()
    }

    fn sample_app(row: u32) -> TrackedApplication {
        TrackedApplication {
            row,
            company: "Acme Corp".to_string(),
            title: "Backend Engineer".to_string(),
            status: ApplicationStatus::Applied,
            peak_status: ApplicationStatus::Applied,
            last_update: parse_cell_datetime("2026-07-01 12:00:00"),
            processed_at: None,
            platform: Some("greenhouse".to_string()),
            source_subject: "subject".to_string(),
            source_link: "link".to_string(),
            source_message_id: "m1".to_string(),
        }
    }

    /// In-memory store recording every write.
    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<Vec<String>>>,
        fail_updates: bool,
        fail_appends: bool,
        update_calls: Mutex<usize>,
        append_calls: Mutex<usize>,
    }

    #[async_trait]
    impl RowStore for FakeStore {
        async fn read_all(&self, _tab: &str) -> Result<Vec<Vec<String>>, StoreError> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn batch_update(
            &self,
            _tab: &str,
            updates: &[RowUpdate],
        ) -> Result<(), StoreError> {
            *self.update_calls.lock().unwrap() += 1;
            if self.fail_updates {
                return Err(StoreError("update rejected".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            for update in updates {
                let idx = (update.row - 1) as usize;
                if rows.len() <= idx {
                    rows.resize(idx + 1, Vec::new());
                }
                rows[idx] = update.values.clone();
            }
            Ok(())
        }

        async fn append(&self, _tab: &str, new_rows: &[Vec<String>]) -> Result<(), StoreError> {
            *self.append_calls.lock().unwrap() += 1;
            if self.fail_appends {
                return Err(StoreError("append rejected".to_string()));
            }
            self.rows.lock().unwrap().extend(new_rows.iter().cloned());
            Ok(())
        }
    }

    fn header() -> Vec<String> {
        vec!["Company".to_string(); 10]
    }

    #[test]
    fn test_column_map_validate_default() {
        assert!(map().validate().is_ok());
        assert_eq!(map().width(), 10);
    }

    #[test]
    fn test_column_map_duplicate_rejected() {
        let mut m = map();
        m.title = m.company;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_column_map_zero_rejected() {
        let mut m = map();
        m.status = 0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_row_codec_round_trip() {
        let app = sample_app(2);
        let cells = application_to_row(&app, &map());
        let decoded = row_to_application(2, &cells, &map()).unwrap();
        assert_eq!(decoded, app);
    }

    #[test]
    fn test_blank_row_skipped() {
        assert!(row_to_application(3, &[String::new(); 10], &map()).is_none());
        assert!(row_to_application(3, &[], &map()).is_none());
    }

    #[test]
    fn test_short_row_tolerated() {
        let cells = vec!["Acme".to_string(), "SRE".to_string()];
        let app = row_to_application(2, &cells, &map()).unwrap();
        assert_eq!(app.company, "Acme");
        assert_eq!(app.status, ApplicationStatus::UpdateOther);
        assert_eq!(app.peak_status, ApplicationStatus::UpdateOther);
        assert!(app.last_update.is_none());
    }

    #[test]
    fn test_unknown_peak_falls_back_to_status() {
        let mut cells = vec![String::new(); 10];
        cells[0] = "Acme".to_string();
        cells[2] = "Interview".to_string();
        let app = row_to_application(2, &cells, &map()).unwrap();
        assert_eq!(app.peak_status, ApplicationStatus::Interview);
    }

    #[test]
    fn test_parse_cell_datetime_formats() {
        assert!(parse_cell_datetime("2026-07-01 12:30:00").is_some());
        assert!(parse_cell_datetime("2026-07-01T12:30:00Z").is_some());
        assert!(parse_cell_datetime("2026-07-01").is_some());
        assert!(parse_cell_datetime("").is_none());
        assert!(parse_cell_datetime("yesterday").is_none());
    }

    #[test]
    fn test_ledger_skips_header_and_blanks() {
        let rows = vec![
            header(),
            application_to_row(&sample_app(2), &map()),
            vec![String::new(); 10],
            application_to_row(&sample_app(4), &map()),
        ];
        let ledger = ApplicationLedger::from_snapshot(&rows, map());
        assert_eq!(ledger.applications().len(), 2);
        assert_eq!(ledger.applications()[1].row, 4);
    }

    #[test]
    fn test_ledger_append_assigns_next_physical_row() {
        let rows = vec![header(), application_to_row(&sample_app(2), &map())];
        let mut ledger = ApplicationLedger::from_snapshot(&rows, map());
        let row = ledger.append(sample_app(0));
        assert_eq!(row, 3);
        let row = ledger.append(sample_app(0));
        assert_eq!(row, 4);
    }

    #[tokio::test]
    async fn test_flush_batches_updates_and_appends() {
        let rows = vec![header(), application_to_row(&sample_app(2), &map())];
        let mut ledger = ApplicationLedger::from_snapshot(&rows, map());
        ledger.update_with(2, |app| app.status = ApplicationStatus::Interview);
        ledger.append(sample_app(0));
        ledger.append(sample_app(0));

        let store = FakeStore::default();
        let outcome = ledger.flush(&store, "Applications").await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.appended, 2);
        // One multi-row update call, one multi-row append call.
        assert_eq!(*store.update_calls.lock().unwrap(), 1);
        assert_eq!(*store.append_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_update_failure_reported_appends_proceed() {
        let rows = vec![header(), application_to_row(&sample_app(2), &map())];
        let mut ledger = ApplicationLedger::from_snapshot(&rows, map());
        ledger.update_with(2, |app| app.status = ApplicationStatus::Interview);
        ledger.append(sample_app(0));

        let store = FakeStore {
            fail_updates: true,
            ..FakeStore::default()
        };
        let outcome = ledger.flush(&store, "Applications").await;
        assert!(outcome.update_error.is_some());
        assert!(outcome.append_error.is_none());
        assert_eq!(outcome.appended, 1);
    }

    #[tokio::test]
    async fn test_updated_appended_row_written_once() {
        let rows = vec![header()];
        let mut ledger = ApplicationLedger::from_snapshot(&rows, map());
        let row = ledger.append(sample_app(0));
        // A later message in the same run touches the just-appended row.
        ledger.update_with(row, |app| app.status = ApplicationStatus::Interview);

        let store = FakeStore::default();
        let outcome = ledger.flush(&store, "Applications").await;
        assert_eq!(outcome.updated, 0, "appended rows flush via the append phase");
        assert_eq!(outcome.appended, 1);
        let written = store.rows.lock().unwrap();
        assert_eq!(written[1][2], "Interview");
    }

    #[test]
    fn test_update_unknown_row_is_noop() {
        let mut ledger = ApplicationLedger::from_snapshot(&[header()], map());
        assert!(!ledger.update_with(9, |_| {}));
    }
}
