//! Stale-application sweep.
//!
//! A separate batch pass on its own schedule: any row whose status is not
//! protected and whose last update predates the inactivity threshold is
//! rewritten to Rejected with a fresh last-update date. The peak status is
//! never touched — a sweep-induced rejection still reflects the true peak
//! the application reached.

use chrono::{DateTime, Duration, Utc};

use crate::config::SweepConfig;
use crate::error::EngineError;
use crate::store::{application_to_row, row_to_application, ColumnMap, RowStore, RowUpdate};
use crate::types::{ApplicationStatus, TrackedApplication};

#[derive(Debug, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub swept: usize,
    pub protected: usize,
}

/// Decide whether one row is stale under the policy.
pub fn is_stale(
    app: &TrackedApplication,
    now: DateTime<Utc>,
    policy: &SweepConfig,
) -> bool {
    if policy.protected_statuses.contains(&app.status) {
        return false;
    }
    let Some(last_update) = app.last_update else {
        // No usable date — leave the row alone rather than guess.
        return false;
    };
    last_update < now - Duration::weeks(policy.threshold_weeks as i64)
}

/// Pure planning pass: returns the rows to rewrite, already mutated.
pub fn plan_sweep(
    applications: &[TrackedApplication],
    now: DateTime<Utc>,
    policy: &SweepConfig,
) -> (Vec<TrackedApplication>, SweepReport) {
    let mut report = SweepReport::default();
    let mut stale = Vec::new();

    for app in applications {
        report.scanned += 1;
        if policy.protected_statuses.contains(&app.status) {
            report.protected += 1;
            continue;
        }
        if !is_stale(app, now, policy) {
            continue;
        }
        let mut swept = app.clone();
        swept.status = ApplicationStatus::Rejected;
        swept.last_update = Some(now);
        stale.push(swept);
    }

    report.swept = stale.len();
    (stale, report)
}

/// Run the sweep: full read, policy pass, single batched write-back.
pub async fn sweep(
    store: &dyn RowStore,
    tab: &str,
    columns: &ColumnMap,
    policy: &SweepConfig,
) -> Result<SweepReport, EngineError> {
    let rows = store
        .read_all(tab)
        .await
        .map_err(|e| EngineError::Configuration(format!("cannot read tab {:?}: {}", tab, e)))?;

    let mut applications = Vec::new();
    for (idx, cells) in rows.iter().enumerate().skip(1) {
        if let Some(app) = row_to_application((idx + 1) as u32, cells, columns) {
            applications.push(app);
        }
    }

    let (stale, report) = plan_sweep(&applications, Utc::now(), policy);
    if stale.is_empty() {
        log::info!("sweep: {} rows scanned, nothing stale", report.scanned);
        return Ok(report);
    }

    let updates: Vec<RowUpdate> = stale
        .iter()
        .map(|app| RowUpdate {
            row: app.row,
            values: application_to_row(app, columns),
        })
        .collect();
    store
        .batch_update(tab, &updates)
        .await
        .map_err(|e| EngineError::StoreWriteFailure(e.to_string()))?;

    log::info!(
        "sweep: {} rows scanned, {} marked rejected, {} protected",
        report.scanned,
        report.swept,
        report.protected
    );
    Ok(report)
}
