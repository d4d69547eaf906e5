//! Sheets API v4 row store implementation.
//!
//! Three calls only: a full values read, one multi-range batch update, and
//! one append. Values go in RAW so the tracker's cell text is exactly what
//! lands in the sheet.

use async_trait::async_trait;
use serde::Deserialize;

use super::{get_valid_access_token, send_with_retry, GoogleApiError, RetryPolicy};
use crate::store::{RowStore, RowUpdate, StoreError};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Google Sheets-backed row store for one spreadsheet.
pub struct SheetsStore {
    client: reqwest::Client,
    policy: RetryPolicy,
    spreadsheet_id: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: String, policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            spreadsheet_id,
        }
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        get_valid_access_token()
            .await
            .map_err(|e| StoreError(e.to_string()))
    }
}

#[async_trait]
impl RowStore for SheetsStore {
    async fn read_all(&self, tab: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_BASE,
            self.spreadsheet_id,
            quoted_tab(tab)
        );

        let resp = send_with_retry(
            self.client
                .get(&url)
                .bearer_auth(&access_token)
                .query(&[("majorDimension", "ROWS")]),
            &self.policy,
        )
        .await
        .map_err(|e| StoreError(e.to_string()))?;
        let resp = check_status(resp)
            .await
            .map_err(|e| StoreError(e.to_string()))?;

        let values: ValuesResponse = resp.json().await.map_err(|e| StoreError(e.to_string()))?;
        Ok(values.values)
    }

    async fn batch_update(&self, tab: &str, updates: &[RowUpdate]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/{}/values:batchUpdate",
            SHEETS_BASE, self.spreadsheet_id
        );

        let data: Vec<serde_json::Value> = updates
            .iter()
            .map(|update| {
                serde_json::json!({
                    "range": row_range(tab, update.row, update.values.len()),
                    "majorDimension": "ROWS",
                    "values": [update.values],
                })
            })
            .collect();
        let body = serde_json::json!({
            "valueInputOption": "RAW",
            "data": data,
        });

        let resp = send_with_retry(
            self.client.post(&url).bearer_auth(&access_token).json(&body),
            &self.policy,
        )
        .await
        .map_err(|e| StoreError(e.to_string()))?;
        check_status(resp)
            .await
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(())
    }

    async fn append(&self, tab: &str, rows: &[Vec<String>]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/{}/values/{}:append",
            SHEETS_BASE,
            self.spreadsheet_id,
            quoted_tab(tab)
        );
        let body = serde_json::json!({ "values": rows });

        let resp = send_with_retry(
            self.client
                .post(&url)
                .bearer_auth(&access_token)
                .query(&[
                    ("valueInputOption", "RAW"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&body),
            &self.policy,
        )
        .await
        .map_err(|e| StoreError(e.to_string()))?;
        check_status(resp)
            .await
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

/// Tab reference for a values URL, quoted for names with spaces.
fn quoted_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// A1 range covering one row at a given width, e.g. `'Applications'!A5:J5`.
fn row_range(tab: &str, row: u32, width: usize) -> String {
    format!(
        "{}!A{}:{}{}",
        quoted_tab(tab),
        row,
        column_letter(width.max(1)),
        row
    )
}

/// 1-based column index to A1 letters.
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}
