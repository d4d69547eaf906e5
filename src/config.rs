//! Tracker configuration (~/.jobtrail/config.json).
//!
//! Everything the engine needs is passed in through this value — label
//! names, spreadsheet addressing, the column map, AI settings, run budgets,
//! sweep policy. Call sites never read process-wide globals.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::ColumnMap;
use crate::types::ApplicationStatus;

/// Top-level configuration, deserialized from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub sheet: SheetConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Spreadsheet addressing. The column map is contract: the core never
/// invents or reorders columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_applications_tab")]
    pub applications_tab: String,
    #[serde(default = "default_leads_tab")]
    pub leads_tab: String,
    #[serde(default)]
    pub columns: ColumnMap,
}

fn default_applications_tab() -> String {
    "Applications".to_string()
}

fn default_leads_tab() -> String {
    "Leads".to_string()
}

/// Gmail label names. Hierarchical by "/" naming convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    #[serde(default = "default_to_process")]
    pub to_process: String,
    #[serde(default = "default_processed")]
    pub processed: String,
    #[serde(default = "default_manual_review")]
    pub manual_review: String,
    /// Separate intake label for job-lead digest emails.
    #[serde(default = "default_leads_to_process")]
    pub leads_to_process: String,
}

fn default_to_process() -> String {
    "JobTrail/ToProcess".to_string()
}

fn default_processed() -> String {
    "JobTrail/Processed".to_string()
}

fn default_manual_review() -> String {
    "JobTrail/ManualReview".to_string()
}

fn default_leads_to_process() -> String {
    "JobTrail/Leads".to_string()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            to_process: default_to_process(),
            processed: default_processed(),
            manual_review: default_manual_review(),
            leads_to_process: default_leads_to_process(),
        }
    }
}

/// AI extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Body prefix cap sent to the model, in characters.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_ai_attempts")]
    pub max_attempts: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_body_chars: default_max_body_chars(),
            max_attempts: default_ai_attempts(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_max_body_chars() -> usize {
    12_000
}

fn default_ai_attempts() -> u32 {
    2
}

/// Per-run budgets and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Wall-clock budget; approaching it stops pulling new messages.
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default = "default_thread_page_size")]
    pub thread_page_size: u32,
    #[serde(default = "default_max_threads")]
    pub max_threads_per_run: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: default_time_budget_secs(),
            thread_page_size: default_thread_page_size(),
            max_threads_per_run: default_max_threads(),
        }
    }
}

fn default_time_budget_secs() -> u64 {
    270
}

fn default_thread_page_size() -> u32 {
    50
}

fn default_max_threads() -> usize {
    200
}

/// Stale-application sweep policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    #[serde(default = "default_threshold_weeks")]
    pub threshold_weeks: u32,
    /// Statuses the sweep never rewrites.
    #[serde(default = "default_protected_statuses")]
    pub protected_statuses: Vec<ApplicationStatus>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            threshold_weeks: default_threshold_weeks(),
            protected_statuses: default_protected_statuses(),
        }
    }
}

fn default_threshold_weeks() -> u32 {
    7
}

fn default_protected_statuses() -> Vec<ApplicationStatus> {
    vec![ApplicationStatus::Rejected, ApplicationStatus::Offer]
}

impl TrackerConfig {
    /// Default config location.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".jobtrail")
            .join("config.json")
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: TrackerConfig = serde_json::from_str(&content).map_err(|e| {
            EngineError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that must hold before a run starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sheet.spreadsheet_id.trim().is_empty() {
            return Err(EngineError::Configuration(
                "sheet.spreadsheetId is empty".to_string(),
            ));
        }
        for (name, value) in [
            ("labels.toProcess", &self.labels.to_process),
            ("labels.processed", &self.labels.processed),
            ("labels.manualReview", &self.labels.manual_review),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Configuration(format!("{} is empty", name)));
            }
        }
        if self.labels.to_process == self.labels.processed
            || self.labels.to_process == self.labels.manual_review
        {
            return Err(EngineError::Configuration(
                "toProcess label must differ from terminal labels".to_string(),
            ));
        }
        self.sheet
            .columns
            .validate()
            .map_err(EngineError::Configuration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "sheet": { "spreadsheetId": "sheet-123" },
            "labels": {}
        }"#
    }

    #[test]
    fn test_defaults_fill_in() {
        let config: TrackerConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(config.labels.to_process, "JobTrail/ToProcess");
        assert_eq!(config.sheet.applications_tab, "Applications");
        assert_eq!(config.ai.max_attempts, 2);
        assert_eq!(config.run.time_budget_secs, 270);
        assert_eq!(config.sweep.threshold_weeks, 7);
        assert!(config
            .sweep
            .protected_statuses
            .contains(&ApplicationStatus::Offer));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_spreadsheet_id_rejected() {
        let json = r#"{ "sheet": { "spreadsheetId": " " }, "labels": {} }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_terminal_label_collision_rejected() {
        let json = r#"{
            "sheet": { "spreadsheetId": "s" },
            "labels": { "toProcess": "X", "processed": "X" }
        }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }
}
