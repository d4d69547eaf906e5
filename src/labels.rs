//! Per-thread outcome tracking and the idempotent label transition.
//!
//! A thread's outcome defaults to done and is downgraded to manual the
//! moment any contained message needs manual review or fails to write.
//! Once every message in the thread has been attempted, the to-process
//! label comes off and exactly one terminal label goes on. Replays are
//! no-ops: mutations already in the desired state are skipped.

use std::collections::HashMap;

use crate::config::LabelConfig;

/// Terminal disposition of one thread for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadOutcome {
    #[default]
    Done,
    Manual,
}

/// Planned label mutation for one thread. Empty plans are replay no-ops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelPlan {
    pub add: Option<String>,
    pub remove: Option<String>,
}

impl LabelPlan {
    pub fn is_noop(&self) -> bool {
        self.add.is_none() && self.remove.is_none()
    }
}

/// Compute the transition for a thread given its current labels.
pub fn plan_transition(
    current_labels: &[String],
    outcome: ThreadOutcome,
    config: &LabelConfig,
) -> LabelPlan {
    let terminal = match outcome {
        ThreadOutcome::Done => &config.processed,
        ThreadOutcome::Manual => &config.manual_review,
    };

    let add = if current_labels.iter().any(|l| l == terminal) {
        None
    } else {
        Some(terminal.clone())
    };
    let remove = if current_labels.iter().any(|l| l == &config.to_process) {
        Some(config.to_process.clone())
    } else {
        None
    };

    LabelPlan { add, remove }
}

/// Tracks per-thread outcomes over one run.
#[derive(Debug, Default)]
pub struct LabelStateMachine {
    outcomes: HashMap<String, ThreadOutcome>,
}

impl LabelStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thread with the default done outcome.
    pub fn note_thread(&mut self, thread_id: &str) {
        self.outcomes
            .entry(thread_id.to_string())
            .or_insert(ThreadOutcome::Done);
    }

    /// Downgrade a thread to manual. Never upgrades back.
    pub fn mark_manual(&mut self, thread_id: &str) {
        self.outcomes
            .insert(thread_id.to_string(), ThreadOutcome::Manual);
    }

    pub fn outcome(&self, thread_id: &str) -> ThreadOutcome {
        self.outcomes.get(thread_id).copied().unwrap_or_default()
    }

    pub fn threads(&self) -> impl Iterator<Item = (&str, ThreadOutcome)> {
        self.outcomes.iter().map(|(id, o)| (id.as_str(), *o))
    }

    pub fn manual_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| **o == ThreadOutcome::Manual)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LabelConfig {
        serde_json::from_str("{}").unwrap()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_done_thread_gets_processed_label() {
        let plan = plan_transition(
            &labels(&["JobTrail/ToProcess"]),
            ThreadOutcome::Done,
            &config(),
        );
        assert_eq!(plan.add.as_deref(), Some("JobTrail/Processed"));
        assert_eq!(plan.remove.as_deref(), Some("JobTrail/ToProcess"));
    }

    #[test]
    fn test_manual_thread_gets_manual_label() {
        let plan = plan_transition(
            &labels(&["JobTrail/ToProcess"]),
            ThreadOutcome::Manual,
            &config(),
        );
        assert_eq!(plan.add.as_deref(), Some("JobTrail/ManualReview"));
    }

    #[test]
    fn test_replay_is_noop() {
        let plan = plan_transition(
            &labels(&["JobTrail/Processed"]),
            ThreadOutcome::Done,
            &config(),
        );
        assert!(plan.is_noop());
    }

    #[test]
    fn test_terminal_present_but_to_process_lingers() {
        // Crash between add and remove: replay only removes.
        let plan = plan_transition(
            &labels(&["JobTrail/Processed", "JobTrail/ToProcess"]),
            ThreadOutcome::Done,
            &config(),
        );
        assert!(plan.add.is_none());
        assert_eq!(plan.remove.as_deref(), Some("JobTrail/ToProcess"));
    }

    #[test]
    fn test_outcome_defaults_done_and_downgrades() {
        let mut machine = LabelStateMachine::new();
        machine.note_thread("t1");
        assert_eq!(machine.outcome("t1"), ThreadOutcome::Done);

        machine.mark_manual("t1");
        machine.note_thread("t1");
        assert_eq!(machine.outcome("t1"), ThreadOutcome::Manual, "never upgrades back");
        assert_eq!(machine.manual_count(), 1);
    }
}
