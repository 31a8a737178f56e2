//! Run state, checkpoints and results

use chrono::{DateTime, Utc};
use flowmine_core::config::EngineConfig;
use flowmine_core::{CommandSequence, FailureStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state_machine::RunStatus;

/// How a run reacts to failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    /// Forwarded to the executor; skips interactive confirmation
    #[serde(default)]
    pub yolo_mode: bool,
}

impl From<&EngineConfig> for RunOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            failure_strategy: config.failure_strategy,
            yolo_mode: config.yolo_mode,
        }
    }
}

/// Where a resumed run picks up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeMode {
    /// Re-run the whole chain with the stored variables and options
    #[default]
    FromScratch,
    /// Run only the steps still pending, keeping completed work
    FromPending,
}

/// Completed and pending step labels at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub completed: Vec<String>,
    pub pending: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointData {
    pub timestamp: DateTime<Utc>,
    pub snapshot: StateSnapshot,
    /// Opaque signal from the executor, such as a VCS revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_state: Option<serde_json::Value>,
}

/// A step that failed, kept even when the strategy masked it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// One run of a chain. Persisted after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub chain: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointData>,
    pub start_time: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub failures: Vec<StepFailure>,
}

impl WorkflowState {
    pub fn new(
        chain: impl Into<String>,
        variables: BTreeMap<String, String>,
        options: RunOptions,
        pending: Vec<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            variables,
            options,
            completed: Vec::new(),
            pending,
            current: None,
            checkpoints: Vec::new(),
            start_time: Utc::now(),
            status: RunStatus::Running,
            failures: Vec::new(),
        }
    }

    pub fn latest_checkpoint(&self) -> Option<&CheckpointData> {
        self.checkpoints.last()
    }

    /// Move `label` from pending to completed
    pub fn mark_completed(&mut self, label: &str) {
        if let Some(idx) = self.pending.iter().position(|p| p == label) {
            self.pending.remove(idx);
        }
        self.completed.push(label.to_string());
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            completed: self.completed.clone(),
            pending: self.pending.clone(),
        }
    }
}

/// What a call to `run` or `resume` produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub chain: String,
    pub success: bool,
    pub status: RunStatus,
    /// Steps completed by this call, in order
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub failures: Vec<StepFailure>,
    /// Milliseconds
    pub duration: f64,
    pub checkpoints: Vec<CheckpointData>,
    /// Sealed record of the executions performed, ready for history
    pub sequence: CommandSequence,
}
