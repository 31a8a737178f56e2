//! Workflow chain templates
//!
//! A chain is immutable once built. Runs of a chain live in the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When the engine records a checkpoint during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointStrategy {
    #[default]
    AfterEach,
    AfterPhase,
    BeforeExecute,
    Manual,
}

impl std::fmt::Display for CheckpointStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AfterEach => write!(f, "after-each"),
            Self::AfterPhase => write!(f, "after-phase"),
            Self::BeforeExecute => write!(f, "before-execute"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// What the engine does when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStrategy {
    #[default]
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl std::fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopOnError => write!(f, "stop-on-error"),
            Self::ContinueOnError => write!(f, "continue-on-error"),
            Self::RollbackOnError => write!(f, "rollback-on-error"),
        }
    }
}

impl std::str::FromStr for FailureStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stop" | "stop-on-error" => Ok(Self::StopOnError),
            "continue" | "continue-on-error" => Ok(Self::ContinueOnError),
            "rollback" | "rollback-on-error" => Ok(Self::RollbackOnError),
            _ => Err(format!("Invalid failure strategy: {}", s)),
        }
    }
}

/// One step of a chain. `${var}` placeholders are resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default)]
    pub checkpoint: bool,
}

impl WorkflowStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: None,
            checkpoint: false,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    pub fn checkpointed(mut self) -> Self {
        self.checkpoint = true;
        self
    }

    /// Command and arguments as one line
    pub fn label(&self) -> String {
        match &self.args {
            Some(args) if !args.is_empty() => format!("{} {}", self.command, args),
            _ => self.command.clone(),
        }
    }
}

/// Steps that run concurrently after the sequential chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

/// Provenance of a synthesized chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub pattern_id: String,
    pub frequency: u64,
    pub success_rate: f64,
    pub quality_score: f64,
    pub discovered_at: DateTime<Utc>,
    pub auto_generated: bool,
}

/// A named, reusable template of ordered steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowChain {
    pub name: String,
    pub description: String,
    #[serde(rename = "chain")]
    pub steps: Vec<WorkflowStep>,
    #[serde(default, rename = "parallel", skip_serializing_if = "Vec::is_empty")]
    pub parallel_groups: Vec<ParallelGroup>,
    #[serde(rename = "checkpoint", default)]
    pub checkpoint_strategy: CheckpointStrategy,
    #[serde(default)]
    pub rollback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TemplateMetadata>,
}

impl WorkflowChain {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            parallel_groups: Vec::new(),
            checkpoint_strategy: CheckpointStrategy::default(),
            rollback: false,
            metadata: None,
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_parallel(mut self, group: ParallelGroup) -> Self {
        self.parallel_groups.push(group);
        self
    }

    pub fn with_checkpoint(mut self, strategy: CheckpointStrategy) -> Self {
        self.checkpoint_strategy = strategy;
        self
    }

    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    /// Every step, sequential first, then each parallel group in order
    pub fn all_steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.steps
            .iter()
            .chain(self.parallel_groups.iter().flat_map(|g| g.steps.iter()))
    }
}
