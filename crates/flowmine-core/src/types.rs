//! Core type definitions for execution history and discovered patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// A single recorded command execution. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecution {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Wall-clock duration in milliseconds
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Classification computed at ingestion
    #[serde(default)]
    pub operation: Operation,
}

impl CommandExecution {
    pub fn new(command: impl Into<String>, success: bool, duration: f64) -> Self {
        let command = command.into();
        let operation = Operation::classify(&command, None);
        Self {
            command,
            args: None,
            timestamp: Utc::now(),
            success,
            duration,
            context: None,
            operation,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self.classify();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Recompute the typed operation from the command text
    pub fn classify(&mut self) {
        self.operation = Operation::classify(&self.command, self.args.as_deref());
    }

    /// Command plus arguments, as a user would have typed it
    pub fn full_command(&self) -> String {
        match &self.args {
            Some(args) if !args.is_empty() => format!("{} {}", self.command, args),
            _ => self.command.clone(),
        }
    }
}

/// Where a sequence came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceSource {
    #[default]
    Manual,
    Workflow,
    Discovered,
}

impl std::fmt::Display for SequenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Workflow => write!(f, "workflow"),
            Self::Discovered => write!(f, "discovered"),
        }
    }
}

/// Ordered executions for one logical run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSequence {
    pub id: String,
    pub commands: Vec<CommandExecution>,
    pub start_time: DateTime<Utc>,
    /// Set when the sequence is sealed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_duration: f64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub source: SequenceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
}

impl CommandSequence {
    pub fn new(id: impl Into<String>, source: SequenceSource) -> Self {
        Self {
            id: id.into(),
            commands: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            total_duration: 0.0,
            success_rate: 0.0,
            source,
            workflow_name: None,
        }
    }

    pub fn with_workflow(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn with_commands(mut self, commands: Vec<CommandExecution>) -> Self {
        self.commands = commands;
        self
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Finalize aggregates. Sealing twice is a no-op.
    pub fn seal(&mut self) {
        if self.is_sealed() {
            return;
        }

        self.end_time = Some(Utc::now());
        self.total_duration = self.commands.iter().map(|c| c.duration).sum();
        self.success_rate = if self.commands.is_empty() {
            0.0
        } else {
            self.commands.iter().filter(|c| c.success).count() as f64
                / self.commands.len() as f64
        };
    }

    /// Command strings in order
    pub fn command_names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.command.clone()).collect()
    }
}

/// Kind of value a pattern variable holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Phase,
    String,
    Number,
    Boolean,
}

/// How to parameterize a literal subsequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    /// Regex whose first capture group is the variable value
    pub extraction: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Kind of optimization suggested for a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationKind {
    Parallel,
    Skip,
    Reorder,
    Merge,
}

impl std::fmt::Display for OptimizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Skip => write!(f, "skip"),
            Self::Reorder => write!(f, "reorder"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A suggested change to a workflow, with its estimated benefit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSuggestion {
    #[serde(rename = "type")]
    pub kind: OptimizationKind,
    pub steps: Vec<String>,
    pub description: String,
    /// Milliseconds
    pub estimated_time_savings: f64,
    pub risk_level: RiskLevel,
}

/// A command subsequence observed often and reliably enough to template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sequence: Vec<String>,
    pub frequency: u64,
    pub success_rate: f64,
    /// Milliseconds
    pub avg_duration: f64,
    /// Milliseconds
    pub time_savings: f64,
    /// 0-100
    pub quality_score: f64,
    #[serde(default)]
    pub variables: Vec<PatternVariable>,
    #[serde(default)]
    pub optimizations: Vec<OptimizationSuggestion>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Usage counter for the most used commands report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCount {
    pub command: String,
    pub count: u64,
}

/// Aggregate statistics over the history document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryStats {
    pub total_executions: u64,
    pub total_sequences: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub avg_execution_time: f64,
    pub most_used_commands: Vec<CommandCount>,
    pub patterns_discovered: u64,
    pub templates_generated: u64,
}

/// The persisted history document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowHistory {
    pub sequences: Vec<CommandSequence>,
    pub executions: Vec<CommandExecution>,
    pub patterns: Vec<DiscoveredPattern>,
    pub stats: HistoryStats,
}
