//! Execution history store
//!
//! Append-only record of individual executions and sealed sequences,
//! persisted as a single JSON document. Every mutation rewrites the whole
//! document atomically; a write failure is fatal and propagates.

use flowmine_core::persist::{read_json_tolerant, write_json_atomic};
use flowmine_core::{
    CommandCount, CommandExecution, CommandSequence, FlowError, HistoryStats, Result,
    SequenceSource, WorkflowHistory,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed store for the history document
pub struct HistoryStore {
    path: PathBuf,
    history: WorkflowHistory,
}

impl HistoryStore {
    /// Open the store at `path`.
    ///
    /// A missing or corrupt document yields an empty history. Executions
    /// are re-classified so documents written before classification existed
    /// carry typed operations too.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut history: WorkflowHistory = read_json_tolerant(&path).await.unwrap_or_default();

        for exec in history.executions.iter_mut() {
            exec.classify();
        }
        for seq in history.sequences.iter_mut() {
            for exec in seq.commands.iter_mut() {
                exec.classify();
            }
        }

        info!(
            "Loaded history: {} executions, {} sequences, {} patterns",
            history.executions.len(),
            history.sequences.len(),
            history.patterns.len()
        );

        let mut store = Self { path, history };
        store.update_stats();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history(&self) -> &WorkflowHistory {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut WorkflowHistory {
        &mut self.history
    }

    pub fn stats(&self) -> &HistoryStats {
        &self.history.stats
    }

    /// Sealed sequences only
    pub fn sealed_sequences(&self) -> impl Iterator<Item = &CommandSequence> {
        self.history.sequences.iter().filter(|s| s.is_sealed())
    }

    /// Record a single command execution
    pub async fn track_execution(&mut self, mut execution: CommandExecution) -> Result<()> {
        execution.classify();
        debug!("Tracking execution: {}", execution.full_command());
        self.history.executions.push(execution);
        self.save().await
    }

    /// Record a complete sequence, sealing it first if needed
    pub async fn track_sequence(&mut self, mut sequence: CommandSequence) -> Result<()> {
        for exec in sequence.commands.iter_mut() {
            exec.classify();
        }
        sequence.seal();
        debug!(
            "Tracking sequence {} ({} commands)",
            sequence.id,
            sequence.commands.len()
        );
        self.history.sequences.push(sequence);
        self.save().await
    }

    /// Open a new, unsealed sequence and return its id
    pub async fn start_sequence(
        &mut self,
        source: SequenceSource,
        workflow_name: Option<String>,
    ) -> Result<String> {
        let id = format!("seq-{}", uuid::Uuid::new_v4());
        let mut sequence = CommandSequence::new(id.clone(), source);
        sequence.workflow_name = workflow_name;

        self.history.sequences.push(sequence);
        self.save().await?;
        Ok(id)
    }

    /// Append an execution to an open sequence
    pub async fn add_to_sequence(
        &mut self,
        sequence_id: &str,
        mut execution: CommandExecution,
    ) -> Result<()> {
        let sequence = self.open_sequence_mut(sequence_id)?;
        execution.classify();
        sequence.commands.push(execution);
        self.save().await
    }

    /// Seal an open sequence, computing its aggregates
    pub async fn complete_sequence(&mut self, sequence_id: &str) -> Result<CommandSequence> {
        let sequence = self.open_sequence_mut(sequence_id)?;
        sequence.seal();
        let sealed = sequence.clone();

        info!(
            "Sealed sequence {} ({} commands, {:.0}% success)",
            sealed.id,
            sealed.commands.len(),
            sealed.success_rate * 100.0
        );
        self.save().await?;
        Ok(sealed)
    }

    /// Count freshly written templates in the stats
    pub async fn record_templates_generated(&mut self, count: u64) -> Result<()> {
        self.history.stats.templates_generated += count;
        self.save().await
    }

    /// Mean duration of raw executions of `command`
    pub fn command_avg_duration(&self, command: &str) -> Option<f64> {
        let durations: Vec<f64> = self
            .history
            .executions
            .iter()
            .filter(|e| e.full_command() == command)
            .map(|e| e.duration)
            .collect();

        if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        }
    }

    /// Recompute stats and rewrite the document
    pub async fn save(&mut self) -> Result<()> {
        self.update_stats();
        write_json_atomic(&self.path, &self.history).await
    }

    fn open_sequence_mut(&mut self, sequence_id: &str) -> Result<&mut CommandSequence> {
        let sequence = self
            .history
            .sequences
            .iter_mut()
            .find(|s| s.id == sequence_id)
            .ok_or_else(|| FlowError::Validation(format!("Unknown sequence: {}", sequence_id)))?;

        if sequence.is_sealed() {
            return Err(FlowError::Validation(format!(
                "Sequence {} is already sealed",
                sequence_id
            )));
        }
        Ok(sequence)
    }

    fn update_stats(&mut self) {
        let history = &mut self.history;
        let stats = &mut history.stats;

        stats.total_executions = history.executions.len() as u64;
        stats.total_sequences = history.sequences.len() as u64;
        stats.successful_executions = history.executions.iter().filter(|e| e.success).count() as u64;
        stats.failed_executions = stats.total_executions - stats.successful_executions;
        stats.patterns_discovered = history.patterns.len() as u64;

        if !history.executions.is_empty() {
            stats.avg_execution_time = history.executions.iter().map(|e| e.duration).sum::<f64>()
                / history.executions.len() as f64;
        }

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for exec in &history.executions {
            *counts.entry(exec.command.as_str()).or_default() += 1;
        }

        let mut most_used: Vec<CommandCount> = counts
            .into_iter()
            .map(|(command, count)| CommandCount {
                command: command.to_string(),
                count,
            })
            .collect();
        most_used.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.command.cmp(&b.command)));
        most_used.truncate(10);
        stats.most_used_commands = most_used;
    }
}
