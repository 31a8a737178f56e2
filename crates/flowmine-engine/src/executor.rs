//! Step execution abstraction

use async_trait::async_trait;
use flowmine_core::{FlowError, Result};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, instrument};

/// Output from a successful step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for StepOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Runs resolved workflow steps (allows mocking in tests)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with its resolved `args`. An error fails the step.
    async fn execute(&self, command: &str, args: &str, yolo_mode: bool) -> Result<StepOutput>;

    /// Optional external state recorded with each checkpoint
    async fn checkpoint_signal(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

fn step_line(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args)
    }
}

/// Runs each step through `sh -c` in a working directory
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    working_dir: PathBuf,
}

impl ShellExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    #[instrument(skip(self), fields(dir = %self.working_dir.display()))]
    async fn execute(&self, command: &str, args: &str, yolo_mode: bool) -> Result<StepOutput> {
        let line = step_line(command, args);
        debug!("Executing {}", line);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(&self.working_dir)
            .env("FLOWMINE_YOLO", if yolo_mode { "1" } else { "0" })
            .output()
            .await
            .map_err(|e| FlowError::step(&line, format!("failed to spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(FlowError::step(line, message));
        }

        Ok(StepOutput::from(output))
    }

    /// Current git revision of the working directory, when there is one
    async fn checkpoint_signal(&self) -> Result<Option<serde_json::Value>> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(&self.working_dir)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FlowError::Other("not a git working tree".to_string()));
        }

        let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(json!({ "gitCommit": commit })))
    }
}

/// Pair of notifications that hold a step open until released
#[derive(Clone)]
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Scripted executor for testing
#[derive(Clone, Default)]
pub struct MockExecutor {
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    gates: HashMap<String, Gate>,
    signal: Option<serde_json::Value>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the step whose resolved line is `step`
    pub fn with_failure(mut self, step: &str, message: &str) -> Self {
        self.failures.insert(step.to_string(), message.to_string());
        self
    }

    pub fn with_delay(mut self, step: &str, delay: Duration) -> Self {
        self.delays.insert(step.to_string(), delay);
        self
    }

    /// Signal `entered` when `step` starts, then wait for `release`
    pub fn with_gate(mut self, step: &str, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gates
            .insert(step.to_string(), Gate { entered, release });
        self
    }

    pub fn with_signal(mut self, signal: serde_json::Value) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Resolved lines executed so far, in start order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, command: &str, args: &str, _yolo_mode: bool) -> Result<StepOutput> {
        let line = step_line(command, args);
        self.calls.lock().await.push(line.clone());

        if let Some(gate) = self.gates.get(&line) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(delay) = self.delays.get(&line) {
            tokio::time::sleep(*delay).await;
        }

        match self.failures.get(&line) {
            Some(message) => Err(FlowError::step(line, message.clone())),
            None => Ok(StepOutput {
                stdout: format!("ran {}", line),
                stderr: String::new(),
            }),
        }
    }

    async fn checkpoint_signal(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.signal.clone())
    }
}
