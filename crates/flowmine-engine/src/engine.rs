//! Workflow chain execution
//!
//! The engine resolves a chain's placeholders, runs its sequential steps in
//! order, then its parallel groups one at a time with a settle-all join.
//! Run state is persisted after every transition, so a crash replays at
//! most the step that was in flight.

use flowmine_core::fail_open::fail_open;
use flowmine_core::{
    CommandExecution, CommandSequence, FailureStrategy, FlowConfig, FlowError, Result,
    SequenceSource, WorkflowChain, WorkflowStep,
};
use flowmine_templates::{resolve_variables, TemplateRegistry};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::checkpoint::{record, restore_latest, should_checkpoint};
use crate::executor::{CommandExecutor, StepOutput};
use crate::state::{CheckpointData, ResumeMode, RunOptions, StepFailure, WorkflowResult, WorkflowState};
use crate::state_machine::{transition, RunEvent, RunStatus};
use crate::state_store::StateStore;

fn locked<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A chain step with its placeholders resolved
#[derive(Debug, Clone)]
struct ResolvedStep {
    command: String,
    args: String,
    label: String,
    checkpoint: bool,
}

impl ResolvedStep {
    fn resolve(step: &WorkflowStep, variables: &BTreeMap<String, String>) -> Self {
        let command = resolve_variables(&step.command, variables);
        let args = step
            .args
            .as_deref()
            .map(|a| resolve_variables(a, variables))
            .unwrap_or_default();
        let label = if args.is_empty() {
            command.clone()
        } else {
            format!("{} {}", command, args)
        };

        Self {
            command,
            args,
            label,
            checkpoint: step.checkpoint,
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedGroup {
    name: String,
    steps: Vec<ResolvedStep>,
}

/// Everything a run will execute, in order
#[derive(Debug, Clone)]
struct Plan {
    sequential: Vec<ResolvedStep>,
    groups: Vec<ResolvedGroup>,
}

impl Plan {
    fn new(chain: &WorkflowChain, variables: &BTreeMap<String, String>) -> Self {
        Self {
            sequential: chain
                .steps
                .iter()
                .map(|s| ResolvedStep::resolve(s, variables))
                .collect(),
            groups: chain
                .parallel_groups
                .iter()
                .map(|g| ResolvedGroup {
                    name: g.name.clone(),
                    steps: g
                        .steps
                        .iter()
                        .map(|s| ResolvedStep::resolve(s, variables))
                        .collect(),
                })
                .collect(),
        }
    }

    fn labels(&self) -> Vec<String> {
        self.sequential
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.steps.iter()))
            .map(|s| s.label.clone())
            .collect()
    }

    /// Keep only steps still listed in `pending`, one per listing
    fn restrict_to(self, pending: &[String]) -> Self {
        let mut remaining: Vec<&str> = pending.iter().map(String::as_str).collect();
        let mut keep = |step: &ResolvedStep| match remaining.iter().position(|p| *p == step.label) {
            Some(idx) => {
                remaining.remove(idx);
                true
            }
            None => false,
        };

        let sequential = self.sequential.into_iter().filter(|s| keep(s)).collect();
        let groups = self
            .groups
            .into_iter()
            .map(|g| ResolvedGroup {
                name: g.name,
                steps: g.steps.into_iter().filter(|s| keep(s)).collect(),
            })
            .filter(|g| !g.steps.is_empty())
            .collect();

        Self { sequential, groups }
    }
}

/// Bookkeeping for a single call to `run` or `resume`
struct Run {
    state: WorkflowState,
    completed_steps: Vec<String>,
    failed_step: Option<String>,
    error: Option<String>,
    /// Failures of this call only; the state keeps the whole run's
    failures: Vec<StepFailure>,
    sequence: CommandSequence,
    started: Instant,
}

impl Run {
    fn new(state: WorkflowState) -> Self {
        let sequence = CommandSequence::new(
            format!("seq-{}", uuid::Uuid::new_v4()),
            SequenceSource::Workflow,
        )
        .with_workflow(state.chain.clone());

        Self {
            state,
            completed_steps: Vec::new(),
            failed_step: None,
            error: None,
            failures: Vec::new(),
            sequence,
            started: Instant::now(),
        }
    }

    fn record_execution(&mut self, step: &ResolvedStep, success: bool, duration_ms: f64) {
        let mut execution = CommandExecution::new(step.command.clone(), success, duration_ms);
        if !step.args.is_empty() {
            execution = execution.with_args(step.args.clone());
        }
        self.sequence.commands.push(execution);
    }

    fn complete(&mut self, label: &str) {
        self.state.mark_completed(label);
        self.completed_steps.push(label.to_string());
    }

    fn record_failure(&mut self, label: &str, error: &FlowError) {
        warn!("Step {} failed: {}", label, error);
        let failure = StepFailure {
            step: label.to_string(),
            error: error.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.state.failures.push(failure.clone());
        self.failures.push(failure);
        self.failed_step = Some(label.to_string());
        self.error = Some(error.to_string());
    }

    fn into_result(mut self) -> WorkflowResult {
        self.sequence.seal();
        let status = self.state.status;

        WorkflowResult {
            chain: self.state.chain.clone(),
            success: status == RunStatus::Completed,
            status,
            completed_steps: self.completed_steps,
            failed_step: self.failed_step,
            error: self.error,
            failures: self.failures,
            duration: self.started.elapsed().as_secs_f64() * 1000.0,
            checkpoints: self.state.checkpoints.clone(),
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Proceed,
    Halt,
}

/// How a run is launched
enum Launch {
    Fresh {
        variables: BTreeMap<String, String>,
        options: RunOptions,
    },
    Continue(WorkflowState),
}

struct StepOutcome {
    result: Result<StepOutput>,
    duration_ms: f64,
}

/// Removes a chain from the active set when its run ends
struct ActiveGuard {
    active: Arc<StdMutex<HashSet<String>>>,
    chain: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        locked(&self.active).remove(&self.chain);
    }
}

/// Runs workflow chains against a [`CommandExecutor`].
///
/// Cheap to clone; clones share templates, state and pause requests.
/// Concurrent runs of the same chain are rejected.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<RwLock<TemplateRegistry>>,
    executor: Arc<dyn CommandExecutor>,
    store: StateStore,
    pause_requests: Arc<StdMutex<HashSet<String>>>,
    active: Arc<StdMutex<HashSet<String>>>,
}

impl WorkflowEngine {
    pub async fn new(
        registry: TemplateRegistry,
        executor: Arc<dyn CommandExecutor>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            executor,
            store: StateStore::open(state_path).await,
            pause_requests: Arc::new(StdMutex::new(HashSet::new())),
            active: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Built-in chains plus discovered templates, state from `config`
    pub async fn open(config: &FlowConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let mut registry = TemplateRegistry::new();
        registry.load_dir(&config.templates_path()).await?;
        Ok(Self::new(registry, executor, config.state_path()).await)
    }

    /// File backing every chain's run state
    pub fn state_path(&self) -> &Path {
        self.store.path()
    }

    pub async fn register(&self, chain: WorkflowChain) {
        self.registry.write().await.register(chain);
    }

    pub async fn templates(&self) -> Vec<WorkflowChain> {
        self.registry.read().await.list().into_iter().cloned().collect()
    }

    /// Run `chain_name` from the top, replacing any previous state
    pub async fn run(
        &self,
        chain_name: &str,
        variables: BTreeMap<String, String>,
        options: RunOptions,
    ) -> Result<WorkflowResult> {
        let chain = self.chain(chain_name).await?;
        self.launch(chain, Launch::Fresh { variables, options }).await
    }

    /// Stop a running chain before its next step.
    ///
    /// A step already in flight is never interrupted. Returns true when a
    /// run live on this engine will honour the request; otherwise only the
    /// stored state is marked paused, and a run driven by another process
    /// is not reached.
    pub async fn pause(&self, chain_name: &str) -> Result<bool> {
        let mut state = self.require_state(chain_name).await?;
        let paused = transition(Some(state.status), RunEvent::Pause)?;

        if self.is_active(chain_name) {
            locked(&self.pause_requests).insert(chain_name.to_string());
            info!("Pause requested for {}", chain_name);
            return Ok(true);
        }

        state.status = paused;
        state.current = None;
        self.store.put(&state).await?;
        info!("Marked stored state of {} paused", chain_name);
        Ok(false)
    }

    /// Continue a paused chain
    pub async fn resume(&self, chain_name: &str, mode: ResumeMode) -> Result<WorkflowResult> {
        let state = self.require_state(chain_name).await?;
        transition(Some(state.status), RunEvent::Resume)?;
        let chain = self.chain(chain_name).await?;

        info!("Resuming {} ({:?})", chain_name, mode);
        match mode {
            ResumeMode::FromScratch => {
                let launch = Launch::Fresh {
                    variables: state.variables,
                    options: state.options,
                };
                self.launch(chain, launch).await
            }
            ResumeMode::FromPending => self.launch(chain, Launch::Continue(state)).await,
        }
    }

    /// Apply the most recent checkpoint to the stored state.
    ///
    /// Refused while the chain is running on this engine.
    pub async fn rollback(&self, chain_name: &str) -> Result<CheckpointData> {
        if self.is_active(chain_name) {
            return Err(FlowError::InvalidTransition(format!(
                "cannot roll back {} while it is running",
                chain_name
            )));
        }
        let mut state = self.require_state(chain_name).await?;
        let checkpoint = state
            .latest_checkpoint()
            .cloned()
            .ok_or_else(|| FlowError::NoCheckpoint(chain_name.to_string()))?;

        restore_latest(&mut state);
        self.store.put(&state).await?;
        info!(
            "Rolled back {} to checkpoint at {}",
            chain_name, checkpoint.timestamp
        );
        Ok(checkpoint)
    }

    pub async fn status(&self, chain_name: &str) -> Result<WorkflowState> {
        self.require_state(chain_name).await
    }

    pub async fn statuses(&self) -> Vec<WorkflowState> {
        self.store.all().await
    }

    /// Drop every completed or failed run
    pub async fn clear_completed(&self) -> Result<usize> {
        self.store.retain(|s| !s.status.is_terminal()).await
    }

    /// Drop the state of one chain
    pub async fn cleanup(&self, chain_name: &str) -> Result<bool> {
        self.store.remove(chain_name).await
    }

    async fn chain(&self, name: &str) -> Result<WorkflowChain> {
        Ok(self.registry.read().await.require(name)?.clone())
    }

    async fn require_state(&self, chain_name: &str) -> Result<WorkflowState> {
        self.store
            .get(chain_name)
            .await
            .ok_or_else(|| FlowError::ChainNotFound(chain_name.to_string()))
    }

    fn is_active(&self, chain_name: &str) -> bool {
        locked(&self.active).contains(chain_name)
    }

    fn claim(&self, chain_name: &str) -> Result<ActiveGuard> {
        if !locked(&self.active).insert(chain_name.to_string()) {
            return Err(FlowError::InvalidTransition(format!(
                "{} is already running",
                chain_name
            )));
        }
        Ok(ActiveGuard {
            active: Arc::clone(&self.active),
            chain: chain_name.to_string(),
        })
    }

    fn take_pause_request(&self, chain_name: &str) -> bool {
        locked(&self.pause_requests).remove(chain_name)
    }

    async fn launch(&self, chain: WorkflowChain, launch: Launch) -> Result<WorkflowResult> {
        let _guard = self.claim(&chain.name)?;
        self.take_pause_request(&chain.name);

        let (state, plan) = match launch {
            Launch::Fresh { variables, options } => {
                let previous = self.store.get(&chain.name).await.map(|s| s.status);
                let plan = Plan::new(&chain, &variables);
                let mut state = WorkflowState::new(&chain.name, variables, options, plan.labels());
                state.status = transition(previous, RunEvent::Start)?;
                (state, plan)
            }
            Launch::Continue(mut state) => {
                state.status = transition(Some(state.status), RunEvent::Resume)?;
                state.current = None;
                let plan = Plan::new(&chain, &state.variables).restrict_to(&state.pending);
                (state, plan)
            }
        };

        info!(
            "Running {} ({} steps, {} parallel groups, {})",
            chain.name,
            plan.sequential.len(),
            plan.groups.len(),
            state.options.failure_strategy
        );

        let mut run = Run::new(state);
        self.store.put(&run.state).await?;
        self.drive(&chain, &plan, &mut run).await?;

        info!("{} finished as {}", chain.name, run.state.status);
        Ok(run.into_result())
    }

    async fn drive(&self, chain: &WorkflowChain, plan: &Plan, run: &mut Run) -> Result<()> {
        let yolo_mode = run.state.options.yolo_mode;

        for (idx, step) in plan.sequential.iter().enumerate() {
            if self.pause_if_requested(run).await? {
                return Ok(());
            }

            run.state.current = Some(step.label.clone());
            self.store.put(&run.state).await?;

            let outcome = self.execute_step(step, yolo_mode).await;
            run.record_execution(step, outcome.result.is_ok(), outcome.duration_ms);

            match outcome.result {
                Ok(_) => {
                    run.complete(&step.label);
                    let next = plan.sequential.get(idx + 1).map(|s| s.label.as_str());
                    if should_checkpoint(chain.checkpoint_strategy, &step.label, step.checkpoint, next) {
                        self.checkpoint(run).await;
                    }
                    self.store.put(&run.state).await?;
                }
                Err(e) => {
                    run.record_failure(&step.label, &e);
                    if self.apply_failure_strategy(chain, run).await? == Flow::Halt {
                        return Ok(());
                    }
                }
            }
        }

        for group in &plan.groups {
            if self.pause_if_requested(run).await? {
                return Ok(());
            }

            run.state.current = Some(group.name.clone());
            self.store.put(&run.state).await?;
            debug!("Running parallel group {} ({} steps)", group.name, group.steps.len());

            // Settle-all: every branch finishes before the group is judged
            let outcomes =
                join_all(group.steps.iter().map(|step| self.execute_step(step, yolo_mode))).await;

            let mut failed = false;
            let mut checkpoint_due = false;
            for (step, outcome) in group.steps.iter().zip(outcomes) {
                run.record_execution(step, outcome.result.is_ok(), outcome.duration_ms);
                match outcome.result {
                    Ok(_) => {
                        run.complete(&step.label);
                        checkpoint_due |= should_checkpoint(
                            chain.checkpoint_strategy,
                            &step.label,
                            step.checkpoint,
                            None,
                        );
                    }
                    Err(e) => {
                        run.record_failure(&step.label, &e);
                        failed = true;
                    }
                }
            }

            if failed {
                if self.apply_failure_strategy(chain, run).await? == Flow::Halt {
                    return Ok(());
                }
            } else {
                if checkpoint_due {
                    self.checkpoint(run).await;
                }
                self.store.put(&run.state).await?;
            }
        }

        // Only continue-on-error gets here with failures, and it masks them
        run.state.status = transition(Some(run.state.status), RunEvent::Finish)?;
        run.state.current = None;
        self.store.put(&run.state).await
    }

    async fn execute_step(&self, step: &ResolvedStep, yolo_mode: bool) -> StepOutcome {
        let started = Instant::now();
        let result = self
            .executor
            .execute(&step.command, &step.args, yolo_mode)
            .await;

        StepOutcome {
            result,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    async fn apply_failure_strategy(&self, chain: &WorkflowChain, run: &mut Run) -> Result<Flow> {
        match run.state.options.failure_strategy {
            FailureStrategy::ContinueOnError => {
                self.store.put(&run.state).await?;
                Ok(Flow::Proceed)
            }
            FailureStrategy::StopOnError => {
                self.fail(run).await?;
                Ok(Flow::Halt)
            }
            FailureStrategy::RollbackOnError => {
                if !chain.rollback {
                    debug!("Rollback disabled for {}", chain.name);
                } else if restore_latest(&mut run.state) {
                    info!("Restored {} to its latest checkpoint", chain.name);
                } else {
                    warn!("No checkpoint to restore for {}", chain.name);
                }
                self.fail(run).await?;
                Ok(Flow::Halt)
            }
        }
    }

    async fn fail(&self, run: &mut Run) -> Result<()> {
        run.state.status = transition(Some(run.state.status), RunEvent::Fail)?;
        run.state.current = None;
        self.store.put(&run.state).await
    }

    async fn checkpoint(&self, run: &mut Run) {
        let signal = fail_open("checkpoint signal", || self.executor.checkpoint_signal())
            .await
            .flatten();
        let checkpoint = record(&mut run.state, signal);
        debug!(
            "Checkpoint for {}: {} completed, {} pending",
            run.state.chain,
            checkpoint.snapshot.completed.len(),
            checkpoint.snapshot.pending.len()
        );
    }

    async fn pause_if_requested(&self, run: &mut Run) -> Result<bool> {
        if !self.take_pause_request(&run.state.chain) {
            return Ok(false);
        }

        run.state.status = transition(Some(run.state.status), RunEvent::Pause)?;
        run.state.current = None;
        self.store.put(&run.state).await?;
        info!("Paused {} with {} steps pending", run.state.chain, run.state.pending.len());
        Ok(true)
    }
}
