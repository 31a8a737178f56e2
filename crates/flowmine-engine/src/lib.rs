//! # flowmine-engine
//!
//! Runs workflow chains step by step with checkpoints, failure strategies,
//! pause and resume, and rollback. Run state survives restarts in a single
//! JSON document.

mod checkpoint;
mod engine;
mod executor;
mod state;
pub mod state_machine;
mod state_store;

pub use checkpoint::should_checkpoint;
pub use engine::WorkflowEngine;
pub use executor::{CommandExecutor, MockExecutor, ShellExecutor, StepOutput};
pub use state::{
    CheckpointData, ResumeMode, RunOptions, StateSnapshot, StepFailure, WorkflowResult,
    WorkflowState,
};
pub use state_machine::{transition, RunEvent, RunStatus};
pub use state_store::StateStore;
