//! Checkpoint policy and restore

use chrono::Utc;
use flowmine_core::CheckpointStrategy;
use serde_json::Value;

use crate::state::{CheckpointData, WorkflowState};

/// Whether a successful step earns a checkpoint.
///
/// `next` is the label of the sequential step that follows, if any.
pub fn should_checkpoint(
    strategy: CheckpointStrategy,
    step: &str,
    flagged: bool,
    next: Option<&str>,
) -> bool {
    match strategy {
        CheckpointStrategy::AfterEach => true,
        CheckpointStrategy::AfterPhase => step.contains("phase"),
        CheckpointStrategy::BeforeExecute => next.is_some_and(|n| n.contains("execute")),
        CheckpointStrategy::Manual => flagged,
    }
}

/// Snapshot `state` and append it to its checkpoints
pub fn record(state: &mut WorkflowState, external_state: Option<Value>) -> CheckpointData {
    let checkpoint = CheckpointData {
        timestamp: Utc::now(),
        snapshot: state.snapshot(),
        external_state,
    };
    state.checkpoints.push(checkpoint.clone());
    checkpoint
}

/// Reset completed and pending to the latest checkpoint.
///
/// Returns false when there is nothing to restore.
pub fn restore_latest(state: &mut WorkflowState) -> bool {
    match state.latest_checkpoint().map(|c| c.snapshot.clone()) {
        Some(snapshot) => {
            state.completed = snapshot.completed;
            state.pending = snapshot.pending;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunOptions;
    use std::collections::BTreeMap;

    #[test]
    fn test_policy() {
        use CheckpointStrategy::*;

        assert!(should_checkpoint(AfterEach, "progress", false, None));
        assert!(should_checkpoint(AfterPhase, "plan-phase 01", false, None));
        assert!(!should_checkpoint(AfterPhase, "progress", false, None));
        assert!(should_checkpoint(
            BeforeExecute,
            "plan-phase 01",
            false,
            Some("execute-phase 01")
        ));
        assert!(!should_checkpoint(BeforeExecute, "execute-phase 01", false, None));
        assert!(should_checkpoint(Manual, "audit", true, None));
        assert!(!should_checkpoint(Manual, "audit", false, None));
    }

    #[test]
    fn test_record_and_restore() {
        let mut state = WorkflowState::new(
            "c",
            BTreeMap::new(),
            RunOptions::default(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        );
        assert!(!restore_latest(&mut state));

        state.mark_completed("a");
        record(&mut state, None);
        state.mark_completed("b");

        assert!(restore_latest(&mut state));
        assert_eq!(state.completed, vec!["a"]);
        assert_eq!(state.pending, vec!["b", "c"]);
    }
}
