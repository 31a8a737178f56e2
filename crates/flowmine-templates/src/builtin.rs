//! Built-in workflow chains

use flowmine_core::{CheckpointStrategy, ParallelGroup, WorkflowChain, WorkflowStep};

/// Every built-in chain
pub fn builtin_chains() -> Vec<WorkflowChain> {
    vec![full_cycle(), quick_fix(), project_setup(), milestone_complete()]
}

/// Research -> Plan -> Execute -> Verify
pub fn full_cycle() -> WorkflowChain {
    WorkflowChain::new("full-cycle", "Research -> Plan -> Execute -> Verify")
        .with_step(WorkflowStep::new("gsi:research-phase").with_args("${phase}"))
        .with_step(WorkflowStep::new("gsi:plan-phase").with_args("${phase}"))
        .with_step(WorkflowStep::new("gsi:execute-phase").with_args("${phase}"))
        .with_step(WorkflowStep::new("gsi:verify-work").with_args("${phase}"))
        .with_checkpoint(CheckpointStrategy::AfterEach)
        .with_rollback(true)
}

/// Plan -> Execute -> Verify, without research
pub fn quick_fix() -> WorkflowChain {
    WorkflowChain::new("quick-fix", "Plan -> Execute -> Verify (skip research)")
        .with_step(WorkflowStep::new("gsi:plan-phase").with_args("${phase} --skip-research"))
        .with_step(WorkflowStep::new("gsi:execute-phase").with_args("${phase}"))
        .with_step(WorkflowStep::new("gsi:verify-work").with_args("${phase}"))
        .with_checkpoint(CheckpointStrategy::BeforeExecute)
        .with_rollback(true)
}

pub fn project_setup() -> WorkflowChain {
    WorkflowChain::new("project-setup", "Initialize new project with all phases")
        .with_step(WorkflowStep::new("gsi:new-project"))
        .with_step(WorkflowStep::new("gsi:map-codebase"))
        .with_step(WorkflowStep::new("gsi:add-phase").with_args("\"Foundation\""))
        .with_step(WorkflowStep::new("gsi:plan-phase").with_args("01"))
        .with_parallel(ParallelGroup {
            name: "status-check".to_string(),
            steps: vec![
                WorkflowStep::new("gsi:check-todos"),
                WorkflowStep::new("gsi:progress"),
            ],
        })
        .with_checkpoint(CheckpointStrategy::AfterPhase)
        .with_rollback(false)
}

pub fn milestone_complete() -> WorkflowChain {
    WorkflowChain::new("milestone-complete", "Complete milestone and prepare next")
        .with_step(WorkflowStep::new("gsi:audit-milestone").checkpointed())
        .with_step(WorkflowStep::new("gsi:verify-work").with_args("--all"))
        .with_step(WorkflowStep::new("gsi:complete-milestone").checkpointed())
        .with_step(WorkflowStep::new("gsi:new-milestone"))
        .with_checkpoint(CheckpointStrategy::Manual)
        .with_rollback(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_unique() {
        let chains = builtin_chains();
        let mut names: Vec<&str> = chains.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), chains.len());
    }

    #[test]
    fn test_project_setup_has_status_group() {
        let chain = project_setup();
        assert_eq!(chain.parallel_groups.len(), 1);
        assert_eq!(chain.parallel_groups[0].steps.len(), 2);
        assert!(!chain.rollback);
    }

    #[test]
    fn test_manual_chain_marks_checkpoints() {
        let chain = milestone_complete();
        let marked = chain.steps.iter().filter(|s| s.checkpoint).count();
        assert_eq!(marked, 2);
    }
}
