use flowmine_core::config::OptimizerConfig;
use flowmine_core::{
    CommandExecution, CommandSequence, OptimizationKind, Operation, SequenceSource,
};
use flowmine_mining::{quality_score, HistoryStore, MiningOptions, PatternMiner};
use proptest::prelude::*;
use tempfile::{tempdir, TempDir};

async fn miner_in(dir: &TempDir) -> PatternMiner {
    PatternMiner::new(HistoryStore::open(dir.path().join("workflow-history.json")).await)
}

fn sequence(workflow: Option<&str>, steps: &[(&str, f64)]) -> CommandSequence {
    let mut seq = CommandSequence::new("seq-test", SequenceSource::Workflow).with_commands(
        steps
            .iter()
            .map(|(cmd, duration)| CommandExecution::new(*cmd, true, *duration))
            .collect(),
    );
    seq.workflow_name = workflow.map(str::to_string);
    seq
}

fn phase_cycle() -> CommandSequence {
    sequence(
        None,
        &[
            ("plan-phase 01", 1000.0),
            ("execute-phase 01", 1000.0),
            ("verify-work 01", 1000.0),
        ],
    )
}

fn exact_three() -> MiningOptions {
    MiningOptions {
        min_frequency: 2,
        min_length: 3,
        max_length: 3,
        ..MiningOptions::default()
    }
}

#[tokio::test]
async fn test_three_identical_sequences_yield_one_pattern() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    for _ in 0..3 {
        miner.track_sequence(phase_cycle()).await.unwrap();
    }

    let mined = miner.mine_patterns(&exact_three()).await.unwrap();

    assert_eq!(mined.len(), 1);
    let pattern = &mined[0];
    assert_eq!(pattern.frequency, 3);
    assert_eq!(pattern.success_rate, 1.0);
    assert_eq!(pattern.sequence.len(), 3);
    assert_eq!(pattern.avg_duration, 3000.0);
    assert!(pattern.quality_score > 0.0 && pattern.quality_score <= 100.0);
    assert_eq!(pattern.variables[0].name, "phase");
}

#[tokio::test]
async fn test_mining_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    for _ in 0..3 {
        miner.track_sequence(phase_cycle()).await.unwrap();
    }

    miner.mine_patterns(&MiningOptions::default()).await.unwrap();
    let first: Vec<_> = miner
        .patterns()
        .iter()
        .map(|p| (p.id.clone(), p.frequency, p.quality_score))
        .collect();

    miner.mine_patterns(&MiningOptions::default()).await.unwrap();
    let second: Vec<_> = miner
        .patterns()
        .iter()
        .map(|p| (p.id.clone(), p.frequency, p.quality_score))
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_frequency_is_monotonic() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    for _ in 0..2 {
        miner.track_sequence(phase_cycle()).await.unwrap();
    }
    let before = miner.mine_patterns(&exact_three()).await.unwrap();
    assert_eq!(before[0].frequency, 2);

    miner.track_sequence(phase_cycle()).await.unwrap();
    miner.mine_patterns(&exact_three()).await.unwrap();

    let stored = miner.get_pattern(&before[0].id).unwrap();
    assert_eq!(stored.frequency, 3);
}

#[tokio::test]
async fn test_patterns_persist_across_reopen() {
    let dir = tempdir().unwrap();
    let id = {
        let mut miner = miner_in(&dir).await;
        for _ in 0..2 {
            miner.track_sequence(phase_cycle()).await.unwrap();
        }
        miner.mine_patterns(&exact_three()).await.unwrap()[0].id.clone()
    };

    let reopened = miner_in(&dir).await;
    assert!(reopened.get_pattern(&id).is_some());
    assert_eq!(reopened.store().stats().patterns_discovered, 1);
    assert_eq!(reopened.store().stats().total_sequences, 2);
}

#[tokio::test]
async fn test_list_commands_pair_for_parallel() {
    let dir = tempdir().unwrap();
    let lenient = OptimizerConfig {
        min_parallel_distance: 1,
        min_parallel_savings_ms: 0.0,
    };
    let mut miner = miner_in(&dir).await.with_optimizer(lenient);
    miner
        .track_sequence(sequence(
            Some("status-check"),
            &[
                ("list-status", 200.0),
                ("list-progress", 1500.0),
                ("execute-phase 01", 100.0),
            ],
        ))
        .await
        .unwrap();

    let suggestions = miner.analyze_optimizations("status-check");
    let parallel: Vec<_> = suggestions
        .iter()
        .filter(|s| s.kind == OptimizationKind::Parallel)
        .collect();

    assert_eq!(parallel.len(), 1);
    assert_eq!(parallel[0].steps, vec!["list-status", "list-progress"]);
    assert_eq!(parallel[0].estimated_time_savings, 200.0);
    assert!(suggestions
        .iter()
        .all(|s| !s.steps.iter().any(|step| step == "execute-phase 01")));
}

#[tokio::test]
async fn test_default_thresholds_reject_small_adjacent_pair() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    miner
        .track_sequence(sequence(
            Some("status-check"),
            &[
                ("list-status", 200.0),
                ("list-progress", 1500.0),
                ("execute-phase 01", 100.0),
            ],
        ))
        .await
        .unwrap();

    let suggestions = miner.analyze_optimizations("status-check");
    assert!(suggestions
        .iter()
        .all(|s| s.kind != OptimizationKind::Parallel));
}

#[test]
fn test_read_only_verbs_are_independent() {
    let verbs = ["check-todos", "list-status", "gsi:progress", "verify-work", "get-config"];
    for a in verbs {
        for b in verbs {
            let (x, y) = (Operation::classify(a, None), Operation::classify(b, None));
            assert!(x.independent_of(&y), "{a} / {b}");
        }
    }

    let write = Operation::classify("update-roadmap", None);
    for a in verbs {
        assert!(!Operation::classify(a, None).independent_of(&write), "{a}");
    }
}

#[tokio::test]
async fn test_attach_optimizations_feeds_patterns() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    let daily = [
        ("check-todos", 2000.0),
        ("plan-phase 01", 100.0),
        ("progress", 1500.0),
    ];
    for _ in 0..2 {
        miner
            .track_sequence(sequence(Some("daily"), &daily))
            .await
            .unwrap();
    }
    miner.mine_patterns(&MiningOptions::default()).await.unwrap();

    let changed = miner.attach_optimizations("daily").await.unwrap();
    assert_eq!(changed, 1);

    let full = miner
        .patterns()
        .iter()
        .find(|p| p.sequence.len() == 3)
        .unwrap();
    assert_eq!(full.optimizations.len(), 1);
    assert_eq!(full.optimizations[0].steps, vec!["check-todos", "progress"]);

    // Attaching again changes nothing
    assert_eq!(miner.attach_optimizations("daily").await.unwrap(), 0);
}

#[tokio::test]
async fn test_analyze_workflows_report() {
    let dir = tempdir().unwrap();
    let mut miner = miner_in(&dir).await;
    for _ in 0..2 {
        miner
            .track_sequence(sequence(
                Some("daily"),
                &[("progress", 100.0), ("check-todos", 5000.0), ("progress", 200.0)],
            ))
            .await
            .unwrap();
    }
    miner.mine_patterns(&MiningOptions::default()).await.unwrap();

    let report = miner.analyze_workflows();
    assert_eq!(report.total_patterns, miner.patterns().len());
    assert!(report.top_patterns.len() <= 10);
    assert!(report
        .top_patterns
        .windows(2)
        .all(|w| w[0].quality_score >= w[1].quality_score));
    assert_eq!(report.optimization_opportunities, 2);
}

proptest! {
    #[test]
    fn prop_quality_score_bounded(
        frequency in 0u64..10_000,
        success in -1.0f64..2.0,
        savings in -1e6f64..1e9,
        length in 0usize..100,
    ) {
        let q = quality_score(frequency, success, savings, length);
        prop_assert!((0.0..=100.0).contains(&q));
    }
}
