use chrono::Utc;
use flowmine_core::{CheckpointStrategy, DiscoveredPattern, FlowError};
use flowmine_templates::{generate_template, TemplateRegistry, TemplateSynthesizer};
use tempfile::tempdir;

fn pattern(id: &str, name: &str, sequence: &[&str], quality: f64) -> DiscoveredPattern {
    DiscoveredPattern {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("Discovered pattern: {}", sequence.join(" -> ")),
        sequence: sequence.iter().map(|s| s.to_string()).collect(),
        frequency: 4,
        success_rate: 1.0,
        avg_duration: 3000.0,
        time_savings: 0.0,
        quality_score: quality,
        variables: Vec::new(),
        optimizations: Vec::new(),
        first_seen: Utc::now(),
        last_seen: Utc::now(),
        sources: vec!["history".to_string()],
    }
}

#[test]
fn test_execute_pattern_checkpoints_before_execute() {
    let patterns = vec![pattern(
        "pattern-exec",
        "plan-phase-execute-phase",
        &["plan-phase 02", "execute-phase 02"],
        70.0,
    )];

    let chain = generate_template(&patterns, "pattern-exec").unwrap();
    assert_eq!(chain.checkpoint_strategy, CheckpointStrategy::BeforeExecute);
}

#[tokio::test]
async fn test_generate_all_respects_quality_cutoff() {
    let dir = tempdir().unwrap();
    let mut synthesizer = TemplateSynthesizer::new(dir.path().join("discovered"));
    let patterns = vec![
        pattern("pattern-a", "good", &["plan-phase 01", "verify-work 01"], 80.0),
        pattern("pattern-b", "edge", &["progress", "check-todos"], 50.0),
        pattern("pattern-c", "weak", &["progress", "list-status"], 49.9),
    ];

    let report = synthesizer.generate_all_templates(&patterns).await;

    assert!(report.is_clean());
    assert_eq!(report.written.len(), 2);
    assert!(dir.path().join("discovered/good.json").exists());
    assert!(!dir.path().join("discovered/weak.json").exists());
    assert_eq!(synthesizer.written().len(), 2);
    assert!(synthesizer.written().get("weak").is_none());

    let mut registry = TemplateRegistry::empty();
    assert_eq!(registry.load_dir(synthesizer.templates_dir()).await.unwrap(), 2);
    let loaded = registry.get("good").unwrap();
    assert!(loaded.metadata.as_ref().unwrap().auto_generated);
}

#[tokio::test]
async fn test_batch_records_failures_and_continues() {
    let dir = tempdir().unwrap();
    let mut synthesizer = TemplateSynthesizer::new(dir.path());
    let patterns = vec![
        pattern("pattern-empty", "empty", &[], 90.0),
        pattern("pattern-ok", "ok", &["progress", "check-todos"], 90.0),
    ];
    let ids = vec![
        "pattern-empty".to_string(),
        "pattern-missing".to_string(),
        "pattern-ok".to_string(),
    ];

    let report = synthesizer.batch_generate(&patterns, &ids).await;

    assert_eq!(report.written.len(), 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].id, "pattern-empty");
    assert_eq!(report.failures[1].id, "pattern-missing");
    assert!(report.failures[1].error.contains("Pattern not found"));
    assert_eq!(synthesizer.written().len(), 1);
    assert!(synthesizer.written().get("ok").is_some());
}

#[test]
fn test_missing_pattern_is_typed_error() {
    let err = generate_template(&[], "pattern-x").unwrap_err();
    assert!(matches!(err, FlowError::PatternNotFound(id) if id == "pattern-x"));
}
