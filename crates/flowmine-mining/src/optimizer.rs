//! Optimization analysis over sealed sequences
//!
//! Pure functions over typed executions. Nothing here touches the store.

use flowmine_core::config::OptimizerConfig;
use flowmine_core::{
    CommandExecution, CommandSequence, OptimizationKind, OptimizationSuggestion, RiskLevel,
};
use std::collections::HashSet;

/// Analyze every sealed sequence tagged with `workflow_name`.
///
/// Suggestions are deduplicated by `(kind, steps)` and sorted by estimated
/// savings, highest first.
pub fn analyze_optimizations<'a>(
    sequences: impl IntoIterator<Item = &'a CommandSequence>,
    workflow_name: &str,
    config: &OptimizerConfig,
) -> Vec<OptimizationSuggestion> {
    let mut suggestions = Vec::new();

    for seq in sequences
        .into_iter()
        .filter(|s| s.is_sealed() && s.workflow_name.as_deref() == Some(workflow_name))
    {
        suggestions.extend(find_parallel(&seq.commands, config));
        suggestions.extend(find_skips(&seq.commands));
        suggestions.extend(find_reorders(&seq.commands));
        suggestions.extend(find_merges(&seq.commands));
    }

    let mut unique = deduplicate(suggestions);
    unique.sort_by(|a, b| b.estimated_time_savings.total_cmp(&a.estimated_time_savings));
    unique
}

/// Pairs far enough apart that are independent and worth running together
pub fn find_parallel(
    commands: &[CommandExecution],
    config: &OptimizerConfig,
) -> Vec<OptimizationSuggestion> {
    let distance = config.min_parallel_distance.max(1);
    let mut suggestions = Vec::new();

    for (i, first) in commands.iter().enumerate() {
        for second in commands.iter().skip(i + distance) {
            if !first.operation.independent_of(&second.operation) {
                continue;
            }

            let savings = first.duration.min(second.duration);
            if savings > config.min_parallel_savings_ms {
                let (a, b) = (first.full_command(), second.full_command());
                suggestions.push(OptimizationSuggestion {
                    kind: OptimizationKind::Parallel,
                    description: format!("{} and {} can run in parallel", a, b),
                    steps: vec![a, b],
                    estimated_time_savings: savings,
                    risk_level: RiskLevel::Low,
                });
            }
        }
    }

    suggestions
}

/// Commands repeated verbatim later in the same sequence
pub fn find_skips(commands: &[CommandExecution]) -> Vec<OptimizationSuggestion> {
    let mut seen: Vec<String> = Vec::new();
    let mut suggestions = Vec::new();

    for cmd in commands {
        let full = cmd.full_command();
        match seen.iter().position(|s| s == &full) {
            Some(prev) => suggestions.push(OptimizationSuggestion {
                kind: OptimizationKind::Skip,
                description: format!(
                    "{} is redundant (already executed at step {})",
                    full,
                    prev + 1
                ),
                steps: vec![full],
                estimated_time_savings: cmd.duration,
                risk_level: RiskLevel::Medium,
            }),
            None => seen.push(full),
        }
    }

    suggestions
}

/// A slow step directly ahead of an independent fast one
pub fn find_reorders(commands: &[CommandExecution]) -> Vec<OptimizationSuggestion> {
    commands
        .windows(2)
        .filter(|w| {
            w[0].duration > w[1].duration * 2.0 && w[0].operation.independent_of(&w[1].operation)
        })
        .map(|w| {
            let (slow, fast) = (w[0].full_command(), w[1].full_command());
            OptimizationSuggestion {
                kind: OptimizationKind::Reorder,
                description: format!("Move fast step {} before slow step {}", fast, slow),
                steps: vec![slow, fast],
                estimated_time_savings: (w[0].duration - w[1].duration) * 0.1,
                risk_level: RiskLevel::Medium,
            }
        })
        .collect()
}

/// Adjacent commands sharing a two-token base with different tails
pub fn find_merges(commands: &[CommandExecution]) -> Vec<OptimizationSuggestion> {
    commands
        .windows(2)
        .filter(|w| mergeable(&w[0], &w[1]))
        .map(|w| {
            let (a, b) = (w[0].full_command(), w[1].full_command());
            OptimizationSuggestion {
                kind: OptimizationKind::Merge,
                description: format!("{} and {} could be merged into a single operation", a, b),
                steps: vec![a, b],
                estimated_time_savings: (w[0].duration + w[1].duration) * 0.2,
                risk_level: RiskLevel::High,
            }
        })
        .collect()
}

fn mergeable(first: &CommandExecution, second: &CommandExecution) -> bool {
    let (a, b) = (first.full_command(), second.full_command());
    base_of(&a) == base_of(&b) && a != b
}

fn base_of(command: &str) -> String {
    command.split(' ').take(2).collect::<Vec<_>>().join(" ")
}

fn deduplicate(suggestions: Vec<OptimizationSuggestion>) -> Vec<OptimizationSuggestion> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert((s.kind, s.steps.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmine_core::SequenceSource;

    fn exec(cmd: &str, duration: f64) -> CommandExecution {
        CommandExecution::new(cmd, true, duration)
    }

    fn sealed(name: &str, commands: Vec<CommandExecution>) -> CommandSequence {
        let mut seq = CommandSequence::new(format!("seq-{}", name), SequenceSource::Workflow)
            .with_workflow(name)
            .with_commands(commands);
        seq.seal();
        seq
    }

    #[test]
    fn test_parallel_requires_distance_and_savings() {
        let commands = vec![
            exec("check-todos", 2000.0),
            exec("plan-phase 01", 10.0),
            exec("progress", 1500.0),
        ];

        let found = find_parallel(&commands, &OptimizerConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].steps, vec!["check-todos", "progress"]);
        assert_eq!(found[0].estimated_time_savings, 1500.0);

        // Adjacent pairs are not considered at the default distance
        let adjacent = vec![exec("check-todos", 2000.0), exec("progress", 1500.0)];
        assert!(find_parallel(&adjacent, &OptimizerConfig::default()).is_empty());
    }

    #[test]
    fn test_parallel_savings_threshold_is_strict() {
        let commands = vec![
            exec("list-a", 1000.0),
            exec("other", 1.0),
            exec("list-b", 1000.0),
        ];
        assert!(find_parallel(&commands, &OptimizerConfig::default()).is_empty());
    }

    #[test]
    fn test_skip_repeated_command() {
        let commands = vec![
            exec("progress", 100.0),
            exec("plan-phase 01", 10.0),
            exec("progress", 250.0),
        ];

        let found = find_skips(&commands);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].steps, vec!["progress"]);
        assert_eq!(found[0].estimated_time_savings, 250.0);
        assert!(found[0].description.contains("step 1"));
    }

    #[test]
    fn test_reorder_slow_before_fast() {
        let commands = vec![exec("check-todos", 5000.0), exec("progress", 1000.0)];

        let found = find_reorders(&commands);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].estimated_time_savings, 400.0);

        // Dependent pairs never reorder
        let dependent = vec![exec("execute-phase 01", 5000.0), exec("verify-work 01", 100.0)];
        assert!(find_reorders(&dependent).is_empty());
    }

    #[test]
    fn test_merge_shared_base() {
        let commands = vec![
            exec("gsi claudeception extract", 100.0),
            exec("gsi claudeception export", 300.0),
        ];

        let found = find_merges(&commands);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].estimated_time_savings, 80.0);

        let identical = vec![exec("gsi progress", 1.0), exec("gsi progress", 1.0)];
        assert!(find_merges(&identical).is_empty());
    }

    #[test]
    fn test_analyze_filters_dedupes_and_sorts() {
        let commands = vec![
            exec("progress", 100.0),
            exec("check-todos", 5000.0),
            exec("progress", 200.0),
        ];
        let sequences = vec![
            sealed("daily", commands.clone()),
            sealed("daily", commands),
            sealed("other", vec![exec("progress", 1.0), exec("progress", 1.0)]),
        ];

        let found = analyze_optimizations(&sequences, "daily", &OptimizerConfig::default());

        let kinds: Vec<OptimizationKind> = found.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![OptimizationKind::Reorder, OptimizationKind::Skip]
        );
        assert_eq!(found[0].estimated_time_savings, 480.0);
        assert!(analyze_optimizations(&sequences, "missing", &OptimizerConfig::default()).is_empty());
    }

    #[test]
    fn test_unsealed_sequences_ignored() {
        let seq = CommandSequence::new("open", SequenceSource::Manual)
            .with_workflow("daily")
            .with_commands(vec![exec("progress", 1.0), exec("progress", 1.0)]);

        assert!(analyze_optimizations([&seq], "daily", &OptimizerConfig::default()).is_empty());
    }
}
