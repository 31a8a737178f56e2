//! Turn scored patterns into workflow chains

use flowmine_core::{
    CheckpointStrategy, DiscoveredPattern, FlowConfig, FlowError, OptimizationKind, ParallelGroup,
    PatternVariable, Result, TemplateMetadata, WorkflowChain, WorkflowStep,
};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::registry::TemplateRegistry;

/// Chains with a success rate above this get rollback enabled
const ROLLBACK_SUCCESS_RATE: f64 = 0.8;

/// One item a batch could not produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of a batch synthesis. Batches never abort on a single item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build the chain for a single pattern
pub fn synthesize(pattern: &DiscoveredPattern) -> Result<WorkflowChain> {
    if pattern.sequence.is_empty() {
        return Err(FlowError::Validation(format!(
            "Pattern {} has an empty sequence",
            pattern.id
        )));
    }

    let rules = compile_rules(&pattern.variables)?;
    let (parallel_groups, grouped) = parallel_groups(pattern, &rules);

    let mut remaining = grouped;
    let mut steps: Vec<WorkflowStep> = pattern
        .sequence
        .iter()
        .filter(|cmd| {
            // Each grouped command is dropped once from the sequential steps
            match remaining.iter().position(|g| g == *cmd) {
                Some(idx) => {
                    remaining.swap_remove(idx);
                    false
                }
                None => true,
            }
        })
        .map(|cmd| templated_step(cmd, &rules))
        .collect();

    let last = steps.len().saturating_sub(1);
    for (idx, step) in steps.iter_mut().enumerate() {
        step.checkpoint = idx == 0 || idx == last;
    }

    let checkpoint_strategy = if pattern.sequence.iter().any(|c| c.contains("execute")) {
        CheckpointStrategy::BeforeExecute
    } else if pattern.sequence.iter().any(|c| c.contains("phase")) {
        CheckpointStrategy::AfterPhase
    } else {
        CheckpointStrategy::AfterEach
    };

    Ok(WorkflowChain {
        name: pattern.name.clone(),
        description: pattern.description.clone(),
        steps,
        parallel_groups,
        checkpoint_strategy,
        rollback: pattern.success_rate > ROLLBACK_SUCCESS_RATE,
        metadata: Some(TemplateMetadata {
            pattern_id: pattern.id.clone(),
            frequency: pattern.frequency,
            success_rate: pattern.success_rate,
            quality_score: pattern.quality_score,
            discovered_at: pattern.first_seen,
            auto_generated: true,
        }),
    })
}

/// Look up `pattern_id` and synthesize it
pub fn generate_template(patterns: &[DiscoveredPattern], pattern_id: &str) -> Result<WorkflowChain> {
    let pattern = patterns
        .iter()
        .find(|p| p.id == pattern_id)
        .ok_or_else(|| FlowError::PatternNotFound(pattern_id.to_string()))?;
    synthesize(pattern)
}

/// Synthesized chain for `pattern_id` as pretty JSON
pub fn export_pattern(patterns: &[DiscoveredPattern], pattern_id: &str) -> Result<String> {
    let chain = generate_template(patterns, pattern_id)?;
    Ok(serde_json::to_string_pretty(&chain)?)
}

/// Writes synthesized chains into the discovered templates directory
pub struct TemplateSynthesizer {
    templates_dir: PathBuf,
    min_quality_score: f64,
    written: TemplateRegistry,
}

impl TemplateSynthesizer {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            min_quality_score: 50.0,
            written: TemplateRegistry::empty(),
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(config.templates_path()).with_min_quality(config.synthesis.min_quality_score)
    }

    pub fn with_min_quality(mut self, min_quality_score: f64) -> Self {
        self.min_quality_score = min_quality_score;
        self
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    /// Chains written by this synthesizer so far
    pub fn written(&self) -> &TemplateRegistry {
        &self.written
    }

    /// Synthesize and persist one chain, returning its path
    pub async fn write_template(&mut self, pattern: &DiscoveredPattern) -> Result<PathBuf> {
        let chain = synthesize(pattern)?;
        let path = self.written.save(chain, &self.templates_dir).await?;
        debug!("Wrote template {} for {}", path.display(), pattern.id);
        Ok(path)
    }

    /// Write a template for every pattern at or above the quality cut-off
    pub async fn generate_all_templates(&mut self, patterns: &[DiscoveredPattern]) -> BatchReport {
        let selected: Vec<&DiscoveredPattern> = patterns
            .iter()
            .filter(|p| p.quality_score >= self.min_quality_score)
            .collect();

        info!(
            "Generating templates for {} of {} patterns (quality >= {})",
            selected.len(),
            patterns.len(),
            self.min_quality_score
        );
        self.write_batch(selected.into_iter().map(|p| (p.id.as_str(), Some(p))))
            .await
    }

    /// Write templates for an explicit id list
    pub async fn batch_generate(&mut self, patterns: &[DiscoveredPattern], ids: &[String]) -> BatchReport {
        let items = ids
            .iter()
            .map(|id| (id.as_str(), patterns.iter().find(|p| &p.id == id)));
        self.write_batch(items).await
    }

    async fn write_batch<'a>(
        &mut self,
        items: impl Iterator<Item = (&'a str, Option<&'a DiscoveredPattern>)>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for (id, pattern) in items {
            let outcome = match pattern {
                Some(pattern) => self.write_template(pattern).await,
                None => Err(FlowError::PatternNotFound(id.to_string())),
            };

            match outcome {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    warn!("Template for {} failed: {}", id, e);
                    report.failures.push(BatchFailure {
                        id: id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Compiled extraction rule paired with its variable name
struct Rule {
    name: String,
    regex: Regex,
}

fn compile_rules(variables: &[PatternVariable]) -> Result<Vec<Rule>> {
    variables
        .iter()
        .map(|v| {
            Regex::new(&v.extraction)
                .map(|regex| Rule {
                    name: v.name.clone(),
                    regex,
                })
                .map_err(|e| {
                    FlowError::Validation(format!("Bad extraction for {}: {}", v.name, e))
                })
        })
        .collect()
}

/// Split `cmd` into its first token and a templated argument tail
fn templated_step(cmd: &str, rules: &[Rule]) -> WorkflowStep {
    let (command, tail) = match cmd.split_once(' ') {
        Some((command, tail)) => (command, tail.trim()),
        None => (cmd, ""),
    };

    let step = WorkflowStep::new(command);
    if tail.is_empty() {
        return step;
    }

    let args = rules.iter().fold(tail.to_string(), |acc, rule| {
        let placeholder = format!("${{{}}}", rule.name);
        rule.regex
            .replace_all(&acc, NoExpand(&placeholder))
            .into_owned()
    });
    step.with_args(args)
}

/// Non-overlapping groups from the pattern's parallel suggestions, taken
/// greedily in order. Also returns the commands the groups consumed.
fn parallel_groups(pattern: &DiscoveredPattern, rules: &[Rule]) -> (Vec<ParallelGroup>, Vec<String>) {
    let mut used: HashSet<&str> = HashSet::new();
    let mut groups = Vec::new();
    let mut grouped = Vec::new();

    for suggestion in pattern
        .optimizations
        .iter()
        .filter(|o| o.kind == OptimizationKind::Parallel)
    {
        let overlaps = suggestion.steps.iter().any(|s| used.contains(s.as_str()));
        let present = suggestion.steps.iter().all(|s| pattern.sequence.contains(s));
        if overlaps || !present {
            continue;
        }

        used.extend(suggestion.steps.iter().map(String::as_str));
        grouped.extend(suggestion.steps.iter().cloned());
        groups.push(ParallelGroup {
            name: format!("parallel-{}", suggestion.steps.join("-")),
            steps: suggestion
                .steps
                .iter()
                .map(|s| templated_step(s, rules))
                .collect(),
        });
    }

    (groups, grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowmine_core::{OptimizationSuggestion, RiskLevel, VariableType};

    fn pattern(sequence: &[&str]) -> DiscoveredPattern {
        DiscoveredPattern {
            id: "pattern-test".to_string(),
            name: "test-pattern".to_string(),
            description: "Discovered pattern: test".to_string(),
            sequence: sequence.iter().map(|s| s.to_string()).collect(),
            frequency: 3,
            success_rate: 0.9,
            avg_duration: 100.0,
            time_savings: 0.0,
            quality_score: 60.0,
            variables: vec![PatternVariable {
                name: "phase".to_string(),
                var_type: VariableType::Phase,
                extraction: r"(\d+(?:\.\d+)?)".to_string(),
                required: true,
                default_value: None,
            }],
            optimizations: Vec::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            sources: Vec::new(),
        }
    }

    fn parallel(steps: &[&str]) -> OptimizationSuggestion {
        OptimizationSuggestion {
            kind: OptimizationKind::Parallel,
            steps: steps.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
            estimated_time_savings: 1500.0,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_steps_are_templated() {
        let chain = synthesize(&pattern(&["plan-phase 02", "execute-phase 02", "progress"])).unwrap();

        assert_eq!(chain.steps.len(), 3);
        assert_eq!(chain.steps[0].command, "plan-phase");
        assert_eq!(chain.steps[0].args.as_deref(), Some("${phase}"));
        assert_eq!(chain.steps[2].args, None);
        assert!(chain.steps[0].checkpoint);
        assert!(!chain.steps[1].checkpoint);
        assert!(chain.steps[2].checkpoint);
        assert!(chain.rollback);
        assert_eq!(chain.metadata.unwrap().pattern_id, "pattern-test");
    }

    #[test]
    fn test_checkpoint_strategy_selection() {
        let exec = synthesize(&pattern(&["plan-phase 01", "execute-phase 02"])).unwrap();
        assert_eq!(exec.checkpoint_strategy, CheckpointStrategy::BeforeExecute);

        let phase = synthesize(&pattern(&["plan-phase 01", "verify-work 01"])).unwrap();
        assert_eq!(phase.checkpoint_strategy, CheckpointStrategy::AfterPhase);

        let plain = synthesize(&pattern(&["progress", "check-todos"])).unwrap();
        assert_eq!(plain.checkpoint_strategy, CheckpointStrategy::AfterEach);
    }

    #[test]
    fn test_rollback_threshold_is_strict() {
        let mut p = pattern(&["a", "b"]);
        p.success_rate = 0.8;
        assert!(!synthesize(&p).unwrap().rollback);
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let err = synthesize(&pattern(&[])).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn test_unknown_pattern() {
        let err = generate_template(&[pattern(&["a", "b"])], "pattern-nope").unwrap_err();
        assert!(matches!(err, FlowError::PatternNotFound(_)));
    }

    #[test]
    fn test_parallel_groups_do_not_duplicate_steps() {
        let mut p = pattern(&["check-todos", "plan-phase 01", "progress", "list-status"]);
        p.optimizations = vec![
            parallel(&["check-todos", "progress"]),
            parallel(&["progress", "list-status"]),
        ];

        let chain = synthesize(&p).unwrap();

        assert_eq!(chain.parallel_groups.len(), 1);
        assert_eq!(chain.parallel_groups[0].name, "parallel-check-todos-progress");

        let sequential: Vec<String> = chain.steps.iter().map(|s| s.label()).collect();
        assert_eq!(sequential, vec!["plan-phase ${phase}", "list-status"]);

        let total = chain.all_steps().count();
        assert_eq!(total, p.sequence.len());
    }

    #[test]
    fn test_export_is_chain_json() {
        let patterns = vec![pattern(&["plan-phase 01", "execute-phase 01"])];
        let json = export_pattern(&patterns, "pattern-test").unwrap();
        let back: WorkflowChain = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "test-pattern");
    }
}
