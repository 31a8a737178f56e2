//! Frequent-subsequence mining over the execution history

use chrono::Utc;
use flowmine_core::config::{MiningDefaults, OptimizerConfig};
use flowmine_core::{
    CommandExecution, CommandSequence, DiscoveredPattern, FlowConfig, FlowError,
    OptimizationKind, OptimizationSuggestion, PatternVariable, Result, VariableType,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::history::HistoryStore;
use crate::optimizer;
use crate::recommend::{recommend, PatternRecommendation, RecommendationContext};

/// Extraction rule for numeric phase tokens
pub const PHASE_EXTRACTION: &str = r"(\d+(?:\.\d+)?)";

/// Extraction rule for quoted names
pub const NAME_EXTRACTION: &str = r#""([^"]+)""#;

static PHASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PHASE_EXTRACTION).expect("static regex"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NAME_EXTRACTION).expect("static regex"));

/// Separator hashed between commands when deriving a pattern id
const ID_SEPARATOR: &str = "\u{1f}";

/// Parameters for a mining pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningOptions {
    pub min_frequency: u64,
    pub min_success_rate: f64,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self::from(&MiningDefaults::default())
    }
}

impl From<&MiningDefaults> for MiningOptions {
    fn from(defaults: &MiningDefaults) -> Self {
        Self {
            min_frequency: defaults.min_frequency,
            min_success_rate: defaults.min_success_rate,
            min_length: defaults.min_length,
            max_length: defaults.max_length,
        }
    }
}

impl MiningOptions {
    fn validate(&self) -> Result<()> {
        if self.min_frequency == 0 {
            return Err(FlowError::Validation(
                "min_frequency must be at least 1".to_string(),
            ));
        }
        if self.min_length == 0 {
            return Err(FlowError::Validation(
                "min_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Summary report across all stored patterns and named workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAnalysis {
    pub total_patterns: usize,
    /// Best ten by quality
    pub top_patterns: Vec<DiscoveredPattern>,
    pub optimization_opportunities: usize,
    pub recommendations: Vec<PatternRecommendation>,
}

/// Occurrence tallies for one candidate subsequence
#[derive(Debug, Default)]
struct Tally {
    count: u64,
    duration_sum: f64,
    success_sum: f64,
}

/// Mines patterns out of a [`HistoryStore`] and keeps them in it
pub struct PatternMiner {
    store: HistoryStore,
    window_size: usize,
    optimizer: OptimizerConfig,
}

impl PatternMiner {
    pub fn new(store: HistoryStore) -> Self {
        Self {
            store,
            window_size: MiningDefaults::default().window_size,
            optimizer: OptimizerConfig::default(),
        }
    }

    /// Open the history named by `config` and apply its mining settings
    pub async fn open(config: &FlowConfig) -> Self {
        let store = HistoryStore::open(config.history_path()).await;
        Self::new(store)
            .with_window_size(config.mining.window_size)
            .with_optimizer(config.optimizer.clone())
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut HistoryStore {
        &mut self.store
    }

    pub async fn track_execution(&mut self, execution: CommandExecution) -> Result<()> {
        self.store.track_execution(execution).await
    }

    pub async fn track_sequence(&mut self, sequence: CommandSequence) -> Result<()> {
        self.store.track_sequence(sequence).await
    }

    /// Run one mining pass and merge the result into the pattern store.
    ///
    /// Returns the patterns scored in this pass, not the whole store.
    pub async fn mine_patterns(&mut self, options: &MiningOptions) -> Result<Vec<DiscoveredPattern>> {
        options.validate()?;

        let tallies = self.tally_subsequences(options);
        debug!("Mining: {} candidate subsequences", tallies.len());

        let now = Utc::now();
        let mut scored: Vec<DiscoveredPattern> = tallies
            .into_iter()
            .filter(|(_, tally)| tally.count >= options.min_frequency)
            .map(|(sequence, tally)| {
                let occurrences = tally.count as f64;
                let mut pattern = DiscoveredPattern {
                    id: pattern_id(&sequence),
                    name: pattern_name(&sequence),
                    description: pattern_description(&sequence),
                    variables: extract_variables(&sequence),
                    frequency: tally.count,
                    success_rate: tally.success_sum / occurrences,
                    avg_duration: tally.duration_sum / occurrences,
                    time_savings: 0.0,
                    quality_score: 0.0,
                    optimizations: Vec::new(),
                    first_seen: now,
                    last_seen: now,
                    sources: vec!["history".to_string()],
                    sequence,
                };
                self.score_pattern(&mut pattern);
                pattern
            })
            .filter(|p| p.success_rate >= options.min_success_rate)
            .collect();

        scored.sort_by(|a, b| {
            b.quality_score
                .total_cmp(&a.quality_score)
                .then_with(|| a.id.cmp(&b.id))
        });

        let (mut merged, mut inserted) = (0, 0);
        let stored = &mut self.store.history_mut().patterns;
        for pattern in &scored {
            match stored.iter_mut().find(|p| p.id == pattern.id) {
                Some(existing) => {
                    existing.frequency = existing.frequency.max(pattern.frequency);
                    existing.last_seen = now;
                    existing.success_rate = pattern.success_rate;
                    existing.avg_duration = pattern.avg_duration;
                    existing.time_savings = pattern.time_savings;
                    existing.quality_score = pattern.quality_score;
                    merged += 1;
                }
                None => {
                    stored.push(pattern.clone());
                    inserted += 1;
                }
            }
        }

        info!(
            "Mined {} patterns ({} new, {} merged)",
            scored.len(),
            inserted,
            merged
        );
        self.store.save().await?;
        Ok(scored)
    }

    /// Fill in `time_savings` and `quality_score`
    pub fn score_pattern(&self, pattern: &mut DiscoveredPattern) {
        let len = pattern.sequence.len().max(1) as f64;
        let standalone = pattern
            .sequence
            .first()
            .and_then(|cmd| self.store.command_avg_duration(cmd))
            .filter(|avg| *avg > 0.0)
            .unwrap_or(pattern.avg_duration / len);

        pattern.time_savings = (standalone * len - pattern.avg_duration).max(0.0);
        pattern.quality_score = quality_score(
            pattern.frequency,
            pattern.success_rate,
            pattern.time_savings,
            pattern.sequence.len(),
        );
    }

    pub fn patterns(&self) -> &[DiscoveredPattern] {
        &self.store.history().patterns
    }

    pub fn get_pattern(&self, id: &str) -> Option<&DiscoveredPattern> {
        self.patterns().iter().find(|p| p.id == id)
    }

    /// Case-insensitive search over names, descriptions and commands,
    /// best quality first
    pub fn search_patterns(&self, query: &str) -> Vec<&DiscoveredPattern> {
        let needle = query.to_lowercase();
        let mut found: Vec<&DiscoveredPattern> = self
            .patterns()
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
                    || p.sequence.iter().any(|c| c.to_lowercase().contains(&needle))
            })
            .collect();

        found.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
        found
    }

    pub fn get_recommendations(&self, context: &RecommendationContext) -> Vec<PatternRecommendation> {
        recommend(self.patterns(), context)
    }

    pub fn analyze_optimizations(&self, workflow_name: &str) -> Vec<OptimizationSuggestion> {
        optimizer::analyze_optimizations(self.store.sealed_sequences(), workflow_name, &self.optimizer)
    }

    /// Store the parallel suggestions of `workflow_name` on every pattern
    /// containing both paired steps. Returns the number of patterns changed.
    pub async fn attach_optimizations(&mut self, workflow_name: &str) -> Result<usize> {
        let parallel: Vec<OptimizationSuggestion> = self
            .analyze_optimizations(workflow_name)
            .into_iter()
            .filter(|s| s.kind == OptimizationKind::Parallel)
            .collect();

        let mut changed = 0;
        for pattern in self.store.history_mut().patterns.iter_mut() {
            let mut touched = false;
            for suggestion in &parallel {
                let applies = suggestion.steps.iter().all(|s| pattern.sequence.contains(s));
                let known = pattern
                    .optimizations
                    .iter()
                    .any(|o| o.kind == suggestion.kind && o.steps == suggestion.steps);
                if applies && !known {
                    pattern.optimizations.push(suggestion.clone());
                    touched = true;
                }
            }
            if touched {
                changed += 1;
            }
        }

        if changed > 0 {
            info!(
                "Attached parallel suggestions from {} to {} patterns",
                workflow_name, changed
            );
            self.store.save().await?;
        }
        Ok(changed)
    }

    pub fn analyze_workflows(&self) -> WorkflowAnalysis {
        let mut top_patterns = self.patterns().to_vec();
        top_patterns.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
        top_patterns.truncate(10);

        let workflow_names: BTreeSet<&str> = self
            .store
            .history()
            .sequences
            .iter()
            .filter_map(|s| s.workflow_name.as_deref())
            .collect();

        let optimization_opportunities = workflow_names
            .iter()
            .map(|name| self.analyze_optimizations(name).len())
            .sum();

        WorkflowAnalysis {
            total_patterns: self.patterns().len(),
            top_patterns,
            optimization_opportunities,
            recommendations: self.get_recommendations(&RecommendationContext::default()),
        }
    }

    /// Token streams: every sealed sequence plus a sliding window over raw
    /// executions. Each carries its own timing.
    fn token_streams(&self) -> Vec<&[CommandExecution]> {
        let history = self.store.history();
        let mut streams: Vec<&[CommandExecution]> = self
            .store
            .sealed_sequences()
            .map(|s| s.commands.as_slice())
            .collect();

        if self.window_size > 0 {
            streams.extend(history.executions.windows(self.window_size));
        }
        streams
    }

    fn tally_subsequences(&self, options: &MiningOptions) -> HashMap<Vec<String>, Tally> {
        let mut tallies: HashMap<Vec<String>, Tally> = HashMap::new();

        for stream in self.token_streams() {
            for start in 0..stream.len() {
                let longest = options.max_length.min(stream.len() - start);
                for len in options.min_length..=longest {
                    let slice = &stream[start..start + len];
                    let key: Vec<String> = slice.iter().map(|e| e.full_command()).collect();

                    let tally = tallies.entry(key).or_default();
                    tally.count += 1;
                    tally.duration_sum += slice.iter().map(|e| e.duration).sum::<f64>();
                    tally.success_sum +=
                        slice.iter().filter(|e| e.success).count() as f64 / len as f64;
                }
            }
        }

        tallies
    }
}

/// Quality on a 0-100 scale from frequency, reliability, savings and length
pub fn quality_score(frequency: u64, success_rate: f64, time_savings: f64, length: usize) -> f64 {
    let frequency_score = (frequency as f64 / 10.0).min(1.0) * 25.0;
    let success_score = success_rate.clamp(0.0, 1.0) * 35.0;
    let savings_score = (time_savings.max(0.0) / 60_000.0).min(1.0) * 25.0;
    let length_score = (length as f64 / 5.0).min(1.0) * 15.0;

    (frequency_score + success_score + savings_score + length_score).clamp(0.0, 100.0)
}

/// Deterministic id: identical sequences always hash to the same id
pub fn pattern_id(sequence: &[String]) -> String {
    let joined = sequence.join(ID_SEPARATOR);
    let digest = Sha256::digest(joined.as_bytes());
    format!("pattern-{}", &hex::encode(digest)[..16])
}

/// Verbs joined with `-` for short patterns, `<first>-<n>-step` otherwise
pub fn pattern_name(sequence: &[String]) -> String {
    let verbs: Vec<&str> = sequence
        .iter()
        .map(|cmd| {
            let head = cmd.split_whitespace().next().unwrap_or_default();
            head.rsplit(':').next().unwrap_or(head)
        })
        .collect();

    match verbs.as_slice() {
        [] => "empty".to_string(),
        short if short.len() <= 3 => short.join("-"),
        [first, ..] => format!("{}-{}-step", first, verbs.len()),
    }
}

fn pattern_description(sequence: &[String]) -> String {
    let head: Vec<&str> = sequence.iter().take(3).map(String::as_str).collect();
    let ellipsis = if sequence.len() > 3 { "..." } else { "" };
    format!("Discovered pattern: {}{}", head.join(" -> "), ellipsis)
}

/// Apply the fixed extraction rules. Each variable is registered once.
pub fn extract_variables(sequence: &[String]) -> Vec<PatternVariable> {
    let mut variables = Vec::new();

    if sequence.iter().any(|c| PHASE_RE.is_match(c)) {
        variables.push(PatternVariable {
            name: "phase".to_string(),
            var_type: VariableType::Phase,
            extraction: PHASE_EXTRACTION.to_string(),
            required: true,
            default_value: None,
        });
    }

    if sequence.iter().any(|c| NAME_RE.is_match(c)) {
        variables.push(PatternVariable {
            name: "name".to_string(),
            var_type: VariableType::String,
            extraction: NAME_EXTRACTION.to_string(),
            required: false,
            default_value: Some("unnamed".to_string()),
        });
    }

    variables
}
