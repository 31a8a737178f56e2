//! Context-driven pattern recommendations

use flowmine_core::{DiscoveredPattern, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Patterns at or below this relevance are never recommended
const MIN_RELEVANCE: f64 = 0.3;

const MAX_RECOMMENDATIONS: usize = 5;

/// What the caller is doing right now
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub recent_commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_goal: Option<String>,
}

impl RecommendationContext {
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.current_phase = Some(phase.into());
        self
    }

    pub fn with_recent(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.recent_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Position of the last recent command inside `pattern`, when the
    /// pattern still has steps after it
    fn continuation_index(&self, pattern: &DiscoveredPattern) -> Option<usize> {
        let last = self.recent_commands.last()?;
        pattern
            .sequence
            .iter()
            .position(|c| c == last)
            .filter(|&idx| idx + 1 < pattern.sequence.len())
    }

    fn phase_relevant(&self, pattern: &DiscoveredPattern) -> bool {
        match &self.current_phase {
            Some(phase) => pattern
                .sequence
                .iter()
                .any(|c| c.contains("phase") || c.contains(phase.as_str())),
            None => false,
        }
    }
}

/// A stored pattern ranked against a context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecommendation {
    pub pattern: DiscoveredPattern,
    /// 0.0-1.0
    pub relevance_score: f64,
    pub reason: String,
    pub suggested_variables: BTreeMap<String, String>,
}

/// Rank `patterns` against `context`, best first, at most five
pub fn recommend<'a>(
    patterns: impl IntoIterator<Item = &'a DiscoveredPattern>,
    context: &RecommendationContext,
) -> Vec<PatternRecommendation> {
    let mut recommendations: Vec<PatternRecommendation> = patterns
        .into_iter()
        .filter_map(|pattern| {
            let relevance_score = relevance(pattern, context);
            (relevance_score > MIN_RELEVANCE).then(|| PatternRecommendation {
                pattern: pattern.clone(),
                relevance_score,
                reason: reason(pattern, context),
                suggested_variables: suggest_variables(pattern, context),
            })
        })
        .collect();

    recommendations.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

pub fn relevance(pattern: &DiscoveredPattern, context: &RecommendationContext) -> f64 {
    let mut score = 0.0;

    if context.continuation_index(pattern).is_some() {
        score += 0.4;
    }
    if context.phase_relevant(pattern) {
        score += 0.3;
    }
    score += pattern.quality_score / 100.0 * 0.3;

    score.min(1.0)
}

fn reason(pattern: &DiscoveredPattern, context: &RecommendationContext) -> String {
    if let Some(idx) = context.continuation_index(pattern) {
        return format!(
            "Continues from {} with {}",
            pattern.sequence[idx],
            pattern.sequence[idx + 1..].join(" -> ")
        );
    }

    if context.current_phase.is_some() && pattern.sequence.iter().any(|c| c.contains("phase")) {
        return format!(
            "Frequently used pattern for phase operations ({} times)",
            pattern.frequency
        );
    }

    format!(
        "High-quality pattern with {:.0}% success rate",
        pattern.success_rate * 100.0
    )
}

fn suggest_variables(
    pattern: &DiscoveredPattern,
    context: &RecommendationContext,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for var in &pattern.variables {
        let value = match (&var.var_type, &context.current_phase) {
            (VariableType::Phase, Some(phase)) => Some(phase.clone()),
            _ => var.default_value.clone(),
        };
        if let Some(value) = value {
            vars.insert(var.name.clone(), value);
        }
    }

    vars
}
