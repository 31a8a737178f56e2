//! Typed command classification
//!
//! Every command is classified once, when it enters the history, into an
//! [`Operation`]. Optimization analysis works on these values instead of
//! re-parsing command strings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Verbs that only observe state
const READ_VERBS: &[&str] = &["check", "list", "status", "verify", "progress", "get"];

/// Verbs that mutate state
const WRITE_VERBS: &[&str] = &["create", "update", "delete", "commit", "complete"];

/// Verbs that run work
const EXECUTE_VERBS: &[&str] = &["execute", "run"];

static PHASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("static regex"));

/// What a command does to shared state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Execute,
    #[default]
    Other,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Execute => write!(f, "execute"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Typed view of a command: its kind plus the phase it targets, if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl Operation {
    /// Classify a command and its optional argument string.
    ///
    /// The verb is the first whitespace token with any `namespace:` prefix
    /// removed, split on `-` and `_`. Mutating segments win over read-only
    /// ones, so `complete-status` is a write.
    pub fn classify(command: &str, args: Option<&str>) -> Self {
        let mut tokens = command.split_whitespace();
        let verb = tokens.next().unwrap_or_default();
        let verb = verb.rsplit(':').next().unwrap_or(verb).to_lowercase();
        let segments: Vec<&str> = verb.split(['-', '_']).collect();

        let has = |set: &[&str]| segments.iter().any(|s| set.contains(s));
        let kind = if has(EXECUTE_VERBS) {
            OperationKind::Execute
        } else if has(WRITE_VERBS) {
            OperationKind::Write
        } else if has(READ_VERBS) {
            OperationKind::Read
        } else {
            OperationKind::Other
        };

        let tail = tokens.collect::<Vec<_>>().join(" ");
        let resource_id = args
            .and_then(phase_of)
            .or_else(|| phase_of(&tail));

        Self { kind, resource_id }
    }

    pub fn is_read_only(&self) -> bool {
        self.kind == OperationKind::Read
    }

    /// Whether two operations can safely run concurrently.
    ///
    /// True only when both are read-only, or both target a phase and the
    /// phases differ. Anything else is treated as dependent.
    pub fn independent_of(&self, other: &Operation) -> bool {
        if self.is_read_only() && other.is_read_only() {
            return true;
        }

        match (&self.resource_id, &other.resource_id) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

fn phase_of(text: &str) -> Option<String> {
    PHASE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_read_verbs() {
        for cmd in ["list-status", "check-todos", "gsi:progress", "verify-work 01"] {
            assert_eq!(Operation::classify(cmd, None).kind, OperationKind::Read, "{cmd}");
        }
    }

    #[test]
    fn test_classify_write_and_execute() {
        assert_eq!(
            Operation::classify("execute-phase 01", None).kind,
            OperationKind::Execute
        );
        assert_eq!(
            Operation::classify("complete-milestone", None).kind,
            OperationKind::Write
        );
        assert_eq!(
            Operation::classify("plan-phase", None).kind,
            OperationKind::Other
        );
    }

    #[test]
    fn test_mutating_segment_wins() {
        let op = Operation::classify("update-status", None);
        assert_eq!(op.kind, OperationKind::Write);
    }

    #[test]
    fn test_verbs_match_whole_segments() {
        assert_eq!(Operation::classify("checkpoint", None).kind, OperationKind::Other);
        assert_eq!(Operation::classify("run-tests", None).kind, OperationKind::Execute);
        assert_eq!(Operation::classify("runner", None).kind, OperationKind::Other);
    }

    #[test]
    fn test_resource_from_args_then_command() {
        let op = Operation::classify("plan-phase", Some("03 --skip-research"));
        assert_eq!(op.resource_id.as_deref(), Some("03"));

        let op = Operation::classify("plan-phase 2.1", None);
        assert_eq!(op.resource_id.as_deref(), Some("2.1"));

        let op = Operation::classify("new-project", None);
        assert_eq!(op.resource_id, None);
    }

    #[test]
    fn test_read_only_pair_is_independent() {
        let a = Operation::classify("list-status", None);
        let b = Operation::classify("list-progress", None);
        assert!(a.independent_of(&b));
        assert!(b.independent_of(&a));
    }

    #[test]
    fn test_different_phases_are_independent() {
        let a = Operation::classify("execute-phase 01", None);
        let b = Operation::classify("execute-phase 02", None);
        assert!(a.independent_of(&b));
    }

    #[test]
    fn test_dependent_by_default() {
        let read = Operation::classify("list-status", None);
        let exec = Operation::classify("execute-phase 01", None);
        assert!(!read.independent_of(&exec));

        let a = Operation::classify("execute-phase 01", None);
        let b = Operation::classify("verify-work 01", None);
        assert!(!a.independent_of(&b));
    }
}
