//! Pure state machine for workflow runs
//!
//! No I/O and no async. The engine asks this module whether a transition is
//! legal and persists the result itself.
//!
//! ```text
//!            start            finish
//!   (any) ---------> Running --------> Completed
//!                    |  ^   \
//!              pause |  |    \ fail
//!                    v  |     v
//!                   Paused   Failed
//!                     resume
//! ```

use flowmine_core::{FlowError, Result};
use serde::{Deserialize, Serialize};

/// Status of one run of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    /// Completed and failed runs stay put until cleanup or a new run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that move a run between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// A new run replaces whatever state the chain had
    Start,
    Pause,
    Resume,
    Finish,
    Fail,
}

/// Next status for `event`, or `InvalidTransition`
pub fn transition(current: Option<RunStatus>, event: RunEvent) -> Result<RunStatus> {
    use RunEvent::*;
    use RunStatus::*;

    match (current, event) {
        (_, Start) => Ok(Running),
        (Some(Running), Pause) => Ok(Paused),
        (Some(Paused), Resume) => Ok(Running),
        (Some(Running), Finish) => Ok(Completed),
        (Some(Running), Fail) => Ok(Failed),
        (from, event) => Err(FlowError::InvalidTransition(format!(
            "cannot apply {:?} to {}",
            event,
            from.map(|s| s.to_string()).unwrap_or_else(|| "no run".to_string())
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let status = transition(None, RunEvent::Start).unwrap();
        assert_eq!(status, RunStatus::Running);

        let status = transition(Some(status), RunEvent::Finish).unwrap();
        assert_eq!(status, RunStatus::Completed);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let paused = transition(Some(RunStatus::Running), RunEvent::Pause).unwrap();
        assert_eq!(paused, RunStatus::Paused);
        assert_eq!(
            transition(Some(paused), RunEvent::Resume).unwrap(),
            RunStatus::Running
        );
    }

    #[test]
    fn test_pause_only_from_running() {
        for from in [RunStatus::Paused, RunStatus::Completed, RunStatus::Failed] {
            let err = transition(Some(from), RunEvent::Pause).unwrap_err();
            assert!(matches!(err, FlowError::InvalidTransition(_)), "{from}");
        }
        assert!(transition(None, RunEvent::Pause).is_err());
    }

    #[test]
    fn test_resume_only_from_paused() {
        for from in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert!(transition(Some(from), RunEvent::Resume).is_err(), "{from}");
        }
    }

    #[test]
    fn test_terminal_states_accept_only_start() {
        for from in [RunStatus::Completed, RunStatus::Failed] {
            assert!(transition(Some(from), RunEvent::Finish).is_err());
            assert!(transition(Some(from), RunEvent::Fail).is_err());
            assert_eq!(
                transition(Some(from), RunEvent::Start).unwrap(),
                RunStatus::Running
            );
        }
    }

    #[test]
    fn test_paused_run_cannot_finish() {
        let err = transition(Some(RunStatus::Paused), RunEvent::Finish).unwrap_err();
        assert!(err.to_string().contains("paused"));
    }
}
