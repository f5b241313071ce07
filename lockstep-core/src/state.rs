//! Pipeline lifecycle.
//!
//! ```text
//! Created ──▶ Running ◀──▶ Retrying
//!    │           │            │
//!    └───────────┴─────┬──────┘
//!                      ▼
//!                  Stopping ──▶ Stopped
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where the pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Workers launched, no round dispatched yet
    Created,
    /// Executing rounds
    Running,
    /// Re-running the current round after a disagreement
    Retrying,
    /// Stop broadcast, waiting for workers to exit
    Stopping,
    /// Every worker joined
    Stopped,
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid pipeline transition {from} -> {to}")]
pub struct StateError {
    /// State before the attempted transition
    pub from: PipelineState,
    /// Requested state
    pub to: PipelineState,
}

impl PipelineState {
    /// Whether `self -> to` is a legal transition
    pub fn can_transition(self, to: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, to),
            (Created, Running)
                | (Running, Running)
                | (Running, Retrying)
                | (Retrying, Retrying)
                | (Retrying, Running)
                | (Created | Running | Retrying, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Move to `to`, or report the illegal transition
    pub fn transition(&mut self, to: PipelineState) -> Result<(), StateError> {
        if self.can_transition(to) {
            tracing::trace!(from = %self, to = %to, "pipeline transition");
            *self = to;
            Ok(())
        } else {
            Err(StateError { from: *self, to })
        }
    }

    /// Whether rounds may still be dispatched
    pub fn accepts_rounds(self) -> bool {
        matches!(
            self,
            PipelineState::Created | PipelineState::Running | PipelineState::Retrying
        )
    }

    /// Whether shutdown has begun or finished
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Stopping | PipelineState::Stopped)
    }
}

/// Running pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Rounds that reached a verdict other than disagreement
    pub rounds: u64,
    /// Dispatches, retries included
    pub attempts: u64,
    /// Attempts that ended in disagreement
    pub disagreements: u64,
    /// Core results that carried a step fault
    pub faults: u64,
}

impl PipelineStats {
    /// Attempts spent per completed round
    pub fn attempts_per_round(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.attempts as f64 / self.rounds as f64
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::Running => "running",
            PipelineState::Retrying => "retrying",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let mut state = PipelineState::Created;
        state.transition(PipelineState::Running).unwrap();
        state.transition(PipelineState::Retrying).unwrap();
        state.transition(PipelineState::Running).unwrap();
        state.transition(PipelineState::Stopping).unwrap();
        state.transition(PipelineState::Stopped).unwrap();
        assert!(state.is_terminal());
        assert!(!state.accepts_rounds());
    }

    #[test]
    fn test_stop_before_first_round() {
        let mut state = PipelineState::Created;
        assert!(state.transition(PipelineState::Stopping).is_ok());
    }

    #[test]
    fn test_no_restart_after_stop() {
        let mut state = PipelineState::Stopped;
        let err = state.transition(PipelineState::Running).unwrap_err();
        assert_eq!(err.from, PipelineState::Stopped);
        assert_eq!(err.to, PipelineState::Running);
        assert_eq!(state, PipelineState::Stopped);
        assert_eq!(err.to_string(), "invalid pipeline transition stopped -> running");
    }

    #[test]
    fn test_attempts_per_round() {
        let stats = PipelineStats {
            rounds: 4,
            attempts: 6,
            disagreements: 2,
            faults: 0,
        };
        assert!((stats.attempts_per_round() - 1.5).abs() < f64::EPSILON);
        assert_eq!(PipelineStats::default().attempts_per_round(), 0.0);
    }

    #[test]
    fn test_cannot_skip_stopping() {
        assert!(!PipelineState::Running.can_transition(PipelineState::Stopped));
        assert!(!PipelineState::Created.can_transition(PipelineState::Retrying));
    }
}
