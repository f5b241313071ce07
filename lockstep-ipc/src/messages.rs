//! Protocol Message Types
//!
//! Commands travel controller → worker, messages travel worker → controller.
//! Payloads (round input and result values) never travel through these
//! messages; they are handed off through the worker's slot, and the message
//! only carries the signal that the handoff happened.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a physical core, and of the single worker pinned to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CoreId(pub usize);

impl CoreId {
    /// Position of this core in per-core arrays
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// All core ids for a pipeline of `cores` workers, in index order
    pub fn all(cores: usize) -> impl Iterator<Item = CoreId> {
        (0..cores).map(CoreId)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

/// Identifies one dispatch of work.
///
/// `round` advances only after agreement; `attempt` counts retries of the
/// same round (starting at 1) and is reset when the round advances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RoundId {
    /// Logical round number (same input across all attempts)
    pub round: u64,
    /// Attempt number within the round, 1-based
    pub attempt: u32,
}

impl RoundId {
    /// First attempt of round `round`
    pub fn first(round: u64) -> Self {
        Self { round, attempt: 1 }
    }

    /// Next attempt of the same round (same input, redispatched)
    pub fn retry(self) -> Self {
        Self {
            round: self.round,
            attempt: self.attempt.saturating_add(1),
        }
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {} attempt {}", self.round, self.attempt)
    }
}

/// Commands sent from the controller to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Input for `round` has been placed in the worker's slot; run the step.
    Execute {
        /// Round being dispatched
        round: RoundId,
    },
    /// Acknowledge and exit. No further commands are valid.
    Stop,
}

/// Messages sent from a worker to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Worker setup finished; the worker is waiting for work
    Ready {
        /// Reporting worker
        core: CoreId,
    },
    /// Worker setup failed; the worker has exited
    SetupFailed {
        /// Reporting worker
        core: CoreId,
        /// Failure description
        message: String,
    },
    /// Result for `round` has been written into the worker's slot
    Completed {
        /// Reporting worker
        core: CoreId,
        /// Round the result belongs to
        round: RoundId,
    },
    /// Stop acknowledged; the worker's execution context is gone after this
    Exited {
        /// Reporting worker
        core: CoreId,
    },
}

impl WorkerMessage {
    /// Core that sent this message
    pub fn core(&self) -> CoreId {
        match self {
            WorkerMessage::Ready { core }
            | WorkerMessage::SetupFailed { core, .. }
            | WorkerMessage::Completed { core, .. }
            | WorkerMessage::Exited { core } => *core,
        }
    }

    /// Short name used in protocol error messages
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Ready { .. } => "Ready",
            WorkerMessage::SetupFailed { .. } => "SetupFailed",
            WorkerMessage::Completed { .. } => "Completed",
            WorkerMessage::Exited { .. } => "Exited",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_retry_keeps_round() {
        let id = RoundId::first(7);
        let retry = id.retry().retry();
        assert_eq!(retry.round, 7);
        assert_eq!(retry.attempt, 3);
    }

    #[test]
    fn test_message_core() {
        let msg = WorkerMessage::Completed {
            core: CoreId(1),
            round: RoundId::first(0),
        };
        assert_eq!(msg.core(), CoreId(1));
        assert_eq!(msg.kind(), "Completed");
    }

    #[test]
    fn test_core_display() {
        assert_eq!(CoreId(0).to_string(), "core0");
        let all: Vec<_> = CoreId::all(3).collect();
        assert_eq!(all, vec![CoreId(0), CoreId(1), CoreId(2)]);
    }
}
