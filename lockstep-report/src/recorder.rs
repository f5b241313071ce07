//! Run recorder: keeps every attempt for the report.

use crate::observer::Observer;
use lockstep_core::{CoreId, CoreResult, PipelineStats, RoundId, StepFault};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One core's contribution to an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRecord {
    /// Core index
    pub core: usize,
    /// `Debug` rendering of the value, absent on fault
    pub value: Option<String>,
    /// Fault message, absent on success
    pub fault: Option<String>,
    /// Step time in nanoseconds
    pub elapsed_ns: u64,
    /// Step cycle count
    pub cycles: u64,
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Agreed on the rendered value
    Agreed {
        /// `Debug` rendering of the agreed value
        value: String,
    },
    /// Every core faulted identically
    Faulted {
        /// Shared fault message
        message: String,
    },
    /// Disagreed at the given core
    Disagreed {
        /// First mismatching core
        first_mismatch: usize,
    },
}

impl AttemptOutcome {
    /// Whether the attempt will be retried
    pub fn is_disagreed(&self) -> bool {
        matches!(self, AttemptOutcome::Disagreed { .. })
    }
}

/// One dispatch of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Round number
    pub round: u64,
    /// Attempt within the round, 1-based
    pub attempt: u32,
    /// Per-core results in core order
    pub cores: Vec<CoreRecord>,
    /// Verdict
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Default)]
struct RecordLog {
    pending: Vec<CoreRecord>,
    attempts: Vec<AttemptRecord>,
    shutdown: Option<PipelineStats>,
}

/// Observer that records attempts. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RunRecorder {
    log: Arc<Mutex<RecordLog>>,
}

impl RunRecorder {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self, round: RoundId, outcome: AttemptOutcome) {
        let mut log = self.lock();
        let cores = std::mem::take(&mut log.pending);
        log.attempts.push(AttemptRecord {
            round: round.round,
            attempt: round.attempt,
            cores,
            outcome,
        });
    }

    /// Every attempt recorded so far
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.lock().attempts.clone()
    }

    /// Counters reported at shutdown, if the pipeline has stopped
    pub fn shutdown_stats(&self) -> Option<PipelineStats> {
        self.lock().shutdown
    }

    /// Step times and cycle counts per core, across all attempts
    pub fn timings_by_core(&self) -> Vec<(Vec<Duration>, Vec<u64>)> {
        let log = self.lock();
        let cores = log
            .attempts
            .iter()
            .map(|a| a.cores.len())
            .max()
            .unwrap_or(0);
        let mut timings = vec![(Vec::new(), Vec::new()); cores];
        for record in log.attempts.iter().flat_map(|a| &a.cores) {
            let (elapsed, cycles) = &mut timings[record.core];
            elapsed.push(Duration::from_nanos(record.elapsed_ns));
            cycles.push(record.cycles);
        }
        timings
    }

    /// Value of the most recent agreed attempt
    pub fn last_agreed(&self) -> Option<String> {
        self.lock()
            .attempts
            .iter()
            .rev()
            .find_map(|a| match &a.outcome {
                AttemptOutcome::Agreed { value } => Some(value.clone()),
                _ => None,
            })
    }
}

impl<O: fmt::Debug> Observer<O> for RunRecorder {
    fn on_core_result(&mut self, result: &CoreResult<O>) {
        let (value, fault) = match &result.value {
            Ok(value) => (Some(format!("{value:?}")), None),
            Err(fault) => (None, Some(fault.message.clone())),
        };
        self.lock().pending.push(CoreRecord {
            core: result.core.index(),
            value,
            fault,
            elapsed_ns: result.elapsed.as_nanos() as u64,
            cycles: result.cycles,
        });
    }

    fn on_agreed(&mut self, round: RoundId, value: &O) {
        self.close(
            round,
            AttemptOutcome::Agreed {
                value: format!("{value:?}"),
            },
        );
    }

    fn on_faulted(&mut self, round: RoundId, fault: &StepFault) {
        self.close(
            round,
            AttemptOutcome::Faulted {
                message: fault.message.clone(),
            },
        );
    }

    fn on_disagreement(&mut self, round: RoundId, first_mismatch: CoreId) {
        self.close(
            round,
            AttemptOutcome::Disagreed {
                first_mismatch: first_mismatch.index(),
            },
        );
    }

    fn on_shutdown(&mut self, stats: &PipelineStats) {
        self.lock().shutdown = Some(*stats);
    }
}
