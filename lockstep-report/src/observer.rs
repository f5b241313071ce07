//! Round observers.
//!
//! The controller reports every core result and every verdict to its
//! observers. Observers never influence consensus.

use lockstep_core::{CoreId, CoreResult, PipelineStats, RoundId, StepFault};
use std::fmt;

/// Receives pipeline events. Every method defaults to a no-op.
pub trait Observer<O>: Send {
    /// One core's result for an attempt, delivered in core order
    fn on_core_result(&mut self, _result: &CoreResult<O>) {}

    /// The attempt agreed on `value`
    fn on_agreed(&mut self, _round: RoundId, _value: &O) {}

    /// Every core faulted identically
    fn on_faulted(&mut self, _round: RoundId, _fault: &StepFault) {}

    /// The attempt disagreed; it will be retried with the same input
    fn on_disagreement(&mut self, _round: RoundId, _first_mismatch: CoreId) {}

    /// Every worker acknowledged exit
    fn on_shutdown(&mut self, _stats: &PipelineStats) {}
}

impl<O, T: Observer<O> + ?Sized> Observer<O> for Box<T> {
    fn on_core_result(&mut self, result: &CoreResult<O>) {
        (**self).on_core_result(result)
    }

    fn on_agreed(&mut self, round: RoundId, value: &O) {
        (**self).on_agreed(round, value)
    }

    fn on_faulted(&mut self, round: RoundId, fault: &StepFault) {
        (**self).on_faulted(round, fault)
    }

    fn on_disagreement(&mut self, round: RoundId, first_mismatch: CoreId) {
        (**self).on_disagreement(round, first_mismatch)
    }

    fn on_shutdown(&mut self, stats: &PipelineStats) {
        (**self).on_shutdown(stats)
    }
}

/// Logs each event through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    label: String,
}

impl TracingObserver {
    /// Observer whose lines carry `label` (usually the scenario id)
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl<O: fmt::Debug> Observer<O> for TracingObserver {
    fn on_core_result(&mut self, result: &CoreResult<O>) {
        match &result.value {
            Ok(value) => tracing::info!(
                scenario = %self.label,
                core = %result.core,
                round = result.round.round,
                attempt = result.round.attempt,
                ?value,
                elapsed = ?result.elapsed,
                "core result"
            ),
            Err(fault) => tracing::warn!(
                scenario = %self.label,
                core = %result.core,
                round = result.round.round,
                attempt = result.round.attempt,
                %fault,
                elapsed = ?result.elapsed,
                "core fault"
            ),
        }
    }

    fn on_agreed(&mut self, round: RoundId, value: &O) {
        tracing::info!(scenario = %self.label, %round, ?value, "cores agree");
    }

    fn on_faulted(&mut self, round: RoundId, fault: &StepFault) {
        tracing::warn!(scenario = %self.label, %round, %fault, "every core faulted");
    }

    fn on_disagreement(&mut self, round: RoundId, first_mismatch: CoreId) {
        tracing::warn!(
            scenario = %self.label,
            %round,
            %first_mismatch,
            "cores disagree, retrying round with identical input"
        );
    }

    fn on_shutdown(&mut self, stats: &PipelineStats) {
        tracing::info!(
            scenario = %self.label,
            rounds = stats.rounds,
            attempts = stats.attempts,
            disagreements = stats.disagreements,
            "all workers exited"
        );
    }
}
