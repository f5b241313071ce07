//! Scenario Execution
//!
//! Runs each planned scenario through its own pipeline, one after another.
//!
//! ## Data Flow
//!
//! ```text
//! ScenarioDef (from SCENARIOS)
//!        │
//!        ▼
//!   ExecutionConfig ──► ScenarioContext (fresh RunRecorder per scenario)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │     Executor     │  launch → rounds (with retry) → stop
//! └────────┬─────────┘
//!          │
//!          ▼
//!  ScenarioExecution (run outcome or failure, recorder, wall time)
//! ```
//!
//! A scenario that returns an error or panics is recorded as failed and the
//! executor moves on to the next one.

use crate::config::{ConfigError, LockstepConfig};
use crate::controller::PipelineConfig;
use crate::scenarios::{ScenarioContext, ScenarioDef, ScenarioRun};
use indicatif::{ProgressBar, ProgressStyle};
use lockstep_core::{CoreId, FaultInjector, PipelineStats, RoundId, StepFault};
use lockstep_report::{Observer, RunRecorder, ScenarioStatus};
use std::time::{Duration, Instant};

/// Settings applied to every scenario of a run
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Pipeline settings
    pub pipeline: PipelineConfig,
    /// Platform settle time
    pub settle_time: Duration,
    /// Rounds per scenario
    pub rounds: u64,
    /// Attempt cap per round
    pub max_attempts: Option<u32>,
    /// Fault injection
    pub faults: FaultInjector,
    /// Tolerance for epsilon comparators
    pub epsilon: f64,
    /// Draw a progress bar per scenario
    pub show_progress: bool,
}

impl ExecutionConfig {
    /// Resolve from a validated configuration
    pub fn from_config(config: &LockstepConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: config.pipeline_config(),
            settle_time: config.settle_time()?,
            rounds: config.run.rounds,
            max_attempts: config.run.max_attempts,
            faults: config.fault_injector()?,
            epsilon: config.consensus.epsilon,
            show_progress: false,
        })
    }

    fn context(&self, progress: Option<ProgressBar>) -> ScenarioContext {
        ScenarioContext {
            pipeline: self.pipeline.clone(),
            settle_time: self.settle_time,
            rounds: self.rounds,
            max_attempts: self.max_attempts,
            faults: self.faults.clone(),
            epsilon: self.epsilon,
            recorder: RunRecorder::new(),
            progress,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            settle_time: Duration::ZERO,
            rounds: 10,
            max_attempts: None,
            faults: FaultInjector::disabled(),
            epsilon: 0.001,
            show_progress: false,
        }
    }
}

/// Why a scenario did not produce a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    /// Error category
    pub kind: String,
    /// Error message
    pub message: String,
}

/// Result from executing a single scenario
#[derive(Debug)]
pub struct ScenarioExecution {
    /// Scenario id
    pub id: String,
    /// Scenario group
    pub group: String,
    /// Run outcome, or why it failed
    pub outcome: Result<ScenarioRun, ExecutionFailure>,
    /// Every attempt the pipeline reported
    pub recorder: RunRecorder,
    /// Wall time
    pub duration_ms: f64,
}

impl ScenarioExecution {
    /// Report status
    pub fn status(&self) -> ScenarioStatus {
        match &self.outcome {
            Ok(run) => run.status,
            Err(_) => ScenarioStatus::Failed,
        }
    }
}

/// Advances a progress bar as rounds finish
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// Observer driving `bar`
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl<O> Observer<O> for ProgressObserver {
    fn on_agreed(&mut self, _round: RoundId, _value: &O) {
        self.bar.inc(1);
    }

    fn on_faulted(&mut self, _round: RoundId, _fault: &StepFault) {
        self.bar.inc(1);
    }

    fn on_disagreement(&mut self, round: RoundId, first_mismatch: CoreId) {
        self.bar
            .set_message(format!("{round}: {first_mismatch} disagreed, retrying"));
    }

    fn on_shutdown(&mut self, _stats: &PipelineStats) {
        self.bar.finish_and_clear();
    }
}

/// Execute scenarios and collect results
pub struct Executor {
    config: ExecutionConfig,
    results: Vec<ScenarioExecution>,
}

impl Executor {
    /// Executor for `config`
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
        }
    }

    /// Execute all provided scenarios in order
    pub fn execute(&mut self, scenarios: &[&ScenarioDef]) -> Vec<ScenarioExecution> {
        for def in scenarios {
            let result = self.execute_single(def);
            match &result.outcome {
                Ok(run) => tracing::info!(
                    scenario = def.id,
                    status = run.status.as_str(),
                    attempts = run.summary.stats.attempts,
                    "Scenario finished"
                ),
                Err(failure) => tracing::error!(
                    scenario = def.id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Scenario failed"
                ),
            }
            self.results.push(result);
        }
        std::mem::take(&mut self.results)
    }

    fn progress_bar(&self, def: &ScenarioDef) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let bar = ProgressBar::new(self.config.rounds);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:<24} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_prefix(def.id);
        Some(bar)
    }

    /// Execute a single scenario
    fn execute_single(&self, def: &ScenarioDef) -> ScenarioExecution {
        let start = Instant::now();
        let progress = self.progress_bar(def);
        let ctx = self.config.context(progress.clone());
        let recorder = ctx.recorder.clone();

        tracing::debug!(scenario = def.id, rounds = ctx.rounds, "Scenario starting");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (def.runner)(&ctx)));

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let outcome = match result {
            Ok(Ok(run)) => Ok(run),
            Ok(Err(e)) => Err(ExecutionFailure {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                Err(ExecutionFailure {
                    kind: "panic".to_string(),
                    message,
                })
            }
        };

        ScenarioExecution {
            id: def.id.to_string(),
            group: def.group.to_string(),
            outcome,
            recorder,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{ScenarioError, ScenarioRunner, find};
    use lockstep_core::SetupError;

    fn config(rounds: u64) -> ExecutionConfig {
        ExecutionConfig {
            pipeline: PipelineConfig {
                pin_workers: false,
                ..PipelineConfig::default()
            },
            rounds,
            ..ExecutionConfig::default()
        }
    }

    fn failing(_: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
        Err(SetupError::new("resource unavailable").into())
    }

    fn panicking(_: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
        panic!("scenario blew up")
    }

    fn def(id: &'static str, runner: ScenarioRunner) -> ScenarioDef {
        ScenarioDef {
            id,
            group: "test",
            tags: &[],
            description: "",
            runner,
        }
    }

    #[test]
    fn test_execute_records_attempts() {
        let addition = find("ops/addition").unwrap();
        let mut executor = Executor::new(config(2));
        let results = executor.execute(&[addition]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status(), ScenarioStatus::Agreed);
        assert_eq!(results[0].recorder.attempts().len(), 2);
        assert!(results[0].duration_ms >= 0.0);
    }

    #[test]
    fn test_failure_is_recorded_and_run_continues() {
        let bad = def("test/failing", failing);
        let addition = find("ops/addition").unwrap();
        let mut executor = Executor::new(config(1));
        let results = executor.execute(&[&bad, addition]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status(), ScenarioStatus::Failed);
        let failure = results[0].outcome.as_ref().unwrap_err();
        assert_eq!(failure.kind, "setup");
        assert!(failure.message.contains("resource unavailable"));
        assert_eq!(results[1].status(), ScenarioStatus::Agreed);
    }

    #[test]
    fn test_panic_is_caught() {
        let bad = def("test/panicking", panicking);
        let mut executor = Executor::new(config(1));
        let results = executor.execute(&[&bad]);

        let failure = results[0].outcome.as_ref().unwrap_err();
        assert_eq!(failure.kind, "panic");
        assert_eq!(failure.message, "scenario blew up");
    }

    #[test]
    fn test_from_config() {
        let mut file = LockstepConfig::default();
        file.run.rounds = 7;
        file.run.max_attempts = Some(3);
        let config = ExecutionConfig::from_config(&file).unwrap();
        assert_eq!(config.rounds, 7);
        assert_eq!(config.max_attempts, Some(3));
        assert!(!config.faults.is_enabled());
    }
}
