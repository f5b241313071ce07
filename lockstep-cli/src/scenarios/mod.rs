//! Built-in Scenarios
//!
//! Each scenario instantiates the generic pipeline with its own workload,
//! master and comparator, and is registered in [`SCENARIOS`] with an id,
//! group and tags for the planner.
//!
//! - `ops/*`: two-operand `i32` arithmetic with optional fault injection
//! - `shared/*`: workers increment a shared counter under different locking
//! - `queue/temperature`: a producer thread feeds the master through a bounded queue

mod ops;
mod queue;
mod shared;

use crate::config::ConfigError;
use crate::controller::{
    Directive, Master, Pipeline, PipelineBuilder, PipelineConfig, PipelineError, RoundOutcome,
    RunSummary,
};
use crate::executor::ProgressObserver;
use indicatif::ProgressBar;
use lockstep_core::{FaultError, FaultInjector, HostPlatform, RoundId, SetupError, Workload};
use lockstep_logic::{ComparatorError, ConsensusChecker};
use lockstep_report::{RunRecorder, ScenarioStatus, TracingObserver};
use std::time::Duration;
use thiserror::Error;

/// A registered scenario
#[derive(Debug, Clone, Copy)]
pub struct ScenarioDef {
    /// Unique id, `group/name`
    pub id: &'static str,
    /// Group for `--group`
    pub group: &'static str,
    /// Tags for `--tag` / `--skip-tag`
    pub tags: &'static [&'static str],
    /// One-line description for `list`
    pub description: &'static str,
    /// Entry point
    pub runner: ScenarioRunner,
}

/// Scenario entry point
pub type ScenarioRunner = fn(&ScenarioContext) -> Result<ScenarioRun, ScenarioError>;

/// Every built-in scenario
pub static SCENARIOS: &[ScenarioDef] = &[
    ScenarioDef {
        id: "ops/addition",
        group: "ops",
        tags: &["arithmetic", "fast"],
        description: "10 + 3 on every core",
        runner: ops::addition,
    },
    ScenarioDef {
        id: "ops/subtraction",
        group: "ops",
        tags: &["arithmetic", "fast"],
        description: "10 - 3 on every core",
        runner: ops::subtraction,
    },
    ScenarioDef {
        id: "ops/multiplication",
        group: "ops",
        tags: &["arithmetic", "fast"],
        description: "10 * 3 on every core",
        runner: ops::multiplication,
    },
    ScenarioDef {
        id: "ops/division",
        group: "ops",
        tags: &["arithmetic", "fast"],
        description: "10 / 3 on every core",
        runner: ops::division,
    },
    ScenarioDef {
        id: "ops/division-by-zero",
        group: "ops",
        tags: &["arithmetic", "fast", "edge"],
        description: "10 / 0 yields the i32::MIN sentinel",
        runner: ops::division_by_zero,
    },
    ScenarioDef {
        id: "ops/tolerance",
        group: "ops",
        tags: &["float", "fast", "comparator"],
        description: "per-core drift within epsilon agrees",
        runner: ops::tolerance,
    },
    ScenarioDef {
        id: "shared/nolock",
        group: "shared",
        tags: &["concurrency", "racy"],
        description: "unsynchronized read-modify-write on a shared counter",
        runner: shared::nolock,
    },
    ScenarioDef {
        id: "shared/mutex",
        group: "shared",
        tags: &["concurrency"],
        description: "mutex-guarded shared counter",
        runner: shared::mutex,
    },
    ScenarioDef {
        id: "shared/atomic",
        group: "shared",
        tags: &["concurrency"],
        description: "atomic fetch_add shared counter",
        runner: shared::atomic,
    },
    ScenarioDef {
        id: "queue/temperature",
        group: "queue",
        tags: &["producer", "slow"],
        description: "Kelvin readings from a producer thread, converted to Celsius",
        runner: queue::temperature,
    },
];

/// Look up a scenario by id
pub fn find(id: &str) -> Option<&'static ScenarioDef> {
    SCENARIOS.iter().find(|s| s.id == id)
}

/// Scenario failure. Each one maps to status `failed`.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Comparator(#[from] ComparatorError),

    #[error(transparent)]
    Fault(#[from] FaultError),
}

impl ScenarioError {
    /// Short category recorded in the report
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioError::Pipeline(PipelineError::ControllerSetup(_))
            | ScenarioError::Pipeline(PipelineError::WorkerSetup { .. }) => "setup",
            ScenarioError::Pipeline(PipelineError::Platform(_)) => "platform",
            ScenarioError::Pipeline(_) => "pipeline",
            ScenarioError::Config(_) | ScenarioError::Comparator(_) | ScenarioError::Fault(_) => {
                "config"
            }
        }
    }
}

/// What a scenario runner hands back to the executor
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Derived from the round outcomes
    pub status: ScenarioStatus,
    /// Comparator name
    pub comparator: String,
    /// Pipeline totals at shutdown
    pub summary: RunSummary,
    /// Scenario-specific findings
    pub warnings: Vec<String>,
}

/// Everything a scenario needs from the run configuration
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    /// Pipeline settings shared by all scenarios
    pub pipeline: PipelineConfig,
    /// Platform settle time
    pub settle_time: Duration,
    /// Rounds per scenario
    pub rounds: u64,
    /// Attempt cap per round; `None` retries until agreement
    pub max_attempts: Option<u32>,
    /// Per-core fault injection
    pub faults: FaultInjector,
    /// Tolerance for epsilon comparators
    pub epsilon: f64,
    /// Attempt recorder for the report
    pub recorder: RunRecorder,
    /// Round progress, when drawing one
    pub progress: Option<ProgressBar>,
}

impl ScenarioContext {
    /// Context with no faults, no progress bar and a fresh recorder
    pub fn new(pipeline: PipelineConfig, rounds: u64) -> Self {
        Self {
            pipeline,
            settle_time: Duration::ZERO,
            rounds,
            max_attempts: None,
            faults: FaultInjector::disabled(),
            epsilon: 0.001,
            recorder: RunRecorder::new(),
            progress: None,
        }
    }

    /// Pipeline builder with this context's config, platform and observers
    pub fn builder<W: Workload>(
        &self,
        id: &str,
        workload: W,
        checker: ConsensusChecker<W::Output>,
    ) -> PipelineBuilder<W> {
        let builder = Pipeline::builder(workload, checker)
            .config(self.pipeline.clone())
            .platform(HostPlatform::new(self.settle_time))
            .observer(self.recorder.clone())
            .observer(TracingObserver::new(id));
        match &self.progress {
            Some(bar) => builder.observer(ProgressObserver::new(bar.clone())),
            None => builder,
        }
    }

    /// Retry policy honoring `max_attempts`
    pub fn keep_retrying(&self, round: RoundId) -> bool {
        self.max_attempts.is_none_or(|max| round.attempt < max)
    }
}

/// Round outcomes seen by a master
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeLog {
    /// Rounds that agreed
    pub agreed: u64,
    /// Rounds where every core faulted identically
    pub faulted: u64,
    /// Rounds given up after the attempt cap
    pub abandoned: u64,
    /// Attempts across all rounds
    pub attempts: u64,
    /// A stop arrived between attempts
    pub interrupted: bool,
}

impl OutcomeLog {
    /// Fold one round into the log
    pub fn record<O>(&mut self, outcome: &RoundOutcome<O>) {
        self.attempts += u64::from(outcome.attempts());
        match outcome {
            RoundOutcome::Agreed { .. } => self.agreed += 1,
            RoundOutcome::Faulted { .. } => self.faulted += 1,
            RoundOutcome::Abandoned { .. } => self.abandoned += 1,
            RoundOutcome::Interrupted { .. } => self.interrupted = true,
        }
    }

    /// Rounds that reached a verdict
    pub fn completed(&self) -> u64 {
        self.agreed + self.faulted + self.abandoned
    }

    /// Warning for a run a stop cut short of `planned` rounds
    pub fn interruption(&self, planned: u64) -> Option<String> {
        (self.interrupted && self.completed() < planned)
            .then(|| format!("stopped after {} of {} rounds", self.completed(), planned))
    }

    /// Worst outcome wins: abandoned, then faulted, then agreed
    pub fn status(&self) -> ScenarioStatus {
        if self.abandoned > 0 {
            ScenarioStatus::Abandoned
        } else if self.faulted > 0 {
            ScenarioStatus::Faulted
        } else {
            ScenarioStatus::Agreed
        }
    }
}

/// Master that replays one fixed input for a set number of rounds
pub struct RepeatMaster<I, O> {
    input: I,
    remaining: u64,
    max_attempts: Option<u32>,
    log: OutcomeLog,
    last: Option<O>,
}

impl<I, O> RepeatMaster<I, O> {
    /// `rounds` rounds of `input`, retry cap from `ctx`
    pub fn new(ctx: &ScenarioContext, input: I) -> Self {
        Self {
            input,
            remaining: ctx.rounds,
            max_attempts: ctx.max_attempts,
            log: OutcomeLog::default(),
            last: None,
        }
    }

    /// Outcomes so far
    pub fn log(&self) -> OutcomeLog {
        self.log
    }

    /// Last agreed value
    pub fn last(&self) -> Option<&O> {
        self.last.as_ref()
    }
}

impl<I, O> Master for RepeatMaster<I, O>
where
    I: Clone + Send + 'static,
    O: Clone,
{
    type Input = I;
    type Output = O;

    fn next_round(&mut self) -> Directive<I> {
        if self.remaining == 0 {
            return Directive::Stop;
        }
        self.remaining -= 1;
        Directive::Run(self.input.clone())
    }

    fn keep_retrying(&mut self, round: RoundId) -> bool {
        self.max_attempts.is_none_or(|max| round.attempt < max)
    }

    fn on_outcome(&mut self, _round: u64, outcome: &RoundOutcome<O>) {
        self.log.record(outcome);
        if let RoundOutcome::Agreed { value, .. } = outcome {
            self.last = Some(value.clone());
        }
    }
}

/// Run `workload` under a `RepeatMaster` and package the result
pub(crate) fn run_repeated<W>(
    ctx: &ScenarioContext,
    id: &str,
    workload: W,
    checker: ConsensusChecker<W::Output>,
    input: W::Input,
) -> Result<ScenarioRun, ScenarioError>
where
    W: Workload,
{
    let comparator = checker.comparator_name().to_string();
    let mut master = RepeatMaster::new(ctx, input);
    let summary = ctx.builder(id, workload, checker).run(&mut master)?;
    let log = master.log();
    Ok(ScenarioRun {
        status: log.status(),
        comparator,
        summary,
        warnings: log.interruption(ctx.rounds).into_iter().collect(),
    })
}

impl From<SetupError> for ScenarioError {
    fn from(e: SetupError) -> Self {
        ScenarioError::Pipeline(PipelineError::ControllerSetup(e))
    }
}
