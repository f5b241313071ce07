//! Pipeline Controller
//!
//! Owns the worker threads, the slot arena, and both channels, and drives
//! the round lifecycle: place input → wake workers → wait for every
//! completion → check consensus → surface or retry.

use lockstep_core::{
    CoreId, CoreResult, HostPlatform, PipelineState, PipelineStats, Placement, Platform,
    PlatformError, PlatformInfo, RoundId, SetupError, SlotArena, SlotError, StateError, StepFault,
    Worker, WorkerExit, Workload,
};
use lockstep_ipc::{
    ChannelError, CollectionChannel, CompletionSet, DispatchChannel, WorkerCommand, WorkerMessage,
    wire,
};
use lockstep_logic::{ConsensusChecker, ConsensusError, ConsensusTally, Verdict};
use lockstep_report::Observer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Fatal pipeline errors. Disagreement is never one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("controller setup failed: {0}")]
    ControllerSetup(#[from] SetupError),

    #[error("platform start failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("failed to spawn worker for {core}: {source}")]
    Spawn {
        core: CoreId,
        #[source]
        source: std::io::Error,
    },

    #[error("worker setup failed on {core}: {message}")]
    WorkerSetup { core: CoreId, message: String },

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("slot error: {0}")]
    Slot(#[from] SlotError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("worker protocol error: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("{core} signalled completion for {round} but its slot is empty")]
    MissingResult { core: CoreId, round: RoundId },

    #[error("pipeline is {0} and accepts no more rounds")]
    NotAccepting(PipelineState),
}

/// Static pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of workers, one per core
    pub cores: usize,
    /// Controller priority level; must exceed `worker_priority`
    pub controller_priority: i32,
    /// Worker priority level
    pub worker_priority: i32,
    /// Stack size of each worker thread, in bytes
    pub worker_stack_size: usize,
    /// Pin each worker to its own CPU
    pub pin_workers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cores: 2,
            controller_priority: 2,
            worker_priority: 1,
            worker_stack_size: 64 * 1024,
            pin_workers: true,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the round protocol cannot run under
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.cores == 0 {
            return Err(PipelineError::InvalidConfig(
                "cores must be at least 1".to_string(),
            ));
        }
        if self.controller_priority <= self.worker_priority {
            return Err(PipelineError::InvalidConfig(format!(
                "controller_priority ({}) must be strictly greater than worker_priority ({})",
                self.controller_priority, self.worker_priority
            )));
        }
        if self.worker_stack_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker_stack_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    fn placement(&self) -> Placement {
        Placement {
            pin: self.pin_workers,
            priority_offset: self.controller_priority - self.worker_priority,
        }
    }
}

/// Cross-thread stop request, checked between attempts
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask the pipeline to stop after the attempt in flight
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// What the controller loop asks for next
#[derive(Debug, Clone, PartialEq)]
pub enum Directive<I> {
    /// Run a round on this input
    Run(I),
    /// Shut the pipeline down
    Stop,
}

/// How a round ended
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome<O> {
    /// Cores agreed
    Agreed {
        /// Canonical value, core 0's result
        value: O,
        /// Attempts it took
        attempts: u32,
    },
    /// Every core faulted identically; not retried
    Faulted {
        /// Shared fault
        fault: StepFault,
        /// Attempts it took
        attempts: u32,
    },
    /// The caller's retry policy gave up
    Abandoned {
        /// Attempts made
        attempts: u32,
    },
    /// A stop was requested between attempts
    Interrupted {
        /// Attempts made
        attempts: u32,
    },
}

impl<O> RoundOutcome<O> {
    /// Attempts the round consumed
    pub fn attempts(&self) -> u32 {
        match self {
            RoundOutcome::Agreed { attempts, .. }
            | RoundOutcome::Faulted { attempts, .. }
            | RoundOutcome::Abandoned { attempts }
            | RoundOutcome::Interrupted { attempts } => *attempts,
        }
    }
}

/// Caller-supplied controller logic
pub trait Master {
    /// Round input handed to every worker
    type Input: Clone + Send + 'static;
    /// Agreed value type
    type Output;

    /// One-time setup, after the platform starts and before any worker starts
    fn setup(&mut self) -> Result<(), SetupError> {
        Ok(())
    }

    /// Produce the next round's input, or stop
    fn next_round(&mut self) -> Directive<Self::Input>;

    /// Whether to redispatch after a disagreement. `round` is the attempt that
    /// just disagreed.
    fn keep_retrying(&mut self, _round: RoundId) -> bool {
        true
    }

    /// Round finished
    fn on_outcome(&mut self, _round: u64, _outcome: &RoundOutcome<Self::Output>) {}
}

/// Totals returned once the pipeline has stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Controller counters
    pub stats: PipelineStats,
    /// Consensus checker counters
    pub tally: ConsensusTally,
    /// Per-worker exit reports
    pub workers: Vec<WorkerExit>,
}

/// Configures and launches a pipeline
pub struct PipelineBuilder<W: Workload> {
    workload: W,
    checker: ConsensusChecker<W::Output>,
    config: PipelineConfig,
    platform: Box<dyn Platform>,
    observers: Vec<Box<dyn Observer<W::Output>>>,
    stop: StopHandle,
}

impl<W: Workload> PipelineBuilder<W> {
    /// Pipeline config
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Platform bring-up hook (defaults to `HostPlatform`)
    pub fn platform(mut self, platform: impl Platform + 'static) -> Self {
        self.platform = Box::new(platform);
        self
    }

    /// Add an observer
    pub fn observer(mut self, observer: impl Observer<W::Output> + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Share an existing stop handle
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Start the platform and every worker; returns once all are ready
    pub fn launch(self) -> Result<Pipeline<W>, PipelineError> {
        Pipeline::launch(self, || Ok(()))
    }

    /// Run `master` to completion. The platform starts first, then the
    /// master's setup, then the workers and rounds until the master stops.
    pub fn run<M>(self, master: &mut M) -> Result<RunSummary, PipelineError>
    where
        M: Master<Input = W::Input, Output = W::Output>,
    {
        let mut pipeline = Pipeline::launch(self, || master.setup())
            .inspect_err(|e| tracing::error!(error = %e, "Pipeline launch failed"))?;
        pipeline
            .drive(master)
            .inspect_err(|e| tracing::error!(error = %e, "Pipeline aborted, tearing down"))?;
        pipeline.stop()
    }
}

/// A running lockstep pipeline
pub struct Pipeline<W: Workload> {
    config: PipelineConfig,
    state: PipelineState,
    dispatch: Option<DispatchChannel>,
    collection: Option<CollectionChannel>,
    arena: Arc<SlotArena<W::Input, W::Output>>,
    workers: Vec<JoinHandle<WorkerExit>>,
    exits: Vec<WorkerExit>,
    checker: ConsensusChecker<W::Output>,
    observers: Vec<Box<dyn Observer<W::Output>>>,
    stop: StopHandle,
    stats: PipelineStats,
    next_round: u64,
    platform_info: PlatformInfo,
}

impl<W: Workload> Pipeline<W> {
    /// Builder for `workload` checked by `checker`
    pub fn builder(workload: W, checker: ConsensusChecker<W::Output>) -> PipelineBuilder<W> {
        PipelineBuilder {
            workload,
            checker,
            config: PipelineConfig::default(),
            platform: Box::new(HostPlatform::default()),
            observers: Vec::new(),
            stop: StopHandle::default(),
        }
    }

    fn launch(
        builder: PipelineBuilder<W>,
        setup_master: impl FnOnce() -> Result<(), SetupError>,
    ) -> Result<Self, PipelineError> {
        let PipelineBuilder {
            workload,
            checker,
            config,
            mut platform,
            observers,
            stop,
        } = builder;

        config.validate()?;
        let platform_info = platform.start(config.cores)?;
        setup_master()?;
        let (dispatch, collection, endpoints) = wire(config.cores)?;
        let arena = SlotArena::new(config.cores);
        let workload = Arc::new(workload);

        let mut pipeline = Pipeline {
            config,
            state: PipelineState::Created,
            dispatch: Some(dispatch),
            collection: Some(collection),
            arena,
            workers: Vec::with_capacity(endpoints.len()),
            exits: Vec::new(),
            checker,
            observers,
            stop,
            stats: PipelineStats::default(),
            next_round: 0,
            platform_info,
        };

        let placement = pipeline.config.placement();
        for endpoint in endpoints {
            let core = endpoint.core;
            let slot = pipeline.arena.handle(core)?;
            let worker = Worker::new(Arc::clone(&workload), endpoint, slot, placement);
            let handle = thread::Builder::new()
                .name(format!("lockstep-worker-{}", core.index()))
                .stack_size(pipeline.config.worker_stack_size)
                .spawn(move || worker.run())
                .map_err(|source| PipelineError::Spawn { core, source })?;
            pipeline.workers.push(handle);
        }

        pipeline.await_ready()?;
        tracing::debug!(
            cores = pipeline.config.cores,
            available = pipeline.platform_info.available_cores,
            "Pipeline ready"
        );
        Ok(pipeline)
    }

    fn await_ready(&mut self) -> Result<(), PipelineError> {
        let collection = self.collection()?;
        let mut ready = CompletionSet::new(self.config.cores);
        while !ready.is_complete() {
            match collection.recv()? {
                WorkerMessage::Ready { core } => {
                    ready.mark(core)?;
                    tracing::debug!(%core, "Worker ready");
                }
                WorkerMessage::SetupFailed { core, message } => {
                    tracing::error!(%core, %message, "Worker setup failed");
                    return Err(PipelineError::WorkerSetup { core, message });
                }
                other => {
                    return Err(PipelineError::Protocol {
                        expected: "Ready".to_string(),
                        got: format!("{} from {}", other.kind(), other.core()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Consensus checker counters so far
    pub fn tally(&self) -> ConsensusTally {
        self.checker.tally()
    }

    /// Worker count
    pub fn cores(&self) -> usize {
        self.config.cores
    }

    /// What the platform reported at launch
    pub fn platform_info(&self) -> &PlatformInfo {
        &self.platform_info
    }

    /// Handle that stops this pipeline from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn dispatch(&self) -> Result<&DispatchChannel, PipelineError> {
        self.dispatch
            .as_ref()
            .ok_or(PipelineError::NotAccepting(self.state))
    }

    fn collection(&self) -> Result<&CollectionChannel, PipelineError> {
        self.collection
            .as_ref()
            .ok_or(PipelineError::NotAccepting(self.state))
    }

    /// Execute one attempt of `round` on every core and check consensus.
    pub fn run_attempt(
        &mut self,
        round: RoundId,
        input: &W::Input,
    ) -> Result<Verdict<W::Output>, PipelineError> {
        if !self.state.accepts_rounds() {
            return Err(PipelineError::NotAccepting(self.state));
        }
        self.state.transition(PipelineState::Running)?;

        // Every slot holds its own copy before any worker is woken.
        for core in CoreId::all(self.config.cores) {
            self.arena.place_input(core, round, input.clone())?;
        }
        let dispatch = self.dispatch()?;
        for core in CoreId::all(self.config.cores) {
            dispatch.send(core, WorkerCommand::Execute { round })?;
        }
        self.stats.attempts += 1;
        tracing::debug!(%round, cores = self.config.cores, "Round dispatched");

        let results = self.collect(round)?;
        self.stats.faults += results.iter().filter(|r| !r.is_ok()).count() as u64;
        for observer in &mut self.observers {
            for result in &results {
                observer.on_core_result(result);
            }
        }

        let verdict = self.checker.check(&results)?;
        match &verdict {
            Verdict::Agreed(value) => {
                self.stats.rounds += 1;
                for observer in &mut self.observers {
                    observer.on_agreed(round, value);
                }
            }
            Verdict::Faulted(fault) => {
                self.stats.rounds += 1;
                for observer in &mut self.observers {
                    observer.on_faulted(round, fault);
                }
            }
            Verdict::Disagreed { first_mismatch } => {
                self.stats.disagreements += 1;
                self.state.transition(PipelineState::Retrying)?;
                for observer in &mut self.observers {
                    observer.on_disagreement(round, *first_mismatch);
                }
            }
        }
        Ok(verdict)
    }

    /// Block until every core has reported `round`, then drain the slots.
    fn collect(&self, round: RoundId) -> Result<Vec<CoreResult<W::Output>>, PipelineError> {
        let collection = self.collection()?;
        let mut done = CompletionSet::new(self.config.cores);
        while !done.is_complete() {
            match collection.recv()? {
                WorkerMessage::Completed { core, round: r } if r == round => {
                    done.mark(core)?;
                    tracing::trace!(%core, %round, remaining = done.remaining(), "Completion received");
                }
                other => {
                    return Err(PipelineError::Protocol {
                        expected: format!("Completed for {round}"),
                        got: format!("{} from {}", other.kind(), other.core()),
                    });
                }
            }
        }

        CoreId::all(self.config.cores)
            .map(|core| -> Result<CoreResult<W::Output>, PipelineError> {
                match self.arena.take_result(core)? {
                    Some(result) if result.round == round => Ok(result),
                    Some(result) => Err(PipelineError::Protocol {
                        expected: format!("result for {round}"),
                        got: format!("result for {} from {core}", result.round),
                    }),
                    None => Err(PipelineError::MissingResult { core, round }),
                }
            })
            .collect()
    }

    /// Run one round to a verdict, redispatching the identical input after
    /// each disagreement for as long as `keep_retrying` allows.
    pub fn run_round_with(
        &mut self,
        input: &W::Input,
        mut keep_retrying: impl FnMut(RoundId) -> bool,
    ) -> Result<RoundOutcome<W::Output>, PipelineError> {
        let mut round = RoundId::first(self.next_round);
        self.next_round += 1;

        loop {
            if self.stop.is_requested() {
                tracing::debug!(%round, "Stop requested between attempts");
                return Ok(RoundOutcome::Interrupted {
                    attempts: round.attempt - 1,
                });
            }

            match self.run_attempt(round, input)? {
                Verdict::Agreed(value) => {
                    return Ok(RoundOutcome::Agreed {
                        value,
                        attempts: round.attempt,
                    });
                }
                Verdict::Faulted(fault) => {
                    return Ok(RoundOutcome::Faulted {
                        fault,
                        attempts: round.attempt,
                    });
                }
                Verdict::Disagreed { .. } => {
                    if !keep_retrying(round) {
                        tracing::warn!(%round, "Retry limit reached, abandoning round");
                        return Ok(RoundOutcome::Abandoned {
                            attempts: round.attempt,
                        });
                    }
                    round = round.retry();
                }
            }
        }
    }

    /// Run one round, retrying until the cores agree or a stop is requested
    pub fn run_round(&mut self, input: &W::Input) -> Result<RoundOutcome<W::Output>, PipelineError> {
        self.run_round_with(input, |_| true)
    }

    /// Drive `master` until it returns `Directive::Stop` or a stop is requested.
    /// A requested stop reaches the master as `RoundOutcome::Interrupted`.
    pub fn drive<M>(&mut self, master: &mut M) -> Result<(), PipelineError>
    where
        M: Master<Input = W::Input, Output = W::Output>,
    {
        loop {
            let input = match master.next_round() {
                Directive::Run(input) => input,
                Directive::Stop => break,
            };
            let round = self.next_round;
            let outcome = self.run_round_with(&input, |r| master.keep_retrying(r))?;
            master.on_outcome(round, &outcome);
            if matches!(outcome, RoundOutcome::Interrupted { .. }) {
                break;
            }
        }
        Ok(())
    }

    /// Stop every worker and release the channels.
    ///
    /// Idempotent. Only ever runs between attempts, so any round already
    /// dispatched has completed and every input has been taken.
    pub fn stop(&mut self) -> Result<RunSummary, PipelineError> {
        if self.state != PipelineState::Stopped {
            if !self.state.is_terminal() {
                self.state.transition(PipelineState::Stopping)?;
            }
            self.stop.request();
            self.shutdown_workers();
            self.state.transition(PipelineState::Stopped)?;

            for observer in &mut self.observers {
                observer.on_shutdown(&self.stats);
            }
            tracing::info!(
                rounds = self.stats.rounds,
                attempts = self.stats.attempts,
                disagreements = self.stats.disagreements,
                "Pipeline stopped, all workers exited"
            );
        }

        Ok(RunSummary {
            stats: self.stats,
            tally: self.checker.tally(),
            workers: self.exits.clone(),
        })
    }

    fn shutdown_workers(&mut self) {
        if let (Some(dispatch), Some(collection)) = (&self.dispatch, &self.collection) {
            let mut exited = CompletionSet::new(self.config.cores);
            for core in dispatch.broadcast_stop() {
                let _ = exited.mark(core);
            }

            while !exited.is_complete() {
                match collection.recv() {
                    Ok(WorkerMessage::Exited { core }) | Ok(WorkerMessage::SetupFailed { core, .. }) => {
                        let _ = exited.mark(core);
                        tracing::debug!(%core, remaining = exited.remaining(), "Worker exit acknowledged");
                    }
                    Ok(other) => {
                        tracing::debug!(core = %other.core(), kind = other.kind(), "Discarding message during shutdown");
                    }
                    Err(_) => break,
                }
            }
        }

        self.dispatch = None;
        self.collection = None;

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            match handle.join() {
                Ok(exit) => self.exits.push(exit),
                Err(_) => tracing::error!(thread = %name, "Worker thread panicked outside its step"),
            }
        }
        self.arena.clear();
    }
}

impl<W: Workload> Drop for Pipeline<W> {
    fn drop(&mut self) {
        if self.state != PipelineState::Stopped {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "Pipeline teardown failed");
            }
        }
    }
}
