//! Shared-counter scenarios.
//!
//! Every worker increments one counter `iterations` times, meets the others
//! at a barrier, then reports what it reads. All cores read after every
//! increment of the attempt has landed, so they always agree; what differs
//! between disciplines is whether the total is right.

use super::{RepeatMaster, ScenarioContext, ScenarioError, ScenarioRun};
use lockstep_core::{CoreId, Workload};
use lockstep_logic::ConsensusChecker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// Increments per core per attempt
pub const ITERATIONS: u64 = 10_000;

/// How increments are synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Separate load and store; concurrent updates can be lost
    NoLock,
    /// Every increment under a mutex
    Mutex,
    /// `fetch_add`
    Atomic,
}

/// Counter shared by all workers of a pipeline
#[derive(Debug)]
pub enum SharedCounter {
    /// Read-modify-write without exclusion
    Racy(AtomicU64),
    /// Mutex-guarded
    Locked(Mutex<u64>),
    /// Atomic increments
    Atomic(AtomicU64),
}

impl SharedCounter {
    /// Zeroed counter for `discipline`
    pub fn new(discipline: Discipline) -> Self {
        match discipline {
            Discipline::NoLock => SharedCounter::Racy(AtomicU64::new(0)),
            Discipline::Mutex => SharedCounter::Locked(Mutex::new(0)),
            Discipline::Atomic => SharedCounter::Atomic(AtomicU64::new(0)),
        }
    }

    /// Add one
    pub fn increment(&self) {
        match self {
            SharedCounter::Racy(value) => {
                let current = value.load(Ordering::Relaxed);
                std::hint::spin_loop();
                value.store(current + 1, Ordering::Relaxed);
            }
            SharedCounter::Locked(value) => {
                *value.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            }
            SharedCounter::Atomic(value) => {
                value.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Current value
    pub fn read(&self) -> u64 {
        match self {
            SharedCounter::Racy(value) | SharedCounter::Atomic(value) => {
                value.load(Ordering::Acquire)
            }
            SharedCounter::Locked(value) => *value.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Increment, rendezvous, read
pub struct Counting {
    counter: Arc<SharedCounter>,
    barrier: Barrier,
    iterations: u64,
}

impl Counting {
    /// Workload for `cores` workers sharing `counter`
    pub fn new(counter: Arc<SharedCounter>, cores: usize, iterations: u64) -> Self {
        Self {
            counter,
            barrier: Barrier::new(cores),
            iterations,
        }
    }
}

impl Workload for Counting {
    type Input = ();
    type Output = u64;

    fn step(&self, _core: CoreId, _input: ()) -> u64 {
        for _ in 0..self.iterations {
            self.counter.increment();
        }
        self.barrier.wait();
        self.counter.read()
    }
}

/// Total the counter should reach after `attempts` attempts
pub fn expected_total(attempts: u64, cores: usize, iterations: u64) -> u64 {
    attempts * cores as u64 * iterations
}

fn shared(
    ctx: &ScenarioContext,
    id: &str,
    discipline: Discipline,
) -> Result<ScenarioRun, ScenarioError> {
    let counter = Arc::new(SharedCounter::new(discipline));
    let workload = Counting::new(Arc::clone(&counter), ctx.pipeline.cores, ITERATIONS);
    let checker = ConsensusChecker::exact();
    let comparator = checker.comparator_name().to_string();

    let mut master = RepeatMaster::new(ctx, ());
    let summary = ctx.builder(id, workload, checker).run(&mut master)?;

    let expected = expected_total(summary.stats.attempts, ctx.pipeline.cores, ITERATIONS);
    let actual = counter.read();
    let log = master.log();
    let mut warnings: Vec<String> = log.interruption(ctx.rounds).into_iter().collect();
    if actual != expected {
        let lost = expected.saturating_sub(actual);
        tracing::warn!(scenario = id, expected, actual, lost, "Shared counter lost updates");
        warnings.push(format!("lost {lost} of {expected} updates ({discipline:?})"));
    }

    Ok(ScenarioRun {
        status: log.status(),
        comparator,
        summary,
        warnings,
    })
}

pub(super) fn nolock(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    shared(ctx, "shared/nolock", Discipline::NoLock)
}

pub(super) fn mutex(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    shared(ctx, "shared/mutex", Discipline::Mutex)
}

pub(super) fn atomic(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    shared(ctx, "shared/atomic", Discipline::Atomic)
}
