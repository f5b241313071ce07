#![warn(missing_docs)]
//! Lockstep Core - Worker Runtime
//!
//! This crate provides the per-core side of the lockstep pipeline:
//! - `Workload` contract: caller-supplied worker setup and step function
//! - `SlotArena`: one handoff slot per core, owned by the controller,
//!   reachable by a worker only through the `SlotHandle` for its own index
//! - `Worker`: the wait → execute → report loop run on each core
//! - High-precision step timing (RDTSCP / CNTVCT with Instant fallback)
//! - CPU affinity pinning and worker priority lowering
//! - `PipelineState` machine, platform bring-up hook, fault injection

mod fault;
mod measure;
mod platform;
mod slot;
mod state;
mod worker;

pub use fault::{FaultError, FaultInjector};
pub use measure::{HAS_CYCLE_COUNTER, Timer, available_cores, lower_thread_priority, pin_to_cpu};
pub use platform::{HostPlatform, Platform, PlatformError, PlatformInfo};
pub use slot::{PendingInput, SlotArena, SlotError, SlotHandle};
pub use state::{PipelineState, PipelineStats, StateError};
pub use worker::{ExitReason, Placement, Worker, WorkerExit};

pub use lockstep_ipc::{CoreId, RoundId};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;

/// Caller-supplied unit of work executed on every core.
///
/// `setup` runs once per worker before its first round; `step` runs once per
/// dispatched round against the worker's own copy of the round input.
/// Any state shared between cores (counters, queues) belongs to the
/// implementation and is its own responsibility to synchronize.
pub trait Workload: Send + Sync + 'static {
    /// Round input, deep-copied into every worker's slot
    type Input: Clone + Send + 'static;
    /// Value each worker produces for a round
    type Output: Clone + Send + fmt::Debug + 'static;

    /// One-time worker setup on `core`
    fn setup(&self, _core: CoreId) -> Result<(), SetupError> {
        Ok(())
    }

    /// Execute one round on `core`
    fn step(&self, core: CoreId, input: Self::Input) -> Self::Output;
}

/// `Workload` built from a closure
pub struct FnWorkload<I, O, F> {
    step: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnWorkload<I, O, F>
where
    F: Fn(CoreId, I) -> O + Send + Sync + 'static,
{
    /// Wrap `step` as a workload with no setup
    pub fn new(step: F) -> Self {
        Self {
            step,
            _marker: PhantomData,
        }
    }
}

impl<I, O, F> Workload for FnWorkload<I, O, F>
where
    I: Clone + Send + 'static,
    O: Clone + Send + fmt::Debug + 'static,
    F: Fn(CoreId, I) -> O + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    fn step(&self, core: CoreId, input: I) -> O {
        (self.step)(core, input)
    }
}

/// Worker or controller setup failure. Fatal to the pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("setup failed: {message}")]
pub struct SetupError {
    /// Description of the missing resource
    pub message: String,
}

impl SetupError {
    /// Setup error with the given description
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A step that could not produce a value (it panicked, or its input was missing).
///
/// The worker still reports completion carrying this fault so the controller
/// never waits on a silent worker.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct StepFault {
    /// Panic payload or protocol description
    pub message: String,
}

impl StepFault {
    /// Fault with the given description
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What one worker produced for one round
#[derive(Debug, Clone)]
pub struct CoreResult<O> {
    /// Worker that produced the result
    pub core: CoreId,
    /// Round (and attempt) the result belongs to
    pub round: RoundId,
    /// Step value, or the fault that replaced it
    pub value: Result<O, StepFault>,
    /// Wall-clock time of the step call alone
    pub elapsed: Duration,
    /// Cycle count of the step call (0 without a cycle counter)
    pub cycles: u64,
}

impl<O> CoreResult<O> {
    /// Whether the step produced a value
    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }
}
