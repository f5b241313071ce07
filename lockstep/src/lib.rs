#![warn(missing_docs)]
//! # Lockstep
//!
//! Redundant execution harness: run the same unit of work on every core,
//! accept a result only when all cores agree, and retry the round with the
//! identical input when they do not.
//!
//! - **Per-core workers**: one pinned thread per core, each reached only through its own slot
//! - **Lock-free handoff**: round input moved into each slot before the worker is woken
//! - **Consensus**: adjacent-pair comparison under a pluggable comparator (exact or epsilon)
//! - **Retry**: disagreement redispatches the same input; the caller decides when to give up
//! - **Graceful shutdown**: in-flight rounds finish before workers acknowledge exit
//!
//! ## Quick Start
//!
//! ```ignore
//! use lockstep::prelude::*;
//!
//! let workload = FnWorkload::new(|_core, (a, b): (i32, i32)| a + b);
//! let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact()).launch()?;
//! match pipeline.run_round(&(10, 3))? {
//!     RoundOutcome::Agreed { value, .. } => assert_eq!(value, 13),
//!     other => panic!("{other:?}"),
//! }
//! pipeline.stop()?;
//! ```
//!
//! ## Caller-driven loops
//!
//! ```ignore
//! struct Countdown(u32);
//!
//! impl Master for Countdown {
//!     type Input = (i32, i32);
//!     type Output = i32;
//!
//!     fn next_round(&mut self) -> Directive<(i32, i32)> {
//!         if self.0 == 0 { return Directive::Stop; }
//!         self.0 -= 1;
//!         Directive::Run((10, 3))
//!     }
//! }
//!
//! let summary = Pipeline::builder(workload, ConsensusChecker::exact()).run(&mut Countdown(5))?;
//! ```

// Re-export core types
pub use lockstep_core::{
    CoreId, CoreResult, ExitReason, FaultError, FaultInjector, FnWorkload, HostPlatform,
    PipelineState, PipelineStats, Platform, PlatformError, PlatformInfo, RoundId, SetupError,
    StepFault, WorkerExit, Workload,
};

// Re-export consensus types
pub use lockstep_logic::{
    Comparator, ComparatorError, ConsensusChecker, ConsensusTally, Epsilon, Exact, FnComparator,
    Verdict,
};

// Re-export observers and report types
pub use lockstep_report::{
    AttemptOutcome, AttemptRecord, Observer, OutputFormat, Report, RunRecorder, ScenarioStatus,
    TracingObserver,
};

// Re-export stats
pub use lockstep_stats::{CoreSkew, TimingSummary, summarize_durations};

// Re-export the controller
pub use lockstep_cli::{
    Directive, LockstepConfig, Master, Pipeline, PipelineBuilder, PipelineConfig, PipelineError,
    RoundOutcome, RunSummary, StopHandle,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ConsensusChecker, CoreId, Directive, Epsilon, FnWorkload, Master, Pipeline,
        PipelineConfig, RoundOutcome, SetupError, StopHandle, Workload,
    };
}

/// Run the Lockstep CLI harness.
///
/// ```ignore
/// fn main() {
///     lockstep::run().unwrap();
/// }
/// ```
pub use lockstep_cli::run;
