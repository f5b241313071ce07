//! Scenario Executor
//!
//! Runs scenarios and turns what their pipelines reported into a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ScenarioDef (from SCENARIOS, filtered by the planner)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  One pipeline per scenario, attempts recorded
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ statistics  │  Per-core step timing (parallel)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Build Report with metadata and summary
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Runs scenarios, catches failures, drives progress bars
//! - [`statistics`] - Parallel per-core timing summaries
//! - [`report`] - Report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod execution;
mod formatting;
mod metadata;
mod report;
mod statistics;

pub use execution::{
    ExecutionConfig, ExecutionFailure, Executor, ProgressObserver, ScenarioExecution,
};
pub use formatting::format_human_output;
pub use metadata::build_report_meta;
pub use report::build_report;
pub use statistics::{ScenarioTiming, compute_statistics};
