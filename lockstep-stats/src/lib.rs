#![warn(missing_docs)]
//! Lockstep Step-Timing Statistics
//!
//! Summarizes the elapsed time each core spent inside its step function:
//! - Outlier detection via IQR, so one preempted step does not skew the mean
//! - Percentiles from all samples (a preempted step is still a real latency)
//! - Cross-core skew, the gap between the slowest and fastest core

mod outliers;
mod percentiles;
mod skew;
mod summary;

pub use outliers::{OutlierAnalysis, detect_outliers};
pub use percentiles::compute_percentile;
pub use skew::{CoreSkew, compute_skew};
pub use summary::{TimingSummary, summarize_durations, summarize_nanos};

/// Default IQR multiplier
pub const DEFAULT_IQR_K: f64 = 1.5;
