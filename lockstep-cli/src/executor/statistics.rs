//! Statistics Computation
//!
//! Per-core step timing for every executed scenario, computed in parallel
//! with Rayon. Each scenario's recorder is read independently:
//! - One `TimingSummary` per core (IQR outlier rejection for the mean)
//! - Skew between the slowest and fastest core

use super::execution::ScenarioExecution;
use lockstep_report::CoreTiming;
use lockstep_stats::{CoreSkew, DEFAULT_IQR_K, compute_skew, summarize_durations};
use rayon::prelude::*;

/// Timing for one scenario
#[derive(Debug, Clone, Default)]
pub struct ScenarioTiming {
    /// One entry per core that reported
    pub cores: Vec<CoreTiming>,
    /// Slowest/fastest gap, when at least two cores reported
    pub skew: Option<CoreSkew>,
}

/// Compute per-core timing for each scenario, in the same order as `results`
pub fn compute_statistics(results: &[ScenarioExecution]) -> Vec<ScenarioTiming> {
    results
        .par_iter()
        .map(|r| {
            let per_core: Vec<_> = r
                .recorder
                .timings_by_core()
                .into_par_iter()
                .enumerate()
                .map(|(core, (elapsed, cycles))| CoreTiming {
                    core,
                    summary: summarize_durations(&elapsed, &cycles, DEFAULT_IQR_K),
                })
                .collect();
            let summaries: Vec<_> = per_core.iter().map(|c| c.summary.clone()).collect();
            ScenarioTiming {
                skew: compute_skew(&summaries),
                cores: per_core,
            }
        })
        .collect()
}
