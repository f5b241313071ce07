//! Per-core step timing summary.

use crate::outliers::detect_outliers;
use crate::percentiles::percentile_of_sorted;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// Summary of one core's step times, in nanoseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Steps measured
    pub samples: usize,
    /// Mean of non-outlier samples
    pub mean_ns: f64,
    /// Median of all samples
    pub median_ns: f64,
    /// Sample standard deviation of non-outlier samples
    pub std_dev_ns: f64,
    /// Fastest step
    pub min_ns: f64,
    /// Slowest step
    pub max_ns: f64,
    /// 90th percentile
    pub p90_ns: f64,
    /// 99th percentile
    pub p99_ns: f64,
    /// Samples outside the IQR fences
    pub outliers: usize,
    /// Mean cycle count, 0 without a cycle counter
    pub mean_cycles: f64,
}

impl TimingSummary {
    /// Coefficient of variation, in percent
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean_ns == 0.0 {
            0.0
        } else {
            self.std_dev_ns / self.mean_ns * 100.0
        }
    }
}

/// Summarize step durations and their cycle counts
pub fn summarize_durations(elapsed: &[Duration], cycles: &[u64], k: f64) -> TimingSummary {
    let nanos: Vec<f64> = elapsed.iter().map(|d| d.as_nanos() as f64).collect();
    let mut summary = summarize_nanos(&nanos, k);
    if !cycles.is_empty() {
        summary.mean_cycles = cycles.iter().map(|&c| c as f64).sum::<f64>() / cycles.len() as f64;
    }
    summary
}

/// Summarize raw nanosecond samples
pub fn summarize_nanos(nanos: &[f64], k: f64) -> TimingSummary {
    if nanos.is_empty() {
        return TimingSummary::default();
    }

    let analysis = detect_outliers(nanos, k);
    let cleaned = &analysis.cleaned;

    let mean = if cleaned.is_empty() {
        0.0
    } else {
        cleaned.iter().sum::<f64>() / cleaned.len() as f64
    };
    let std_dev = if cleaned.len() < 2 {
        0.0
    } else {
        let variance =
            cleaned.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (cleaned.len() - 1) as f64;
        variance.sqrt()
    };

    let mut sorted = nanos.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    TimingSummary {
        samples: nanos.len(),
        mean_ns: mean,
        median_ns: percentile_of_sorted(&sorted, 50.0),
        std_dev_ns: std_dev,
        min_ns: sorted[0],
        max_ns: sorted[sorted.len() - 1],
        p90_ns: percentile_of_sorted(&sorted, 90.0),
        p99_ns: percentile_of_sorted(&sorted, 99.0),
        outliers: analysis.count(),
        mean_cycles: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_summary() {
        let summary = summarize_nanos(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.5);
        assert!((summary.mean_ns - 3.0).abs() < 0.01);
        assert!((summary.median_ns - 3.0).abs() < 0.01);
        assert_eq!(summary.min_ns, 1.0);
        assert_eq!(summary.max_ns, 5.0);
        assert_eq!(summary.samples, 5);
    }

    #[test]
    fn test_outlier_excluded_from_mean_not_max() {
        let summary = summarize_nanos(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0], 1.5);
        assert!(summary.mean_ns < 10.0);
        assert_eq!(summary.max_ns, 100.0);
        assert_eq!(summary.outliers, 1);
    }

    #[test]
    fn test_durations_and_cycles() {
        let elapsed = [Duration::from_nanos(1000), Duration::from_nanos(1000)];
        let summary = summarize_durations(&elapsed, &[3000, 3100], 1.5);
        assert_eq!(summary.mean_ns, 1000.0);
        assert_eq!(summary.mean_cycles, 3050.0);
        assert_eq!(summary.coefficient_of_variation(), 0.0);
    }

    #[test]
    fn test_empty() {
        let summary = summarize_durations(&[], &[], 1.5);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.mean_ns, 0.0);
    }
}
