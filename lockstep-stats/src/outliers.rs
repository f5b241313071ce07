//! IQR outlier detection.
//!
//! Outliers are flagged, not discarded: min/max and percentiles still see
//! them, only the mean and standard deviation use the cleaned samples.

use crate::percentiles::compute_percentile;
use serde::Serialize;

/// Result of outlier analysis
#[derive(Debug, Clone, Serialize)]
pub struct OutlierAnalysis {
    /// Samples inside the fences
    #[serde(skip)]
    pub cleaned: Vec<f64>,
    /// Samples below the lower fence
    pub low: usize,
    /// Samples above the upper fence
    pub high: usize,
    /// Lower fence
    pub lower_bound: f64,
    /// Upper fence
    pub upper_bound: f64,
}

impl OutlierAnalysis {
    /// Total outliers
    pub fn count(&self) -> usize {
        self.low + self.high
    }
}

/// Flag samples outside `[Q1 - k*IQR, Q3 + k*IQR]`
pub fn detect_outliers(samples: &[f64], k: f64) -> OutlierAnalysis {
    if samples.is_empty() {
        return OutlierAnalysis {
            cleaned: Vec::new(),
            low: 0,
            high: 0,
            lower_bound: 0.0,
            upper_bound: 0.0,
        };
    }

    let q1 = compute_percentile(samples, 25.0);
    let q3 = compute_percentile(samples, 75.0);
    let iqr = q3 - q1;
    let lower_bound = q1 - k * iqr;
    let upper_bound = q3 + k * iqr;

    let mut low = 0;
    let mut high = 0;
    let mut cleaned = Vec::with_capacity(samples.len());
    for &sample in samples {
        if sample < lower_bound {
            low += 1;
        } else if sample > upper_bound {
            high += 1;
        } else {
            cleaned.push(sample);
        }
    }

    OutlierAnalysis {
        cleaned,
        low,
        high,
        lower_bound,
        upper_bound,
    }
}
