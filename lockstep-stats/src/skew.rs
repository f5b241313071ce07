//! Cross-core timing skew.

use crate::summary::TimingSummary;
use serde::{Deserialize, Serialize};

/// Gap between the slowest and fastest core's median step time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreSkew {
    /// Core index with the lowest median
    pub fastest: usize,
    /// Core index with the highest median
    pub slowest: usize,
    /// `slowest / fastest` median ratio (1.0 when equal or unmeasurable)
    pub ratio: f64,
}

/// Skew across per-core summaries, indexed by core. `None` for fewer than two cores.
pub fn compute_skew(per_core: &[TimingSummary]) -> Option<CoreSkew> {
    if per_core.len() < 2 {
        return None;
    }

    let mut fastest = 0;
    let mut slowest = 0;
    for (core, summary) in per_core.iter().enumerate() {
        if summary.median_ns < per_core[fastest].median_ns {
            fastest = core;
        }
        if summary.median_ns > per_core[slowest].median_ns {
            slowest = core;
        }
    }

    let low = per_core[fastest].median_ns;
    let ratio = if low > 0.0 {
        per_core[slowest].median_ns / low
    } else {
        1.0
    };

    Some(CoreSkew {
        fastest,
        slowest,
        ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_median(median_ns: f64) -> TimingSummary {
        TimingSummary {
            median_ns,
            ..TimingSummary::default()
        }
    }

    #[test]
    fn test_skew() {
        let skew = compute_skew(&[with_median(200.0), with_median(100.0)]).unwrap();
        assert_eq!(skew.fastest, 1);
        assert_eq!(skew.slowest, 0);
        assert!((skew.ratio - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_core_has_no_skew() {
        assert!(compute_skew(&[with_median(1.0)]).is_none());
    }

    #[test]
    fn test_zero_median() {
        let skew = compute_skew(&[with_median(0.0), with_median(0.0)]).unwrap();
        assert_eq!(skew.ratio, 1.0);
    }
}
