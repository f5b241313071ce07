//! Percentile Computation

use std::cmp::Ordering;

/// Compute a single percentile from samples.
///
/// Uses linear interpolation between nearest ranks. Returns 0 for no samples.
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    match samples.len() {
        0 => return 0.0,
        1 => return samples[0],
        _ => {}
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    percentile_of_sorted(&sorted, percentile)
}

pub(crate) fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - lower as f64;

    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        let samples = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert!((compute_percentile(&samples, 50.0) - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_tail() {
        let samples: Vec<f64> = (1..=1000).map(|x| x as f64).collect();
        let p99 = compute_percentile(&samples, 99.0);
        assert!(p99 > 985.0 && p99 < 995.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(compute_percentile(&[], 50.0), 0.0);
        assert_eq!(compute_percentile(&[42.0], 99.0), 42.0);
        assert_eq!(compute_percentile(&[1.0, 2.0], 150.0), 2.0);
    }
}
