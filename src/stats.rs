//! Descriptive statistics over per-sample scores.
//!
//! The run report carries a distribution summary of per-sample mean-IoU
//! values next to the authoritative cumulative score, so a handful of
//! catastrophic samples can be told apart from uniform mediocrity.

use serde::{Deserialize, Serialize};

/// Descriptive statistics for a set of measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Mean value.
    pub mean: f64,
    /// Median value.
    pub median: f64,
    /// Standard deviation.
    pub std_dev: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// 25th percentile.
    pub p25: f64,
    /// 75th percentile.
    pub p75: f64,
}

impl Summary {
    /// Compute summary statistics for a slice of values.
    ///
    /// Returns `None` if the slice is empty.
    #[must_use]
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            mean,
            median: percentile_sorted(&sorted, 0.5),
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[count - 1],
            p25: percentile_sorted(&sorted, 0.25),
            p75: percentile_sorted(&sorted, 0.75),
        })
    }
}

/// Compute the mean of a slice; 0.0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compute the median of a slice; 0.0 for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, 0.5)
}

/// Percentile with linear interpolation (R-7) on a sorted slice.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_empty() {
        assert!(Summary::compute(&[]).is_none());
    }

    #[test]
    fn test_summary_basic() {
        let summary = Summary::compute(&[0.2, 0.4, 0.6, 0.8, 1.0]).unwrap();
        assert_eq!(summary.count, 5);
        assert!((summary.mean - 0.6).abs() < 1e-12);
        assert!((summary.median - 0.6).abs() < 1e-12);
        assert_eq!(summary.min, 0.2);
        assert_eq!(summary.max, 1.0);
    }

    #[test]
    fn test_median_even_length() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_summary_quartiles() {
        let summary = Summary::compute(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((summary.p25 - 1.0).abs() < 1e-12);
        assert!((summary.p75 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_unsorted_input() {
        assert!((mean(&[0.9, 0.1, 0.5]) - 0.5).abs() < 1e-12);
    }
}
