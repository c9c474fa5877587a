//! Descriptive statistics and paired significance testing.
//!
//! Percentiles here are plain order statistics on a sorted copy (no
//! interpolation), matching how bootstrap confidence bounds are read off.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;

/// Arithmetic mean, `None` for an empty slice
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Median of the samples (mean of the two middle values for even counts)
#[must_use]
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sorted = sorted_copy(samples);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1 denominator)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = mean(samples).unwrap_or(0.0);
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Sort a copy of the samples ascending; NaN compares equal
#[must_use]
pub fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Order-statistic percentile: `sorted[floor(len * fraction)]`
///
/// The index is clamped to the last element so `fraction = 1.0` is valid.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn order_statistic(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() as f64 * fraction).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Result of a paired significance test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    /// t-statistic
    pub t_statistic: f64,
    /// Two-tailed p-value
    pub p_value: f64,
    /// Degrees of freedom
    pub degrees_of_freedom: f64,
    /// Is result significant at the given alpha?
    pub is_significant: bool,
    /// Cohen's d effect size
    pub cohens_d: f64,
    /// Effect size interpretation
    pub effect_interpretation: String,
}

/// Paired t-test over per-segment scores of two systems
///
/// Returns `None` if the slices differ in length, have fewer than two
/// elements, or the differences have no variance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn paired_t_test(samples_a: &[f64], samples_b: &[f64], alpha: f64) -> Option<SignificanceResult> {
    if samples_a.len() != samples_b.len() || samples_a.len() < 2 {
        return None;
    }

    let n = samples_a.len();
    let differences: Vec<f64> = samples_a
        .iter()
        .zip(samples_b.iter())
        .map(|(a, b)| a - b)
        .collect();

    let mean_diff = mean(&differences)?;
    let std_diff = std_dev(&differences);

    if std_diff < f64::EPSILON {
        return None;
    }

    let t_statistic = mean_diff / (std_diff / (n as f64).sqrt());
    let df = (n - 1) as f64;

    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = 2.0 * (1.0 - t_dist.cdf(t_statistic.abs()));

    let cohens_d = mean_diff / std_diff;

    Some(SignificanceResult {
        t_statistic,
        p_value,
        degrees_of_freedom: df,
        is_significant: p_value < alpha,
        cohens_d,
        effect_interpretation: interpret_cohens_d(cohens_d).to_string(),
    })
}

/// Apply Bonferroni correction for multiple comparisons
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bonferroni_correction(alpha: f64, num_comparisons: usize) -> f64 {
    if num_comparisons == 0 {
        return alpha;
    }
    alpha / num_comparisons as f64
}

/// Interpret Cohen's d effect size
#[must_use]
pub fn interpret_cohens_d(d: f64) -> &'static str {
    let abs_d = d.abs();
    if abs_d < 0.2 {
        "negligible"
    } else if abs_d < 0.5 {
        "small"
    } else if abs_d < 0.8 {
        "medium"
    } else {
        "large"
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(median(&[6.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert!(mean(&[]).is_none());
        assert!(median(&[]).is_none());
    }

    #[test]
    fn test_std_dev() {
        let samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = std_dev(&samples);
        // Sample std for this data is ~2.138
        assert!(std > 2.0 && std < 2.2, "std = {std}");
        assert_eq!(std_dev(&[5.0]), 0.0);
    }

    #[test]
    fn test_order_statistic_floor_index() {
        let sorted: Vec<f64> = (0..100).map(f64::from).collect();
        assert_eq!(order_statistic(&sorted, 0.025), Some(2.0));
        assert_eq!(order_statistic(&sorted, 0.975), Some(97.0));
        assert_eq!(order_statistic(&sorted, 1.0), Some(99.0));
        assert!(order_statistic(&[], 0.5).is_none());
    }

    #[test]
    fn test_order_statistic_small_sample() {
        // floor(10 * 0.975) = 9, the last element
        let sorted: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(order_statistic(&sorted, 0.025), Some(0.0));
        assert_eq!(order_statistic(&sorted, 0.975), Some(9.0));
    }

    #[test]
    fn test_sorted_copy_leaves_input() {
        let samples = vec![3.0, 1.0, 2.0];
        let sorted = sorted_copy(&samples);
        assert_eq!(sorted, vec![1.0, 2.0, 3.0]);
        assert_eq!(samples, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_paired_t_test_with_variance() {
        let samples_a: Vec<f64> = (0..100)
            .map(|i| 0.95 + (i as f64 * 0.001) + ((i % 3) as f64 * 0.01))
            .collect();
        let samples_b: Vec<f64> = (0..100)
            .map(|i| 0.85 + (i as f64 * 0.001) + ((i % 5) as f64 * 0.005))
            .collect();

        let result = paired_t_test(&samples_a, &samples_b, 0.05).unwrap();
        assert!(result.is_significant, "p={}", result.p_value);
        assert!(result.t_statistic > 0.0);
        assert_eq!(result.degrees_of_freedom, 99.0);
    }

    #[test]
    fn test_paired_t_test_constant_difference() {
        let a = vec![0.9; 20];
        let b = vec![0.8; 20];
        assert!(paired_t_test(&a, &b, 0.05).is_none());
    }

    #[test]
    fn test_paired_t_test_unequal_length() {
        assert!(paired_t_test(&[0.9, 0.91, 0.92], &[0.8, 0.81], 0.05).is_none());
    }

    #[test]
    fn test_bonferroni_correction() {
        assert!((bonferroni_correction(0.05, 5) - 0.01).abs() < f64::EPSILON);
        assert!((bonferroni_correction(0.05, 0) - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cohens_d_interpretation() {
        assert_eq!(interpret_cohens_d(0.1), "negligible");
        assert_eq!(interpret_cohens_d(0.3), "small");
        assert_eq!(interpret_cohens_d(0.6), "medium");
        assert_eq!(interpret_cohens_d(-0.9), "large");
    }
}
