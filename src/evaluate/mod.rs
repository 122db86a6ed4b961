//! Diagnostics over finished partitions.
//!
//! Two read-only checks the caller runs before trusting a partition:
//! covariate-distribution similarity between each fold's train and test
//! subsets, and an empirical-correlogram estimate of the effective spatial
//! autocorrelation range, an advisory input when choosing block or buffer
//! sizes. Neither mutates a [`PartitionResult`].
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let points = PointSet::from_xy_features(
//!     &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)],
//!     &[vec![1.0], vec![2.0], vec![1.0], vec![2.0]],
//! ).unwrap();
//! let result = BufferLooPartitioner::new(0.0).partition(&points).unwrap();
//! let similarity = FoldEvaluator::new().fold_similarity(&result, &points).unwrap();
//! assert_eq!(similarity.per_fold.len(), 4);
//! ```

use crate::data::PointSet;
use crate::error::{ParcelarError, Result};
use crate::partition::PartitionResult;
use crate::stats::{ks_statistic, mean};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Per-fold train/test covariate similarity, 0 (disjoint) to 1 (identical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSimilarity {
    /// One score per fold, in fold order.
    pub per_fold: Vec<f64>,
    /// Mean of the per-fold scores.
    pub aggregate: f64,
}

/// Effective spatial autocorrelation range of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocorrelationEstimate {
    /// Index of the feature the estimate was fit on.
    pub variable: usize,
    /// Distance beyond which correlation stays at or below the threshold.
    pub effective_range: f64,
    /// Estimation method identifier.
    pub method: String,
}

/// Read-only fold diagnostics.
#[derive(Debug, Clone)]
pub struct FoldEvaluator {
    num_sample: usize,
    num_lags: usize,
    threshold: f64,
    seed: u64,
}

impl Default for FoldEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl FoldEvaluator {
    /// Creates an evaluator with default settings: up to 1000 sampled
    /// points, 15 correlogram lags, correlation threshold 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_sample: 1000,
            num_lags: 15,
            threshold: 0.0,
            seed: 0,
        }
    }

    /// Caps the number of points entering the correlogram (default 1000).
    #[must_use]
    pub fn with_num_sample(mut self, num_sample: usize) -> Self {
        self.num_sample = num_sample;
        self
    }

    /// Number of distance bins in the correlogram (default 15).
    #[must_use]
    pub fn with_num_lags(mut self, num_lags: usize) -> Self {
        self.num_lags = num_lags;
        self
    }

    /// Correlation level treated as negligible (default 0).
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Seed for the point subsample (default 0).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Per-fold train/test similarity of the covariate distributions.
    ///
    /// For each fold and each feature dimension the two-sample
    /// Kolmogorov–Smirnov distance between train and test values is turned
    /// into `1 - KS` and averaged across dimensions. Folds with an empty
    /// train or test side score 0.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::EmptyInput`] when the point set carries no features
    /// or the result holds no folds.
    pub fn fold_similarity(
        &self,
        result: &PartitionResult,
        points: &PointSet,
    ) -> Result<FoldSimilarity> {
        let Some(width) = points.n_features() else {
            return Err(ParcelarError::empty_input(
                "features (fold similarity needs covariates)",
            ));
        };
        if result.is_empty() {
            return Err(ParcelarError::empty_input("folds"));
        }

        let value = |id: usize, dim: usize| -> f64 {
            points[id].features.as_ref().map_or(0.0, |f| f[dim])
        };
        let per_fold: Vec<f64> = result
            .folds
            .iter()
            .map(|fold| {
                if fold.train.is_empty() || fold.test.is_empty() {
                    return Ok(0.0);
                }
                let mut sum = 0.0;
                for dim in 0..width {
                    let train: Vec<f64> = fold.train.iter().map(|&id| value(id, dim)).collect();
                    let test: Vec<f64> = fold.test.iter().map(|&id| value(id, dim)).collect();
                    sum += 1.0 - ks_statistic(&train, &test)?;
                }
                Ok(sum / width as f64)
            })
            .collect::<Result<_>>()?;
        let aggregate = mean(&per_fold);
        Ok(FoldSimilarity {
            per_fold,
            aggregate,
        })
    }

    /// Estimates the effective autocorrelation range of one feature from an
    /// empirical correlogram over a seeded point subsample.
    ///
    /// Pairwise products of centered values are binned by distance up to
    /// half the extent diagonal; the range is the center of the first lag
    /// whose correlation drops to the threshold, or the maximum lag distance
    /// when correlation never decays. A constant variable has range 0.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::EmptyInput`] when the point set carries no features;
    /// [`ParcelarError::InvalidConfig`] for an out-of-range variable index
    /// or a zero sample/lag count.
    pub fn autocorrelation_range(
        &self,
        points: &PointSet,
        variable: usize,
    ) -> Result<AutocorrelationEstimate> {
        let Some(width) = points.n_features() else {
            return Err(ParcelarError::empty_input(
                "features (correlogram needs covariates)",
            ));
        };
        if variable >= width {
            return Err(ParcelarError::invalid_config(
                "variable",
                variable,
                &format!("< number of features ({width})"),
            ));
        }
        if self.num_sample == 0 || self.num_lags == 0 {
            return Err(ParcelarError::invalid_config(
                "num_sample/num_lags",
                0,
                ">= 1",
            ));
        }

        let ids = self.subsample_ids(points.len());
        let values: Vec<f64> = ids
            .iter()
            .map(|&id| points[id].features.as_ref().map_or(0.0, |f| f[variable]))
            .collect();
        let m = mean(&values);
        let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
        let variance = mean(&centered.iter().map(|z| z * z).collect::<Vec<_>>());

        let extent = points.extent();
        let max_dist = (extent.width().hypot(extent.height()) / 2.0).max(f64::MIN_POSITIVE);
        let estimate = |range: f64| AutocorrelationEstimate {
            variable,
            effective_range: range,
            method: "correlogram".to_string(),
        };
        if variance == 0.0 {
            return Ok(estimate(0.0));
        }

        let bin_width = max_dist / self.num_lags as f64;
        let mut sums = vec![0.0; self.num_lags];
        let mut counts = vec![0usize; self.num_lags];
        for (i, &a) in ids.iter().enumerate() {
            for (j, &b) in ids.iter().enumerate().skip(i + 1) {
                let d = points.distance(a, b);
                if d > max_dist {
                    continue;
                }
                let bin = ((d / bin_width) as usize).min(self.num_lags - 1);
                sums[bin] += centered[i] * centered[j];
                counts[bin] += 1;
            }
        }

        for bin in 0..self.num_lags {
            if counts[bin] == 0 {
                continue;
            }
            let correlation = sums[bin] / counts[bin] as f64 / variance;
            if correlation <= self.threshold {
                return Ok(estimate((bin as f64 + 0.5) * bin_width));
            }
        }
        Ok(estimate(max_dist))
    }

    /// Up to `num_sample` point ids; a seeded shuffle decides which are kept
    /// when the set is larger than the sample budget.
    fn subsample_ids(&self, n: usize) -> Vec<usize> {
        let mut ids: Vec<usize> = (0..n).collect();
        if n > self.num_sample {
            let mut rng = StdRng::seed_from_u64(self.seed);
            ids.shuffle(&mut rng);
            ids.truncate(self.num_sample);
            ids.sort_unstable();
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{BufferLooPartitioner, Fold, PartitionMetadata};

    fn result_with_folds(folds: Vec<Fold>) -> PartitionResult {
        PartitionResult {
            folds,
            metadata: PartitionMetadata::new("block"),
        }
    }

    #[test]
    fn test_similarity_identical_distributions_is_one() {
        let points = PointSet::from_xy_features(
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)],
            &[vec![1.0], vec![2.0], vec![1.0], vec![2.0]],
        )
        .unwrap();
        let result = result_with_folds(vec![Fold::new(vec![0, 1], vec![2, 3])]);
        let sim = FoldEvaluator::new().fold_similarity(&result, &points).unwrap();
        assert!((sim.per_fold[0] - 1.0).abs() < 1e-12);
        assert!((sim.aggregate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_disjoint_distributions_is_zero() {
        let points = PointSet::from_xy_features(
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)],
            &[vec![1.0], vec![2.0], vec![100.0], vec![200.0]],
        )
        .unwrap();
        let result = result_with_folds(vec![Fold::new(vec![0, 1], vec![2, 3])]);
        let sim = FoldEvaluator::new().fold_similarity(&result, &points).unwrap();
        assert!(sim.per_fold[0].abs() < 1e-12);
    }

    #[test]
    fn test_similarity_empty_side_scores_zero() {
        let points = PointSet::from_xy_features(
            &[(0.0, 0.0), (1.0, 0.0)],
            &[vec![1.0], vec![2.0]],
        )
        .unwrap();
        let result = result_with_folds(vec![
            Fold::new(vec![], vec![0]).degenerate(),
            Fold::new(vec![0], vec![1]),
        ]);
        let sim = FoldEvaluator::new().fold_similarity(&result, &points).unwrap();
        assert_eq!(sim.per_fold[0], 0.0);
    }

    #[test]
    fn test_similarity_without_features_rejected() {
        let points = PointSet::from_xy(&[(0.0, 0.0), (1.0, 0.0)]).unwrap();
        let result = BufferLooPartitioner::new(0.0).partition(&points).unwrap();
        let out = FoldEvaluator::new().fold_similarity(&result, &points);
        assert!(matches!(out, Err(ParcelarError::EmptyInput { .. })));
    }

    #[test]
    fn test_similarity_aggregate_is_mean() {
        let points = PointSet::from_xy_features(
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)],
            &[vec![1.0], vec![2.0], vec![1.0], vec![2.0]],
        )
        .unwrap();
        let result = result_with_folds(vec![
            Fold::new(vec![0, 1], vec![2, 3]),
            Fold::new(vec![], vec![0]).degenerate(),
        ]);
        let sim = FoldEvaluator::new().fold_similarity(&result, &points).unwrap();
        assert!((sim.aggregate - (sim.per_fold[0] + sim.per_fold[1]) / 2.0).abs() < 1e-12);
    }

    /// Smooth east-west gradient: near pairs correlate positively, far pairs
    /// negatively, so the correlogram must cross zero strictly inside the
    /// lag window.
    #[test]
    fn test_gradient_has_interior_range() {
        let coords: Vec<(f64, f64)> = (0..40).map(|i| (i as f64, 0.0)).collect();
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let points = PointSet::from_xy_features(&coords, &features).unwrap();
        let est = FoldEvaluator::new().autocorrelation_range(&points, 0).unwrap();
        assert_eq!(est.variable, 0);
        assert_eq!(est.method, "correlogram");
        assert!(est.effective_range > 0.0);
        assert!(est.effective_range < 19.5); // half the 39-unit diagonal
    }

    #[test]
    fn test_constant_variable_has_zero_range() {
        let points = PointSet::from_xy_features(
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)],
            &[vec![5.0], vec![5.0], vec![5.0]],
        )
        .unwrap();
        let est = FoldEvaluator::new().autocorrelation_range(&points, 0).unwrap();
        assert_eq!(est.effective_range, 0.0);
    }

    #[test]
    fn test_uncorrelated_noise_has_short_range() {
        // Alternating values have negative lag-1 correlation.
        let coords: Vec<(f64, f64)> = (0..20).map(|i| (i as f64, 0.0)).collect();
        let features: Vec<Vec<f64>> =
            (0..20).map(|i| vec![if i % 2 == 0 { 1.0 } else { -1.0 }]).collect();
        let points = PointSet::from_xy_features(&coords, &features).unwrap();
        let est = FoldEvaluator::new().autocorrelation_range(&points, 0).unwrap();
        assert!(est.effective_range < 1.0);
    }

    #[test]
    fn test_subsample_is_deterministic() {
        let coords: Vec<(f64, f64)> = (0..50)
            .map(|i| ((i as f64 * 1.3).sin() * 10.0, (i as f64 * 0.7).cos() * 10.0))
            .collect();
        let features: Vec<Vec<f64>> = coords.iter().map(|&(x, _)| vec![x]).collect();
        let points = PointSet::from_xy_features(&coords, &features).unwrap();
        let evaluator = FoldEvaluator::new().with_num_sample(20).with_seed(7);
        let a = evaluator.autocorrelation_range(&points, 0).unwrap();
        let b = evaluator.autocorrelation_range(&points, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_variable_out_of_range_rejected() {
        let points =
            PointSet::from_xy_features(&[(0.0, 0.0), (1.0, 0.0)], &[vec![1.0], vec![2.0]])
                .unwrap();
        let out = FoldEvaluator::new().autocorrelation_range(&points, 3);
        assert!(matches!(out, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_without_features_rejected() {
        let points = PointSet::from_xy(&[(0.0, 0.0), (1.0, 0.0)]).unwrap();
        let out = FoldEvaluator::new().autocorrelation_range(&points, 0);
        assert!(matches!(out, Err(ParcelarError::EmptyInput { .. })));
    }
}
