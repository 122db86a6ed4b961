//! Distribution-matched leave-one-out cross-validation (NNDM-style).
//!
//! Tunes leave-one-out folds so that the nearest-neighbor distances from
//! test points to their training sets mimic the distances from future
//! prediction locations to the training set. The reference distribution
//! comes from synthetic locations sampled over the modeling domain; a greedy
//! local search then excludes nearest training neighbors one at a time
//! wherever doing so shrinks the Kolmogorov–Smirnov distance between the
//! achieved and the reference distance distributions.
//!
//! The search is a deterministic heuristic, not a global optimum: given
//! identical inputs and seed it always produces the same result, and the KS
//! statistic never increases across iterations.

use crate::data::{Extent, PointSet};
use crate::error::{ParcelarError, Result};
use crate::index::{Neighbor, SpatialIndex};
use crate::partition::{Fold, PartitionMetadata, PartitionResult};
use crate::stats::ks_statistic;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// How synthetic prediction locations are drawn from the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDesign {
    /// Seeded uniform sampling over the domain extent.
    Random,
    /// Deterministic square lattice over the domain extent.
    Regular,
}

/// Distribution-matched leave-one-out partitioner.
#[derive(Debug, Clone)]
pub struct DistributionMatchPartitioner {
    num_sample: usize,
    sampling: SamplingDesign,
    domain: Option<Extent>,
    min_train_fraction: f64,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
    time_budget: Option<Duration>,
}

impl DistributionMatchPartitioner {
    /// Creates a partitioner drawing `num_sample` synthetic prediction
    /// locations. Choosing `num_sample` at least as large as the point set
    /// is the caller's responsibility; it is not enforced.
    #[must_use]
    pub fn new(num_sample: usize) -> Self {
        Self {
            num_sample,
            sampling: SamplingDesign::Random,
            domain: None,
            min_train_fraction: 0.5,
            max_iterations: 1000,
            tolerance: 0.05,
            seed: 0,
            time_budget: None,
        }
    }

    /// Sets the sampling design (default random).
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingDesign) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sets the prediction domain; defaults to the point extent.
    #[must_use]
    pub fn with_domain(mut self, domain: Extent) -> Self {
        self.domain = Some(domain);
        self
    }

    /// No fold's training fraction may drop below this bound (default 0.5).
    #[must_use]
    pub fn with_min_train_fraction(mut self, fraction: f64) -> Self {
        self.min_train_fraction = fraction;
        self
    }

    /// Caps the number of greedy reassignment steps (default 1000).
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// KS distance below which the search is considered converged
    /// (default 0.05).
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Seed for the synthetic sampling (default 0).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Wall-clock budget for the search; on expiry the best-found result is
    /// returned with `converged = false` instead of blocking.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Runs the matched leave-one-out search.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::EmptyInput`] for an empty point set;
    /// [`ParcelarError::InvalidConfig`] for fewer than two points,
    /// `num_sample` of 0, or a train fraction outside (0, 1). Exhausting the
    /// iteration or time budget is *not* an error: the best-found result
    /// comes back with `converged = false`.
    pub fn partition(&self, points: &PointSet) -> Result<PartitionResult> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("point set"));
        }
        let n = points.len();
        if n < 2 {
            return Err(ParcelarError::invalid_config(
                "points",
                n,
                ">= 2 (distance distributions need at least two points)",
            ));
        }
        if self.num_sample == 0 {
            return Err(ParcelarError::invalid_config("num_sample", 0, ">= 1"));
        }
        if self.min_train_fraction <= 0.0 || self.min_train_fraction >= 1.0 {
            return Err(ParcelarError::invalid_config(
                "min_train_fraction",
                self.min_train_fraction,
                "in (0, 1)",
            ));
        }

        let start = Instant::now();
        let index = SpatialIndex::build(points)?;
        let domain = self.domain.unwrap_or_else(|| points.extent());
        let reference = self.reference_distances(&index, &domain);

        // Each fold excludes a prefix of its point's neighbor list from
        // training. Neighbor rank r of point p is only needed once the
        // search has excluded r neighbors there, so lists are fetched
        // incrementally instead of materializing all n*(n-1) distances.
        let mut cache = NeighborCache::new(n);
        let mut excluded = vec![0usize; n];
        let mut achieved: Vec<f64> = (0..n).map(|p| cache.distance_at(&index, p, 0)).collect();

        let mut ks = ks_statistic(&achieved, &reference)?;
        let mut steps = 0usize;
        let mut out_of_budget = false;
        while steps < self.max_iterations && ks > self.tolerance {
            if let Some(budget) = self.time_budget {
                if start.elapsed() >= budget {
                    out_of_budget = true;
                    break;
                }
            }
            let Some((best_ks, p)) =
                self.best_move(n, &index, &mut cache, &excluded, &achieved, &reference)
            else {
                break;
            };
            if best_ks >= ks {
                break; // no single reassignment improves the statistic
            }
            excluded[p] += 1;
            achieved[p] = cache.distance_at(&index, p, excluded[p]);
            ks = best_ks;
            steps += 1;
        }
        let converged = ks <= self.tolerance && !out_of_budget;

        let folds = (0..n)
            .map(|p| {
                let cut = cache.ids_up_to(p, excluded[p]);
                let train: Vec<usize> = (0..n)
                    .filter(|&q| q != p && !cut.contains(&q))
                    .collect();
                let fold = Fold::new(train, vec![p]);
                if fold.train_fraction(n) < self.min_train_fraction {
                    fold.degenerate()
                } else {
                    fold
                }
            })
            .collect();

        let mut metadata = PartitionMetadata::new("distribution_match");
        metadata.seed = Some(self.seed);
        metadata.iterations = steps;
        metadata.ks_statistic = Some(ks);
        metadata.converged = converged;
        Ok(PartitionResult { folds, metadata })
    }

    /// The single allowed reassignment with the lowest resulting KS
    /// distance; ties go to the lowest fold id. `None` when no fold can
    /// give up another training neighbor.
    fn best_move(
        &self,
        n: usize,
        index: &SpatialIndex,
        cache: &mut NeighborCache,
        excluded: &[usize],
        achieved: &[f64],
        reference: &[f64],
    ) -> Option<(f64, usize)> {
        let mut best: Option<(f64, usize)> = None;
        let mut candidate = achieved.to_vec();
        for p in 0..n {
            let next = excluded[p] + 1;
            // Keep at least min_train_fraction of the n-1 candidates.
            let train_after = (n - 1 - next) as f64 / (n - 1) as f64;
            if next >= n - 1 || train_after < self.min_train_fraction {
                continue;
            }
            candidate[p] = cache.distance_at(index, p, next);
            let ks = ks_statistic(&candidate, reference).unwrap_or(f64::INFINITY);
            candidate[p] = achieved[p];
            if best.is_none() || ks < best.map_or(f64::INFINITY, |b| b.0) {
                best = Some((ks, p));
            }
        }
        best
    }

    /// Nearest-training-point distances from the synthetic prediction
    /// locations to the full point set.
    fn reference_distances(&self, index: &SpatialIndex, domain: &Extent) -> Vec<f64> {
        let locations = match self.sampling {
            SamplingDesign::Random => {
                let mut rng = StdRng::seed_from_u64(self.seed);
                (0..self.num_sample)
                    .map(|_| {
                        (
                            domain.min_x + rng.gen::<f64>() * domain.width(),
                            domain.min_y + rng.gen::<f64>() * domain.height(),
                        )
                    })
                    .collect::<Vec<_>>()
            }
            SamplingDesign::Regular => regular_lattice(domain, self.num_sample),
        };
        locations
            .iter()
            .map(|&(x, y)| index.nearest_to(x, y, 1)[0].distance)
            .collect()
    }
}

/// Deterministic lattice of cell centers spanning the whole domain. The
/// column count is `ceil(sqrt(num_sample))` and the row count follows from
/// it, so the last row may be partial but every row band of the extent is
/// sampled.
fn regular_lattice(domain: &Extent, num_sample: usize) -> Vec<(f64, f64)> {
    let cols = (num_sample as f64).sqrt().ceil() as usize;
    let rows = (num_sample + cols - 1) / cols;
    let w = domain.width() / cols as f64;
    let h = domain.height() / rows as f64;
    (0..num_sample)
        .map(|i| {
            (
                domain.min_x + (i % cols) as f64 * w + w / 2.0,
                domain.min_y + (i / cols) as f64 * h + h / 2.0,
            )
        })
        .collect()
}

/// Per-point neighbor lists grown on demand, ordered by increasing
/// distance with ties by ascending id.
struct NeighborCache {
    lists: Vec<Vec<Neighbor>>,
}

impl NeighborCache {
    fn new(n: usize) -> Self {
        Self {
            lists: vec![Vec::new(); n],
        }
    }

    /// Distance to the `rank`-th nearest neighbor of `p`, fetching more of
    /// the list when the cached prefix is too short.
    fn distance_at(&mut self, index: &SpatialIndex, p: usize, rank: usize) -> f64 {
        if self.lists[p].len() <= rank {
            self.lists[p] = index.nearest(p, rank + 1);
        }
        self.lists[p][rank].distance
    }

    /// Ids of the `count` nearest neighbors of `p`. Only ranks already
    /// fetched through [`NeighborCache::distance_at`] are available.
    fn ids_up_to(&self, p: usize, count: usize) -> Vec<usize> {
        self.lists[p][..count].iter().map(|nb| nb.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points clustered in one corner of a much larger prediction domain:
    /// achieved LOO distances start far smaller than the reference.
    fn corner_cluster() -> (PointSet, Extent) {
        let coords: Vec<(f64, f64)> = (0..12)
            .map(|i| ((i % 4) as f64 * 0.5, (i / 4) as f64 * 0.5))
            .collect();
        let points = PointSet::from_xy(&coords).unwrap();
        let domain = Extent::new(0.0, 0.0, 10.0, 10.0);
        (points, domain)
    }

    #[test]
    fn test_high_tolerance_yields_plain_loo() {
        let (points, domain) = corner_cluster();
        let result = DistributionMatchPartitioner::new(50)
            .with_domain(domain)
            .with_tolerance(1.0)
            .partition(&points)
            .unwrap();
        assert!(result.metadata.converged);
        assert_eq!(result.metadata.iterations, 0);
        for (p, fold) in result.folds.iter().enumerate() {
            assert_eq!(fold.test, vec![p]);
            assert_eq!(fold.train.len(), points.len() - 1);
        }
    }

    #[test]
    fn test_search_reduces_ks() {
        let (points, domain) = corner_cluster();
        let make = |max_iterations| {
            DistributionMatchPartitioner::new(50)
                .with_domain(domain)
                .with_tolerance(0.0)
                .with_min_train_fraction(0.2)
                .with_max_iterations(max_iterations)
                .partition(&points)
                .unwrap()
        };
        let short = make(1);
        let long = make(30);
        assert!(short.metadata.iterations >= 1);
        assert!(
            long.metadata.ks_statistic.unwrap() <= short.metadata.ks_statistic.unwrap(),
            "KS must not increase with more iterations"
        );
    }

    #[test]
    fn test_ks_monotone_across_budgets() {
        let (points, domain) = corner_cluster();
        let ks_at = |m| {
            DistributionMatchPartitioner::new(40)
                .with_domain(domain)
                .with_tolerance(0.0)
                .with_min_train_fraction(0.2)
                .with_max_iterations(m)
                .partition(&points)
                .unwrap()
                .metadata
                .ks_statistic
                .unwrap()
        };
        let series: Vec<f64> = [1, 2, 4, 8, 16].iter().map(|&m| ks_at(m)).collect();
        for pair in series.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let (points, domain) = corner_cluster();
        let make = || {
            DistributionMatchPartitioner::new(30)
                .with_domain(domain)
                .with_seed(42)
                .with_min_train_fraction(0.3)
                .partition(&points)
                .unwrap()
        };
        let a = make();
        let b = make();
        assert_eq!(a.folds, b.folds);
        assert_eq!(a.metadata.ks_statistic, b.metadata.ks_statistic);
    }

    #[test]
    fn test_regular_sampling_is_seed_independent() {
        let (points, domain) = corner_cluster();
        let make = |seed| {
            DistributionMatchPartitioner::new(25)
                .with_domain(domain)
                .with_sampling(SamplingDesign::Regular)
                .with_seed(seed)
                .partition(&points)
                .unwrap()
        };
        assert_eq!(make(0).folds, make(777).folds);
    }

    #[test]
    fn test_min_train_fraction_respected() {
        let (points, domain) = corner_cluster();
        let fraction = 0.4;
        let result = DistributionMatchPartitioner::new(60)
            .with_domain(domain)
            .with_tolerance(0.0)
            .with_min_train_fraction(fraction)
            .with_max_iterations(500)
            .partition(&points)
            .unwrap();
        let n = points.len();
        for fold in &result.folds {
            assert!(fold.train_fraction(n) >= fraction);
            assert!(!fold.degenerate);
        }
    }

    #[test]
    fn test_budget_exhaustion_reports_not_converged() {
        let (points, domain) = corner_cluster();
        let result = DistributionMatchPartitioner::new(60)
            .with_domain(domain)
            .with_tolerance(0.0)
            .with_max_iterations(1)
            .partition(&points)
            .unwrap();
        assert!(!result.metadata.converged);
        assert!(result.metadata.ks_statistic.is_some());
        assert_eq!(result.folds.len(), points.len());
    }

    #[test]
    fn test_zero_time_budget_returns_best_found() {
        let (points, domain) = corner_cluster();
        let result = DistributionMatchPartitioner::new(60)
            .with_domain(domain)
            .with_tolerance(0.0)
            .with_time_budget(Duration::ZERO)
            .partition(&points)
            .unwrap();
        assert!(!result.metadata.converged);
        assert_eq!(result.metadata.iterations, 0);
        assert_eq!(result.folds.len(), points.len());
    }

    #[test]
    fn test_folds_are_disjoint_leave_one_out() {
        let (points, domain) = corner_cluster();
        let result = DistributionMatchPartitioner::new(30)
            .with_domain(domain)
            .partition(&points)
            .unwrap();
        for (p, fold) in result.folds.iter().enumerate() {
            assert_eq!(fold.test, vec![p]);
            assert!(!fold.train.contains(&p));
        }
    }

    #[test]
    fn test_regular_lattice_covers_full_extent() {
        // Partial last rows must not cut off the top of the domain: every
        // row band gets sampled even when num_sample is not a square.
        let domain = Extent::new(0.0, 0.0, 9.0, 9.0);
        for n in [5usize, 7, 10, 16] {
            let locations = regular_lattice(&domain, n);
            assert_eq!(locations.len(), n);
            assert!(locations.iter().all(|&(x, y)| domain.contains(x, y)));
            let ys: Vec<f64> = locations.iter().map(|&(_, y)| y).collect();
            let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
            assert!(max_y > 4.5, "top half unsampled for num_sample = {n}");
            assert!(min_y < 4.5, "bottom half unsampled for num_sample = {n}");
        }
    }

    #[test]
    fn test_exclusions_are_nearest_neighbor_prefixes() {
        // Whatever the search excludes from a fold's training set must be
        // the held-out point's closest neighbors, never a farther point.
        let (points, domain) = corner_cluster();
        let result = DistributionMatchPartitioner::new(40)
            .with_domain(domain)
            .with_tolerance(0.0)
            .with_min_train_fraction(0.2)
            .with_max_iterations(20)
            .partition(&points)
            .unwrap();
        let n = points.len();
        for (p, fold) in result.folds.iter().enumerate() {
            let cut: Vec<usize> = (0..n)
                .filter(|&q| q != p && !fold.train.contains(&q))
                .collect();
            for &c in &cut {
                for &t in &fold.train {
                    assert!(points.distance(p, c) <= points.distance(p, t));
                }
            }
        }
    }

    #[test]
    fn test_single_point_rejected() {
        let points = PointSet::from_xy(&[(0.0, 0.0)]).unwrap();
        let result = DistributionMatchPartitioner::new(10).partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let points = PointSet::from_xy(&[(0.0, 0.0), (1.0, 1.0)]).unwrap();
        let result = DistributionMatchPartitioner::new(0).partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }
}
