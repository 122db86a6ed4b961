//! Train/test fold generation for spatial cross-validation.
//!
//! Four strategies under one contract: regular-grid blocking
//! ([`BlockPartitioner`]), spatial or environmental clustering
//! ([`ClusterPartitioner`]), buffered leave-one-out
//! ([`BufferLooPartitioner`]), and distribution-matched leave-one-out
//! ([`DistributionMatchPartitioner`]). Every strategy is a pure function of
//! (points, configuration, seed) and produces an immutable
//! [`PartitionResult`].
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let points = PointSet::from_xy(&[
//!     (0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0),
//!     (10.0, 10.0), (11.0, 10.0), (10.0, 11.0), (11.0, 11.0),
//! ]).unwrap();
//!
//! let strategy = PartitionStrategy::Cluster(ClusterPartitioner::new(2));
//! let result = strategy.partition(&points).unwrap();
//! assert_eq!(result.folds.len(), 2);
//! for fold in &result.folds {
//!     assert!(fold.train.iter().all(|id| !fold.test.contains(id)));
//! }
//! ```

pub mod block;
pub mod buffer;
pub mod cluster;
pub mod nndm;

pub use block::{BlockPartitioner, BlockSelection, BlockShape};
pub use buffer::BufferLooPartitioner;
pub use cluster::{ClusterPartitioner, ClusterSpace};
pub use nndm::{DistributionMatchPartitioner, SamplingDesign};

use crate::data::PointSet;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One train/test index partition.
///
/// Invariant: `train` and `test` are sorted, duplicate-free and disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Training point ids.
    pub train: Vec<usize>,
    /// Testing point ids.
    pub test: Vec<usize>,
    /// Whether the fold fell below the configured minimum train fraction or
    /// has an empty side. Retained so the caller decides exclusion policy.
    pub degenerate: bool,
}

impl Fold {
    /// Creates a fold, sorting both id lists.
    #[must_use]
    pub fn new(mut train: Vec<usize>, mut test: Vec<usize>) -> Self {
        train.sort_unstable();
        test.sort_unstable();
        Self {
            train,
            test,
            degenerate: false,
        }
    }

    /// Marks the fold degenerate.
    #[must_use]
    pub fn degenerate(mut self) -> Self {
        self.degenerate = true;
        self
    }

    /// Fraction of available points in the training set, relative to the
    /// full point set minus the test set.
    #[must_use]
    pub fn train_fraction(&self, n_points: usize) -> f64 {
        let available = n_points.saturating_sub(self.test.len());
        if available == 0 {
            return 0.0;
        }
        self.train.len() as f64 / available as f64
    }
}

/// Provenance and quality metadata attached to a [`PartitionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    /// Strategy name ("block", "cluster", "buffer_loo", "distribution_match").
    pub strategy: String,
    /// Seed used for the stochastic steps, if any.
    pub seed: Option<u64>,
    /// Iterations run (search trials, k-means sweeps, reassignment steps).
    pub iterations: usize,
    /// Balance score of the chosen assignment (coefficient of variation of
    /// fold test sizes), where the strategy searches for balance.
    pub balance_score: Option<f64>,
    /// Achieved Kolmogorov–Smirnov distance of the distribution-matched
    /// search.
    pub ks_statistic: Option<f64>,
    /// False when a bounded search exhausted its budget before meeting its
    /// tolerance; the result is still the best found.
    pub converged: bool,
    /// Ids excluded from the partition (e.g. outside the tessellated
    /// extent). Never silently dropped.
    pub dropped_points: Vec<usize>,
}

impl PartitionMetadata {
    pub(crate) fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            seed: None,
            iterations: 0,
            balance_score: None,
            ks_statistic: None,
            converged: true,
            dropped_points: Vec::new(),
        }
    }
}

/// Ordered folds plus metadata; the immutable output of every partitioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionResult {
    /// The folds, in strategy-defined order.
    pub folds: Vec<Fold>,
    /// Provenance and quality metadata.
    pub metadata: PartitionMetadata,
}

impl PartitionResult {
    /// Number of folds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    /// Whether the result holds no folds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Ids of folds flagged degenerate.
    #[must_use]
    pub fn degenerate_folds(&self) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(_, f)| f.degenerate)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Tagged union over the four partitioning strategies.
///
/// Gives every strategy the same caller-facing contract:
/// `(PointSet, config, seed) -> PartitionResult`.
#[derive(Debug, Clone)]
pub enum PartitionStrategy {
    /// Regular-grid blocking.
    Block(BlockPartitioner),
    /// K-means fold assignment over coordinates or covariates.
    Cluster(ClusterPartitioner),
    /// Buffered leave-one-out.
    BufferLoo(BufferLooPartitioner),
    /// Distribution-matched leave-one-out (NNDM-style).
    DistributionMatch(DistributionMatchPartitioner),
}

impl PartitionStrategy {
    /// Runs the wrapped partitioner.
    ///
    /// # Errors
    ///
    /// Propagates the wrapped partitioner's configuration and input errors.
    pub fn partition(&self, points: &PointSet) -> Result<PartitionResult> {
        match self {
            PartitionStrategy::Block(p) => p.partition(points),
            PartitionStrategy::Cluster(p) => p.partition(points),
            PartitionStrategy::BufferLoo(p) => p.partition(points),
            PartitionStrategy::DistributionMatch(p) => p.partition(points),
        }
    }
}
