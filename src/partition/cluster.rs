//! K-means fold assignment over coordinates or covariates.
//!
//! Runs seeded Lloyd's k-means with deterministic farthest-point
//! initialization; the cluster id of a point is its test fold id, the train
//! set is the complement. `Spatial` clusters on coordinates, `Environmental`
//! on the feature vectors (standardized first).
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let points = PointSet::from_xy(&[
//!     (0.0, 0.0), (0.0, 1.0), (10.0, 0.0), (10.0, 1.0),
//! ]).unwrap();
//! let result = ClusterPartitioner::new(2).partition(&points).unwrap();
//! assert_eq!(result.folds.len(), 2);
//! ```

use crate::data::PointSet;
use crate::error::{ParcelarError, Result};
use crate::partition::{Fold, PartitionMetadata, PartitionResult};
use crate::stats::standardize;

/// Which space the clustering runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSpace {
    /// Cluster on point coordinates.
    Spatial,
    /// Cluster on covariate feature vectors.
    Environmental,
}

/// Cluster-based cross-validation partitioner.
#[derive(Debug, Clone)]
pub struct ClusterPartitioner {
    k: usize,
    space: ClusterSpace,
    scale: bool,
    seed: u64,
    max_iter: usize,
    tol: f64,
}

impl ClusterPartitioner {
    /// Creates a partitioner producing `k` cluster folds.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            space: ClusterSpace::Spatial,
            scale: false,
            seed: 0,
            max_iter: 300,
            tol: 1e-6,
        }
    }

    /// Sets the clustering space (default spatial). Environmental clustering
    /// requires features and `with_scale(true)`.
    #[must_use]
    pub fn with_space(mut self, space: ClusterSpace) -> Self {
        self.space = space;
        self
    }

    /// Standardize the clustered vectors column-wise before running k-means.
    #[must_use]
    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Seed selecting the initial centroid (default 0).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Maximum Lloyd iterations (default 300).
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Clusters the points and collects one fold per cluster.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::EmptyInput`] for an empty point set or environmental
    /// clustering without features; [`ParcelarError::InvalidConfig`] when
    /// `k < 2`, `k` exceeds the number of distinct rows, or environmental
    /// clustering is requested without scaling.
    pub fn partition(&self, points: &PointSet) -> Result<PartitionResult> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("point set"));
        }
        if self.k < 2 {
            return Err(ParcelarError::invalid_config("k", self.k, ">= 2"));
        }
        let rows = self.clustered_rows(points)?;
        let distinct = count_distinct(&rows);
        if self.k > distinct {
            return Err(ParcelarError::invalid_config(
                "k",
                self.k,
                &format!("<= number of distinct points ({distinct})"),
            ));
        }

        let (labels, n_iter) = lloyd_kmeans(&rows, self.k, self.seed, self.max_iter, self.tol);

        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.k];
        for (id, &label) in labels.iter().enumerate() {
            tests[label].push(id);
        }
        let folds = tests
            .into_iter()
            .map(|test| {
                let train: Vec<usize> =
                    (0..points.len()).filter(|id| !test.contains(id)).collect();
                let degenerate = test.is_empty();
                let fold = Fold::new(train, test);
                if degenerate {
                    fold.degenerate()
                } else {
                    fold
                }
            })
            .collect();

        let mut metadata = PartitionMetadata::new("cluster");
        metadata.seed = Some(self.seed);
        metadata.iterations = n_iter;
        Ok(PartitionResult { folds, metadata })
    }

    fn clustered_rows(&self, points: &PointSet) -> Result<Vec<Vec<f64>>> {
        match self.space {
            ClusterSpace::Spatial => {
                let rows: Vec<Vec<f64>> = points.iter().map(|p| vec![p.x, p.y]).collect();
                if self.scale {
                    standardize(&rows)
                } else {
                    Ok(rows)
                }
            }
            ClusterSpace::Environmental => {
                if points.n_features().is_none() {
                    return Err(ParcelarError::empty_input(
                        "features (environmental clustering needs covariates)",
                    ));
                }
                if !self.scale {
                    return Err(ParcelarError::invalid_config(
                        "scale",
                        false,
                        "true (environmental clustering requires standardized features)",
                    ));
                }
                let rows: Vec<Vec<f64>> = points
                    .iter()
                    .map(|p| p.features.clone().unwrap_or_default())
                    .collect();
                standardize(&rows)
            }
        }
    }
}

fn count_distinct(rows: &[Vec<f64>]) -> usize {
    let mut keys: Vec<Vec<u64>> = rows
        .iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect())
        .collect();
    keys.sort();
    keys.dedup();
    keys.len()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Lloyd's algorithm with deterministic initialization: the seed selects the
/// first centroid, remaining centroids are chosen farthest-point (ties by
/// lowest row index). Returns per-row labels and the iteration count.
fn lloyd_kmeans(
    rows: &[Vec<f64>],
    k: usize,
    seed: u64,
    max_iter: usize,
    tol: f64,
) -> (Vec<usize>, usize) {
    let n = rows.len();
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    centroids.push(rows[(seed as usize) % n].clone());
    while centroids.len() < k {
        let mut best = (0.0, 0usize);
        for (i, row) in rows.iter().enumerate() {
            let d = centroids
                .iter()
                .map(|c| squared_distance(row, c))
                .fold(f64::INFINITY, f64::min);
            if d > best.0 {
                best = (d, i);
            }
        }
        centroids.push(rows[best.1].clone());
    }

    let mut labels = vec![0usize; n];
    let mut n_iter = 0;
    for _ in 0..max_iter {
        n_iter += 1;
        for (i, row) in rows.iter().enumerate() {
            let mut min = (f64::INFINITY, 0usize);
            for (c, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(row, centroid);
                if d < min.0 {
                    min = (d, c);
                }
            }
            labels[i] = min.1;
        }

        let width = rows[0].len();
        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in rows.iter().zip(&labels) {
            counts[label] += 1;
            for (j, v) in row.iter().enumerate() {
                sums[label][j] += v;
            }
        }
        let mut shift: f64 = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue; // empty cluster keeps its centroid
            }
            for v in &mut sums[c] {
                *v /= counts[c] as f64;
            }
            shift = shift.max(squared_distance(&sums[c], &centroids[c]));
            centroids[c] = std::mem::take(&mut sums[c]);
        }
        if shift <= tol * tol {
            break;
        }
    }
    (labels, n_iter)
}
