//! Buffered leave-one-out cross-validation.
//!
//! For every point p the test set is `{p}` and the training set is every
//! point strictly farther than the buffer radius, so observations spatially
//! correlated with the held-out point never leak into training. A radius of
//! zero reduces to classic leave-one-out.
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let points = PointSet::from_xy(&[
//!     (0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0),
//! ]).unwrap();
//! let result = BufferLooPartitioner::new(1.5).partition(&points).unwrap();
//! assert_eq!(result.folds.len(), 5);
//! // The middle point loses both immediate neighbors on each side.
//! assert_eq!(result.folds[2].train, vec![0, 4]);
//! ```

use crate::data::PointSet;
use crate::error::{ParcelarError, Result};
use crate::index::SpatialIndex;
use crate::partition::{Fold, PartitionMetadata, PartitionResult};

/// Buffered leave-one-out partitioner.
#[derive(Debug, Clone)]
pub struct BufferLooPartitioner {
    radius: f64,
    min_train_fraction: f64,
}

impl BufferLooPartitioner {
    /// Creates a partitioner with the given buffer radius (coordinate
    /// units). Radius 0 is classic leave-one-out; negative radii are
    /// rejected at partition time.
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            min_train_fraction: 0.5,
        }
    }

    /// Folds whose train fraction falls below this threshold are flagged
    /// degenerate, not dropped (default 0.5).
    #[must_use]
    pub fn with_min_train_fraction(mut self, fraction: f64) -> Self {
        self.min_train_fraction = fraction;
        self
    }

    /// Produces one fold per point, in id order.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::InvalidConfig`] for a negative radius or a train
    /// fraction outside (0, 1); [`ParcelarError::EmptyInput`] for an empty
    /// point set.
    pub fn partition(&self, points: &PointSet) -> Result<PartitionResult> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("point set"));
        }
        if self.radius < 0.0 {
            return Err(ParcelarError::invalid_config("radius", self.radius, ">= 0"));
        }
        if self.min_train_fraction <= 0.0 || self.min_train_fraction >= 1.0 {
            return Err(ParcelarError::invalid_config(
                "min_train_fraction",
                self.min_train_fraction,
                "in (0, 1)",
            ));
        }

        let index = SpatialIndex::build(points)?;
        let n = points.len();
        let folds = (0..n)
            .map(|id| {
                let excluded: Vec<usize> = index
                    .within_radius(id, self.radius)
                    .iter()
                    .map(|nb| nb.id)
                    .collect();
                let train: Vec<usize> = (0..n)
                    .filter(|&q| q != id && !excluded.contains(&q))
                    .collect();
                let fold = Fold::new(train, vec![id]);
                if fold.train_fraction(n) < self.min_train_fraction {
                    fold.degenerate()
                } else {
                    fold
                }
            })
            .collect();

        Ok(PartitionResult {
            folds,
            metadata: PartitionMetadata::new("buffer_loo"),
        })
    }
}
