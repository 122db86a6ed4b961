//! Parcelar: spatial cross-validation fold generation in pure Rust.
//!
//! Parcelar decides which observation indices belong to which
//! cross-validation fold when the observations are georeferenced and
//! spatially autocorrelated, so that naive random splits do not leak
//! nearby points between train and test. It covers four partitioning
//! strategies under one contract plus the diagnostics to judge the result.
//!
//! # Quick Start
//!
//! ```
//! use parcelar::prelude::*;
//!
//! // Two spatial clusters of observations.
//! let points = PointSet::from_xy(&[
//!     (0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0),
//!     (10.0, 10.0), (11.0, 10.0), (10.0, 11.0), (11.0, 11.0),
//! ]).unwrap();
//!
//! // Cluster-based folds: each cluster becomes one test set.
//! let result = ClusterPartitioner::new(2).partition(&points).unwrap();
//! assert_eq!(result.folds.len(), 2);
//! for fold in &result.folds {
//!     assert!(fold.train.iter().all(|id| !fold.test.contains(id)));
//! }
//! ```
//!
//! # Modules
//!
//! - [`data`]: Point, PointSet, Extent and covariate access
//! - [`index`]: k-d tree nearest-neighbor and radius queries
//! - [`partition`]: the four fold-generation strategies
//! - [`evaluate`]: fold similarity and autocorrelation-range diagnostics
//! - [`stats`]: shared statistical helpers
//! - [`error`]: the crate-wide error type

pub mod data;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod partition;
pub mod prelude;
pub mod stats;

pub use error::{ParcelarError, Result};
