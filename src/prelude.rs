//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use parcelar::prelude::*;
//! ```

pub use crate::data::{CovariateSource, Extent, GridRaster, Point, PointSet};
pub use crate::error::{ParcelarError, Result};
pub use crate::evaluate::{AutocorrelationEstimate, FoldEvaluator, FoldSimilarity};
pub use crate::index::{Neighbor, SpatialIndex};
pub use crate::partition::{
    BlockPartitioner, BlockSelection, BlockShape, BufferLooPartitioner, ClusterPartitioner,
    ClusterSpace, DistributionMatchPartitioner, Fold, PartitionMetadata, PartitionResult,
    PartitionStrategy, SamplingDesign,
};
