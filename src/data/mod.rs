//! Core spatial data types (Point, PointSet, Extent) and covariate access.
//!
//! A [`PointSet`] is the single input every partitioner consumes: an ordered
//! sequence of georeferenced observations in one projected coordinate
//! reference system, each optionally carrying a fixed-length feature vector.
//! Covariate rasters are reached through the narrow [`CovariateSource`]
//! trait; this crate never reads raster files itself.

use crate::error::{ParcelarError, Result};
use serde::{Deserialize, Serialize};

/// One georeferenced observation.
///
/// Immutable once loaded; `id` equals the point's position in its
/// [`PointSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Stable 0-based identifier.
    pub id: usize,
    /// X coordinate in projected units.
    pub x: f64,
    /// Y coordinate in projected units.
    pub y: f64,
    /// Optional covariate vector; same length across a point set.
    pub features: Option<Vec<f64>>,
}

impl Point {
    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Ordered collection of [`Point`]s sharing one coordinate reference system.
///
/// # Examples
///
/// ```
/// use parcelar::prelude::*;
///
/// let points = PointSet::from_xy(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]).unwrap();
/// assert_eq!(points.len(), 3);
/// assert_eq!(points[1].id, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    points: Vec<Point>,
    crs: Option<String>,
    n_features: Option<usize>,
}

impl PointSet {
    /// Builds a point set from raw points.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelarError::EmptyInput`] for zero points and
    /// [`ParcelarError::InvalidConfig`] when ids do not match positions or
    /// feature vectors have inconsistent lengths.
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("point set"));
        }
        let n_features = points[0].features.as_ref().map(Vec::len);
        for (i, p) in points.iter().enumerate() {
            if p.id != i {
                return Err(ParcelarError::invalid_config(
                    "id",
                    p.id,
                    "ids must equal point positions (0-based)",
                ));
            }
            if p.features.as_ref().map(Vec::len) != n_features {
                return Err(ParcelarError::invalid_config(
                    "features",
                    format!("point {i}"),
                    "all feature vectors must have equal length, or all be absent",
                ));
            }
        }
        Ok(Self {
            points,
            crs: None,
            n_features,
        })
    }

    /// Builds a point set from bare coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelarError::EmptyInput`] for an empty slice.
    pub fn from_xy(coords: &[(f64, f64)]) -> Result<Self> {
        let points = coords
            .iter()
            .enumerate()
            .map(|(id, &(x, y))| Point {
                id,
                x,
                y,
                features: None,
            })
            .collect();
        Self::new(points)
    }

    /// Builds a point set from coordinates plus one feature vector per point.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, a coordinate/feature length
    /// mismatch, or ragged feature vectors.
    pub fn from_xy_features(coords: &[(f64, f64)], features: &[Vec<f64>]) -> Result<Self> {
        if coords.len() != features.len() {
            return Err(ParcelarError::invalid_config(
                "features",
                features.len(),
                &format!("one feature vector per point ({})", coords.len()),
            ));
        }
        let points = coords
            .iter()
            .zip(features)
            .enumerate()
            .map(|(id, (&(x, y), f))| Point {
                id,
                x,
                y,
                features: Some(f.clone()),
            })
            .collect();
        Self::new(points)
    }

    /// Tags the point set with a coordinate reference system identifier.
    #[must_use]
    pub fn with_crs(mut self, crs: &str) -> Self {
        self.crs = Some(crs.to_string());
        self
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: an empty point set cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// CRS identifier, if tagged.
    #[must_use]
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Feature vector length, if features are present.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Iterator over the points in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Bounding extent of all points.
    #[must_use]
    pub fn extent(&self) -> Extent {
        Extent::of_points(&self.points)
    }

    /// Euclidean distance between two points by id.
    #[must_use]
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.points[a].distance_to(&self.points[b])
    }

    /// Returns a copy with features sampled from a covariate source at every
    /// point coordinate, replacing any existing features.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelarError::CrsMismatch`] when both sides carry a CRS tag
    /// and they differ, and [`ParcelarError::OutsideCoverage`] when any point
    /// falls outside the source (no silent loss).
    pub fn sample_features<S: CovariateSource + ?Sized>(&self, source: &S) -> Result<PointSet> {
        if let (Some(ours), Some(theirs)) = (self.crs(), source.crs()) {
            if ours != theirs {
                return Err(ParcelarError::CrsMismatch {
                    expected: ours.to_string(),
                    actual: theirs.to_string(),
                });
            }
        }
        let mut points = Vec::with_capacity(self.len());
        for p in &self.points {
            let features = source
                .sample(p.x, p.y)
                .ok_or(ParcelarError::OutsideCoverage { id: p.id })?;
            points.push(Point {
                id: p.id,
                x: p.x,
                y: p.y,
                features: Some(features),
            });
        }
        let mut out = Self::new(points)?;
        out.crs = self.crs.clone();
        Ok(out)
    }
}

impl std::ops::Index<usize> for PointSet {
    type Output = Point;

    fn index(&self, id: usize) -> &Point {
        &self.points[id]
    }
}

/// Axis-aligned bounding box in projected units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl Extent {
    /// Creates an extent from its corners.
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of a non-empty point slice.
    #[must_use]
    pub fn of_points(points: &[Point]) -> Self {
        let mut e = Self::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for p in points {
            e.min_x = e.min_x.min(p.x);
            e.min_y = e.min_y.min(p.y);
            e.max_x = e.max_x.max(p.x);
            e.max_y = e.max_y.max(p.y);
        }
        e
    }

    /// Width of the extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether a coordinate lies inside (inclusive of edges).
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Read-only access to a covariate surface, queried by coordinate.
///
/// The one interface through which partitioners and the fold evaluator see
/// raster data. Implementations are supplied by the caller; [`GridRaster`]
/// is a minimal in-memory implementation for tests and small grids.
pub trait CovariateSource {
    /// Number of bands returned by [`CovariateSource::sample`].
    fn n_bands(&self) -> usize;

    /// CRS identifier, if known.
    fn crs(&self) -> Option<&str> {
        None
    }

    /// Covariate vector at a coordinate; `None` outside coverage.
    fn sample(&self, x: f64, y: f64) -> Option<Vec<f64>>;
}

/// In-memory regular grid of covariate values, row-major from the top-left
/// corner (row 0 = maximum y), one `Vec<f64>` of band values per cell.
#[derive(Debug, Clone)]
pub struct GridRaster {
    extent: Extent,
    rows: usize,
    cols: usize,
    n_bands: usize,
    values: Vec<f64>,
    crs: Option<String>,
}

impl GridRaster {
    /// Creates a raster over `extent` with `rows * cols * n_bands` values.
    ///
    /// # Errors
    ///
    /// Returns an error when the value buffer length does not match the grid
    /// dimensions or the grid is empty.
    pub fn new(
        extent: Extent,
        rows: usize,
        cols: usize,
        n_bands: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 || n_bands == 0 {
            return Err(ParcelarError::empty_input("raster grid"));
        }
        if values.len() != rows * cols * n_bands {
            return Err(ParcelarError::invalid_config(
                "values",
                values.len(),
                &format!("rows * cols * n_bands = {}", rows * cols * n_bands),
            ));
        }
        Ok(Self {
            extent,
            rows,
            cols,
            n_bands,
            values,
            crs: None,
        })
    }

    /// Tags the raster with a coordinate reference system identifier.
    #[must_use]
    pub fn with_crs(mut self, crs: &str) -> Self {
        self.crs = Some(crs.to_string());
        self
    }
}

impl CovariateSource for GridRaster {
    fn n_bands(&self) -> usize {
        self.n_bands
    }

    fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    fn sample(&self, x: f64, y: f64) -> Option<Vec<f64>> {
        if !self.extent.contains(x, y) {
            return None;
        }
        let cell_w = self.extent.width() / self.cols as f64;
        let cell_h = self.extent.height() / self.rows as f64;
        let col = (((x - self.extent.min_x) / cell_w) as usize).min(self.cols - 1);
        let row = (((self.extent.max_y - y) / cell_h) as usize).min(self.rows - 1);
        let base = (row * self.cols + col) * self.n_bands;
        Some(self.values[base..base + self.n_bands].to_vec())
    }
}
