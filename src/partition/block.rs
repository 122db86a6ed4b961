//! Regular-grid block cross-validation.
//!
//! Overlays a square or hexagonal tessellation on the point extent, assigns
//! every point to the block covering it, then assigns blocks to folds. The
//! `Random` selection searches multiple seeded assignments for the most
//! balanced fold sizes; `Systematic` and `Checkerboard` are fully
//! deterministic and seed-independent.
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let coords: Vec<(f64, f64)> = (0..100)
//!     .map(|i| ((i % 10) as f64, (i / 10) as f64))
//!     .collect();
//! let points = PointSet::from_xy(&coords).unwrap();
//!
//! let partitioner = BlockPartitioner::new(10)
//!     .with_rows_cols(2, 5)
//!     .with_selection(BlockSelection::Systematic);
//! let result = partitioner.partition(&points).unwrap();
//! assert_eq!(result.folds.len(), 10);
//! ```

use crate::data::PointSet;
use crate::error::{ParcelarError, Result};
use crate::partition::{Fold, PartitionMetadata, PartitionResult};
use crate::stats::coefficient_of_variation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Shape of the tessellation cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    /// Axis-aligned square cells.
    Square,
    /// Flat-top hexagonal cells.
    Hexagon,
}

/// How blocks are assigned to folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelection {
    /// Seeded uniform assignment, best of `iterations` trials by fold-size
    /// balance.
    Random,
    /// Row-major block index mod k. Seed-independent.
    Systematic,
    /// Two-coloring by (row + col) mod 2, colors cycled over k folds in
    /// row-major order. Seed-independent.
    Checkerboard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GridSizing {
    CellSize(f64),
    RowsCols(usize, usize),
}

/// Spatial block cross-validation partitioner.
#[derive(Debug, Clone)]
pub struct BlockPartitioner {
    k: usize,
    sizing: Option<GridSizing>,
    shape: BlockShape,
    selection: BlockSelection,
    iterations: usize,
    seed: u64,
}

impl BlockPartitioner {
    /// Creates a partitioner producing `k` folds. Grid sizing must be set
    /// with [`BlockPartitioner::with_cell_size`] or
    /// [`BlockPartitioner::with_rows_cols`] before partitioning.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            sizing: None,
            shape: BlockShape::Square,
            selection: BlockSelection::Random,
            iterations: 1,
            seed: 0,
        }
    }

    /// Sizes cells by edge length (square) or outer radius (hexagon), in
    /// coordinate units. Mutually exclusive with
    /// [`BlockPartitioner::with_rows_cols`]; the last setter wins.
    #[must_use]
    pub fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.sizing = Some(GridSizing::CellSize(cell_size));
        self
    }

    /// Sizes the grid by row and column counts over the point extent.
    #[must_use]
    pub fn with_rows_cols(mut self, rows: usize, cols: usize) -> Self {
        self.sizing = Some(GridSizing::RowsCols(rows, cols));
        self
    }

    /// Sets the cell shape (default square).
    #[must_use]
    pub fn with_shape(mut self, shape: BlockShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the block-to-fold selection rule (default random).
    #[must_use]
    pub fn with_selection(mut self, selection: BlockSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Number of random-assignment trials to search (default 1). Meaningful
    /// only for [`BlockSelection::Random`].
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Seed for the random selection search (default 0).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Tessellates, assigns blocks to folds and collects the folds.
    ///
    /// # Errors
    ///
    /// [`ParcelarError::InvalidConfig`] when `k < 2`, the sizing is missing
    /// or non-positive, `iterations` is 0, or a fold ends up with an empty
    /// test set; [`ParcelarError::EmptyInput`] for an empty point set.
    pub fn partition(&self, points: &PointSet) -> Result<PartitionResult> {
        let sizing = self.validate(points)?;
        let grid = tessellate(points, self.shape, sizing);

        let (assignment, trials, balance) = match self.selection {
            BlockSelection::Systematic => (self.assign_systematic(&grid), 1, None),
            BlockSelection::Checkerboard => (self.assign_checkerboard(&grid), 1, None),
            BlockSelection::Random => {
                let (assignment, score) = self.search_random(&grid);
                (assignment, self.iterations, Some(score))
            }
        };

        let folds = self.collect_folds(points, &grid, &assignment)?;

        let mut metadata = PartitionMetadata::new("block");
        metadata.seed = match self.selection {
            BlockSelection::Random => Some(self.seed),
            _ => None,
        };
        metadata.iterations = trials;
        metadata.balance_score = balance;
        metadata.dropped_points = grid.dropped.clone();
        Ok(PartitionResult { folds, metadata })
    }

    fn validate(&self, points: &PointSet) -> Result<GridSizing> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("point set"));
        }
        if self.k < 2 {
            return Err(ParcelarError::invalid_config("k", self.k, ">= 2"));
        }
        if self.iterations == 0 {
            return Err(ParcelarError::invalid_config(
                "iterations",
                self.iterations,
                ">= 1",
            ));
        }
        let sizing = self.sizing.ok_or_else(|| {
            ParcelarError::invalid_config("sizing", "unset", "cell_size or rows_cols")
        })?;
        match sizing {
            GridSizing::CellSize(s) if s <= 0.0 => {
                Err(ParcelarError::invalid_config("cell_size", s, "> 0"))
            }
            GridSizing::RowsCols(r, c) if r == 0 || c == 0 => Err(ParcelarError::invalid_config(
                "rows_cols",
                format!("({r}, {c})"),
                "positive row and column counts",
            )),
            _ => Ok(sizing),
        }
    }

    fn assign_systematic(&self, grid: &Tessellation) -> Vec<usize> {
        (0..grid.blocks.len()).map(|i| i % self.k).collect()
    }

    fn assign_checkerboard(&self, grid: &Tessellation) -> Vec<usize> {
        // The i-th block of color c in row-major order gets fold
        // (c + 2i) mod k, which is exactly fold = color for k = 2.
        let mut counts = [0usize; 2];
        grid.blocks
            .iter()
            .map(|&(row, col)| {
                let color = (row + col).rem_euclid(2) as usize;
                let fold = (color + 2 * counts[color]) % self.k;
                counts[color] += 1;
                fold
            })
            .collect()
    }

    fn search_random(&self, grid: &Tessellation) -> (Vec<usize>, f64) {
        let best = (0..self.iterations as u64)
            .into_par_iter()
            .map(|trial| {
                let assignment = random_assignment(self.seed, trial, grid.blocks.len(), self.k);
                let score = self.balance_score(grid, &assignment);
                (score, trial, assignment)
            })
            .min_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            })
            .expect("iterations >= 1 is validated");
        (best.2, best.0)
    }

    /// Coefficient of variation of fold test sizes; +inf when a fold gets no
    /// points so the search avoids empty folds whenever possible.
    fn balance_score(&self, grid: &Tessellation, assignment: &[usize]) -> f64 {
        let mut sizes = vec![0usize; self.k];
        for block in grid.point_block.iter().flatten() {
            sizes[assignment[*block]] += 1;
        }
        if sizes.iter().any(|&s| s == 0) {
            return f64::INFINITY;
        }
        let sizes: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
        coefficient_of_variation(&sizes)
    }

    fn collect_folds(
        &self,
        points: &PointSet,
        grid: &Tessellation,
        assignment: &[usize],
    ) -> Result<Vec<Fold>> {
        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.k];
        for (id, block) in grid.point_block.iter().enumerate() {
            if let Some(block) = block {
                tests[assignment[*block]].push(id);
            }
        }
        if let Some(empty) = tests.iter().position(Vec::is_empty) {
            return Err(ParcelarError::invalid_config(
                "k",
                self.k,
                &format!("fold {empty} has an empty test set; use fewer folds or larger blocks"),
            ));
        }
        let retained: Vec<usize> = (0..points.len())
            .filter(|id| grid.point_block[*id].is_some())
            .collect();
        Ok(tests
            .into_iter()
            .map(|test| {
                let train: Vec<usize> = retained
                    .iter()
                    .copied()
                    .filter(|id| !test.contains(id))
                    .collect();
                Fold::new(train, test)
            })
            .collect())
    }
}

/// Per-trial assignment of blocks to folds, independently seeded so trials
/// can run in parallel in any order.
fn random_assignment(base_seed: u64, trial: u64, n_blocks: usize, k: usize) -> Vec<usize> {
    // SplitMix64 increment decorrelates consecutive trial seeds.
    let mut rng = StdRng::seed_from_u64(base_seed ^ trial.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    (0..n_blocks).map(|_| rng.gen_range(0..k)).collect()
}

struct Tessellation {
    /// (row, col) per block, enumerated row-major.
    blocks: Vec<(i64, i64)>,
    /// Block slot per point id; `None` for dropped points.
    point_block: Vec<Option<usize>>,
    /// Ids of points outside every block.
    dropped: Vec<usize>,
}

fn tessellate(points: &PointSet, shape: BlockShape, sizing: GridSizing) -> Tessellation {
    match shape {
        BlockShape::Square => tessellate_square(points, sizing),
        BlockShape::Hexagon => tessellate_hexagon(points, sizing),
    }
}

fn tessellate_square(points: &PointSet, sizing: GridSizing) -> Tessellation {
    let extent = points.extent();
    let (rows, cols, cell_w, cell_h) = match sizing {
        GridSizing::RowsCols(rows, cols) => {
            let cell_w = pos_or_one(extent.width() / cols as f64);
            let cell_h = pos_or_one(extent.height() / rows as f64);
            (rows, cols, cell_w, cell_h)
        }
        GridSizing::CellSize(size) => {
            let cols = ((extent.width() / size).ceil() as usize).max(1);
            let rows = ((extent.height() / size).ceil() as usize).max(1);
            (rows, cols, size, size)
        }
    };

    let blocks: Vec<(i64, i64)> = (0..rows as i64)
        .flat_map(|row| (0..cols as i64).map(move |col| (row, col)))
        .collect();
    let point_block = points
        .iter()
        .map(|p| {
            let col = (((p.x - extent.min_x) / cell_w) as usize).min(cols - 1);
            let row = (((p.y - extent.min_y) / cell_h) as usize).min(rows - 1);
            Some(row * cols + col)
        })
        .collect();
    Tessellation {
        blocks,
        point_block,
        dropped: Vec::new(),
    }
}

fn tessellate_hexagon(points: &PointSet, sizing: GridSizing) -> Tessellation {
    let extent = points.extent();
    let radius = match sizing {
        GridSizing::CellSize(size) => size,
        // Pick the radius that yields roughly the requested column count;
        // flat-top hexes advance 1.5 R per column.
        GridSizing::RowsCols(rows, cols) => {
            let by_width = extent.width() / (1.5 * cols as f64);
            let by_height = extent.height() / (3f64.sqrt() * rows as f64);
            pos_or_one(by_width.max(by_height))
        }
    };

    // Flat-top axial coordinates with cube rounding.
    let axial: Vec<(i64, i64)> = points
        .iter()
        .map(|p| {
            let px = p.x - extent.min_x;
            let py = p.y - extent.min_y;
            let q = (2.0 / 3.0 * px) / radius;
            let r = (-px / 3.0 + 3f64.sqrt() / 3.0 * py) / radius;
            cube_round(q, r)
        })
        .collect();

    // Offset form (odd-q) so the two-coloring and row-major enumeration see
    // an ordinary row/column lattice.
    let cells: Vec<(i64, i64)> = axial
        .iter()
        .map(|&(q, r)| (r + (q - (q & 1)) / 2, q))
        .collect();

    let min_row = cells.iter().map(|c| c.0).min().unwrap_or(0);
    let max_row = cells.iter().map(|c| c.0).max().unwrap_or(0);
    let min_col = cells.iter().map(|c| c.1).min().unwrap_or(0);
    let max_col = cells.iter().map(|c| c.1).max().unwrap_or(0);

    let mut blocks = Vec::new();
    let mut slot_of: HashMap<(i64, i64), usize> = HashMap::new();
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            slot_of.insert((row, col), blocks.len());
            blocks.push((row, col));
        }
    }

    let mut dropped = Vec::new();
    let point_block = cells
        .iter()
        .enumerate()
        .map(|(id, cell)| {
            let slot = slot_of.get(cell).copied();
            if slot.is_none() {
                dropped.push(id);
            }
            slot
        })
        .collect();
    Tessellation {
        blocks,
        point_block,
        dropped,
    }
}

/// Rounds fractional axial coordinates to the containing hexagon.
fn cube_round(q: f64, r: f64) -> (i64, i64) {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let (dq, dr, ds) = ((rq - q).abs(), (rr - r).abs(), (rs - s).abs());
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i64, rr as i64)
}

fn pos_or_one(v: f64) -> f64 {
    if v > 0.0 {
        v
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> PointSet {
        // 100 points on a 10x10 unit lattice.
        let coords: Vec<(f64, f64)> = (0..100)
            .map(|i| ((i % 10) as f64, (i / 10) as f64))
            .collect();
        PointSet::from_xy(&coords).unwrap()
    }

    fn assert_exhaustive(result: &PartitionResult, n: usize) {
        let mut seen: Vec<usize> = result
            .folds
            .iter()
            .flat_map(|f| f.test.iter().copied())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        for fold in &result.folds {
            for id in &fold.test {
                assert!(!fold.train.contains(id));
            }
        }
    }

    #[test]
    fn test_systematic_bands_scenario() {
        // 2x5 grid over the 10x10 lattice: each block holds exactly 10
        // points and k = 10 gives one block per fold.
        let points = grid_points();
        let partitioner = BlockPartitioner::new(10)
            .with_rows_cols(2, 5)
            .with_selection(BlockSelection::Systematic);
        let result = partitioner.partition(&points).unwrap();
        assert_eq!(result.folds.len(), 10);
        for fold in &result.folds {
            assert_eq!(fold.test.len(), 10);
            assert_eq!(fold.train.len(), 90);
        }
        assert_exhaustive(&result, 100);
    }

    #[test]
    fn test_systematic_deterministic_across_calls_and_seeds() {
        let points = grid_points();
        let a = BlockPartitioner::new(4)
            .with_rows_cols(2, 2)
            .with_selection(BlockSelection::Systematic)
            .with_seed(1)
            .partition(&points)
            .unwrap();
        let b = BlockPartitioner::new(4)
            .with_rows_cols(2, 2)
            .with_selection(BlockSelection::Systematic)
            .with_seed(999)
            .partition(&points)
            .unwrap();
        assert_eq!(a.folds, b.folds);
    }

    #[test]
    fn test_checkerboard_two_folds_alternate() {
        let points = grid_points();
        let result = BlockPartitioner::new(2)
            .with_rows_cols(2, 2)
            .with_selection(BlockSelection::Checkerboard)
            .partition(&points)
            .unwrap();
        assert_eq!(result.folds.len(), 2);
        assert_exhaustive(&result, 100);
        // Blocks (0,0) and (1,1) share a fold, (0,1) and (1,0) the other.
        // Point (0,0) and point (9,9) sit in diagonal blocks.
        let fold_of = |id: usize| result.folds.iter().position(|f| f.test.contains(&id));
        assert_eq!(fold_of(0), fold_of(99));
        assert_eq!(fold_of(9), fold_of(90));
        assert_ne!(fold_of(0), fold_of(9));
    }

    #[test]
    fn test_checkerboard_seed_independent() {
        let points = grid_points();
        let make = |seed| {
            BlockPartitioner::new(3)
                .with_rows_cols(3, 3)
                .with_selection(BlockSelection::Checkerboard)
                .with_seed(seed)
                .partition(&points)
                .unwrap()
        };
        assert_eq!(make(0).folds, make(12345).folds);
    }

    #[test]
    fn test_random_reproducible_for_fixed_seed() {
        let points = grid_points();
        let make = |seed| {
            BlockPartitioner::new(3)
                .with_rows_cols(4, 4)
                .with_selection(BlockSelection::Random)
                .with_iterations(10)
                .with_seed(seed)
                .partition(&points)
                .unwrap()
        };
        assert_eq!(make(7).folds, make(7).folds);
        assert_ne!(make(7).folds, make(8).folds);
    }

    #[test]
    fn test_random_search_improves_balance() {
        let points = grid_points();
        let make = |iterations| {
            BlockPartitioner::new(4)
                .with_rows_cols(4, 4)
                .with_selection(BlockSelection::Random)
                .with_iterations(iterations)
                .with_seed(3)
                .partition(&points)
                .unwrap()
                .metadata
                .balance_score
                .unwrap()
        };
        // More trials can only keep or improve the best score.
        assert!(make(50) <= make(1));
    }

    #[test]
    fn test_random_records_seed_and_iterations() {
        let points = grid_points();
        let result = BlockPartitioner::new(2)
            .with_rows_cols(4, 4)
            .with_selection(BlockSelection::Random)
            .with_iterations(5)
            .with_seed(11)
            .partition(&points)
            .unwrap();
        assert_eq!(result.metadata.seed, Some(11));
        assert_eq!(result.metadata.iterations, 5);
        assert!(result.metadata.balance_score.is_some());
        assert_eq!(result.metadata.strategy, "block");
    }

    #[test]
    fn test_cell_size_sizing() {
        let points = grid_points();
        let result = BlockPartitioner::new(3)
            .with_cell_size(3.0)
            .with_selection(BlockSelection::Systematic)
            .partition(&points)
            .unwrap();
        assert_exhaustive(&result, 100);
    }

    #[test]
    fn test_hexagon_shape_exhaustive() {
        let points = grid_points();
        let result = BlockPartitioner::new(3)
            .with_cell_size(2.5)
            .with_shape(BlockShape::Hexagon)
            .with_selection(BlockSelection::Systematic)
            .partition(&points)
            .unwrap();
        assert!(result.metadata.dropped_points.is_empty());
        assert_exhaustive(&result, 100);
    }

    #[test]
    fn test_k_below_two_rejected() {
        let points = grid_points();
        let result = BlockPartitioner::new(1)
            .with_rows_cols(2, 2)
            .partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_nonpositive_cell_size_rejected() {
        let points = grid_points();
        let result = BlockPartitioner::new(2).with_cell_size(0.0).partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_missing_sizing_rejected() {
        let points = grid_points();
        let result = BlockPartitioner::new(2).partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let points = grid_points();
        let result = BlockPartitioner::new(2)
            .with_rows_cols(2, 2)
            .with_iterations(0)
            .partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_empty_fold_signaled() {
        // 4 clustered points cannot fill 3 folds from a single occupied
        // block column.
        let points =
            PointSet::from_xy(&[(0.0, 0.0), (0.1, 0.0), (0.0, 0.1), (0.1, 0.1)]).unwrap();
        let result = BlockPartitioner::new(3)
            .with_rows_cols(1, 1)
            .with_selection(BlockSelection::Systematic)
            .partition(&points);
        assert!(matches!(result, Err(ParcelarError::InvalidConfig { .. })));
    }

    #[test]
    fn test_cube_round_centers() {
        assert_eq!(cube_round(0.0, 0.0), (0, 0));
        assert_eq!(cube_round(1.1, -0.1), (1, 0));
        assert_eq!(cube_round(-0.9, 1.9), (-1, 2));
    }
}
