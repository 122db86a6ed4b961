//! Static 2D spatial index for nearest-neighbor and radius queries.
//!
//! A balanced kd-tree built once from a [`PointSet`] in O(n log n); every
//! partitioner queries it read-only. Neighbors are returned by increasing
//! distance with ties broken by ascending point id.
//!
//! # Examples
//!
//! ```
//! use parcelar::prelude::*;
//!
//! let points = PointSet::from_xy(&[(0.0, 0.0), (1.0, 0.0), (5.0, 0.0)]).unwrap();
//! let index = SpatialIndex::build(&points).unwrap();
//!
//! let nn = index.nearest(0, 1);
//! assert_eq!(nn[0].id, 1);
//! assert!((nn[0].distance - 1.0).abs() < 1e-12);
//! ```

use crate::data::PointSet;
use crate::error::{ParcelarError, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An f64 wrapper that implements Ord using total_cmp.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdF64(f64);

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One query result: a point id and its distance from the query location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Point id.
    pub id: usize,
    /// Euclidean distance from the query location.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    x: f64,
    y: f64,
    id: usize,
}

/// Read-only kd-tree over the coordinates of a [`PointSet`].
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    /// Entries reordered into kd-tree layout: the median of each recursion
    /// range sits at its midpoint, left/right halves are the subtrees.
    entries: Vec<Entry>,
}

impl SpatialIndex {
    /// Builds the index from a point set.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelarError::EmptyInput`] for zero points.
    pub fn build(points: &PointSet) -> Result<Self> {
        if points.is_empty() {
            return Err(ParcelarError::empty_input("spatial index"));
        }
        let mut entries: Vec<Entry> = points
            .iter()
            .map(|p| Entry {
                x: p.x,
                y: p.y,
                id: p.id,
            })
            .collect();
        build_recursive(&mut entries, 0);
        Ok(Self { entries })
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: an empty index cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` nearest points to the point with the given id, excluding the
    /// point itself. Ordered by increasing distance, ties by ascending id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a member of the indexed point set.
    #[must_use]
    pub fn nearest(&self, id: usize, k: usize) -> Vec<Neighbor> {
        let (x, y) = self.coords_of(id);
        self.knn(x, y, k, Some(id))
    }

    /// The `k` nearest points to an arbitrary coordinate.
    #[must_use]
    pub fn nearest_to(&self, x: f64, y: f64, k: usize) -> Vec<Neighbor> {
        self.knn(x, y, k, None)
    }

    /// All points within `radius` of the point with the given id, excluding
    /// the point itself. Same ordering as [`SpatialIndex::nearest`].
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a member of the indexed point set.
    #[must_use]
    pub fn within_radius(&self, id: usize, radius: f64) -> Vec<Neighbor> {
        let (x, y) = self.coords_of(id);
        let mut found = Vec::new();
        self.radius_recursive(0, self.entries.len(), 0, x, y, radius, Some(id), &mut found);
        found.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        found
    }

    fn coords_of(&self, id: usize) -> (f64, f64) {
        // Tree layout is permuted; scan is O(n) but only used to resolve the
        // query point, not during traversal.
        let e = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .expect("query id must be a member of the indexed point set");
        (e.x, e.y)
    }

    fn knn(&self, x: f64, y: f64, k: usize, exclude: Option<usize>) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        // Max-heap of the k best (distance, id) keys seen so far.
        let mut heap: BinaryHeap<(OrdF64, usize)> = BinaryHeap::with_capacity(k + 1);
        self.knn_recursive(0, self.entries.len(), 0, x, y, k, exclude, &mut heap);
        let mut out: Vec<Neighbor> = heap
            .into_iter()
            .map(|(d, id)| Neighbor { id, distance: d.0 })
            .collect();
        out.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn knn_recursive(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        x: f64,
        y: f64,
        k: usize,
        exclude: Option<usize>,
        heap: &mut BinaryHeap<(OrdF64, usize)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let e = self.entries[mid];
        if Some(e.id) != exclude {
            let d = ((e.x - x).powi(2) + (e.y - y).powi(2)).sqrt();
            heap.push((OrdF64(d), e.id));
            if heap.len() > k {
                heap.pop();
            }
        }
        let (split, query_axis) = if depth % 2 == 0 { (e.x, x) } else { (e.y, y) };
        let (near, far) = if query_axis < split {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.knn_recursive(near.0, near.1, depth + 1, x, y, k, exclude, heap);
        // Visit the far side unless the splitting plane is strictly beyond
        // the current worst candidate (non-strict keeps equal-distance ties
        // eligible so the ascending-id tie-break stays exact).
        let plane_dist = (query_axis - split).abs();
        let worst = heap.peek().map_or(f64::INFINITY, |(d, _)| d.0);
        if heap.len() < k || plane_dist <= worst {
            self.knn_recursive(far.0, far.1, depth + 1, x, y, k, exclude, heap);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn radius_recursive(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        x: f64,
        y: f64,
        radius: f64,
        exclude: Option<usize>,
        found: &mut Vec<Neighbor>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let e = self.entries[mid];
        if Some(e.id) != exclude {
            let d = ((e.x - x).powi(2) + (e.y - y).powi(2)).sqrt();
            if d <= radius {
                found.push(Neighbor {
                    id: e.id,
                    distance: d,
                });
            }
        }
        let (split, query_axis) = if depth % 2 == 0 { (e.x, x) } else { (e.y, y) };
        if query_axis - radius <= split {
            self.radius_recursive(lo, mid, depth + 1, x, y, radius, exclude, found);
        }
        if query_axis + radius >= split {
            self.radius_recursive(mid + 1, hi, depth + 1, x, y, radius, exclude, found);
        }
    }
}

/// Reorders `entries` in place into kd-tree layout (median at midpoint).
fn build_recursive(entries: &mut [Entry], depth: usize) {
    if entries.len() <= 1 {
        return;
    }
    let mid = entries.len() / 2;
    if depth % 2 == 0 {
        entries.select_nth_unstable_by(mid, |a, b| {
            a.x.total_cmp(&b.x).then_with(|| a.id.cmp(&b.id))
        });
    } else {
        entries.select_nth_unstable_by(mid, |a, b| {
            a.y.total_cmp(&b.y).then_with(|| a.id.cmp(&b.id))
        });
    }
    let (left, right) = entries.split_at_mut(mid);
    build_recursive(left, depth + 1);
    build_recursive(&mut right[1..], depth + 1);
}
