//! Dynamic time warping between two feature sequences.
//!
//! The accumulated cost of cell `(i, j)` is `dist(x[i], y[j])` plus the
//! cheapest of `(i - 1, j)`, `(i, j - 1)` and `(i - 1, j - 1)`; the borders
//! accumulate along the first row and column. The path is read back from the
//! last cell. When predecessors tie, the diagonal wins, then the vertical step
//! (reference advances), then the horizontal one (target advances).

pub mod fastdtw;
mod window;

use std::ops::Index;

use ndarray::prelude::*;
use tracing::debug;

use crate::error::{CompareError, Result};
use crate::Float;

/// Search radius used by the approximate aligner unless configured otherwise.
pub const DEFAULT_RADIUS: usize = 1;

/// Euclidean distance between two frames.
pub fn euclidean(a: ArrayView1<Float>, b: ArrayView1<Float>) -> Float {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<Float>()
        .sqrt()
}

/// Monotone sequence of `(reference, target)` frame indices from `(0, 0)` to
/// the last frame of both sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarpingPath(Vec<(usize, usize)>);

impl WarpingPath {
    pub fn steps(&self) -> &[(usize, usize)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, usize)> + '_ {
        self.0.iter()
    }

    /// The same path with reference and target exchanged.
    pub fn swapped(&self) -> WarpingPath {
        WarpingPath(self.0.iter().map(|&(i, j)| (j, i)).collect())
    }

    /// Whether this is a valid path through an `n` by `m` grid.
    pub fn is_valid_for(&self, n: usize, m: usize) -> bool {
        let (Some(&first), Some(&last)) = (self.0.first(), self.0.last()) else {
            return false;
        };
        first == (0, 0)
            && n > 0
            && m > 0
            && last == (n - 1, m - 1)
            && self.0.windows(2).all(|pair| {
                let ((i0, j0), (i1, j1)) = (pair[0], pair[1]);
                matches!(
                    (i1.checked_sub(i0), j1.checked_sub(j0)),
                    (Some(0), Some(1)) | (Some(1), Some(0)) | (Some(1), Some(1))
                )
            })
    }
}

impl<'a> IntoIterator for &'a WarpingPath {
    type Item = &'a (usize, usize);
    type IntoIter = std::slice::Iter<'a, (usize, usize)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DtwResult {
    pub path: WarpingPath,
    /// Accumulated distance along `path`, not divided by its length.
    pub cost: Float,
}

impl DtwResult {
    pub fn cost_per_step(&self) -> Float {
        self.cost / self.path.len() as Float
    }
}

macro_rules! min {
        ($($args:expr),*) => {{
        let result = Float::INFINITY;
        $(
            let result = result.min($args);
        )*
        result
    }}
}

/// Accumulated costs, stored only inside a per-row window of columns.
pub(crate) struct SparseCostMatrix {
    indices: Vec<usize>,
    cost_matrix: Vec<Float>,
    windows: Vec<(usize, usize)>,
    size: (usize, usize),
}

impl SparseCostMatrix {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    pub(crate) fn stored_cells(&self) -> usize {
        self.cost_matrix.len()
    }
}

impl Index<(usize, usize)> for SparseCostMatrix {
    type Output = Float;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        assert!(index.0 < self.indices.len());
        let (i, j) = index;
        if j < self.windows[i].0 || j >= self.windows[i].1 {
            return &Float::INFINITY;
        }
        let row_start = self.indices[i];
        &self.cost_matrix[row_start + j - self.windows[i].0]
    }
}

pub(crate) fn cost_matrix<D>(
    x: ArrayView2<Float>,
    y: ArrayView2<Float>,
    window: Option<Vec<(usize, usize)>>,
    dist: &D,
) -> SparseCostMatrix
where
    D: Fn(ArrayView1<Float>, ArrayView1<Float>) -> Float,
{
    let window = window.unwrap_or_else(|| vec![(0, y.nrows()); x.nrows()]);

    let indices: Vec<usize> = window
        .iter()
        .scan(0, |acc, win| {
            let ret = *acc;
            *acc += win.1.saturating_sub(win.0);
            Some(ret)
        })
        .collect();

    let len_cost_matrix = window.iter().map(|w| w.1.saturating_sub(w.0)).sum();
    let mut cost_matrix = SparseCostMatrix {
        indices,
        cost_matrix: Vec::with_capacity(len_cost_matrix),
        windows: window.clone(),
        size: (x.nrows(), y.nrows()),
    };

    for (&(range_start, range_end), (i, row)) in window.iter().zip(x.rows().into_iter().enumerate())
    {
        for j in range_start..range_end.max(range_start) {
            let d = dist(row, y.row(j));
            let min_prev = match (i, j) {
                (0, 0) => 0.,
                (0, _) => cost_matrix[(i, j - 1)],
                (_, 0) => cost_matrix[(i - 1, j)],
                (_, _) => {
                    min!(
                        cost_matrix[(i - 1, j)],
                        cost_matrix[(i, j - 1)],
                        cost_matrix[(i - 1, j - 1)]
                    )
                }
            };
            cost_matrix.cost_matrix.push(min_prev + d);
        }
    }

    cost_matrix
}

fn best_path(accumulated_cost_matrix: &SparseCostMatrix) -> DtwResult {
    let (n, m) = accumulated_cost_matrix.size();
    let mut path = Vec::with_capacity(n + m);

    let (mut i, mut j) = (n - 1, m - 1);
    let cost = accumulated_cost_matrix[(i, j)];

    path.push((i, j));
    while i > 0 || j > 0 {
        let next = match (i, j) {
            (0, _) => (i, j - 1),
            (_, 0) => (i - 1, j),
            _ => {
                let diagonal = accumulated_cost_matrix[(i - 1, j - 1)];
                let vertical = accumulated_cost_matrix[(i - 1, j)];
                let horizontal = accumulated_cost_matrix[(i, j - 1)];
                if diagonal <= vertical && diagonal <= horizontal {
                    (i - 1, j - 1)
                } else if vertical <= horizontal {
                    (i - 1, j)
                } else {
                    (i, j - 1)
                }
            }
        };
        path.push(next);
        (i, j) = next;
    }
    path.shrink_to_fit();
    path.reverse();
    DtwResult {
        path: WarpingPath(path),
        cost,
    }
}

/// DTW restricted to `window`, or over the full grid when `window` is `None`.
pub(crate) fn dtw<D>(
    x: ArrayView2<Float>,
    y: ArrayView2<Float>,
    window: Option<Vec<(usize, usize)>>,
    dist: &D,
) -> DtwResult
where
    D: Fn(ArrayView1<Float>, ArrayView1<Float>) -> Float,
{
    let cost_matrix = cost_matrix(x, y, window, dist);
    debug!(
        rows = x.nrows(),
        cols = y.nrows(),
        cells = cost_matrix.stored_cells(),
        "filled dtw cost matrix"
    );
    best_path(&cost_matrix)
}

fn check_inputs(reference: &ArrayView2<Float>, target: &ArrayView2<Float>) -> Result<()> {
    if reference.nrows() == 0 || target.nrows() == 0 {
        return Err(CompareError::EmptySequence);
    }
    if reference.ncols() != target.ncols() {
        return Err(CompareError::DimensionMismatch {
            reference: reference.ncols(),
            target: target.ncols(),
        });
    }
    Ok(())
}

/// Exact DTW over the full `R x T` grid.
pub fn align<D>(
    reference: ArrayView2<Float>,
    target: ArrayView2<Float>,
    dist: D,
) -> Result<DtwResult>
where
    D: Fn(ArrayView1<Float>, ArrayView1<Float>) -> Float,
{
    check_inputs(&reference, &target)?;
    Ok(dtw(reference, target, None, &dist))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtwAlgorithm {
    /// Full grid, quadratic time and memory.
    Exact,
    /// FastDTW: coarse-to-fine search within `radius` of the projected path.
    Fast { radius: usize },
}

impl Default for DtwAlgorithm {
    fn default() -> Self {
        DtwAlgorithm::Fast {
            radius: DEFAULT_RADIUS,
        }
    }
}

pub type FrameDistance = fn(ArrayView1<Float>, ArrayView1<Float>) -> Float;

/// Aligns feature sequences with a fixed algorithm and frame distance.
#[derive(Clone, Copy, Debug)]
pub struct Aligner<D = FrameDistance> {
    algorithm: DtwAlgorithm,
    distance: D,
}

impl Aligner {
    pub fn new(algorithm: DtwAlgorithm) -> Self {
        Self {
            algorithm,
            distance: euclidean,
        }
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(DtwAlgorithm::default())
    }
}

impl<D> Aligner<D>
where
    D: Fn(ArrayView1<Float>, ArrayView1<Float>) -> Float,
{
    pub fn with_distance(algorithm: DtwAlgorithm, distance: D) -> Self {
        Self {
            algorithm,
            distance,
        }
    }

    pub fn algorithm(&self) -> DtwAlgorithm {
        self.algorithm
    }

    pub fn align(
        &self,
        reference: ArrayView2<Float>,
        target: ArrayView2<Float>,
    ) -> Result<DtwResult> {
        check_inputs(&reference, &target)?;
        let result = match self.algorithm {
            DtwAlgorithm::Exact => dtw(reference, target, None, &self.distance),
            DtwAlgorithm::Fast { radius } => {
                fastdtw::fast_dtw(reference, target, radius, &self.distance)
            }
        };
        debug!(
            cost = result.cost,
            steps = result.path.len(),
            "aligned sequences"
        );
        Ok(result)
    }
}
