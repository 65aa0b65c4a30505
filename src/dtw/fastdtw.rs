//! FastDTW (Salvador & Chan): solve a half-resolution problem, project its
//! path back onto the full grid, widen it by `radius` columns and only fill
//! the cost matrix inside that band. Runs in roughly linear time; the cost
//! is never lower than the exact one and usually equal or close to it.

use ndarray::prelude::*;
use ndarray::Zip;

use super::window::Window;
use super::{dtw, DtwResult};
use crate::Float;

/// Average consecutive pairs of frames. A trailing odd frame is dropped; the
/// projected window re-adds the last rows and columns.
pub(crate) fn coarsen(x: ArrayView2<Float>) -> Array2<Float> {
    let reduced_len = x.nrows() / 2;
    let mut ret = Array2::zeros((reduced_len, x.ncols()));
    for (k, mut row) in ret.rows_mut().into_iter().enumerate() {
        Zip::from(&mut row)
            .and(&x.row(2 * k))
            .and(&x.row(2 * k + 1))
            .for_each(|out, &a, &b| *out = (a + b) / 2.);
    }
    ret
}

pub(crate) fn expand_window(
    path: &[(usize, usize)],
    len_x: usize,
    len_y: usize,
    radius: usize,
) -> Vec<(usize, usize)> {
    let mut w = Window::new(len_x, len_y);
    let (mut last_i, mut last_j) = (usize::MAX, usize::MAX);
    for &(i, j) in path {
        w.mark_visited(i * 2, j * 2);
        w.mark_visited(i * 2, j * 2 + 1);
        w.mark_visited(i * 2 + 1, j * 2);
        w.mark_visited(i * 2 + 1, j * 2 + 1);
        if last_i != usize::MAX && i > last_i && j > last_j {
            w.mark_visited(i * 2 - 1, j * 2);
            w.mark_visited(i * 2, j * 2 - 1);
        }
        (last_i, last_j) = (i, j);
    }

    // For odd numbered series, add the last point
    for i in [1, 2] {
        for j in [1, 2] {
            w.mark_visited(len_x.saturating_sub(i), len_y.saturating_sub(j));
        }
    }

    let window = w.window.clone();
    for (i, (left, right)) in window.into_iter().enumerate() {
        let left = left.saturating_sub(radius);
        let right = right.saturating_add(radius).min(len_y);

        w.mark_visited(i, left);
        w.mark_visited(i, right.saturating_sub(1));
    }
    w.window
}

pub(crate) fn fast_dtw<D>(
    x: ArrayView2<Float>,
    y: ArrayView2<Float>,
    radius: usize,
    dist: &D,
) -> DtwResult
where
    D: Fn(ArrayView1<Float>, ArrayView1<Float>) -> Float,
{
    let min_size = radius + 2;
    if x.nrows() < min_size || y.nrows() < min_size {
        return dtw(x, y, None, dist);
    }

    let reduced_x = coarsen(x);
    let reduced_y = coarsen(y);

    let res = fast_dtw(reduced_x.view(), reduced_y.view(), radius, dist);
    let window = expand_window(res.path.steps(), x.nrows(), y.nrows(), radius);
    dtw(x, y, Some(window), dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtw::{align, euclidean};

    #[test]
    fn test_coarsen() {
        let fine = array![[1.], [3.], [5.], [7.], [9.]];
        let coarse = array![[2.], [6.]];
        assert_eq!(coarsen(fine.view()), coarse);
    }

    #[test]
    fn test_window() {
        // | | |x|
        // | | |x|
        // |x|x| |
        //
        // ->
        //
        // | | | | |x|x|
        // | | | | |x|x|
        // | | | | |x|x|
        // | | | |x|x|x|
        // |x|x|x|x|x| |
        // |x|x|x|x| | |
        let path = &[(0, 0), (0, 1), (1, 2), (2, 2)];
        let window = vec![(0, 4), (0, 5), (3, 6), (4, 6), (4, 6), (4, 6)];
        assert_eq!(expand_window(path, 6, 6, 0), window);
    }

    #[test]
    fn short_inputs_fall_back_to_exact() {
        let x = array![[1.], [2.], [3.]];
        let y = array![[1.], [1.], [2.], [3.], [4.]];
        let fast = fast_dtw(x.view(), y.view(), 3, &euclidean);
        let exact = align(x.view(), y.view(), euclidean).unwrap();
        assert_eq!(fast, exact);
    }

    #[test]
    fn path_is_valid_on_odd_lengths() {
        let x = Array2::from_shape_fn((37, 2), |(i, k)| (i as Float * 0.17 + k as Float).sin());
        let y = Array2::from_shape_fn((51, 2), |(i, k)| (i as Float * 0.12 + k as Float).sin());
        let res = fast_dtw(x.view(), y.view(), 1, &euclidean);
        assert!(res.path.is_valid_for(37, 51));
        assert!(res.cost.is_finite());
    }

    #[test]
    fn never_cheaper_than_exact() {
        let x = Array2::from_shape_fn((40, 3), |(i, k)| ((i * (k + 2)) as Float * 0.05).cos());
        let y = Array2::from_shape_fn((29, 3), |(i, k)| ((i * (k + 2)) as Float * 0.07).cos());
        let exact = align(x.view(), y.view(), euclidean).unwrap();
        let fast = fast_dtw(x.view(), y.view(), 1, &euclidean);
        assert!(fast.cost >= exact.cost - 1e-4);
    }
}
