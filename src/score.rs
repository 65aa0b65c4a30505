//! Distortion between two feature sequences along a warping path.

use ndarray::prelude::*;

use crate::dtw::{DtwResult, WarpingPath};
use crate::error::{CompareError, Result};
use crate::Float;

#[derive(Clone, Debug, PartialEq)]
pub struct DistortionReport {
    /// Accumulated DTW distance of the path.
    pub distance: Float,
    /// Squared error averaged over the feature dimension, one per path step.
    pub frame_errors: Vec<Float>,
    /// Mean of `frame_errors`.
    pub mse: Float,
}

fn frame_error(a: ArrayView1<Float>, b: ArrayView1<Float>) -> Float {
    let sum: Float = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    sum / a.len().max(1) as Float
}

/// Squared errors between frames paired by `path`.
pub fn frame_errors(
    reference: ArrayView2<Float>,
    target: ArrayView2<Float>,
    path: &WarpingPath,
) -> Result<Vec<Float>> {
    if reference.ncols() != target.ncols() {
        return Err(CompareError::DimensionMismatch {
            reference: reference.ncols(),
            target: target.ncols(),
        });
    }
    if path.is_empty() {
        return Err(CompareError::EmptySequence);
    }
    let (n, m) = (reference.nrows(), target.nrows());
    path.iter()
        .map(|&(i, j)| {
            if i >= n || j >= m {
                return Err(CompareError::invalid_config(format!(
                    "path step ({i}, {j}) outside {n} x {m} grid"
                )));
            }
            Ok(frame_error(reference.row(i), target.row(j)))
        })
        .collect()
}

/// Frame errors and their mean for an alignment of `reference` and `target`.
pub fn score(
    reference: ArrayView2<Float>,
    target: ArrayView2<Float>,
    alignment: &DtwResult,
) -> Result<DistortionReport> {
    let frame_errors = frame_errors(reference, target, &alignment.path)?;
    let mse = frame_errors.iter().sum::<Float>() / frame_errors.len() as Float;
    Ok(DistortionReport {
        distance: alignment.cost,
        frame_errors,
        mse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtw::{align, euclidean};
    use approx::assert_abs_diff_eq;

    #[test]
    fn identical_frames_score_zero() {
        let x = array![[0., 0.], [1., 1.], [2., 2.]];
        let alignment = align(x.view(), x.view(), euclidean).unwrap();
        let report = score(x.view(), x.view(), &alignment).unwrap();
        assert_eq!(report.distance, 0.);
        assert_eq!(report.frame_errors, vec![0.; 3]);
        assert_eq!(report.mse, 0.);
    }

    #[test]
    fn inserted_frame_scores_small_positive() {
        let x = array![[0.], [1.], [2.]];
        let y = array![[0.], [0.5], [1.], [2.]];
        let alignment = align(x.view(), y.view(), euclidean).unwrap();
        let report = score(x.view(), y.view(), &alignment).unwrap();
        assert_eq!(report.frame_errors, vec![0., 0.25, 0., 0.]);
        assert_abs_diff_eq!(report.mse, 0.0625);
        assert_abs_diff_eq!(report.distance, 0.5);
    }

    #[test]
    fn averages_over_dimension() {
        let x = array![[1., 3.]];
        let y = array![[0., 0.]];
        let alignment = align(x.view(), y.view(), euclidean).unwrap();
        let report = score(x.view(), y.view(), &alignment).unwrap();
        assert_eq!(report.frame_errors, vec![5.]);
    }

    #[test]
    fn mismatched_dimensions() {
        let x = Array2::<Float>::zeros((3, 13));
        let y = Array2::<Float>::zeros((3, 26));
        let alignment = align(x.view(), x.view(), euclidean).unwrap();
        assert!(matches!(
            score(x.view(), y.view(), &alignment),
            Err(CompareError::DimensionMismatch { .. })
        ));
    }
}
