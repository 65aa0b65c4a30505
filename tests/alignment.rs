use ndarray::prelude::*;
use utterance_dtw::dtw::{align, euclidean};
use utterance_dtw::{
    extract, score, Aligner, CompareError, DtwAlgorithm, ExtractOptions, FeatureMatrix, Float,
    Waveform,
};

/// FastDTW may return a more expensive path than the exact search. On ramps
/// and on MFCC features of speech-like sweeps it stays within this relative
/// margin (well under 1% for sweeps). Uncorrelated frames such as white noise
/// can exceed it several times over.
const FAST_DTW_TOLERANCE: Float = 0.10;

const SAMPLE_RATE: u32 = 16000;

fn ramp(len: usize, dim: usize) -> Array2<Float> {
    Array2::from_shape_fn((len, dim), |(i, k)| {
        (k + 1) as Float * i as Float / (len - 1) as Float
    })
}

/// Linear sweep from `f0` to `f1` Hz over `seconds`.
fn chirp(f0: f64, f1: f64, seconds: f64) -> Waveform {
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let rate = (f1 - f0) / seconds;
    let samples = (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let phase = std::f64::consts::TAU * (f0 * t + 0.5 * rate * t * t);
            (0.5 * phase.sin()) as Float
        })
        .collect();
    Waveform::new(samples, SAMPLE_RATE)
}

fn assert_fast_close_to_exact(reference: ArrayView2<Float>, target: ArrayView2<Float>) {
    let exact = Aligner::new(DtwAlgorithm::Exact)
        .align(reference, target)
        .unwrap();
    let fast = Aligner::default().align(reference, target).unwrap();

    assert!(fast.path.is_valid_for(reference.nrows(), target.nrows()));
    assert!(fast.cost >= exact.cost * (1. - 1e-5) - 1e-4);
    assert!(
        fast.cost <= exact.cost * (1. + FAST_DTW_TOLERANCE) + 1e-3,
        "fast {} exact {}",
        fast.cost,
        exact.cost
    );
}

#[test]
fn fast_dtw_is_close_to_exact_on_ramps() {
    let reference = ramp(40, 3);
    let target = ramp(57, 3);
    assert_fast_close_to_exact(reference.view(), target.view());
}

#[test]
fn fast_dtw_is_close_to_exact_on_sweep_features() {
    let opts = ExtractOptions {
        include_deltas: true,
        ..Default::default()
    };
    let cases = [
        (chirp(300., 2400., 0.8), chirp(300., 2400., 1.1)),
        (chirp(500., 3000., 0.5), chirp(500., 3000., 0.75)),
        (chirp(2000., 500., 0.6), chirp(2000., 500., 0.9)),
    ];
    for (reference, target) in &cases {
        let reference = extract(reference, &opts).unwrap();
        let target = extract(target, &opts).unwrap();
        assert_eq!(reference.dim(), 39);
        assert_fast_close_to_exact(reference.view(), target.view());
    }
}

#[test]
fn fast_dtw_with_covering_radius_is_exact() {
    let reference = Array2::from_shape_fn((12, 2), |(i, k)| (i as Float * 0.4 + k as Float).sin());
    let target = Array2::from_shape_fn((9, 2), |(i, k)| (i as Float * 0.5 + k as Float).sin());
    let exact = Aligner::new(DtwAlgorithm::Exact)
        .align(reference.view(), target.view())
        .unwrap();
    let fast = Aligner::new(DtwAlgorithm::Fast { radius: 20 })
        .align(reference.view(), target.view())
        .unwrap();
    assert_eq!(fast, exact);
}

#[test]
fn trivial_alignment_scenario() {
    let frames: [[Float; 2]; 3] = [[0., 0.], [1., 1.], [2., 2.]];
    let frames = FeatureMatrix::from_frames(&frames).unwrap();
    for algorithm in [DtwAlgorithm::Exact, DtwAlgorithm::default()] {
        let alignment = Aligner::new(algorithm)
            .align(frames.view(), frames.view())
            .unwrap();
        assert_eq!(alignment.cost, 0.);
        assert_eq!(alignment.path.steps(), &[(0, 0), (1, 1), (2, 2)]);
        let report = score(frames.view(), frames.view(), &alignment).unwrap();
        assert_eq!(report.mse, 0.0);
    }
}

#[test]
fn identity_alignment_of_long_sequence() {
    let frames = Array2::from_shape_fn((64, 13), |(i, k)| ((i + 3 * k) as Float * 0.37).sin());
    let alignment = align(frames.view(), frames.view(), euclidean).unwrap();
    assert_eq!(alignment.cost, 0.);
    let diagonal: Vec<_> = (0..64).map(|i| (i, i)).collect();
    assert_eq!(alignment.path.steps(), diagonal.as_slice());
}

#[test]
fn single_extra_frame_scenario() {
    let reference: [[Float; 1]; 3] = [[0.], [1.], [2.]];
    let target: [[Float; 1]; 4] = [[0.], [0.5], [1.], [2.]];
    let reference = FeatureMatrix::from_frames(&reference).unwrap();
    let target = FeatureMatrix::from_frames(&target).unwrap();
    let alignment = align(reference.view(), target.view(), euclidean).unwrap();
    assert_eq!(alignment.cost, 0.5);
    assert_eq!(alignment.path.steps(), &[(0, 0), (0, 1), (1, 2), (2, 3)]);

    let report = score(reference.view(), target.view(), &alignment).unwrap();
    assert!(report.mse > 0. && report.mse < 0.1);
    assert_eq!(report.frame_errors.len(), alignment.path.len());
}

#[test]
fn dimension_mismatch_scenario() {
    let reference = Array2::<Float>::zeros((10, 13));
    let target = Array2::<Float>::zeros((10, 26));
    for algorithm in [DtwAlgorithm::Exact, DtwAlgorithm::default()] {
        let err = Aligner::new(algorithm)
            .align(reference.view(), target.view())
            .unwrap_err();
        assert!(matches!(err, CompareError::DimensionMismatch { .. }));
    }
}
