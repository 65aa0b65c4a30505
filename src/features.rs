//! From waveform to feature matrix: silence trimming, duration normalization,
//! MFCCs and optional delta features.

use ndarray::prelude::*;
use ndarray::{concatenate, Zip};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, warn};

use crate::error::{CompareError, Result};
use crate::mfcc::{FrameExtractionOpts, Mfcc};
use crate::Float;

/// Frame length used when looking for leading and trailing silence.
pub const TRIM_FRAME_LENGTH: usize = 2048;
pub const TRIM_HOP_LENGTH: usize = 512;
/// Frames this far below the loudest frame count as silence.
pub const TRIM_TOP_DB: Float = 60.;

/// Half width of the delta regression window.
pub const DELTA_WIDTH: usize = 4;

const STRETCH_CHUNK: usize = 1024;
const MAX_HELD_CHUNKS: usize = 64;

/// Mono audio samples at a fixed sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    samples: Vec<Float>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<Float>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[Float] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Frame-wise feature vectors, one row per frame. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix(Array2<Float>);

impl FeatureMatrix {
    pub fn new(frames: Array2<Float>) -> Result<Self> {
        if frames.nrows() == 0 || frames.ncols() == 0 {
            return Err(CompareError::EmptySequence);
        }
        Ok(Self(frames))
    }

    /// Build from a list of frames, all of the same dimension.
    pub fn from_frames<F: AsRef<[Float]>>(frames: &[F]) -> Result<Self> {
        let dim = frames.first().map_or(0, |f| f.as_ref().len());
        let mut data = Vec::with_capacity(frames.len() * dim);
        for frame in frames {
            let frame = frame.as_ref();
            if frame.len() != dim {
                return Err(CompareError::DimensionMismatch {
                    reference: dim,
                    target: frame.len(),
                });
            }
            data.extend_from_slice(frame);
        }
        let array = Array2::from_shape_vec((frames.len(), dim), data)
            .map_err(|e| CompareError::invalid_config(e.to_string()))?;
        Self::new(array)
    }

    pub fn num_frames(&self) -> usize {
        self.0.nrows()
    }

    pub fn dim(&self) -> usize {
        self.0.ncols()
    }

    pub fn frame(&self, index: usize) -> ArrayView1<Float> {
        self.0.row(index)
    }

    pub fn view(&self) -> ArrayView2<Float> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<Float> {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractOptions {
    pub num_coefficients: usize,
    pub trim_silence: bool,
    pub target_duration: Option<f64>,
    pub include_deltas: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            num_coefficients: 13,
            trim_silence: false,
            target_duration: None,
            include_deltas: false,
        }
    }
}

impl ExtractOptions {
    fn validate(&self) -> Result<()> {
        if self.num_coefficients == 0 {
            return Err(CompareError::invalid_config(
                "number of coefficients must be positive",
            ));
        }
        match self.target_duration {
            Some(target) if !(target.is_finite() && target > 0.) => {
                Err(CompareError::invalid_config(format!(
                    "target duration must be positive, got {target}"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn frame_rms(samples: &[Float]) -> Vec<Float> {
    let n_frames = if samples.len() <= TRIM_FRAME_LENGTH {
        1
    } else {
        1 + (samples.len() - TRIM_FRAME_LENGTH + TRIM_HOP_LENGTH - 1) / TRIM_HOP_LENGTH
    };
    (0..n_frames)
        .map(|k| {
            let start = k * TRIM_HOP_LENGTH;
            let end = (start + TRIM_FRAME_LENGTH).min(samples.len());
            let frame = &samples[start..end];
            let energy: Float = frame.iter().map(|x| x * x).sum();
            (energy / frame.len().max(1) as Float).sqrt()
        })
        .collect()
}

/// Strip leading and trailing silence.
///
/// Silence is relative to the loudest frame. If nothing is louder than the
/// threshold (including all-zero input) the samples are returned untouched.
pub fn trim_silence(samples: &[Float]) -> &[Float] {
    let rms = frame_rms(samples);
    let max_rms = rms.iter().copied().fold(0., Float::max);
    if max_rms <= 0. {
        warn!(n_samples = samples.len(), "waveform is silent, not trimming");
        return samples;
    }
    let threshold = max_rms * (10. as Float).powf(-TRIM_TOP_DB / 20.);

    let loud = |r: &Float| *r > threshold;
    let (Some(first), Some(last)) = (rms.iter().position(loud), rms.iter().rposition(loud)) else {
        return samples;
    };
    let start = first * TRIM_HOP_LENGTH;
    let end = (last * TRIM_HOP_LENGTH + TRIM_FRAME_LENGTH).min(samples.len());
    debug!(start, end, n_samples = samples.len(), "trimmed silence");
    &samples[start..end]
}

fn resample_error(e: impl std::fmt::Display) -> CompareError {
    CompareError::invalid_audio(format!("time stretch failed: {e}"))
}

/// Resample `samples` to exactly `target_len` samples. Changes tempo (and pitch).
///
/// Past the end of the input the last sample is held, so the interpolation
/// filter settles on the signal rather than on implicit zeros.
fn stretch(samples: &[Float], target_len: usize) -> Result<Vec<Float>> {
    let ratio = target_len as f64 / samples.len() as f64;
    let mut resampler =
        FastFixedIn::<Float>::new(ratio, 1.0, PolynomialDegree::Cubic, STRETCH_CHUNK, 1)
            .map_err(resample_error)?;
    let delay = resampler.output_delay();
    let wanted = delay + target_len;
    let edge = samples.last().copied().unwrap_or(0.);

    let mut out: Vec<Float> = Vec::with_capacity(wanted + STRETCH_CHUNK);
    let mut input = samples;
    let mut held = Vec::with_capacity(STRETCH_CHUNK);
    let mut held_chunks = 0;
    while out.len() < wanted {
        let needed = resampler.input_frames_next();
        let chunk = if input.len() >= needed {
            let (chunk, rest) = input.split_at(needed);
            input = rest;
            chunk
        } else {
            // every chunk yields roughly ratio * needed samples, so this is ample
            if held_chunks == MAX_HELD_CHUNKS {
                break;
            }
            held.clear();
            held.extend_from_slice(input);
            held.resize(needed, edge);
            input = &[];
            held_chunks += 1;
            held.as_slice()
        };
        let produced = resampler.process(&[chunk], None).map_err(resample_error)?;
        out.extend_from_slice(&produced[0]);
    }

    let mut stretched: Vec<Float> = out.into_iter().skip(delay).take(target_len).collect();
    stretched.resize(target_len, edge);
    Ok(stretched)
}

/// Bring the waveform to exactly `target_duration * sample_rate` samples.
///
/// Longer input is resampled down to the target length, shorter input is
/// right-padded with zeros, input of the target length is returned as is.
pub fn normalize_duration(
    samples: &[Float],
    sample_rate: u32,
    target_duration: f64,
) -> Result<Vec<Float>> {
    let target_len = (target_duration * sample_rate as f64) as usize;
    if target_len == 0 {
        return Err(CompareError::invalid_config(format!(
            "target duration {target_duration}s is shorter than one sample at {sample_rate} Hz"
        )));
    }

    match samples.len() {
        n if n == target_len => Ok(samples.to_vec()),
        0 => Ok(vec![0.; target_len]),
        n if n < target_len => {
            let mut padded = Vec::with_capacity(target_len);
            padded.extend_from_slice(samples);
            padded.resize(target_len, 0.);
            Ok(padded)
        }
        n => {
            debug!(from = n, to = target_len, "stretching waveform");
            stretch(samples, target_len)
        }
    }
}

/// Regression deltas over `DELTA_WIDTH` frames on either side, replicating
/// the first and last frame past the edges.
pub fn delta(features: ArrayView2<Float>) -> Array2<Float> {
    let n_frames = features.nrows();
    let last = n_frames.saturating_sub(1);
    let denominator: Float = 2. * (1..=DELTA_WIDTH).map(|n| (n * n) as Float).sum::<Float>();

    let mut out = Array2::zeros(features.raw_dim());
    for (t, mut row) in out.rows_mut().into_iter().enumerate() {
        for n in 1..=DELTA_WIDTH {
            let ahead = features.row((t + n).min(last));
            let behind = features.row(t.saturating_sub(n));
            let weight = n as Float / denominator;
            Zip::from(&mut row)
                .and(&ahead)
                .and(&behind)
                .for_each(|d, &a, &b| *d += weight * (a - b));
        }
    }
    out
}

/// Frame-wise features for one waveform.
pub fn extract(waveform: &Waveform, opts: &ExtractOptions) -> Result<FeatureMatrix> {
    opts.validate()?;
    if waveform.sample_rate() == 0 {
        return Err(CompareError::invalid_audio("sample rate is zero"));
    }
    if waveform.samples().is_empty() {
        return Err(CompareError::invalid_audio("waveform has no samples"));
    }
    if waveform.samples().iter().any(|x| !x.is_finite()) {
        return Err(CompareError::invalid_audio("waveform contains non-finite samples"));
    }

    let samples = if opts.trim_silence {
        trim_silence(waveform.samples())
    } else {
        waveform.samples()
    };
    let normalized;
    let samples = match opts.target_duration {
        Some(target) => {
            normalized = normalize_duration(samples, waveform.sample_rate(), target)?;
            normalized.as_slice()
        }
        None => samples,
    };

    let mut mfcc = Mfcc::new(
        FrameExtractionOpts::standard(waveform.sample_rate()),
        opts.num_coefficients,
    );
    let base = mfcc.compute(samples)?;

    let features = if opts.include_deltas {
        let d1 = delta(base.view());
        let d2 = delta(d1.view());
        concatenate(Axis(1), &[base.view(), d1.view(), d2.view()])
            .map_err(|e| CompareError::invalid_config(e.to_string()))?
    } else {
        base
    };
    debug!(
        frames = features.nrows(),
        dim = features.ncols(),
        "extracted features"
    );
    FeatureMatrix::new(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tone(n: usize, sample_rate: u32) -> Vec<Float> {
        (0..n)
            .map(|i| (std::f32::consts::TAU * 220. * i as Float / sample_rate as Float).sin() * 0.5)
            .collect()
    }

    #[test]
    fn trim_removes_outer_silence() {
        let mut samples = vec![0.; 8000];
        samples.extend(tone(8000, 16000));
        samples.extend(vec![0.; 8000]);

        let trimmed = trim_silence(&samples);
        assert!(trimmed.len() < samples.len());
        assert!(trimmed.len() >= 8000);
        let energy = |s: &[Float]| s.iter().map(|x| x * x).sum::<Float>();
        assert_abs_diff_eq!(energy(trimmed), energy(&samples), epsilon = 1e-3);
    }

    #[test]
    fn trim_keeps_all_silent_input() {
        let samples = vec![0.; 5000];
        assert_eq!(trim_silence(&samples).len(), 5000);
    }

    #[test]
    fn trim_short_input() {
        let samples = tone(100, 16000);
        assert_eq!(trim_silence(&samples), samples.as_slice());
    }

    #[test]
    fn pad_to_target() {
        let samples = tone(1000, 1000);
        let padded = normalize_duration(&samples, 1000, 2.5).unwrap();
        assert_eq!(padded.len(), 2500);
        assert_eq!(&padded[..1000], samples.as_slice());
        assert!(padded[1000..].iter().all(|x| *x == 0.));
    }

    #[test]
    fn normalize_is_noop_at_target() {
        let samples = tone(16000, 16000);
        assert_eq!(normalize_duration(&samples, 16000, 1.0).unwrap(), samples);
    }

    #[test]
    fn stretch_hits_exact_length() {
        let samples = tone(32000, 16000);
        let once = normalize_duration(&samples, 16000, 1.0).unwrap();
        assert_eq!(once.len(), 16000);
        assert!(once.iter().any(|x| x.abs() > 0.1));

        let twice = normalize_duration(&once, 16000, 1.0).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn stretch_tail_settles_on_signal() {
        let samples = vec![0.981 as Float; 70000];
        let stretched = normalize_duration(&samples, 22050, 3.0).unwrap();
        assert_eq!(stretched.len(), 66150);
        for x in &stretched[stretched.len() - 256..] {
            assert_abs_diff_eq!(*x, 0.981, epsilon = 1e-3);
        }
    }

    #[test]
    fn rejects_sub_sample_target() {
        let err = normalize_duration(&[0.1; 10], 10, 0.01).unwrap_err();
        assert!(matches!(err, CompareError::InvalidConfig { .. }));
    }

    #[test]
    fn delta_of_ramp() {
        let ramp = Array2::from_shape_fn((12, 2), |(t, _)| t as Float);
        let d = delta(ramp.view());
        for t in DELTA_WIDTH..12 - DELTA_WIDTH {
            assert_abs_diff_eq!(d[(t, 0)], 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(d[(t, 1)], 1.0, epsilon = 1e-5);
        }
        // Edges are replicated, so the slope shrinks but stays positive
        assert!(d[(0, 0)] > 0. && d[(0, 0)] < 1.);
        assert!(d[(11, 0)] > 0. && d[(11, 0)] < 1.);
    }

    #[test]
    fn delta_of_single_frame_is_zero() {
        let single = array![[1.0, 2.0, 3.0]];
        assert_eq!(delta(single.view()), Array2::<Float>::zeros((1, 3)));
    }

    #[test]
    fn extract_shapes() {
        let wave = Waveform::new(tone(16000, 16000), 16000);
        let base = extract(&wave, &ExtractOptions::default()).unwrap();
        assert_eq!(base.dim(), 13);
        assert_eq!(base.num_frames(), 101);

        let opts = ExtractOptions {
            include_deltas: true,
            target_duration: Some(0.5),
            trim_silence: true,
            ..Default::default()
        };
        let full = extract(&wave, &opts).unwrap();
        assert_eq!(full.dim(), 39);
        assert_eq!(full.num_frames(), 51);
    }

    #[test]
    fn extract_rejects_empty_waveform() {
        let wave = Waveform::new(vec![], 22050);
        let err = extract(&wave, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, CompareError::InvalidAudio { .. }));
    }

    #[test]
    fn extract_rejects_zero_coefficients() {
        let wave = Waveform::new(tone(1000, 16000), 16000);
        let opts = ExtractOptions {
            num_coefficients: 0,
            ..Default::default()
        };
        let err = extract(&wave, &opts).unwrap_err();
        assert!(matches!(err, CompareError::InvalidConfig { .. }));
    }

    #[test]
    fn extract_all_silent_with_trim() {
        let wave = Waveform::new(vec![0.; 4000], 16000);
        let opts = ExtractOptions {
            trim_silence: true,
            ..Default::default()
        };
        let features = extract(&wave, &opts).unwrap();
        assert_eq!(features.num_frames(), 4000 / 160 + 1);
    }

    #[test]
    fn from_frames_checks_dimensions() {
        let err = FeatureMatrix::from_frames(&[vec![0.0 as Float, 1.0], vec![2.0]]).unwrap_err();
        assert!(matches!(err, CompareError::DimensionMismatch { .. }));
        let empty: [Vec<Float>; 0] = [];
        assert!(matches!(
            FeatureMatrix::from_frames(&empty).unwrap_err(),
            CompareError::EmptySequence
        ));
    }
}
