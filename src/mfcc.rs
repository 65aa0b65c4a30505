//! Mel-frequency cepstral coefficients.
//!
//! The waveform is cut into overlapping frames; every frame is pre-emphasized,
//! Hamming-windowed and zero-padded to a power of two before the real FFT. The
//! power spectrum goes through a triangular mel filterbank, the log energies
//! through an orthonormal DCT-II, and the first `n_ceps` outputs are kept.

use std::sync::Arc;

use ndarray::linalg::general_mat_vec_mul;
use ndarray::prelude::*;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use tracing::debug;

use crate::error::{CompareError, Result};
use crate::freq::{self, Freq};
use crate::Float;

const PI: Float = std::f32::consts::PI;
const TWOPI: Float = std::f32::consts::TAU;

pub const FRAME_LENGTH_MS: Float = 25.;
pub const FRAME_SHIFT_MS: Float = 10.;
const EMPHASIS_FACTOR: Float = 0.97;

const MEL_BINS: usize = 40;
const MEL_LOW_FREQ: Float = 133.3333;
const MEL_HIGH_FREQ: Float = 6855.4976;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameExtractionOpts {
    pub sample_freq: u32,
    pub frame_length_ms: Float,
    pub frame_shift_ms: Float,
    pub emphasis_factor: Float,
}

impl FrameExtractionOpts {
    /// The framing every comparison in a run shares.
    pub fn standard(sample_freq: u32) -> Self {
        Self {
            sample_freq,
            frame_length_ms: FRAME_LENGTH_MS,
            frame_shift_ms: FRAME_SHIFT_MS,
            emphasis_factor: EMPHASIS_FACTOR,
        }
    }

    pub fn win_size(&self) -> usize {
        let samples = self.sample_freq as Float * 0.001 * self.frame_length_ms;
        (samples as usize).max(2)
    }

    pub fn win_size_padded(&self) -> usize {
        self.win_size().next_power_of_two()
    }

    pub fn win_shift(&self) -> usize {
        ((self.sample_freq as Float * 0.001 * self.frame_shift_ms) as usize).max(1)
    }
}

struct MelBanks {
    // (first fft bin, triangular weights starting at that bin)
    bins: Vec<(usize, Array1<Float>)>,
}

impl MelBanks {
    fn new(n_bins: usize, frame_opts: &FrameExtractionOpts) -> Self {
        let sample_freq = Freq::from(frame_opts.sample_freq as Float);
        let nyquist = 0.5 * sample_freq;

        let win_size = frame_opts.win_size_padded();
        let n_fft_bins = win_size / 2 + 1;
        let fft_bin_width = sample_freq / win_size as Float;

        let high_freq = Freq::from(MEL_HIGH_FREQ).min(nyquist);
        let low_freq = Freq::from(MEL_LOW_FREQ).min(0.5 * high_freq);
        let mel_low_freq = low_freq.to_mel();
        let mel_high_freq = high_freq.to_mel();

        let mel_freq_delta = (mel_high_freq - mel_low_freq) / (n_bins + 1) as Float;

        let bins = (0..n_bins)
            .map(|bin| {
                let bin = bin as Float;
                let left_mel = mel_low_freq + bin * mel_freq_delta;
                let center_mel = mel_low_freq + (bin + 1.0) * mel_freq_delta;
                let right_mel = mel_low_freq + (bin + 2.0) * mel_freq_delta;

                let mut first_index = None;
                let weights: Array1<Float> = (0..n_fft_bins)
                    .filter_map(|i| {
                        let freq: freq::Freq = fft_bin_width * (i as Float);
                        let mel = freq.to_mel();
                        if mel <= left_mel || mel >= right_mel {
                            return None;
                        }
                        let weight = if mel <= center_mel {
                            (mel - left_mel) / (center_mel - left_mel)
                        } else {
                            (right_mel - mel) / (right_mel - center_mel)
                        };
                        first_index.get_or_insert(i);
                        Some(weight)
                    })
                    .collect();
                // Too narrow to catch an fft bin at low sample rates; contributes nothing.
                (first_index.unwrap_or(0), weights)
            })
            .collect();
        Self { bins }
    }

    fn apply_in(&self, power_spectrum: ArrayView1<Float>, mut mel_energies: ArrayViewMut1<Float>) {
        for ((offset, weights), output) in self.bins.iter().zip(mel_energies.iter_mut()) {
            *output = weights.dot(&power_spectrum.slice(s![*offset..*offset + weights.len()]));
        }
    }
}

fn dct_matrix(rows: usize, cols: usize) -> Array2<Float> {
    let mut matrix = Array2::zeros((rows, cols));

    let normalizer = (1.0 / cols as Float).sqrt();
    matrix.row_mut(0).fill(normalizer);

    let normalizer = (2.0 / cols as f64).sqrt();
    for row in 1..rows {
        for col in 0..cols {
            matrix[(row, col)] = (normalizer
                * f64::cos(PI as f64 / cols as f64 * (col as f64 + 0.5) * row as f64))
                as Float
        }
    }
    matrix
}

fn hamming_window(len: usize) -> Array1<Float> {
    let a = TWOPI / (len - 1) as Float;
    Array1::from_iter((0..len).map(|i| 0.54 - 0.46 * Float::cos(a * i as Float)))
}

fn preemphasize(frame: &mut [Float], emphasis_factor: Float) {
    for j in (1..frame.len()).rev() {
        frame[j] -= emphasis_factor * frame[j - 1];
    }
    frame[0] -= emphasis_factor * frame[0];
}

pub struct Mfcc {
    opts: FrameExtractionOpts,
    n_ceps: usize,
    mel_banks: MelBanks,
    dct_matrix: Array2<Float>,
    window: Array1<Float>,
    fft: Arc<dyn RealToComplex<Float>>,
    // Scratch space reused across frames
    mel_energies: Array1<Float>,
    power_spectrum: Array1<Float>,
    fft_scratch: Vec<Complex<Float>>,
    fft_out: Vec<Complex<Float>>,
}

impl Mfcc {
    pub fn new(opts: FrameExtractionOpts, n_ceps: usize) -> Self {
        let n_bins = MEL_BINS.max(n_ceps);
        let win_size_padded = opts.win_size_padded();
        let fft = RealFftPlanner::new().plan_fft_forward(win_size_padded);
        let fft_scratch = fft.make_scratch_vec();
        let fft_out = fft.make_output_vec();
        Self {
            opts,
            n_ceps,
            mel_banks: MelBanks::new(n_bins, &opts),
            dct_matrix: dct_matrix(n_ceps, n_bins),
            window: hamming_window(win_size_padded),
            power_spectrum: Array1::zeros(fft_out.len()),
            mel_energies: Array1::zeros(n_bins),
            fft,
            fft_scratch,
            fft_out,
        }
    }

    pub fn n_coeffs(&self) -> usize {
        self.n_ceps
    }

    /// Number of frames produced for a waveform of `n_samples`.
    pub fn num_frames(&self, n_samples: usize) -> usize {
        n_samples / self.opts.win_shift() + 1
    }

    fn compute_frame(
        &mut self,
        frame: &mut [Float],
        mut feature: ArrayViewMut1<Float>,
    ) -> Result<()> {
        self.fft
            .process_with_scratch(frame, &mut self.fft_out, &mut self.fft_scratch)
            .map_err(|e| CompareError::invalid_audio(format!("fft failed: {e}")))?;

        for (power, bin) in self.power_spectrum.iter_mut().zip(self.fft_out.iter()) {
            *power = bin.norm_sqr();
        }

        self.mel_banks
            .apply_in(self.power_spectrum.view(), self.mel_energies.view_mut());
        self.mel_energies
            .mapv_inplace(|energy| energy.max(Float::EPSILON).ln());

        general_mat_vec_mul(1.0, &self.dct_matrix, &self.mel_energies, 0.0, &mut feature);
        Ok(())
    }

    /// Frame-wise coefficients, one row per frame.
    pub fn compute(&mut self, wave: &[Float]) -> Result<Array2<Float>> {
        let n_samples = wave.len();
        let frame_shift = self.opts.win_shift();
        let frame_length_padded = self.opts.win_size_padded();
        let num_frames = self.num_frames(n_samples);

        let mut frame = vec![0.; frame_length_padded];
        let mut output = Array2::zeros((num_frames, self.n_ceps));
        for i in 0..num_frames {
            let frame_start = (i * frame_shift).min(n_samples);
            let frame_end = usize::min(frame_start + frame_length_padded, n_samples);
            let filled = frame_end - frame_start;
            frame[..filled].copy_from_slice(&wave[frame_start..frame_end]);
            // Zero-pad the last frames
            frame[filled..].fill(0.);

            preemphasize(&mut frame, self.opts.emphasis_factor);
            for (sample, weight) in frame.iter_mut().zip(self.window.iter()) {
                *sample *= weight;
            }

            self.compute_frame(&mut frame, output.row_mut(i))?;
        }
        debug!(
            n_samples,
            num_frames,
            frame_shift,
            frame_length_padded,
            "computed mfcc frames"
        );
        Ok(output)
    }
}
