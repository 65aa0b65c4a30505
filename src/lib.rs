//! Acoustic similarity of spoken utterances.
//!
//! A reference recording and a candidate recording are turned into MFCC
//! sequences ([`features::extract`]), aligned with dynamic time warping
//! ([`dtw::Aligner`]) and scored by the mean squared error between aligned
//! frames ([`score::score`]). [`driver::run`] does this for whole datasets.

pub mod audioreader;
pub mod driver;
pub mod dtw;
pub mod error;
pub mod features;
pub mod freq;
pub mod mfcc;
pub mod report;
pub mod score;
pub mod stats;

pub type Float = f32;

#[cfg(feature = "ffmpeg")]
pub use audioreader::FfmpegLoader;
pub use audioreader::{AudioLoader, WavLoader};
pub use driver::{CompareConfig, DatasetConfig, PairSource};
pub use dtw::{Aligner, DtwAlgorithm, DtwResult, WarpingPath};
pub use error::{CompareError, Result};
pub use features::{extract, ExtractOptions, FeatureMatrix, Waveform};
pub use score::{score, DistortionReport};
