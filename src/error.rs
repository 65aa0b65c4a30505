use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompareError>;

#[derive(Error, Debug)]
pub enum CompareError {
    /// Unreadable, empty or zero-length audio.
    #[error("invalid audio: {reason}")]
    InvalidAudio { reason: String },

    /// Feature extraction parameters out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("cannot align an empty feature sequence")]
    EmptySequence,

    #[error("feature dimension mismatch: reference has {reference}, target has {target}")]
    DimensionMismatch { reference: usize, target: usize },

    #[error("file not found: {}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
}

impl CompareError {
    pub(crate) fn invalid_audio(reason: impl Into<String>) -> Self {
        Self::InvalidAudio {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
