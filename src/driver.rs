//! Batch comparison of configured reference/candidate pairs.

use std::path::{Path, PathBuf};
use std::thread;

use tracing::{info, warn};

use crate::audioreader::AudioLoader;
use crate::dtw::{Aligner, DtwAlgorithm};
use crate::error::Result;
use crate::features::{extract, ExtractOptions, FeatureMatrix};
use crate::score::{score, DistortionReport};
use crate::stats::{summarize, Summary};

/// Placeholder replaced by the two-digit, 1-based pair index.
pub const INDEX_PLACEHOLDER: &str = "{idx}";

#[derive(Clone, Debug, PartialEq)]
pub enum PairSource {
    /// `count` pairs named by expanding the index placeholder in each template.
    Indexed {
        dir: PathBuf,
        reference_template: String,
        candidate_template: String,
        count: usize,
    },
    /// Explicit `(reference, candidate)` paths.
    Explicit(Vec<(PathBuf, PathBuf)>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PairPaths {
    pub id: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
}

impl PairSource {
    /// Reference and candidate sharing one directory, both suffixed `-NN.wav`.
    pub fn prefixed(
        dir: impl Into<PathBuf>,
        reference_tag: &str,
        candidate_tag: &str,
        prefix: &str,
        count: usize,
    ) -> Self {
        PairSource::Indexed {
            dir: dir.into(),
            reference_template: format!("{reference_tag}-{prefix}-{INDEX_PLACEHOLDER}.wav"),
            candidate_template: format!("{candidate_tag}-{prefix}-{INDEX_PLACEHOLDER}.wav"),
            count,
        }
    }

    /// One reference compared against every candidate.
    pub fn against_reference(
        reference: impl Into<PathBuf>,
        candidates: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let reference = reference.into();
        PairSource::Explicit(
            candidates
                .into_iter()
                .map(|candidate| (reference.clone(), candidate))
                .collect(),
        )
    }

    pub fn pairs(&self) -> Vec<PairPaths> {
        match self {
            PairSource::Indexed {
                dir,
                reference_template,
                candidate_template,
                count,
            } => (1..=*count)
                .map(|i| {
                    let idx = format!("{i:02}");
                    PairPaths {
                        reference: dir.join(reference_template.replace(INDEX_PLACEHOLDER, &idx)),
                        candidate: dir.join(candidate_template.replace(INDEX_PLACEHOLDER, &idx)),
                        id: idx,
                    }
                })
                .collect(),
            PairSource::Explicit(pairs) => pairs
                .iter()
                .enumerate()
                .map(|(i, (reference, candidate))| PairPaths {
                    id: candidate
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("{:02}", i + 1)),
                    reference: reference.clone(),
                    candidate: candidate.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetConfig {
    pub label: String,
    pub pairs: PairSource,
    pub extract: ExtractOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompareConfig {
    pub datasets: Vec<DatasetConfig>,
    pub algorithm: DtwAlgorithm,
}

const AMANDA_PAIRS: usize = 5;

impl CompareConfig {
    fn amanda_with(root: &Path, extract: ExtractOptions) -> Self {
        let dir = root.join("amanda");
        let dataset = |label: &str, prefix: &str| DatasetConfig {
            label: label.to_owned(),
            pairs: PairSource::prefixed(&dir, "DNC", "PIPER", prefix, AMANDA_PAIRS),
            extract: extract.clone(),
        };
        Self {
            datasets: vec![
                dataset("Correct", "abairt-ceart"),
                dataset("Wrong", "abairt-micheart"),
            ],
            algorithm: DtwAlgorithm::default(),
        }
    }

    /// Correct and wrong sentence recordings, silence trimmed.
    pub fn amanda(root: &Path) -> Self {
        Self::amanda_with(
            root,
            ExtractOptions {
                trim_silence: true,
                ..Default::default()
            },
        )
    }

    /// As [`CompareConfig::amanda`], also normalized to 3 s and with delta features.
    pub fn amanda_normalized(root: &Path) -> Self {
        Self::amanda_with(
            root,
            ExtractOptions {
                trim_silence: true,
                target_duration: Some(3.0),
                include_deltas: true,
                ..Default::default()
            },
        )
    }

    /// One ground truth counting recording against four attempts.
    pub fn ground_truth_123(root: &Path) -> Self {
        let dir = root.join("123");
        let candidates = ["02-correct", "03-wrong", "04-v-wrong", "05-nonsense"]
            .into_iter()
            .map(|name| dir.join(name).with_extension("wav"));
        Self {
            datasets: vec![DatasetConfig {
                label: "123".to_owned(),
                pairs: PairSource::against_reference(dir.join("01-correct.wav"), candidates),
                extract: ExtractOptions::default(),
            }],
            algorithm: DtwAlgorithm::default(),
        }
    }
}

#[derive(Debug)]
pub struct PairOutcome {
    pub paths: PairPaths,
    pub result: Result<DistortionReport>,
}

#[derive(Debug)]
pub struct DatasetOutcome {
    pub label: String,
    pub pairs: Vec<PairOutcome>,
}

impl DatasetOutcome {
    /// Statistics over the MSE of every pair that succeeded.
    pub fn summary(&self) -> Option<Summary> {
        summarize(
            self.pairs
                .iter()
                .filter_map(|pair| pair.result.as_ref().ok())
                .map(|report| report.mse as f64),
        )
    }

    pub fn failures(&self) -> usize {
        self.pairs.iter().filter(|pair| pair.result.is_err()).count()
    }
}

fn load_features<L: AudioLoader>(
    loader: &L,
    path: &Path,
    opts: &ExtractOptions,
) -> Result<FeatureMatrix> {
    let waveform = loader.load(path)?;
    extract(&waveform, opts)
}

/// Load, extract, align and score one pair. Both files are processed concurrently.
pub fn compare_pair<L>(
    loader: &L,
    reference: &Path,
    candidate: &Path,
    opts: &ExtractOptions,
    aligner: &Aligner,
) -> Result<DistortionReport>
where
    L: AudioLoader + Sync,
{
    let (reference_features, candidate_features) = thread::scope(|s| {
        let t_reference = s.spawn(|| load_features(loader, reference, opts));
        let t_candidate = s.spawn(|| load_features(loader, candidate, opts));
        let reference = t_reference
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let candidate = t_candidate
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (reference, candidate)
    });
    let (reference_features, candidate_features) = (reference_features?, candidate_features?);

    let alignment = aligner.align(reference_features.view(), candidate_features.view())?;
    score(reference_features.view(), candidate_features.view(), &alignment)
}

/// Compare every configured pair. A failing pair is recorded and skipped.
pub fn run<L>(config: &CompareConfig, loader: &L) -> Vec<DatasetOutcome>
where
    L: AudioLoader + Sync,
{
    let aligner = Aligner::new(config.algorithm);
    config
        .datasets
        .iter()
        .map(|dataset| {
            info!(label = %dataset.label, "comparing dataset");
            let pairs = dataset
                .pairs
                .pairs()
                .into_iter()
                .map(|paths| {
                    let result = compare_pair(
                        loader,
                        &paths.reference,
                        &paths.candidate,
                        &dataset.extract,
                        &aligner,
                    );
                    if let Err(e) = &result {
                        warn!(label = %dataset.label, pair = %paths.id, error = %e, "pair failed");
                    }
                    PairOutcome { paths, result }
                })
                .collect();
            DatasetOutcome {
                label: dataset.label.clone(),
                pairs,
            }
        })
        .collect()
}
