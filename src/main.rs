use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use utterance_dtw::{driver, report, CompareConfig, DtwAlgorithm, WavLoader};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Preset {
    /// DNC vs PIPER sentences, silence trimmed
    Amanda,
    /// As amanda, normalized to 3 s with delta features
    AmandaNormalized,
    /// One ground truth against four attempts
    Counting,
}

#[derive(Parser, Debug)]
struct Args {
    /// Directory holding the amanda/ and 123/ recordings
    #[clap(value_parser, default_value = "audio-files")]
    audio_root: PathBuf,

    #[clap(long, value_enum, default_value = "amanda")]
    preset: Preset,

    /// Use the full-grid DTW instead of FastDTW
    #[clap(long)]
    exact: bool,

    #[clap(long, value_parser, default_value_t = utterance_dtw::dtw::DEFAULT_RADIUS)]
    radius: usize,

    /// Decode with FFmpeg (any container, resampled to 22050 Hz) instead of reading WAV directly
    #[cfg(feature = "ffmpeg")]
    #[clap(long)]
    ffmpeg: bool,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match args.preset {
        Preset::Amanda => CompareConfig::amanda(&args.audio_root),
        Preset::AmandaNormalized => CompareConfig::amanda_normalized(&args.audio_root),
        Preset::Counting => CompareConfig::ground_truth_123(&args.audio_root),
    };
    config.algorithm = if args.exact {
        DtwAlgorithm::Exact
    } else {
        DtwAlgorithm::Fast {
            radius: args.radius,
        }
    };

    #[cfg(feature = "ffmpeg")]
    let outcomes = if args.ffmpeg {
        driver::run(&config, &utterance_dtw::FfmpegLoader::default())
    } else {
        driver::run(&config, &WavLoader)
    };
    #[cfg(not(feature = "ffmpeg"))]
    let outcomes = driver::run(&config, &WavLoader);
    report::write_report(&mut io::stdout().lock(), &outcomes)
}
