//! Decoding audio files into mono waveforms.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{CompareError, Result};
use crate::features::Waveform;
use crate::Float;

pub trait AudioLoader {
    fn load(&self, path: &Path) -> Result<Waveform>;
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => CompareError::FileNotFound {
            path: path.to_owned(),
            source,
        },
        _ => CompareError::Decode {
            path: path.to_owned(),
            reason: source.to_string(),
        },
    })
}

/// Average interleaved channels down to one.
fn downmix(interleaved: Vec<Float>, channels: usize) -> Vec<Float> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<Float>() / channels as Float)
        .collect()
}

/// WAV files at their native sample rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavLoader;

impl AudioLoader for WavLoader {
    fn load(&self, path: &Path) -> Result<Waveform> {
        let invalid = |e: hound::Error| {
            CompareError::invalid_audio(format!("{}: {e}", path.display()))
        };
        let reader = WavReader::new(BufReader::new(open(path)?)).map_err(invalid)?;
        let spec = reader.spec();

        let interleaved: Vec<Float> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(invalid)?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as Float;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as Float * scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(invalid)?
            }
        };
        let samples = downmix(interleaved, spec.channels as usize);
        debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            n_samples = samples.len(),
            "loaded wav"
        );
        Ok(Waveform::new(samples, spec.sample_rate))
    }
}

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg_reader::FfmpegLoader;

#[cfg(feature = "ffmpeg")]
mod ffmpeg_reader {
    use std::path::Path;
    use std::sync::OnceLock;

    use ffmpeg::format::{sample::Type, Sample};
    use ffmpeg::frame::Audio;
    use ffmpeg::{codec, decoder, format, media, software, ChannelLayout, Packet};
    use ffmpeg_next as ffmpeg;
    use tracing::debug;

    use super::{open, AudioLoader};
    use crate::error::{CompareError, Result};
    use crate::features::Waveform;

    type FfmpegResult<T> = std::result::Result<T, ffmpeg::Error>;

    fn init() -> FfmpegResult<()> {
        static INIT: OnceLock<FfmpegResult<()>> = OnceLock::new();
        INIT.get_or_init(|| {
            ffmpeg::init()?;
            ffmpeg::log::set_level(ffmpeg::log::Level::Fatal);
            Ok(())
        })
        .clone()
    }

    /// The best audio stream of a container, decoded and converted to mono
    /// f32 as packets arrive.
    struct MonoStream {
        index: usize,
        decoder: decoder::Audio,
        resampler: software::resampling::Context,
        samples: Vec<f32>,
    }

    impl MonoStream {
        fn open(input: &format::context::Input, rate: u32) -> FfmpegResult<Self> {
            let stream = input
                .streams()
                .best(media::Type::Audio)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            let mut decoder = codec::context::Context::from_parameters(stream.parameters())?
                .decoder()
                .audio()?;
            decoder.set_parameters(stream.parameters())?;
            // Packed and planar are the same layout for one channel
            let resampler = software::resampler(
                (decoder.format(), decoder.channel_layout(), decoder.rate()),
                (Sample::F32(Type::Packed), ChannelLayout::MONO, rate),
            )?;
            Ok(Self {
                index: stream.index(),
                decoder,
                resampler,
                samples: Vec::new(),
            })
        }

        fn feed(&mut self, packet: &Packet) -> FfmpegResult<()> {
            self.decoder.send_packet(packet)?;
            self.drain_decoder()
        }

        fn drain_decoder(&mut self) -> FfmpegResult<()> {
            let mut decoded = Audio::empty();
            let mut converted = Audio::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                self.resampler.run(&decoded, &mut converted)?;
                self.keep(&converted);
            }
            Ok(())
        }

        fn keep(&mut self, frame: &Audio) {
            if frame.samples() > 0 {
                self.samples.extend_from_slice(frame.plane::<f32>(0));
            }
        }

        fn finish(mut self) -> FfmpegResult<Vec<f32>> {
            self.decoder.send_eof()?;
            self.drain_decoder()?;
            let mut converted = Audio::empty();
            while self.resampler.delay().is_some() {
                self.resampler.flush(&mut converted)?;
                if converted.samples() == 0 {
                    break;
                }
                self.keep(&converted);
            }
            Ok(self.samples)
        }
    }

    /// Any container FFmpeg understands, converted to mono at `rate`.
    #[derive(Clone, Copy, Debug)]
    pub struct FfmpegLoader {
        rate: u32,
    }

    impl FfmpegLoader {
        /// The rate the comparison scripts originally decoded at.
        pub const DEFAULT_RATE: u32 = 22050;

        pub fn new(rate: u32) -> Self {
            Self { rate }
        }

        pub fn rate(&self) -> u32 {
            self.rate
        }

        fn decode(&self, path: &Path) -> FfmpegResult<Vec<f32>> {
            init()?;
            let mut input = format::input(&path)?;
            let mut stream = MonoStream::open(&input, self.rate)?;
            for (packet_stream, packet) in input.packets() {
                if packet_stream.index() == stream.index {
                    stream.feed(&packet)?;
                }
            }
            stream.finish()
        }
    }

    impl Default for FfmpegLoader {
        fn default() -> Self {
            Self::new(Self::DEFAULT_RATE)
        }
    }

    impl AudioLoader for FfmpegLoader {
        fn load(&self, path: &Path) -> Result<Waveform> {
            open(path)?;
            let samples = self.decode(path).map_err(|e| CompareError::Decode {
                path: path.to_owned(),
                reason: e.to_string(),
            })?;
            debug!(
                path = %path.display(),
                sample_rate = self.rate,
                n_samples = samples.len(),
                "decoded with ffmpeg"
            );
            Ok(Waveform::new(samples, self.rate))
        }
    }
}
