use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::events::types::AppEvent;

mod encoder;
mod pipeline;
mod resampler;

pub use resampler::StreamResampler;

/// Sample rates the mp3 encoder accepts.
const MP3_SUPPORTED_RATES: [u32; 9] = [
    8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000,
];

/// Used when a lossy target does not support the source rate.
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCodec {
    Mp3,
    OggVorbis,
    Flac,
    Wav,
}

impl TargetCodec {
    pub fn name(&self) -> &'static str {
        match self {
            TargetCodec::Mp3 => "mp3",
            TargetCodec::OggVorbis => "vorbis",
            TargetCodec::Flac => "flac",
            TargetCodec::Wav => "pcm_s16le",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetCodec::Mp3 => "mp3",
            TargetCodec::OggVorbis => "ogg",
            TargetCodec::Flac => "flac",
            TargetCodec::Wav => "wav",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, TargetCodec::Flac | TargetCodec::Wav)
    }

    /// The codec's fixed supported-rate set, or `None` when any rate the
    /// source uses can be passed through.
    pub fn supported_rates(&self) -> Option<&'static [u32]> {
        match self {
            TargetCodec::Mp3 => Some(&MP3_SUPPORTED_RATES),
            _ => None,
        }
    }

    /// Pick the output rate for a source rate: pass-through when the codec
    /// accepts it, otherwise fall back to 44100 Hz.
    pub fn negotiate_rate(&self, source_rate: u32) -> u32 {
        match self.supported_rates() {
            Some(rates) if !rates.contains(&source_rate) => FALLBACK_SAMPLE_RATE,
            _ => source_rate,
        }
    }
}

impl FromStr for TargetCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(TargetCodec::Mp3),
            "ogg" | "vorbis" => Ok(TargetCodec::OggVorbis),
            "flac" => Ok(TargetCodec::Flac),
            "wav" => Ok(TargetCodec::Wav),
            other => Err(Error::Encode(format!("unknown target codec: {other}"))),
        }
    }
}

/// Caller-supplied encoder parameters. Lossless targets ignore the bit
/// rate.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub bitrate_kbps: Option<u32>,
}

impl fmt::Display for EncodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bitrate_kbps {
            Some(kbps) => write!(f, "b:a={kbps}k"),
            None => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec: TargetCodec,
    pub options: EncodeOptions,
}

/// Launches one-shot transcode workers. At most one job runs at a time;
/// a second request is rejected with [`Error::Busy`] without touching the
/// in-flight job.
pub struct Converter {
    event_tx: mpsc::Sender<AppEvent>,
    active: Arc<AtomicBool>,
}

impl Converter {
    pub fn new(event_tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            event_tx,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start converting `job.input` into `job.output`, returning as soon as
    /// the worker is launched. The job's outcome arrives as a single
    /// `ConversionFinished` event; on failure any partial output file is
    /// left in place.
    pub fn start(&self, job: ConversionJob) -> Result<JoinHandle<()>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Busy);
        }

        let event_tx = self.event_tx.clone();
        let active = self.active.clone();
        Ok(std::thread::spawn(move || {
            let output = job.output.clone();
            let error = pipeline::run(&job, &event_tx).err().map(|e| e.to_string());
            active.store(false, Ordering::SeqCst);
            let _ = event_tx.send(AppEvent::ConversionFinished { output, error });
        }))
    }
}

/// [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]].
pub(crate) fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }
    planar
}

/// [[L, L, ...], [R, R, ...]] to [L, R, L, R, ...].
pub(crate) fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let channels = planar.len();
    if channels == 0 {
        return Vec::new();
    }
    let frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(frames * channels);
    for frame_idx in 0..frames {
        for ch in planar {
            interleaved.push(ch[frame_idx]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp3_clamps_unsupported_rates() {
        assert_eq!(TargetCodec::Mp3.negotiate_rate(96000), 44100);
        assert_eq!(TargetCodec::Mp3.negotiate_rate(88200), 44100);
        assert_eq!(TargetCodec::Mp3.negotiate_rate(44100), 44100);
        assert_eq!(TargetCodec::Mp3.negotiate_rate(22050), 22050);
    }

    #[test]
    fn lossless_targets_pass_rate_through() {
        assert_eq!(TargetCodec::Flac.negotiate_rate(96000), 96000);
        assert_eq!(TargetCodec::Wav.negotiate_rate(8000), 8000);
        assert_eq!(TargetCodec::OggVorbis.negotiate_rate(96000), 96000);
    }

    #[test]
    fn codec_parses_from_str() {
        assert_eq!("mp3".parse::<TargetCodec>().unwrap(), TargetCodec::Mp3);
        assert_eq!(
            "OGG".parse::<TargetCodec>().unwrap(),
            TargetCodec::OggVorbis
        );
        assert_eq!("flac".parse::<TargetCodec>().unwrap(), TargetCodec::Flac);
        assert!("wma".parse::<TargetCodec>().is_err());
    }

    #[test]
    fn interleave_round_trips() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = deinterleave(&interleaved, 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
        assert_eq!(interleave(&planar), interleaved);
    }

    #[test]
    fn options_render_for_error_messages() {
        assert_eq!(
            EncodeOptions {
                bitrate_kbps: Some(192)
            }
            .to_string(),
            "b:a=192k"
        );
        assert_eq!(EncodeOptions::default().to_string(), "default");
    }
}
