use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::warn;

use crate::error::{Error, Result};

/// One decoded batch of interleaved PCM samples.
///
/// Owned by whichever pipeline stage currently holds it; never shared
/// across threads.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Presentation time of the packet this frame was decoded from.
    pub pts_secs: Option<f64>,
}

/// An open audio container with its decoder, yielding [`AudioFrame`]s.
pub struct AudioSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    pub duration_secs: f64,
}

impl AudioSource {
    pub fn open(path: &Path) -> Result<Self> {
        let unreadable = |message: String| Error::FileUnreadable {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| unreadable(e.to_string()))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unreadable("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let time_base = codec_params.time_base;

        let duration_secs = match (time_base, codec_params.n_frames) {
            (Some(tb), Some(frames)) => {
                let time = tb.calc_time(frames);
                time.seconds as f64 + time.frac
            }
            _ => 0.0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unreadable(e.to_string()))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            duration_secs,
        })
    }

    /// Reposition the stream at `seconds`, coarse (keyframe-backward) like
    /// a slider seek wants. The decoder is reset; the first packets after
    /// the jump may still fail to decode while it warms up, which
    /// [`Self::next_frame`] tolerates.
    pub fn seek_to(&mut self, seconds: f64) -> Result<()> {
        let seek_to = SeekTo::Time {
            time: Time::from(seconds),
            track_id: Some(self.track_id),
        };
        self.format
            .seek(SeekMode::Coarse, seek_to)
            .map_err(|e| Error::Decode(format!("seek failed: {e}")))?;
        self.decoder.reset();
        Ok(())
    }

    /// Decode the next frame batch. Returns `None` at end of stream.
    /// Corrupt packets are skipped; only I/O and fatal decoder errors
    /// abort the stream.
    pub fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let pts_secs = self.time_base.map(|tb| {
                let time = tb.calc_time(packet.ts());
                time.seconds as f64 + time.frac
            });

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(AudioFrame {
                        samples: buf.samples().to_vec(),
                        sample_rate: spec.rate,
                        channels: spec.channels.count() as u16,
                        pts_secs,
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            }
        }
    }
}
