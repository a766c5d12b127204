use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::num::{NonZeroU8, NonZeroU32};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flacenc::source::{Fill, MemSource, Source};
use mp3lame_encoder::{Builder, FlushNoGap, InterleavedPcm, max_required_buffer_size};
use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoderBuilder};

use crate::convert::{EncodeOptions, TargetCodec, deinterleave};
use crate::error::{Error, Result};

/// One open destination file. `write` takes interleaved f32 PCM already at
/// the encoder's sample rate; `finish` flushes delayed packets and closes
/// the container.
pub trait Encoder {
    fn write(&mut self, interleaved: &[f32]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

pub fn open_encoder(
    codec: TargetCodec,
    path: &Path,
    sample_rate: u32,
    channels: u16,
    options: &EncodeOptions,
) -> Result<Box<dyn Encoder>> {
    match codec {
        TargetCodec::Wav => Ok(Box::new(WavEncoder::create(path, sample_rate, channels)?)),
        TargetCodec::Flac => Ok(Box::new(FlacEncoder::create(path, sample_rate, channels)?)),
        TargetCodec::Mp3 => Ok(Box::new(Mp3Encoder::create(
            path,
            sample_rate,
            channels,
            options,
        )?)),
        TargetCodec::OggVorbis => Ok(Box::new(OggVorbisEncoder::create(
            path,
            sample_rate,
            channels,
            options,
        )?)),
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

struct WavEncoder {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavEncoder {
    fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| Error::Encode(format!("wav: {e}")))?;
        Ok(Self { writer })
    }
}

impl Encoder for WavEncoder {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        for sample in interleaved {
            self.writer
                .write_sample(to_i16(*sample))
                .map_err(|e| Error::Encode(format!("wav: {e}")))?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer
            .finalize()
            .map_err(|e| Error::Encode(format!("wav: {e}")))
    }
}

/// flacenc pulls samples through its `Source` trait, so PCM is spooled to
/// an unlinked temp file as it arrives and streamed back through
/// [`SpooledFlacSource`] when `finish` runs the encoder. Memory use is
/// bounded by the chunk size, not the input length.
struct FlacEncoder {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    spool: BufWriter<File>,
}

impl FlacEncoder {
    fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            channels,
            spool: BufWriter::new(tempfile::tempfile()?),
        })
    }
}

impl Encoder for FlacEncoder {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        for sample in interleaved {
            self.spool
                .write_all(&(to_i16(*sample) as i32).to_le_bytes())?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        use flacenc::bitsink::ByteSink;
        use flacenc::component::BitRepr;
        use flacenc::error::Verify;

        let mut spool = self
            .spool
            .into_inner()
            .map_err(|e| Error::Encode(format!("flac spool: {e}")))?;
        spool.seek(SeekFrom::Start(0))?;

        let config = flacenc::config::Encoder::default()
            .into_verified()
            .map_err(|(_, e)| Error::Encode(format!("flac config: {e:?}")))?;

        let source = SpooledFlacSource::new(
            spool,
            self.channels as usize,
            self.sample_rate as usize,
            config.block_size,
        );
        let io_error = source.io_error_slot();
        let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
            .map_err(|e| Error::Encode(format!("flac: {e:?}")))?;
        if let Some(e) = io_error.lock().unwrap().take() {
            return Err(Error::Io(e));
        }

        let mut sink = ByteSink::new();
        stream
            .write(&mut sink)
            .map_err(|e| Error::Encode(format!("flac: {e:?}")))?;
        std::fs::write(&self.path, sink.as_slice())?;
        Ok(())
    }
}

/// Streams spooled PCM back to flacenc chunk by chunk, delegating each
/// chunk to a [`MemSource`]. A spool read failure truncates the stream
/// and is reported through the shared error slot, since the encoder owns
/// the source once encoding starts.
struct SpooledFlacSource {
    reader: BufReader<File>,
    channels: usize,
    sample_rate: usize,
    chunk_frames: usize,
    current: MemSource,
    io_error: Arc<Mutex<Option<std::io::Error>>>,
    done: bool,
}

impl SpooledFlacSource {
    /// Chunks hold whole encoder blocks; a short mid-stream read would
    /// otherwise be encoded as an undersized frame.
    const BLOCKS_PER_CHUNK: usize = 16;

    fn new(spool: File, channels: usize, sample_rate: usize, block_size: usize) -> Self {
        Self {
            reader: BufReader::new(spool),
            channels,
            sample_rate,
            chunk_frames: block_size * Self::BLOCKS_PER_CHUNK,
            current: MemSource::from_samples(&[], channels, 16, sample_rate),
            io_error: Arc::new(Mutex::new(None)),
            done: false,
        }
    }

    fn io_error_slot(&self) -> Arc<Mutex<Option<std::io::Error>>> {
        self.io_error.clone()
    }

    fn load_chunk(&mut self) -> std::io::Result<bool> {
        let mut samples = Vec::with_capacity(self.chunk_frames * self.channels);
        let mut bytes = [0u8; 4];
        while samples.len() < self.chunk_frames * self.channels {
            match self.reader.read_exact(&mut bytes) {
                Ok(()) => samples.push(i32::from_le_bytes(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
        if samples.is_empty() {
            return Ok(false);
        }
        self.current = MemSource::from_samples(&samples, self.channels, 16, self.sample_rate);
        Ok(true)
    }
}

impl Source for SpooledFlacSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn bits_per_sample(&self) -> usize {
        16
    }

    fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    fn read_samples<F: Fill>(
        &mut self,
        block_size: usize,
        dest: &mut F,
    ) -> std::result::Result<usize, flacenc::error::SourceError> {
        while !self.done {
            let read = self.current.read_samples(block_size, dest)?;
            if read > 0 {
                return Ok(read);
            }
            match self.load_chunk() {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    *self.io_error.lock().unwrap() = Some(e);
                    self.done = true;
                }
            }
        }
        Ok(0)
    }
}

struct Mp3Encoder {
    encoder: mp3lame_encoder::Encoder,
    writer: BufWriter<File>,
    channels: usize,
}

impl Mp3Encoder {
    fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        options: &EncodeOptions,
    ) -> Result<Self> {
        if channels > 2 {
            return Err(Error::Encode(format!(
                "mp3 supports at most 2 channels, source has {channels}"
            )));
        }

        let mut builder = Builder::new()
            .ok_or_else(|| Error::Encode("failed to initialize lame".to_string()))?;
        builder
            .set_num_channels(channels as u8)
            .map_err(|e| Error::Encode(format!("mp3 channels: {e:?}")))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| Error::Encode(format!("mp3 sample rate: {e:?}")))?;
        builder
            .set_brate(lame_bitrate(options.bitrate_kbps.unwrap_or(192))?)
            .map_err(|e| Error::Encode(format!("mp3 bitrate: {e:?}")))?;
        builder
            .set_quality(mp3lame_encoder::Quality::Good)
            .map_err(|e| Error::Encode(format!("mp3 quality: {e:?}")))?;
        let encoder = builder
            .build()
            .map_err(|e| Error::Encode(format!("mp3: {e:?}")))?;

        Ok(Self {
            encoder,
            writer: BufWriter::new(File::create(path)?),
            channels: channels as usize,
        })
    }
}

impl Encoder for Mp3Encoder {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        let pcm: Vec<i16> = interleaved.iter().map(|s| to_i16(*s)).collect();
        let mut out = Vec::with_capacity(max_required_buffer_size(pcm.len() / self.channels));
        self.encoder
            .encode_to_vec(InterleavedPcm(&pcm), &mut out)
            .map_err(|e| Error::Encode(format!("mp3: {e:?}")))?;
        self.writer.write_all(&out)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        let mut out = Vec::with_capacity(7200);
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut out)
            .map_err(|e| Error::Encode(format!("mp3: {e:?}")))?;
        self.writer.write_all(&out)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn lame_bitrate(kbps: u32) -> Result<mp3lame_encoder::Bitrate> {
    use mp3lame_encoder::Bitrate;
    match kbps {
        8 => Ok(Bitrate::Kbps8),
        16 => Ok(Bitrate::Kbps16),
        24 => Ok(Bitrate::Kbps24),
        32 => Ok(Bitrate::Kbps32),
        40 => Ok(Bitrate::Kbps40),
        48 => Ok(Bitrate::Kbps48),
        64 => Ok(Bitrate::Kbps64),
        80 => Ok(Bitrate::Kbps80),
        96 => Ok(Bitrate::Kbps96),
        112 => Ok(Bitrate::Kbps112),
        128 => Ok(Bitrate::Kbps128),
        160 => Ok(Bitrate::Kbps160),
        192 => Ok(Bitrate::Kbps192),
        224 => Ok(Bitrate::Kbps224),
        256 => Ok(Bitrate::Kbps256),
        320 => Ok(Bitrate::Kbps320),
        other => Err(Error::Encode(format!("unsupported mp3 bitrate: {other}k"))),
    }
}

struct OggVorbisEncoder {
    inner: vorbis_rs::VorbisEncoder<BufWriter<File>>,
    channels: usize,
}

impl OggVorbisEncoder {
    fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        options: &EncodeOptions,
    ) -> Result<Self> {
        let rate = NonZeroU32::new(sample_rate)
            .ok_or_else(|| Error::Encode("vorbis: zero sample rate".to_string()))?;
        let chans = u8::try_from(channels)
            .ok()
            .and_then(NonZeroU8::new)
            .ok_or_else(|| Error::Encode(format!("vorbis: bad channel count {channels}")))?;

        let writer = BufWriter::new(File::create(path)?);
        let mut builder = VorbisEncoderBuilder::new(rate, chans, writer)
            .map_err(|e| Error::Encode(format!("vorbis: {e}")))?;
        if let Some(kbps) = options.bitrate_kbps {
            let target = NonZeroU32::new(kbps * 1000)
                .ok_or_else(|| Error::Encode("vorbis: zero bitrate".to_string()))?;
            builder.bitrate_management_strategy(VorbisBitrateManagementStrategy::Vbr {
                target_bitrate: target,
            });
        }
        let inner = builder
            .build()
            .map_err(|e| Error::Encode(format!("vorbis: {e}")))?;

        Ok(Self {
            inner,
            channels: channels as usize,
        })
    }
}

impl Encoder for OggVorbisEncoder {
    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        let planar = deinterleave(interleaved, self.channels);
        self.inner
            .encode_audio_block(&planar)
            .map_err(|e| Error::Encode(format!("vorbis: {e}")))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.inner
            .finish()
            .map_err(|e| Error::Encode(format!("vorbis: {e}")))?;
        Ok(())
    }
}
