use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::Sample;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::error;

use crate::error::{Error, Result};

/// Real-time PCM output. `write` blocks when the device buffer is full,
/// which is the engine's only source of backpressure.
pub trait OutputSink {
    fn write(&mut self, samples: &[f32]) -> Result<()>;
    fn set_paused(&mut self, paused: bool);
    /// Discard anything buffered but not yet played.
    fn clear(&mut self);
    fn buffered(&self) -> usize;
    /// Whether the device stream has died; buffered samples will never
    /// play and writes are pointless.
    fn failed(&self) -> bool {
        false
    }
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
}

/// Opens a sink for a given sample rate and channel count. The engine
/// calls this whenever the stream's format changes; the sink itself stays
/// on the engine thread.
pub type SinkOpener = Box<dyn Fn(u32, u16) -> Result<Box<dyn OutputSink>> + Send>;

pub fn cpal_opener() -> SinkOpener {
    Box::new(|sample_rate, channels| {
        Ok(Box::new(CpalSink::open(sample_rate, channels)?) as Box<dyn OutputSink>)
    })
}

struct Shared {
    buffer: Mutex<VecDeque<f32>>,
    space: Condvar,
    paused: AtomicBool,
    failed: AtomicBool,
}

pub struct CpalSink {
    shared: Arc<Shared>,
    high_water: usize,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl CpalSink {
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Roughly half a second of audio between the decoder and the device.
        let high_water = (sample_rate as usize * channels as usize) / 2;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(high_water)),
            space: Condvar::new(),
            paused: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        });

        let data_shared = shared.clone();
        let err_shared = shared.clone();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut buffer = data_shared.buffer.lock().unwrap();
                    for sample in data.iter_mut() {
                        if data_shared.paused.load(Ordering::Relaxed) {
                            *sample = Sample::EQUILIBRIUM;
                        } else {
                            *sample = buffer.pop_front().unwrap_or(Sample::EQUILIBRIUM);
                        }
                    }
                    drop(buffer);
                    data_shared.space.notify_one();
                },
                move |err| {
                    error!("audio stream error: {err}");
                    err_shared.failed.store(true, Ordering::Relaxed);
                    err_shared.space.notify_one();
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        Ok(Self {
            shared,
            high_water,
            sample_rate,
            channels,
            _stream: stream,
        })
    }
}

impl OutputSink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let mut buffer = self.shared.buffer.lock().unwrap();
        while buffer.len() > self.high_water {
            if self.shared.failed.load(Ordering::Relaxed) {
                return Err(Error::Device("output stream failed".to_string()));
            }
            let (guard, _) = self
                .shared
                .space
                .wait_timeout(buffer, Duration::from_millis(100))
                .unwrap();
            buffer = guard;
        }
        buffer.extend(samples.iter().copied());

        if self.shared.failed.load(Ordering::Relaxed) {
            return Err(Error::Device("output stream failed".to_string()));
        }
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
    }

    fn clear(&mut self) {
        self.shared.buffer.lock().unwrap().clear();
        self.shared.space.notify_one();
    }

    fn buffered(&self) -> usize {
        self.shared.buffer.lock().unwrap().len()
    }

    fn failed(&self) -> bool {
        self.shared.failed.load(Ordering::Relaxed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
