#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use cadenza::error::{Error, Result};
use cadenza::events::types::AppEvent;
use cadenza::player::sink::{OutputSink, SinkOpener};

/// Write a 440 Hz sine fixture and return its path.
pub fn write_sine_wav(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    seconds: f32,
) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as u32;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * 440.0 * t).sin() * 0.4 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// What the engine did to the sink, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
    Write(usize),
    SetPaused(bool),
    Clear,
}

/// Sink that swallows samples. With `realtime` set, writes sleep for the
/// duration of the audio handed over, approximating device backpressure.
pub struct CaptureSink {
    sample_rate: u32,
    channels: u16,
    realtime: bool,
    written: Arc<AtomicUsize>,
    ops: Option<Arc<Mutex<Vec<SinkOp>>>>,
}

impl CaptureSink {
    fn record(&self, op: SinkOp) {
        if let Some(ops) = &self.ops {
            ops.lock().unwrap().push(op);
        }
    }
}

impl OutputSink for CaptureSink {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if self.realtime {
            let secs = samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64);
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
        self.written.fetch_add(samples.len(), Ordering::SeqCst);
        self.record(SinkOp::Write(samples.len()));
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.record(SinkOp::SetPaused(paused));
    }

    fn clear(&mut self) {
        self.record(SinkOp::Clear);
    }

    fn buffered(&self) -> usize {
        0
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

pub fn capture_opener(realtime: bool, written: Arc<AtomicUsize>) -> SinkOpener {
    Box::new(move |sample_rate, channels| {
        Ok(Box::new(CaptureSink {
            sample_rate,
            channels,
            realtime,
            written: written.clone(),
            ops: None,
        }) as Box<dyn OutputSink>)
    })
}

/// Like [`capture_opener`], but every sink call is appended to `ops`.
pub fn logging_opener(realtime: bool, ops: Arc<Mutex<Vec<SinkOp>>>) -> SinkOpener {
    Box::new(move |sample_rate, channels| {
        Ok(Box::new(CaptureSink {
            sample_rate,
            channels,
            realtime,
            written: Arc::new(AtomicUsize::new(0)),
            ops: Some(ops.clone()),
        }) as Box<dyn OutputSink>)
    })
}

/// Sink whose stream is already dead: writes are accepted but the buffer
/// never drains and the failure flag is up.
pub struct DeadStreamSink {
    sample_rate: u32,
    channels: u16,
}

impl OutputSink for DeadStreamSink {
    fn write(&mut self, _samples: &[f32]) -> Result<()> {
        Ok(())
    }

    fn set_paused(&mut self, _paused: bool) {}

    fn clear(&mut self) {}

    fn buffered(&self) -> usize {
        1
    }

    fn failed(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

pub fn dead_stream_opener() -> SinkOpener {
    Box::new(|sample_rate, channels| {
        Ok(Box::new(DeadStreamSink {
            sample_rate,
            channels,
        }) as Box<dyn OutputSink>)
    })
}

/// Opener whose sinks can never be created; playback of every file fails
/// with a device error.
pub fn failing_opener() -> SinkOpener {
    Box::new(|_, _| Err(Error::Device("no such device".to_string())))
}

/// Wait for the first event matching `pred`, discarding everything else.
pub fn wait_for<F>(rx: &mpsc::Receiver<AppEvent>, timeout: Duration, mut pred: F) -> Option<AppEvent>
where
    F: FnMut(&AppEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Collect all events that arrive within `window`.
pub fn collect_for(rx: &mpsc::Receiver<AppEvent>, window: Duration) -> Vec<AppEvent> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}
