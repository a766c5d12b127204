use std::sync::mpsc;

use tracing::{debug, info};

use crate::convert::encoder::open_encoder;
use crate::convert::resampler::StreamResampler;
use crate::convert::ConversionJob;
use crate::error::{Error, Result};
use crate::events::types::AppEvent;
use crate::player::source::AudioSource;

/// Run one conversion to completion. Any failure aborts the whole job and
/// is wrapped with the codec name and options so the finished event can
/// report it on its own.
pub(crate) fn run(job: &ConversionJob, event_tx: &mpsc::Sender<AppEvent>) -> Result<()> {
    convert_file(job, event_tx).map_err(|e| Error::Conversion {
        codec: job.codec.name().to_string(),
        options: job.options.to_string(),
        message: e.to_string(),
    })
}

fn convert_file(job: &ConversionJob, event_tx: &mpsc::Sender<AppEvent>) -> Result<()> {
    let mut source = AudioSource::open(&job.input)?;
    let total_secs = (source.duration_secs > 0.0).then_some(source.duration_secs);

    let Some(first) = source.next_frame()? else {
        return Err(Error::Decode("source contains no audio frames".to_string()));
    };

    let source_rate = first.sample_rate;
    let channels = first.channels;
    let target_rate = job.codec.negotiate_rate(source_rate);

    // Destination-driven: the resampler exists only when the negotiated
    // output rate differs from the source.
    let mut resampler = if target_rate != source_rate {
        Some(StreamResampler::new(source_rate, target_rate, channels)?)
    } else {
        None
    };

    let mut encoder = open_encoder(job.codec, &job.output, target_rate, channels, &job.options)?;

    info!(
        "converting {} -> {} ({}, {source_rate} Hz -> {target_rate} Hz)",
        job.input.display(),
        job.output.display(),
        job.codec.name(),
    );

    let mut last_percent: i32 = -1;
    let mut frame = Some(first);
    while let Some(f) = frame {
        match &mut resampler {
            Some(r) => {
                let out = r.push(&f.samples)?;
                if !out.is_empty() {
                    encoder.write(&out)?;
                }
            }
            None => encoder.write(&f.samples)?,
        }

        if let Some(percent) = progress_step(f.pts_secs, total_secs, &mut last_percent) {
            let _ = event_tx.send(AppEvent::ConversionProgress(percent));
        }

        frame = source.next_frame()?;
    }

    if let Some(r) = &mut resampler {
        let tail = r.finish()?;
        if !tail.is_empty() {
            encoder.write(&tail)?;
        }
    }
    encoder.finish()?;

    debug!("conversion of {} complete", job.input.display());
    Ok(())
}

/// Integer-percent progress for one packet, reported only when it
/// advances. Containers that never report a duration get no progress
/// events at all rather than a made-up percentage.
fn progress_step(
    pts_secs: Option<f64>,
    total_secs: Option<f64>,
    last_percent: &mut i32,
) -> Option<u8> {
    let pts = pts_secs?;
    let total = total_secs?;
    let percent = ((pts / total) * 100.0) as i32;
    if percent > *last_percent {
        *last_percent = percent;
        Some(percent.clamp(0, 100) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_duration_suppresses_progress() {
        let mut last = -1;
        assert_eq!(progress_step(Some(0.0), None, &mut last), None);
        assert_eq!(progress_step(Some(30.0), None, &mut last), None);
        assert_eq!(last, -1);
    }

    #[test]
    fn progress_advances_by_integer_percent() {
        let mut last = -1;
        assert_eq!(progress_step(Some(0.0), Some(10.0), &mut last), Some(0));
        assert_eq!(progress_step(Some(0.05), Some(10.0), &mut last), None);
        assert_eq!(progress_step(Some(0.5), Some(10.0), &mut last), Some(5));
        assert_eq!(progress_step(Some(0.5), Some(10.0), &mut last), None);
        assert_eq!(progress_step(Some(10.0), Some(10.0), &mut last), Some(100));
    }

    #[test]
    fn progress_clamps_past_the_end() {
        let mut last = -1;
        // Streams can run slightly past the reported duration.
        assert_eq!(progress_step(Some(10.4), Some(10.0), &mut last), Some(100));
        assert_eq!(progress_step(Some(11.0), Some(10.0), &mut last), Some(100));
    }

    #[test]
    fn missing_pts_is_skipped() {
        let mut last = -1;
        assert_eq!(progress_step(None, Some(10.0), &mut last), None);
        assert_eq!(last, -1);
    }
}
