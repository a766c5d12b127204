use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the playback engine and the transcode pipeline.
///
/// All of these are caught at file or job granularity inside the owning
/// worker; none of them terminate a worker's outer loop.
#[derive(Debug, Error)]
pub enum Error {
    /// The file is missing or could not be probed as an audio container.
    #[error("cannot open {path}: {message}")]
    FileUnreadable { path: PathBuf, message: String },

    /// Mid-stream demux or decode failure.
    #[error("decode error: {0}")]
    Decode(String),

    /// Output device failure.
    #[error("audio device error: {0}")]
    Device(String),

    /// Sample rate conversion failure inside the transcode pipeline.
    #[error("resample error: {0}")]
    Resample(String),

    /// Encoder or muxer failure inside the transcode pipeline.
    #[error("encode error: {0}")]
    Encode(String),

    /// A whole conversion job failed. Carries the codec name and the
    /// options the job ran with so the failure is reportable on its own.
    #[error("conversion to {codec} failed ({options}): {message}")]
    Conversion {
        codec: String,
        options: String,
        message: String,
    },

    /// A conversion was requested while another one is running.
    #[error("a conversion is already running")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
