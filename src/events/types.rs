use std::path::PathBuf;

use crate::library::FileEntry;

/// Events emitted by the worker threads, consumed by the caller's loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    // From the playback engine
    PlaybackStarted { path: PathBuf, duration_secs: f64 },
    PositionChanged(f64),
    PlaybackFinished,
    PlaybackError { path: PathBuf, message: String },
    SeekCompleted(f64),

    // From the transcode pipeline
    ConversionProgress(u8),
    ConversionFinished {
        output: PathBuf,
        error: Option<String>,
    },

    // From the directory scanner
    ScanChunk(Vec<FileEntry>),
    ScanFinished(usize),
    ScanError(String),
}
