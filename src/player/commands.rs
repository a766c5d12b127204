/// Control commands posted to the engine thread, consumed in FIFO order.
#[derive(Debug, Clone, Copy)]
pub enum PlaybackCommand {
    Pause,
    Unpause,
    /// Target offset in seconds from the start of the current file.
    Seek(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Seeking,
}
