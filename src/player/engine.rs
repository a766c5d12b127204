use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::Result;
use crate::events::types::AppEvent;
use crate::player::commands::{EngineState, PlaybackCommand};
use crate::player::queue::PlayQueue;
use crate::player::sink::{OutputSink, SinkOpener};
use crate::player::source::AudioSource;

/// How long the idle engine waits on the play queue before rechecking the
/// stop flag.
const QUEUE_POLL: Duration = Duration::from_millis(100);
/// Bounded wait on the command channel while paused; arrival of a command
/// wakes the engine immediately.
const PAUSE_POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Status {
    state: EngineState,
    current_file: Option<PathBuf>,
    duration_secs: f64,
}

struct SharedStatus {
    stop: AtomicBool,
    interrupt: AtomicBool,
    active: AtomicBool,
    status: Mutex<Status>,
}

impl SharedStatus {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            interrupt: AtomicBool::new(false),
            active: AtomicBool::new(false),
            status: Mutex::new(Status::default()),
        }
    }

    fn halted(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.interrupt.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: EngineState) {
        self.status.lock().unwrap().state = state;
    }

    fn set_session(&self, state: EngineState, file: Option<PathBuf>, duration_secs: f64) {
        let mut status = self.status.lock().unwrap();
        status.state = state;
        status.current_file = file;
        status.duration_secs = duration_secs;
    }
}

/// Handle to the persistent playback worker.
///
/// All methods are safe to call from any thread; the worker consumes the
/// play queue and command channel in order and reports through the event
/// channel handed to [`Player::spawn`].
pub struct Player {
    cmd_tx: mpsc::Sender<PlaybackCommand>,
    queue: Arc<PlayQueue>,
    shared: Arc<SharedStatus>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    pub fn spawn(opener: SinkOpener, event_tx: mpsc::Sender<AppEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let queue = Arc::new(PlayQueue::new());
        let shared = Arc::new(SharedStatus::new());

        let engine = Engine {
            cmd_rx,
            event_tx,
            queue: queue.clone(),
            shared: shared.clone(),
            opener,
        };
        let handle = std::thread::spawn(move || engine.run());

        Self {
            cmd_tx,
            queue,
            shared,
            handle: Some(handle),
        }
    }

    /// Append a file to the play queue.
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        self.queue.push(path.into());
    }

    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// Drop all pending queue entries matching `path`. Does not touch the
    /// file currently playing; use [`Player::interrupt`] for that.
    pub fn remove(&self, path: &Path) {
        self.queue.remove(path);
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(PlaybackCommand::Pause);
    }

    pub fn unpause(&self) {
        let _ = self.cmd_tx.send(PlaybackCommand::Unpause);
    }

    pub fn seek(&self, seconds: f64) {
        let _ = self.cmd_tx.send(PlaybackCommand::Seek(seconds));
    }

    /// Abort the file currently playing; the engine moves on to the next
    /// queue entry, or goes idle.
    pub fn interrupt(&self) {
        self.shared.interrupt.store(true, Ordering::SeqCst);
        self.shared.active.store(false, Ordering::SeqCst);
    }

    /// Interrupt and permanently halt the worker. Shutdown only.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.interrupt();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> EngineState {
        self.shared.status.lock().unwrap().state
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.shared.status.lock().unwrap().current_file.clone()
    }

    pub fn duration_secs(&self) -> f64 {
        self.shared.status.lock().unwrap().duration_secs
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

/// Wall-clock bookkeeping for the file currently playing. The reported
/// position is `base_secs` plus the time elapsed since `anchor`,
/// re-anchored on every pause, unpause and seek.
struct Session {
    base_secs: f64,
    anchor: Instant,
    paused_at_secs: f64,
    pending_seek: Option<f64>,
    paused: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            base_secs: 0.0,
            anchor: Instant::now(),
            paused_at_secs: 0.0,
            pending_seek: None,
            paused: false,
        }
    }

    fn position_secs(&self) -> f64 {
        if self.paused {
            self.paused_at_secs
        } else {
            self.base_secs + self.anchor.elapsed().as_secs_f64()
        }
    }

    fn rebase(&mut self, offset_secs: f64) {
        self.base_secs = offset_secs;
        self.anchor = Instant::now();
    }
}

struct SeekRequest {
    target_secs: f64,
    /// Whether `seek_completed` already fired (deferred seeks announce when
    /// the command is recorded, not when the container is repositioned).
    announced: bool,
}

enum CommandOutcome {
    Continue,
    Reseek(SeekRequest),
    Aborted,
}

struct Engine {
    cmd_rx: mpsc::Receiver<PlaybackCommand>,
    event_tx: mpsc::Sender<AppEvent>,
    queue: Arc<PlayQueue>,
    shared: Arc<SharedStatus>,
    opener: SinkOpener,
}

impl Engine {
    fn run(mut self) {
        while !self.shared.stop.load(Ordering::SeqCst) {
            let Some(path) = self.queue.pop_timeout(QUEUE_POLL) else {
                continue;
            };

            self.shared.interrupt.store(false, Ordering::SeqCst);
            self.shared.active.store(true, Ordering::SeqCst);
            self.shared
                .set_session(EngineState::Loading, Some(path.clone()), 0.0);

            match self.play_file(&path) {
                Ok(true) => {
                    let _ = self.event_tx.send(AppEvent::PlaybackFinished);
                }
                Ok(false) => {
                    debug!("playback of {} interrupted", path.display());
                }
                Err(e) => {
                    let _ = self.event_tx.send(AppEvent::PlaybackError {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
            }

            self.shared.active.store(false, Ordering::SeqCst);
            self.shared.set_session(EngineState::Idle, None, 0.0);
        }
    }

    /// Play one file to completion. Returns `Ok(true)` on natural end of
    /// stream, `Ok(false)` when interrupted or stopped.
    fn play_file(&mut self, path: &Path) -> Result<bool> {
        let mut sink: Option<Box<dyn OutputSink>> = None;
        let mut seek: Option<SeekRequest> = None;
        let mut sess = Session::new();

        // The container is reopened after every live seek; the sink is kept
        // when the stream's rate and channel count are unchanged.
        'reopen: loop {
            let mut source = AudioSource::open(path)?;

            match seek.take() {
                Some(req) => {
                    self.shared.set_state(EngineState::Seeking);
                    source.seek_to(req.target_secs)?;
                    sess.rebase(req.target_secs);
                    if !req.announced {
                        let _ = self
                            .event_tx
                            .send(AppEvent::SeekCompleted(req.target_secs));
                    }
                }
                None => {
                    let duration_secs = source.duration_secs;
                    self.shared.set_session(
                        EngineState::Playing,
                        Some(path.to_path_buf()),
                        duration_secs,
                    );
                    info!(
                        "playing {} ({duration_secs:.1}s)",
                        path.display()
                    );
                    let _ = self.event_tx.send(AppEvent::PlaybackStarted {
                        path: path.to_path_buf(),
                        duration_secs,
                    });
                    sess = Session::new();
                }
            }
            self.shared.set_state(EngineState::Playing);

            loop {
                if self.shared.halted() {
                    return Ok(false);
                }

                match self.pump_commands(&mut sess, sink.as_deref_mut())? {
                    CommandOutcome::Continue => {}
                    CommandOutcome::Reseek(req) => {
                        if let Some(s) = sink.as_deref_mut() {
                            s.clear();
                        }
                        seek = Some(req);
                        continue 'reopen;
                    }
                    CommandOutcome::Aborted => return Ok(false),
                }

                let Some(frame) = source.next_frame()? else {
                    // Natural end of stream; let the device drain what is
                    // still buffered before reporting finished.
                    if let Some(s) = sink.as_deref_mut() {
                        self.drain(s);
                    }
                    return Ok(!self.shared.halted());
                };

                let out = match &mut sink {
                    Some(s)
                        if s.sample_rate() == frame.sample_rate
                            && s.channels() == frame.channels =>
                    {
                        s.as_mut()
                    }
                    slot => {
                        *slot = Some((self.opener)(frame.sample_rate, frame.channels)?);
                        slot.as_deref_mut().unwrap()
                    }
                };

                // Write in bounded slices so commands and cancellation are
                // picked up within a fraction of a second even when the
                // decoder hands us large packets.
                let max_chunk =
                    (frame.sample_rate as usize / 8).max(1) * frame.channels as usize;
                let mut rest = frame.samples.as_slice();
                loop {
                    let (head, tail) = rest.split_at(rest.len().min(max_chunk));
                    out.write(head)?;
                    let _ = self
                        .event_tx
                        .send(AppEvent::PositionChanged(sess.position_secs()));
                    if tail.is_empty() {
                        break;
                    }
                    rest = tail;

                    if self.shared.halted() {
                        return Ok(false);
                    }
                    match self.pump_commands(&mut sess, Some(&mut *out))? {
                        CommandOutcome::Continue => {}
                        CommandOutcome::Reseek(req) => {
                            out.clear();
                            seek = Some(req);
                            continue 'reopen;
                        }
                        CommandOutcome::Aborted => return Ok(false),
                    }
                }
            }
        }
    }

    /// Drain pending commands. While playing this is a non-blocking sweep
    /// between writes; while paused it becomes the wait loop that the next
    /// `unpause` or `seek` breaks out of.
    fn pump_commands(
        &mut self,
        sess: &mut Session,
        mut sink: Option<&mut (dyn OutputSink + 'static)>,
    ) -> Result<CommandOutcome> {
        loop {
            let cmd = if sess.paused {
                match self.cmd_rx.recv_timeout(PAUSE_POLL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return Ok(CommandOutcome::Aborted),
                }
            } else {
                match self.cmd_rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => return Ok(CommandOutcome::Continue),
                    Err(TryRecvError::Disconnected) => return Ok(CommandOutcome::Aborted),
                }
            };

            if self.shared.halted() {
                return Ok(CommandOutcome::Aborted);
            }

            let Some(cmd) = cmd else {
                continue;
            };

            match cmd {
                PlaybackCommand::Pause => {
                    if !sess.paused {
                        sess.paused_at_secs = sess.position_secs();
                        sess.paused = true;
                        if let Some(s) = sink.as_deref_mut() {
                            s.set_paused(true);
                        }
                        self.shared.set_state(EngineState::Paused);
                        debug!("paused at {:.2}s", sess.paused_at_secs);
                    }
                }
                PlaybackCommand::Unpause => {
                    if sess.paused {
                        sess.paused = false;
                        if let Some(target_secs) = sess.pending_seek.take() {
                            // Drop the stale pre-seek audio still in the ring
                            // buffer before the device starts playing again.
                            if let Some(s) = sink.as_deref_mut() {
                                s.clear();
                                s.set_paused(false);
                            }
                            return Ok(CommandOutcome::Reseek(SeekRequest {
                                target_secs,
                                announced: true,
                            }));
                        }
                        if let Some(s) = sink.as_deref_mut() {
                            s.set_paused(false);
                        }
                        sess.rebase(sess.paused_at_secs);
                        self.shared.set_state(EngineState::Playing);
                    }
                }
                PlaybackCommand::Seek(target_secs) => {
                    sess.paused_at_secs = target_secs;
                    if sess.paused {
                        // Single deferred slot: a later seek overwrites this
                        // one, and the container is not touched until the
                        // next unpause.
                        sess.pending_seek = Some(target_secs);
                        let _ = self.event_tx.send(AppEvent::SeekCompleted(target_secs));
                    } else {
                        return Ok(CommandOutcome::Reseek(SeekRequest {
                            target_secs,
                            announced: false,
                        }));
                    }
                }
            }
        }
    }

    fn drain(&self, sink: &mut dyn OutputSink) {
        while sink.buffered() > 0 {
            if self.shared.halted() {
                sink.clear();
                return;
            }
            // A dead stream never consumes its buffer.
            if sink.failed() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
