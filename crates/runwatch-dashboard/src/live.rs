//! Asynchronous work behind the dashboard: log reads, filesystem watches,
//! run discovery and the shared heartbeat. Workers never touch dashboard
//! state; each operation ends in at most one [`Msg`] on the intake channel.

use crossterm::event::{KeyEvent, MouseEvent};
use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use runwatch_core::discovery::{scan_runs, DiscoveryError};
use runwatch_core::reader::{LogReader, LogSource, ReadError, RecordBatch};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

pub const INTAKE_CAPACITY: usize = 256;
/// Large enough that the timer task never waits on a busy controller.
pub const HEARTBEAT_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Backlog,
    Live,
}

/// Everything the controller reacts to.
pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize { width: u16, height: u16 },
    AnimationFrame,
    RunsDiscovered(Vec<String>),
    ScanFailed(DiscoveryError),
    ReaderOpened {
        key: String,
        path: PathBuf,
        reader: Box<dyn LogReader>,
    },
    ReaderFailed {
        key: String,
        error: ReadError,
    },
    RecordsRead {
        key: String,
        kind: ReadKind,
        reader: Box<dyn LogReader>,
        batch: RecordBatch,
    },
    ReadFailed {
        key: String,
        error: ReadError,
    },
    WatcherStarted {
        key: String,
        watcher: RunWatcher,
        events: WatchEvents,
    },
    WatcherFailed {
        key: String,
        error: notify::Error,
    },
    FileChanged {
        key: String,
        events: WatchEvents,
    },
    WatcherClosed {
        key: String,
    },
    Heartbeat,
}

impl Msg {
    pub fn name(&self) -> &'static str {
        match self {
            Msg::Key(_) => "key",
            Msg::Mouse(_) => "mouse",
            Msg::Resize { .. } => "resize",
            Msg::AnimationFrame => "animation_frame",
            Msg::RunsDiscovered(_) => "runs_discovered",
            Msg::ScanFailed(_) => "scan_failed",
            Msg::ReaderOpened { .. } => "reader_opened",
            Msg::ReaderFailed { .. } => "reader_failed",
            Msg::RecordsRead { .. } => "records_read",
            Msg::ReadFailed { .. } => "read_failed",
            Msg::WatcherStarted { .. } => "watcher_started",
            Msg::WatcherFailed { .. } => "watcher_failed",
            Msg::FileChanged { .. } => "file_changed",
            Msg::WatcherClosed { .. } => "watcher_closed",
            Msg::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Work the controller asks for.
pub enum WorkOp {
    OpenLog {
        key: String,
        path: PathBuf,
    },
    Read {
        key: String,
        kind: ReadKind,
        reader: Box<dyn LogReader>,
    },
    StartWatcher {
        key: String,
        dir: PathBuf,
    },
    WaitForWatcher {
        key: String,
        events: WatchEvents,
    },
    ScanRuns {
        dir: PathBuf,
        delay: Duration,
    },
    Frame {
        delay: Duration,
    },
}

impl WorkOp {
    pub fn name(&self) -> &'static str {
        match self {
            WorkOp::OpenLog { .. } => "open_log",
            WorkOp::Read {
                kind: ReadKind::Backlog,
                ..
            } => "read_chunk",
            WorkOp::Read {
                kind: ReadKind::Live, ..
            } => "read_available",
            WorkOp::StartWatcher { .. } => "start_watcher",
            WorkOp::WaitForWatcher { .. } => "wait_for_watcher",
            WorkOp::ScanRuns { .. } => "scan_runs",
            WorkOp::Frame { .. } => "frame",
        }
    }

    pub fn run_key(&self) -> Option<&str> {
        match self {
            WorkOp::OpenLog { key, .. }
            | WorkOp::Read { key, .. }
            | WorkOp::StartWatcher { key, .. }
            | WorkOp::WaitForWatcher { key, .. } => Some(key),
            WorkOp::ScanRuns { .. } | WorkOp::Frame { .. } => None,
        }
    }
}

impl fmt::Debug for WorkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run_key() {
            Some(key) => write!(f, "{}({key})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatControl {
    Start,
    Reset,
    Stop,
}

/// Follow-up returned by the controller for the runtime to carry out.
#[derive(Debug)]
pub enum Command {
    Work(WorkOp),
    Heartbeat(HeartbeatControl),
    Quit,
}

/// Receiving end of a watcher; yields one coalesced change at a time.
pub struct WatchEvents(mpsc::Receiver<()>);

impl WatchEvents {
    /// `None` once the watcher has been dropped.
    pub async fn wait(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

/// A live filesystem watch on one run directory. Dropping it stops the
/// watch and closes the paired [`WatchEvents`].
pub struct RunWatcher {
    _inner: RecommendedWatcher,
}

impl RunWatcher {
    pub fn start(dir: &Path) -> notify::Result<(RunWatcher, WatchEvents)> {
        let (tx, rx) = mpsc::channel(1);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if is_content_change(&event.kind) {
                        let _ = tx.try_send(());
                    }
                }
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok((RunWatcher { _inner: watcher }, WatchEvents(rx)))
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Other
    )
}

/// Runs [`WorkOp`]s on the tokio runtime and posts their results.
#[derive(Clone)]
pub struct Worker {
    source: Arc<dyn LogSource>,
    intake: mpsc::Sender<Msg>,
}

impl Worker {
    pub fn new(source: Arc<dyn LogSource>, intake: mpsc::Sender<Msg>) -> Self {
        Self { source, intake }
    }

    pub fn spawn(&self, op: WorkOp) {
        debug!(event = "work_spawned", op = ?op);
        let source = Arc::clone(&self.source);
        let intake = self.intake.clone();
        tokio::spawn(async move {
            if let Some(msg) = execute(source, op).await {
                let _ = intake.send(msg).await;
            }
        });
    }
}

fn worker_panicked(path: &Path, err: tokio::task::JoinError) -> ReadError {
    ReadError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, err.to_string()),
    }
}

/// Performs one operation to completion. Blocking file work runs on the
/// blocking pool.
pub async fn execute(source: Arc<dyn LogSource>, op: WorkOp) -> Option<Msg> {
    match op {
        WorkOp::OpenLog { key, path } => {
            let target = path.clone();
            let opened = tokio::task::spawn_blocking(move || source.open(&target)).await;
            match opened {
                Ok(Ok(reader)) => Some(Msg::ReaderOpened { key, path, reader }),
                Ok(Err(error)) => Some(Msg::ReaderFailed { key, error }),
                Err(err) => Some(Msg::ReaderFailed {
                    error: worker_panicked(&path, err),
                    key,
                }),
            }
        }
        WorkOp::Read { key, kind, reader } => {
            let path = reader.path().to_path_buf();
            let joined = tokio::task::spawn_blocking(move || {
                let mut reader = reader;
                let result = match kind {
                    ReadKind::Backlog => reader.read_chunk(),
                    ReadKind::Live => reader.read_available(),
                };
                (reader, result)
            })
            .await;
            match joined {
                Ok((reader, Ok(batch))) => Some(Msg::RecordsRead {
                    key,
                    kind,
                    reader,
                    batch,
                }),
                Ok((_reader, Err(error))) => Some(Msg::ReadFailed { key, error }),
                Err(err) => Some(Msg::ReadFailed {
                    key,
                    error: worker_panicked(&path, err),
                }),
            }
        }
        WorkOp::StartWatcher { key, dir } => {
            let started = tokio::task::spawn_blocking(move || RunWatcher::start(&dir)).await;
            match started {
                Ok(Ok((watcher, events))) => Some(Msg::WatcherStarted {
                    key,
                    watcher,
                    events,
                }),
                Ok(Err(error)) => Some(Msg::WatcherFailed { key, error }),
                Err(err) => Some(Msg::WatcherFailed {
                    key,
                    error: notify::Error::generic(&err.to_string()),
                }),
            }
        }
        WorkOp::WaitForWatcher { key, mut events } => match events.wait().await {
            Some(()) => Some(Msg::FileChanged { key, events }),
            None => Some(Msg::WatcherClosed { key }),
        },
        WorkOp::ScanRuns { dir, delay } => {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let scanned = tokio::task::spawn_blocking(move || scan_runs(&dir)).await;
            match scanned {
                Ok(Ok(keys)) => Some(Msg::RunsDiscovered(keys)),
                Ok(Err(error)) => Some(Msg::ScanFailed(error)),
                Err(err) => {
                    warn!(event = "scan_worker_failed", error = %err);
                    None
                }
            }
        }
        WorkOp::Frame { delay } => {
            sleep(delay).await;
            Some(Msg::AnimationFrame)
        }
    }
}

/// Liveness flag shared with the heartbeat timer. Only the controller
/// writes it.
#[derive(Debug, Clone, Default)]
pub struct LiveFlag(Arc<AtomicBool>);

impl LiveFlag {
    pub fn set(&self, live: bool) {
        self.0.store(live, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick;

/// Handle to the single heartbeat timer task.
pub struct Heartbeat {
    control: mpsc::UnboundedSender<HeartbeatControl>,
}

impl Heartbeat {
    /// Spawns the timer task. Ticks go to `ticks` without ever blocking.
    pub fn spawn(interval: Duration, live: LiveFlag, ticks: mpsc::Sender<HeartbeatTick>) -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(heartbeat_loop(interval, live, control_rx, ticks));
        Self { control }
    }

    pub fn send(&self, control: HeartbeatControl) {
        let _ = self.control.send(control);
    }
}

async fn heartbeat_loop(
    interval: Duration,
    live: LiveFlag,
    mut control: mpsc::UnboundedReceiver<HeartbeatControl>,
    ticks: mpsc::Sender<HeartbeatTick>,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        let armed = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        tokio::select! {
            cmd = control.recv() => match cmd {
                Some(HeartbeatControl::Start) | Some(HeartbeatControl::Reset) => {
                    deadline = Some(Instant::now() + interval);
                }
                Some(HeartbeatControl::Stop) => deadline = None,
                None => break,
            },
            _ = sleep_until(armed), if deadline.is_some() => {
                deadline = None;
                if live.get() && ticks.try_send(HeartbeatTick).is_err() {
                    debug!(event = "heartbeat_dropped");
                }
            }
        }
    }
}
