//! Per-run state: the open log, an optional watcher, the lifecycle derived
//! from the log, and everything the panels render for the run.

use crate::live::RunWatcher;
use chrono::{DateTime, Utc};
use runwatch_core::console::ConsoleAssembler;
use runwatch_core::reader::LogReader;
use runwatch_core::{MetricPoint, ResourcePoint, RunMetadata, RunRecord, RunState};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Points kept per series before older ones are thinned out.
const MAX_SERIES_POINTS: usize = 4_096;

#[derive(Debug, Clone, Default)]
pub struct Series {
    points: Vec<(f64, f64)>,
    min_y: f64,
    max_y: f64,
}

impl Series {
    pub fn push(&mut self, x: f64, y: f64) {
        if !y.is_finite() {
            return;
        }
        if self.points.is_empty() {
            self.min_y = y;
            self.max_y = y;
        } else {
            self.min_y = self.min_y.min(y);
            self.max_y = self.max_y.max(y);
        }
        self.points.push((x, y));
        if self.points.len() > MAX_SERIES_POINTS {
            // keep every other point of the older half
            let half = self.points.len() / 2;
            let mut kept: Vec<(f64, f64)> = self.points[..half].iter().step_by(2).copied().collect();
            kept.extend_from_slice(&self.points[half..]);
            self.points = kept;
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        self.points.last().copied()
    }

    pub fn y_bounds(&self) -> Option<(f64, f64)> {
        (!self.points.is_empty()).then_some((self.min_y, self.max_y))
    }

    pub fn x_bounds(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.0, self.points.last()?.0))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Where the session's reader currently is.
enum ReaderSlot {
    Ready(Box<dyn LogReader>),
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub applied: usize,
    pub started: bool,
    pub completed: bool,
}

pub struct RunSession {
    pub key: String,
    pub log_path: PathBuf,
    reader: ReaderSlot,
    watcher: Option<RunWatcher>,
    watcher_requested: bool,
    reread_pending: bool,
    pub state: RunState,
    pub exit_code: Option<i32>,
    pub backlog_done: bool,
    pub metadata: Option<RunMetadata>,
    pub environment: BTreeMap<String, String>,
    pub console: ConsoleAssembler,
    pub metrics: BTreeMap<String, Series>,
    pub resources: BTreeMap<String, Series>,
    resource_origin: Option<DateTime<Utc>>,
    pub records_seen: u64,
    pub last_step: Option<u64>,
    revision: u64,
}

impl RunSession {
    pub fn new(key: impl Into<String>, log_path: impl Into<PathBuf>, reader: Box<dyn LogReader>) -> Self {
        Self {
            key: key.into(),
            log_path: log_path.into(),
            reader: ReaderSlot::Ready(reader),
            watcher: None,
            watcher_requested: false,
            reread_pending: false,
            state: RunState::Idle,
            exit_code: None,
            backlog_done: false,
            metadata: None,
            environment: BTreeMap::new(),
            console: ConsoleAssembler::default(),
            metrics: BTreeMap::new(),
            resources: BTreeMap::new(),
            resource_origin: None,
            records_seen: 0,
            last_step: None,
            revision: 0,
        }
    }

    pub fn log_dir(&self) -> &Path {
        self.log_path.parent().unwrap_or(&self.log_path)
    }

    /// Bumped on every applied record.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Has a `run` record and no completion yet.
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Not yet completed; such sessions keep a watcher and are polled by
    /// the heartbeat.
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Lends the reader to a worker. `None` while a read is already out.
    pub fn take_reader(&mut self) -> Option<Box<dyn LogReader>> {
        match std::mem::replace(&mut self.reader, ReaderSlot::InFlight) {
            ReaderSlot::Ready(reader) => Some(reader),
            ReaderSlot::InFlight => None,
        }
    }

    pub fn restore_reader(&mut self, reader: Box<dyn LogReader>) {
        self.reader = ReaderSlot::Ready(reader);
    }

    pub fn read_in_flight(&self) -> bool {
        matches!(self.reader, ReaderSlot::InFlight)
    }

    /// Records a change seen while a read was out, so one more read follows
    /// it instead of a second concurrent one.
    pub fn mark_reread(&mut self) {
        self.reread_pending = true;
    }

    pub fn take_reread(&mut self) -> bool {
        std::mem::take(&mut self.reread_pending)
    }

    pub fn has_watcher(&self) -> bool {
        self.watcher.is_some()
    }

    /// Marks a watcher start as requested; false if one exists or is pending.
    pub fn request_watcher(&mut self) -> bool {
        if self.watcher.is_some() || self.watcher_requested {
            return false;
        }
        self.watcher_requested = true;
        true
    }

    pub fn attach_watcher(&mut self, watcher: RunWatcher) {
        self.watcher_requested = false;
        self.watcher = Some(watcher);
    }

    pub fn watcher_failed(&mut self) {
        self.watcher_requested = false;
    }

    /// Drops the watcher; its pending wait resolves as closed.
    pub fn stop_watcher(&mut self) {
        self.watcher = None;
    }

    pub fn apply_records(&mut self, records: Vec<RunRecord>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in records {
            let before = self.state;
            self.apply_record(record);
            outcome.applied += 1;
            if before != RunState::Running && self.state == RunState::Running {
                outcome.started = true;
            }
            if !before.is_terminal() && self.state.is_terminal() {
                outcome.completed = true;
            }
        }
        outcome
    }

    pub fn apply_record(&mut self, record: RunRecord) {
        self.records_seen += 1;
        self.revision += 1;
        match record {
            RunRecord::Run(meta) => {
                self.metadata = Some(meta);
                self.state = self.state.advance(RunState::Running);
            }
            RunRecord::Metric(point) => self.push_metric(point),
            RunRecord::Resource(point) => self.push_resource(point),
            RunRecord::Console(text) => self.console.push(&text),
            RunRecord::Environment(env) => self.environment.extend(env.values),
            RunRecord::Exit(completion) => {
                self.exit_code = Some(completion.exit_code);
                let next = if completion.succeeded() {
                    RunState::Finished
                } else {
                    RunState::Failed
                };
                self.state = self.state.advance(next);
                self.stop_watcher();
            }
        }
    }

    fn push_metric(&mut self, point: MetricPoint) {
        let x = point.step as f64;
        self.last_step = Some(self.last_step.map_or(point.step, |s| s.max(point.step)));
        for (name, value) in point.values {
            self.metrics.entry(name).or_default().push(x, value);
        }
    }

    fn push_resource(&mut self, point: ResourcePoint) {
        let origin = *self.resource_origin.get_or_insert(point.timestamp);
        let seconds = (point.timestamp - origin).num_milliseconds() as f64 / 1000.0;
        self.resources
            .entry(point.name)
            .or_default()
            .push(seconds, point.value);
    }

    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.display_name.as_deref())
            .unwrap_or(&self.key)
    }

    /// Latest value of every metric, for the overview summary.
    pub fn summary(&self) -> Vec<(String, f64)> {
        self.metrics
            .iter()
            .filter_map(|(name, series)| series.last().map(|(_, y)| (name.clone(), y)))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use runwatch_core::reader::{ReadError, RecordBatch};
    use runwatch_core::{Completion, ConsoleStream, ConsoleText};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory reader that counts how often it was dropped.
    pub(crate) struct FakeReader {
        pub path: PathBuf,
        pub pending: Vec<Vec<RunRecord>>,
        pub drops: Arc<AtomicUsize>,
    }

    impl FakeReader {
        pub(crate) fn boxed(drops: &Arc<AtomicUsize>) -> Box<dyn LogReader> {
            Box::new(FakeReader {
                path: PathBuf::from("/runs/run-20250101_000000-abc/run-abc.jsonl"),
                pending: Vec::new(),
                drops: Arc::clone(drops),
            })
        }
    }

    impl LogReader for FakeReader {
        fn path(&self) -> &Path {
            &self.path
        }

        fn read_chunk(&mut self) -> Result<RecordBatch, ReadError> {
            let records = if self.pending.is_empty() {
                Vec::new()
            } else {
                self.pending.remove(0)
            };
            Ok(RecordBatch {
                records,
                has_more: !self.pending.is_empty(),
                decode_errors: Vec::new(),
            })
        }

        fn read_available(&mut self) -> Result<RecordBatch, ReadError> {
            self.read_chunk()
        }
    }

    impl Drop for FakeReader {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_754_000_000 + seconds, 0).expect("timestamp")
    }

    pub(crate) fn metric(step: u64, name: &str, value: f64) -> RunRecord {
        RunRecord::Metric(MetricPoint {
            step,
            timestamp: None,
            values: BTreeMap::from([(name.to_string(), value)]),
        })
    }

    pub(crate) fn run_meta(id: &str) -> RunRecord {
        RunRecord::Run(RunMetadata {
            run_id: id.to_string(),
            display_name: Some(format!("{id}-name")),
            ..RunMetadata::default()
        })
    }

    fn session() -> (RunSession, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let session = RunSession::new(
            "run-20250101_000000-abc",
            "/runs/run-20250101_000000-abc/run-abc.jsonl",
            FakeReader::boxed(&drops),
        );
        (session, drops)
    }

    #[test]
    fn records_dispatch_to_their_views() {
        let (mut session, _) = session();
        let outcome = session.apply_records(vec![
            run_meta("abc"),
            metric(1, "loss", 0.9),
            metric(2, "loss", 0.5),
            RunRecord::Resource(ResourcePoint {
                name: "cpu".into(),
                timestamp: ts(0),
                value: 12.0,
            }),
            RunRecord::Resource(ResourcePoint {
                name: "cpu".into(),
                timestamp: ts(5),
                value: 30.0,
            }),
            RunRecord::Console(ConsoleText {
                text: "hello\n".into(),
                stream: ConsoleStream::Stdout,
                timestamp: ts(1),
            }),
        ]);
        assert_eq!(outcome.applied, 6);
        assert!(outcome.started);
        assert!(!outcome.completed);
        assert_eq!(session.state, RunState::Running);
        assert_eq!(session.display_name(), "abc-name");
        assert_eq!(session.metrics["loss"].points(), &[(1.0, 0.9), (2.0, 0.5)]);
        assert_eq!(session.resources["cpu"].points(), &[(0.0, 12.0), (5.0, 30.0)]);
        assert_eq!(session.console.len(), 1);
        assert_eq!(session.summary(), vec![("loss".to_string(), 0.5)]);
        assert_eq!(session.last_step, Some(2));
    }

    #[test]
    fn completion_marker_sets_terminal_state() {
        let (mut session, _) = session();
        session.apply_records(vec![run_meta("abc")]);
        let outcome = session.apply_records(vec![RunRecord::Exit(Completion { exit_code: 2 })]);
        assert!(outcome.completed);
        assert_eq!(session.state, RunState::Failed);
        assert_eq!(session.exit_code, Some(2));

        // late metadata does not resurrect the run
        session.apply_records(vec![run_meta("abc")]);
        assert_eq!(session.state, RunState::Failed);
        assert!(!session.is_live());
    }

    #[test]
    fn successful_exit_finishes() {
        let (mut session, _) = session();
        session.apply_records(vec![run_meta("abc"), RunRecord::Exit(Completion { exit_code: 0 })]);
        assert_eq!(session.state, RunState::Finished);
    }

    #[test]
    fn reader_is_lent_out_once() {
        let (mut session, drops) = session();
        let reader = session.take_reader().expect("reader");
        assert!(session.read_in_flight());
        assert!(session.take_reader().is_none());
        session.restore_reader(reader);
        assert!(!session.read_in_flight());

        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watcher_request_is_deduplicated() {
        let (mut session, _) = session();
        assert!(session.request_watcher());
        assert!(!session.request_watcher());
        session.watcher_failed();
        assert!(session.request_watcher());
    }

    #[test]
    fn series_ignores_non_finite_values_and_tracks_bounds() {
        let mut series = Series::default();
        series.push(0.0, 3.0);
        series.push(1.0, f64::NAN);
        series.push(2.0, -1.0);
        assert_eq!(series.len(), 2);
        assert_eq!(series.y_bounds(), Some((-1.0, 3.0)));
        assert_eq!(series.x_bounds(), Some((0.0, 2.0)));
    }

    #[test]
    fn series_thins_old_points() {
        let mut series = Series::default();
        for i in 0..(MAX_SERIES_POINTS + 1) {
            series.push(i as f64, 1.0);
        }
        assert!(series.len() <= MAX_SERIES_POINTS);
        assert_eq!(series.last(), Some((MAX_SERIES_POINTS as f64, 1.0)));
    }
}
