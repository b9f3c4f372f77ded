//! Drives the controller and real workers step by step against run logs on
//! disk, without a terminal or background tasks.

use chrono::{TimeZone, Utc};
use runwatch_core::reader::{JsonlLogSource, LogSource};
use runwatch_core::runlog::{encode_frame, DEFAULT_MAX_FRAME_BYTES};
use runwatch_core::{Completion, MetricPoint, RunMetadata, RunRecord, RunState};
use runwatch_dashboard::app::Dashboard;
use runwatch_dashboard::config::Config;
use runwatch_dashboard::live::{execute, Command, HeartbeatControl, LiveFlag, Msg, WorkOp};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const RUN_KEY: &str = "run-20250101_120000-abc";

fn metric(step: u64, loss: f64) -> RunRecord {
    RunRecord::Metric(MetricPoint {
        step,
        timestamp: Utc.timestamp_opt(1_735_732_800 + step as i64, 0).single(),
        values: BTreeMap::from([("loss".to_string(), loss)]),
    })
}

fn run_record() -> RunRecord {
    RunRecord::Run(RunMetadata {
        run_id: "abc".to_string(),
        display_name: Some("baseline".to_string()),
        ..RunMetadata::default()
    })
}

fn append(path: &Path, records: &[RunRecord]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log");
    for record in records {
        let frame = encode_frame(record, DEFAULT_MAX_FRAME_BYTES).expect("encode");
        file.write_all(&frame).expect("write");
    }
    file.flush().expect("flush");
}

fn dashboard(runs_dir: &Path) -> Dashboard {
    let config = Config {
        runs_dir: runs_dir.to_path_buf(),
        ..Config::default()
    };
    Dashboard::new(config, LiveFlag::default(), 160, 48)
}

fn has_heartbeat(cmds: &[Command], control: HeartbeatControl) -> bool {
    cmds.iter()
        .any(|cmd| matches!(cmd, Command::Heartbeat(c) if *c == control))
}

/// Runs the log and scan work in `cmds` to completion. Watchers, frames and
/// delayed rescans are left alone so each step stays deterministic.
async fn run_work(source: &Arc<dyn LogSource>, cmds: Vec<Command>) -> Vec<Msg> {
    let mut msgs = Vec::new();
    for cmd in cmds {
        let Command::Work(op) = cmd else { continue };
        let runnable = match &op {
            WorkOp::OpenLog { .. } | WorkOp::Read { .. } => true,
            WorkOp::ScanRuns { delay, .. } => delay.is_zero(),
            _ => false,
        };
        if runnable {
            if let Some(msg) = execute(Arc::clone(source), op).await {
                msgs.push(msg);
            }
        }
    }
    msgs
}

/// Feeds `msgs` to the dashboard and returns every command it issued.
fn apply_all(dash: &mut Dashboard, msgs: Vec<Msg>) -> Vec<Command> {
    msgs.into_iter().flat_map(|msg| dash.apply(msg)).collect()
}

#[tokio::test]
async fn latest_run_is_loaded_and_followed_until_exit() {
    let runs = tempfile::tempdir().expect("tempdir");
    let run_dir = runs.path().join(RUN_KEY);
    fs::create_dir_all(&run_dir).expect("run dir");
    let log = run_dir.join("run-abc.jsonl");
    append(&log, &[run_record(), metric(1, 0.9), metric(2, 0.7)]);

    let source: Arc<dyn LogSource> = Arc::new(JsonlLogSource);
    let mut dash = dashboard(runs.path());

    // scan -> open -> backlog
    let discovered = run_work(&source, dash.start()).await;
    let cmds = apply_all(&mut dash, discovered);
    assert!(dash.is_selected(RUN_KEY));
    assert_eq!(dash.pinned(), Some(RUN_KEY));
    let opened = run_work(&source, cmds).await;
    let cmds = apply_all(&mut dash, opened);
    let read = run_work(&source, cmds).await;
    let cmds = apply_all(&mut dash, read);

    let session = dash.session(RUN_KEY).expect("session loaded");
    assert!(session.backlog_done);
    assert_eq!(session.state, RunState::Running);
    assert_eq!(session.display_name(), "baseline");
    assert_eq!(session.metrics["loss"].len(), 2);
    assert!(has_heartbeat(&cmds, HeartbeatControl::Start));
    assert!(cmds
        .iter()
        .any(|cmd| matches!(cmd, Command::Work(WorkOp::StartWatcher { .. }))));
    assert!(dash.heartbeat_running());

    // the run keeps writing, then exits
    append(
        &log,
        &[
            metric(3, 0.5),
            RunRecord::Exit(Completion { exit_code: 0 }),
        ],
    );
    let cmds = dash.apply(Msg::Heartbeat);
    assert!(has_heartbeat(&cmds, HeartbeatControl::Reset));
    let read = run_work(&source, cmds).await;
    assert_eq!(read.len(), 1);
    let cmds = apply_all(&mut dash, read);

    let session = dash.session(RUN_KEY).expect("session kept");
    assert_eq!(session.state, RunState::Finished);
    assert_eq!(session.exit_code, Some(0));
    assert_eq!(session.metrics["loss"].len(), 3);
    assert!(has_heartbeat(&cmds, HeartbeatControl::Stop));
    assert!(!dash.heartbeat_running());

    // nothing is live any more, so further ticks do nothing
    assert!(dash.apply(Msg::Heartbeat).is_empty());
}

#[tokio::test]
async fn run_without_a_log_yet_is_deselected_quietly() {
    let runs = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(runs.path().join(RUN_KEY)).expect("run dir");

    let source: Arc<dyn LogSource> = Arc::new(JsonlLogSource);
    let mut dash = dashboard(runs.path());

    let discovered = run_work(&source, dash.start()).await;
    let cmds = apply_all(&mut dash, discovered);
    let failed = run_work(&source, cmds).await;
    assert!(matches!(failed.as_slice(), [Msg::ReaderFailed { .. }]));
    apply_all(&mut dash, failed);

    assert!(!dash.is_selected(RUN_KEY));
    assert_eq!(dash.pinned(), None);
    assert_eq!(dash.session_count(), 0);
    assert!(!dash.heartbeat_running());
}

#[tokio::test]
async fn quitting_releases_every_session() {
    let runs = tempfile::tempdir().expect("tempdir");
    let run_dir = runs.path().join(RUN_KEY);
    fs::create_dir_all(&run_dir).expect("run dir");
    append(&run_dir.join("run-abc.jsonl"), &[run_record()]);

    let source: Arc<dyn LogSource> = Arc::new(JsonlLogSource);
    let mut dash = dashboard(runs.path());
    let discovered = run_work(&source, dash.start()).await;
    let cmds = apply_all(&mut dash, discovered);
    let opened = run_work(&source, cmds).await;
    let cmds = apply_all(&mut dash, opened);
    let read = run_work(&source, cmds).await;
    apply_all(&mut dash, read);
    assert!(dash.heartbeat_running());

    let cmds = dash.shutdown();
    assert!(has_heartbeat(&cmds, HeartbeatControl::Stop));
    assert!(matches!(cmds.last(), Some(Command::Quit)));
    assert_eq!(dash.session_count(), 0);
    assert!(dash.is_quitting());
}
