use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use runwatch_core::reader::JsonlLogSource;
use runwatch_dashboard::app::Dashboard;
use runwatch_dashboard::config::{self, parse_bool_flag, Config, Overrides};
use runwatch_dashboard::live::{
    Command, Heartbeat, LiveFlag, Msg, Worker, HEARTBEAT_QUEUE_CAPACITY, INTAKE_CAPACITY,
};
use runwatch_dashboard::ui;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "runwatch", about = "Live terminal dashboard for local training runs")]
struct Args {
    /// Directory containing run-* directories.
    runs_dir: Option<PathBuf>,
    /// Config file (default: <config dir>/runwatch/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Fallback polling interval for live runs.
    #[arg(long)]
    heartbeat_ms: Option<u64>,
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load(&Overrides {
        config_path: args.config,
        runs_dir: args.runs_dir,
        heartbeat_ms: args.heartbeat_ms,
        log_file: args.log_file,
    })?;
    init_logging(config.log_file.as_deref())?;
    info!(
        event = "runwatch_start",
        runs_dir = %config.runs_dir.display(),
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64
    );

    let mut terminal = setup_terminal()?;
    let result = run(&mut terminal, config).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, config: Config) -> Result<()> {
    let (intake_tx, mut intake_rx) = mpsc::channel(INTAKE_CAPACITY);
    let (tick_tx, mut tick_rx) = mpsc::channel(HEARTBEAT_QUEUE_CAPACITY);
    let live = LiveFlag::default();
    let heartbeat = Heartbeat::spawn(config.heartbeat_interval, live.clone(), tick_tx);
    let worker = Worker::new(Arc::new(JsonlLogSource), intake_tx);

    let size = terminal.size()?;
    let mut app = Dashboard::new(config, live, size.width, size.height);
    let mut events = EventStream::new();
    dispatch(app.start(), &worker, &heartbeat);

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;
        let msg = tokio::select! {
            Some(msg) = intake_rx.recv() => msg,
            Some(_) = tick_rx.recv() => Msg::Heartbeat,
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => match translate(event) {
                    Some(msg) => msg,
                    None => continue,
                },
                Some(Err(err)) => {
                    warn!(event = "terminal_event_failed", error = %err);
                    continue;
                }
                None => break,
            },
            else => break,
        };
        if dispatch(app.apply(msg), &worker, &heartbeat) {
            break;
        }
    }
    if !app.is_quitting() {
        dispatch(app.shutdown(), &worker, &heartbeat);
    }
    Ok(())
}

fn translate(event: Event) -> Option<Msg> {
    match event {
        Event::Key(key) => Some(Msg::Key(key)),
        Event::Mouse(mouse) => Some(Msg::Mouse(mouse)),
        Event::Resize(width, height) => Some(Msg::Resize { width, height }),
        _ => None,
    }
}

/// Hands commands to the runtime. Returns true once the dashboard quits.
fn dispatch(cmds: Vec<Command>, worker: &Worker, heartbeat: &Heartbeat) -> bool {
    let mut quit = false;
    for cmd in cmds {
        match cmd {
            Command::Work(op) => worker.spawn(op),
            Command::Heartbeat(control) => heartbeat.send(control),
            Command::Quit => quit = true,
        }
    }
    quit
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// The terminal owns stdout, so logs go nowhere unless a file is given or
/// `RUNWATCH_LOG_STDOUT` asks for them.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = std::env::var("RUNWATCH_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let stdout_enabled = std::env::var("RUNWATCH_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    } else if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
    Ok(())
}
