//! The dashboard controller. Owns all presentation state and every run
//! session; applies one [`Msg`] at a time and answers with the follow-up
//! [`Command`]s the runtime should carry out.

use crate::config::{Config, GridSize};
use crate::filter::PatternFilter;
use crate::focus::{Direction, FocusController, RegionInfo};
use crate::keys::{action_for, filter_input_for, Action, FilterInput};
use crate::layout::{
    self, ConsoleGeometry, DashboardLayout, CONSOLE_MIN_HEIGHT, SYSTEM_MIN_HEIGHT,
};
use crate::live::{Command, HeartbeatControl, LiveFlag, Msg, ReadKind, WorkOp};
use crate::pager::{Pager, PagerItem};
use crate::panels::{ChartGrid, ConsoleLogsPane, OverviewSidebar, RunsSidebar, SystemMetricsPane};
use crate::session::RunSession;
use crossterm::event::{KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use runwatch_core::discovery::run_log_path;
use runwatch_core::reader::{LogReader, ReadError, RecordBatch};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Keyboard focus targets, in Tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    RunList,
    Charts,
    ConsoleLogs,
    Overview,
}

impl Region {
    pub const ORDER: [Region; 4] = [
        Region::RunList,
        Region::Charts,
        Region::ConsoleLogs,
        Region::Overview,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Region::RunList => "runs",
            Region::Charts => "charts",
            Region::ConsoleLogs => "logs",
            Region::Overview => "overview",
        }
    }
}

/// What a filter prompt narrows down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Metrics,
    System,
    Overview,
}

impl FilterTarget {
    pub const ALL: [FilterTarget; 3] = [
        FilterTarget::Metrics,
        FilterTarget::System,
        FilterTarget::Overview,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FilterTarget::Metrics => "filter",
            FilterTarget::System => "system filter",
            FilterTarget::Overview => "overview filter",
        }
    }

    /// Key that opens the prompt.
    pub fn prompt(self) -> &'static str {
        match self {
            FilterTarget::Metrics => "/",
            FilterTarget::System => "\\",
            FilterTarget::Overview => "o",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Runs,
    Overview,
    Console,
    System,
}

impl Panel {
    fn name(self) -> &'static str {
        match self {
            Panel::Runs => "runs_sidebar",
            Panel::Overview => "overview_sidebar",
            Panel::Console => "console_logs",
            Panel::System => "system_metrics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nav {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
}

impl Nav {
    fn apply<T: PagerItem>(self, pager: &mut Pager<T>) {
        match self {
            Nav::Up => pager.up(),
            Nav::Down => pager.down(),
            Nav::PageUp => pager.page_up(),
            Nav::PageDown => pager.page_down(),
            Nav::Home => pager.home(),
            Nav::End => pager.scroll_to_end(),
        }
    }
}

pub struct Dashboard {
    pub(crate) config: Config,
    width: u16,
    height: u16,
    pub(crate) layout: DashboardLayout,
    pub(crate) runs: RunsSidebar,
    pub(crate) overview: OverviewSidebar,
    pub(crate) console: ConsoleLogsPane,
    pub(crate) system: SystemMetricsPane,
    pub(crate) charts: ChartGrid,
    pub(crate) chart_grid: GridSize,
    pub(crate) system_grid: GridSize,
    pub(crate) focus: FocusController<Region>,
    pub(crate) metric_filter: PatternFilter,
    pub(crate) system_filter: PatternFilter,
    pub(crate) overview_filter: PatternFilter,
    pub(crate) help_open: bool,
    pub(crate) status_note: Option<String>,
    sessions: HashMap<String, RunSession>,
    selected: BTreeSet<String>,
    pinned: Option<String>,
    auto_selected: bool,
    live: LiveFlag,
    heartbeat_running: bool,
    frame_scheduled: bool,
    quitting: bool,
}

impl Dashboard {
    /// `live` is shared with the heartbeat timer; only the dashboard writes it.
    pub fn new(config: Config, live: LiveFlag, width: u16, height: u16) -> Self {
        let panels = config.panels;
        let duration = config.animation_duration;
        let runs = RunsSidebar::new(
            layout::sidebar_width(width, panels.overview_sidebar),
            panels.runs_sidebar,
            duration,
        );
        let overview = OverviewSidebar::new(
            layout::sidebar_width(width, panels.runs_sidebar),
            panels.overview_sidebar,
            duration,
        );
        let console = ConsoleLogsPane::new(
            layout::pane_height(height, panels.system_metrics, CONSOLE_MIN_HEIGHT),
            panels.console_logs,
            duration,
        );
        let system = SystemMetricsPane::new(
            layout::pane_height(height, panels.console_logs, SYSTEM_MIN_HEIGHT),
            panels.system_metrics,
            duration,
        );
        let chart_grid = config.metrics_grid;
        let system_grid = config.system_grid;
        let mut dashboard = Self {
            config,
            width,
            height,
            layout: DashboardLayout::default(),
            runs,
            overview,
            console,
            system,
            charts: ChartGrid::default(),
            chart_grid,
            system_grid,
            focus: FocusController::new(Region::ORDER.to_vec(), Region::RunList),
            metric_filter: PatternFilter::default(),
            system_filter: PatternFilter::default(),
            overview_filter: PatternFilter::default(),
            help_open: false,
            status_note: None,
            sessions: HashMap::new(),
            selected: BTreeSet::new(),
            pinned: None,
            auto_selected: false,
            live,
            heartbeat_running: false,
            frame_scheduled: false,
            quitting: false,
        };
        dashboard.relayout();
        dashboard
    }

    /// Work to kick off before the first message.
    pub fn start(&self) -> Vec<Command> {
        vec![Command::Work(WorkOp::ScanRuns {
            dir: self.config.runs_dir.clone(),
            delay: Duration::ZERO,
        })]
    }

    pub fn apply(&mut self, msg: Msg) -> Vec<Command> {
        self.apply_at(msg, Instant::now())
    }

    /// Applies one message to completion. `now` drives animations.
    pub fn apply_at(&mut self, msg: Msg, now: Instant) -> Vec<Command> {
        let mut cmds = Vec::new();
        if self.quitting {
            return cmds;
        }
        trace!(event = "msg_applied", msg = msg.name());
        match msg {
            Msg::Key(key) => self.on_key(key, now, &mut cmds),
            Msg::Mouse(event) => self.on_mouse(event),
            Msg::Resize { width, height } => {
                self.width = width;
                self.height = height;
            }
            Msg::AnimationFrame => self.on_animation_frame(now, &mut cmds),
            Msg::RunsDiscovered(keys) => self.on_runs_discovered(keys, &mut cmds),
            Msg::ScanFailed(error) => {
                warn!(event = "run_scan_failed", error = %error);
                self.status_note = Some(error.to_string());
                self.schedule_scan(&mut cmds);
            }
            Msg::ReaderOpened { key, path, reader } => self.on_reader_opened(key, path, reader, &mut cmds),
            Msg::ReaderFailed { key, error } => self.on_reader_failed(&key, error, &mut cmds),
            Msg::RecordsRead {
                key,
                kind,
                reader,
                batch,
            } => self.on_records_read(key, kind, reader, batch, &mut cmds),
            Msg::ReadFailed { key, error } => {
                if self.sessions.contains_key(&key) {
                    warn!(event = "run_read_failed", run_key = %key, error = %error);
                    self.status_note = Some(format!("{key}: {error}"));
                    self.drop_run(&key, &mut cmds);
                }
            }
            Msg::WatcherStarted {
                key,
                watcher,
                events,
            } => match self.sessions.get_mut(&key) {
                Some(session) if session.is_live() => {
                    debug!(event = "watcher_started", run_key = %key);
                    session.attach_watcher(watcher);
                    cmds.push(Command::Work(WorkOp::WaitForWatcher { key, events }));
                }
                Some(session) => session.watcher_failed(),
                None => debug!(event = "stale_watcher_discarded", run_key = %key),
            },
            Msg::WatcherFailed { key, error } => {
                if let Some(session) = self.sessions.get_mut(&key) {
                    warn!(event = "watcher_start_failed", run_key = %key, error = %error);
                    session.watcher_failed();
                }
            }
            Msg::FileChanged { key, events } => self.on_file_changed(key, events, &mut cmds),
            Msg::WatcherClosed { key } => debug!(event = "watcher_closed", run_key = %key),
            Msg::Heartbeat => self.on_heartbeat(&mut cmds),
        }
        self.sync_views();
        self.relayout();
        cmds
    }

    /// Releases every session and stops the heartbeat.
    pub fn shutdown(&mut self) -> Vec<Command> {
        let mut cmds = Vec::new();
        self.quitting = true;
        self.sessions.clear();
        self.live.set(false);
        if self.heartbeat_running {
            self.heartbeat_running = false;
            cmds.push(Command::Heartbeat(HeartbeatControl::Stop));
        }
        cmds.push(Command::Quit);
        info!(event = "dashboard_shutdown");
        cmds
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn session(&self, key: &str) -> Option<&RunSession> {
        self.sessions.get(key)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected.contains(key)
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> + '_ {
        self.selected.iter().map(String::as_str)
    }

    pub fn pinned(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    pub fn focused_region(&self) -> Region {
        self.focus.current()
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat_running
    }

    pub fn runs_dir(&self) -> &std::path::Path {
        &self.config.runs_dir
    }

    /// The run whose details the side panes show: the one under the run
    /// list cursor when it is loaded, else the pinned run.
    pub fn highlighted_key(&self) -> Option<&str> {
        self.runs
            .highlighted()
            .filter(|key| self.sessions.contains_key(*key))
            .or_else(|| self.pinned.as_deref().filter(|key| self.sessions.contains_key(*key)))
    }

    pub fn highlighted_run(&self) -> Option<&RunSession> {
        self.highlighted_key().and_then(|key| self.sessions.get(key))
    }

    /// Selected sessions in display order, pinned run last so it draws on top.
    pub fn chart_sessions(&self) -> Vec<&RunSession> {
        let mut sessions: Vec<&RunSession> = self
            .selected
            .iter()
            .filter(|key| self.pinned.as_ref() != Some(*key))
            .filter_map(|key| self.sessions.get(key))
            .collect();
        if let Some(pinned) = self.pinned.as_ref().and_then(|key| self.sessions.get(key)) {
            sessions.push(pinned);
        }
        sessions
    }

    pub fn filter(&self, target: FilterTarget) -> &PatternFilter {
        match target {
            FilterTarget::Metrics => &self.metric_filter,
            FilterTarget::System => &self.system_filter,
            FilterTarget::Overview => &self.overview_filter,
        }
    }

    fn filter_mut(&mut self, target: FilterTarget) -> &mut PatternFilter {
        match target {
            FilterTarget::Metrics => &mut self.metric_filter,
            FilterTarget::System => &mut self.system_filter,
            FilterTarget::Overview => &mut self.overview_filter,
        }
    }

    /// The filter whose prompt is open, if any. Prompts only open from
    /// normal mode, so at most one is editing.
    pub fn editing_filter(&self) -> Option<FilterTarget> {
        FilterTarget::ALL
            .into_iter()
            .find(|target| self.filter(*target).is_editing())
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant, cmds: &mut Vec<Command>) {
        if let Some(target) = self.editing_filter() {
            if let Some(input) = filter_input_for(key) {
                self.on_filter_input(target, input);
            }
            return;
        }
        let Some(action) = action_for(key, self.help_open) else {
            return;
        };
        match action {
            Action::Quit => cmds.extend(self.shutdown()),
            Action::ToggleHelp => self.help_open = !self.help_open,
            Action::CloseOverlay => {
                self.help_open = false;
                self.status_note = None;
            }
            Action::ToggleRunsSidebar => self.toggle_panel(Panel::Runs, now, cmds),
            Action::ToggleOverviewSidebar => self.toggle_panel(Panel::Overview, now, cmds),
            Action::ToggleConsoleLogs => self.toggle_panel(Panel::Console, now, cmds),
            Action::ToggleSystemMetrics => self.toggle_panel(Panel::System, now, cmds),
            Action::FocusNext => self.tab(Direction::Forward),
            Action::FocusPrev => self.tab(Direction::Backward),
            Action::Up => self.navigate_focused(Nav::Up),
            Action::Down => self.navigate_focused(Nav::Down),
            Action::PageUp => self.navigate_focused(Nav::PageUp),
            Action::PageDown => self.navigate_focused(Nav::PageDown),
            Action::Home => self.navigate_focused(Nav::Home),
            Action::ScrollToEnd => self.navigate_focused(Nav::End),
            Action::ToggleRunSelected => {
                if let Some(key) = self.runs.highlighted().map(str::to_string) {
                    if self.selected.contains(&key) {
                        info!(event = "run_deselected", run_key = %key);
                        self.drop_run(&key, cmds);
                    } else {
                        self.select_run(key, cmds);
                    }
                }
            }
            Action::TogglePin => {
                if let Some(key) = self.runs.highlighted().map(str::to_string) {
                    self.toggle_pin(key, cmds);
                }
            }
            Action::NextChartPage => self.charts.pager.page_down(),
            Action::PrevChartPage => self.charts.pager.page_up(),
            Action::NextSystemPage => self.system.grid.pager.page_down(),
            Action::PrevSystemPage => self.system.grid.pager.page_up(),
            Action::EnterFilter => self.metric_filter.begin(),
            Action::ClearFilter => self.metric_filter.clear(),
            Action::EnterSystemFilter => self.system_filter.begin(),
            Action::ClearSystemFilter => self.system_filter.clear(),
            Action::EnterOverviewFilter => self.overview_filter.begin(),
            Action::ClearOverviewFilter => self.overview_filter.clear(),
        }
    }

    fn on_filter_input(&mut self, target: FilterTarget, input: FilterInput) {
        let filter = self.filter_mut(target);
        match input {
            FilterInput::Insert(ch) => filter.insert(ch),
            FilterInput::Backspace => filter.backspace(),
            FilterInput::ToggleMode => filter.toggle_mode(),
            FilterInput::Apply => {
                filter.apply();
                info!(
                    event = "filter_applied",
                    target = target.label(),
                    pattern = filter.applied(),
                    mode = filter.mode().label()
                );
            }
            FilterInput::Cancel => filter.cancel(),
            FilterInput::Clear => filter.clear(),
        }
    }

    fn toggle_panel(&mut self, panel: Panel, now: Instant, cmds: &mut Vec<Command>) {
        let anim = match panel {
            Panel::Runs => &mut self.runs.anim,
            Panel::Overview => &mut self.overview.anim,
            Panel::Console => &mut self.console.anim,
            Panel::System => &mut self.system.anim,
        };
        if !anim.toggle(now) {
            debug!(event = "panel_toggle_ignored", panel = panel.name());
            return;
        }
        debug!(event = "panel_toggled", panel = panel.name(), open = anim.is_open());
        self.relayout();
        self.schedule_frame(cmds);
    }

    fn schedule_frame(&mut self, cmds: &mut Vec<Command>) {
        if self.frame_scheduled {
            return;
        }
        self.frame_scheduled = true;
        cmds.push(Command::Work(WorkOp::Frame {
            delay: self.config.animation_frame,
        }));
    }

    fn on_animation_frame(&mut self, now: Instant, cmds: &mut Vec<Command>) {
        self.frame_scheduled = false;
        let mut at_rest = true;
        for anim in [
            &mut self.runs.anim,
            &mut self.overview.anim,
            &mut self.console.anim,
            &mut self.system.anim,
        ] {
            at_rest &= anim.update(now);
        }
        if !at_rest {
            self.schedule_frame(cmds);
        }
    }

    fn region_infos(&self) -> [RegionInfo; 4] {
        [
            RegionInfo::plain(self.runs.anim.is_open() && !self.runs.list.is_empty()),
            RegionInfo::plain(!self.charts.pager.is_empty()),
            // focusable while empty so the pane can be scrolled once output arrives
            RegionInfo::plain(self.console.anim.is_open()),
            RegionInfo::composite(self.overview.anim.is_open(), self.overview.visible_count()),
        ]
    }

    fn tab(&mut self, direction: Direction) {
        let infos = self.region_infos();
        self.focus.tab(direction, move |region| infos[region.index()]);
    }

    fn focus_region(&mut self, region: Region, section: usize) {
        let infos = self.region_infos();
        if infos[region.index()].available {
            self.focus
                .activate_section(region, section, move |r| infos[r.index()]);
        }
    }

    fn navigate_focused(&mut self, nav: Nav) {
        let region = self.focus.current();
        let section = self.focus.section_of(region).unwrap_or(0);
        self.navigate(region, section, nav);
    }

    fn navigate(&mut self, region: Region, section: usize, nav: Nav) {
        match region {
            Region::RunList => nav.apply(&mut self.runs.list),
            Region::Charts => nav.apply(&mut self.charts.pager),
            Region::ConsoleLogs => nav.apply(&mut self.console.pager),
            Region::Overview => {
                if let Some(pager) = self.overview.visible_mut(section) {
                    nav.apply(pager);
                }
            }
        }
    }

    fn region_at(&self, column: u16, row: u16) -> Option<Region> {
        let layout = &self.layout;
        [
            (layout.runs, Region::RunList),
            (layout.charts, Region::Charts),
            (layout.console, Region::ConsoleLogs),
            (layout.overview, Region::Overview),
        ]
        .into_iter()
        .find(|(area, _)| layout::contains(*area, column, row))
        .map(|(_, region)| region)
    }

    fn overview_section_at(&self, row: u16) -> usize {
        layout::overview_bands(self.layout.overview, self.overview.visible_count())
            .iter()
            .position(|band| row >= band.y && row < band.y + band.height)
            .unwrap_or(0)
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        let (column, row) = (event.column, event.row);
        let Some(region) = self.region_at(column, row) else {
            return;
        };
        let section = match region {
            Region::Overview => self.overview_section_at(row),
            _ => 0,
        };
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.focus_region(region, section);
                self.click(region, column, row);
            }
            MouseEventKind::ScrollUp => self.navigate(region, section, Nav::Up),
            MouseEventKind::ScrollDown => self.navigate(region, section, Nav::Down),
            _ => {}
        }
    }

    fn click(&mut self, region: Region, column: u16, row: u16) {
        match region {
            Region::RunList => {
                // border + header
                let first_row = self.layout.runs.y + 2;
                if row < first_row {
                    return;
                }
                let index = self.runs.list.top() + usize::from(row - first_row);
                if index < self.runs.list.visible_range().end {
                    self.runs.list.select(index);
                }
            }
            Region::Charts => {
                let area = layout::chart_grid_area(self.layout.charts);
                let visible = self.charts.pager.visible_range();
                let hit = visible.clone().enumerate().find(|(cell, _)| {
                    layout::contains(layout::grid_cell(area, self.chart_grid, *cell), column, row)
                });
                if let Some((_, index)) = hit {
                    self.charts.pager.select(index);
                }
            }
            Region::ConsoleLogs | Region::Overview => {}
        }
    }

    fn on_runs_discovered(&mut self, keys: Vec<String>, cmds: &mut Vec<Command>) {
        if self.runs.list.items() != keys.as_slice() {
            debug!(event = "runs_discovered", count = keys.len());
            self.runs.list.set_items(keys);
        }
        if !self.auto_selected {
            if let Some(latest) = self.runs.list.items().last().cloned() {
                // once per process; later runs are left for the user to pick
                self.auto_selected = true;
                info!(event = "latest_run_auto_selected", run_key = %latest);
                self.runs.list.select(self.runs.list.len() - 1);
                if !self.selected.contains(&latest) {
                    self.select_run(latest.clone(), cmds);
                }
                self.pinned = Some(latest);
            }
        }
        self.schedule_scan(cmds);
    }

    fn schedule_scan(&self, cmds: &mut Vec<Command>) {
        cmds.push(Command::Work(WorkOp::ScanRuns {
            dir: self.config.runs_dir.clone(),
            delay: self.config.scan_interval,
        }));
    }

    fn select_run(&mut self, key: String, cmds: &mut Vec<Command>) {
        let Some(path) = run_log_path(&self.config.runs_dir, &key) else {
            warn!(event = "run_key_invalid", run_key = %key);
            return;
        };
        info!(event = "run_selected", run_key = %key);
        if self.pinned.is_none() {
            self.pinned = Some(key.clone());
        }
        self.selected.insert(key.clone());
        cmds.push(Command::Work(WorkOp::OpenLog { key, path }));
    }

    fn toggle_pin(&mut self, key: String, cmds: &mut Vec<Command>) {
        if self.pinned.as_deref() == Some(key.as_str()) {
            self.pinned = None;
            return;
        }
        if !self.selected.contains(&key) {
            self.select_run(key.clone(), cmds);
        }
        info!(event = "run_pinned", run_key = %key);
        self.pinned = Some(key);
    }

    /// Forgets a run: its session, selection and pin. Dropping the session
    /// closes its reader and watcher.
    fn drop_run(&mut self, key: &str, cmds: &mut Vec<Command>) {
        self.selected.remove(key);
        if self.pinned.as_deref() == Some(key) {
            self.pinned = None;
        }
        if self.sessions.remove(key).is_some() {
            debug!(event = "session_closed", run_key = %key);
        }
        self.sync_heartbeat(cmds);
    }

    fn on_reader_opened(
        &mut self,
        key: String,
        path: PathBuf,
        reader: Box<dyn LogReader>,
        cmds: &mut Vec<Command>,
    ) {
        if !self.selected.contains(&key) || self.sessions.contains_key(&key) {
            // deselected or reopened while opening; dropping closes the log
            debug!(event = "stale_reader_discarded", run_key = %key);
            return;
        }
        debug!(event = "run_log_opened", run_key = %key, path = %path.display());
        let mut session = RunSession::new(key.clone(), path, reader);
        if let Some(reader) = session.take_reader() {
            cmds.push(Command::Work(WorkOp::Read {
                key: key.clone(),
                kind: ReadKind::Backlog,
                reader,
            }));
        }
        self.sessions.insert(key, session);
    }

    fn on_reader_failed(&mut self, key: &str, error: ReadError, cmds: &mut Vec<Command>) {
        if !self.selected.contains(key) {
            return;
        }
        if error.is_not_found() {
            // the directory scan can see a run before its log exists
            debug!(event = "run_log_missing", run_key = %key);
        } else {
            warn!(event = "run_open_failed", run_key = %key, error = %error);
            self.status_note = Some(format!("{key}: {error}"));
        }
        if !self.sessions.contains_key(key) {
            self.drop_run(key, cmds);
        }
    }

    fn on_records_read(
        &mut self,
        key: String,
        kind: ReadKind,
        reader: Box<dyn LogReader>,
        batch: RecordBatch,
        cmds: &mut Vec<Command>,
    ) {
        let Some(session) = self.sessions.get_mut(&key) else {
            debug!(event = "stale_read_discarded", run_key = %key);
            return;
        };
        session.restore_reader(reader);
        for error in &batch.decode_errors {
            warn!(event = "record_decode_failed", run_key = %key, error = %error);
        }
        let has_more = batch.has_more;
        let outcome = session.apply_records(batch.records);
        if outcome.started {
            info!(event = "run_started", run_key = %key);
        }
        if outcome.completed {
            info!(
                event = "run_completed",
                run_key = %key,
                state = %session.state,
                exit_code = ?session.exit_code
            );
        }

        let mut watch_dir = None;
        let next_read = match kind {
            ReadKind::Backlog if has_more => Some(ReadKind::Backlog),
            ReadKind::Backlog => {
                session.backlog_done = true;
                debug!(event = "backlog_loaded", run_key = %key, records = session.records_seen);
                if session.is_live() && session.request_watcher() {
                    watch_dir = Some(session.log_dir().to_path_buf());
                }
                None
            }
            ReadKind::Live => has_more.then_some(ReadKind::Live),
        };
        let reread = session.take_reread() && session.is_live();
        let next_read = next_read.or(reread.then_some(ReadKind::Live));
        if let Some(kind) = next_read {
            self.issue_read(&key, kind, cmds);
        }
        if let Some(dir) = watch_dir {
            cmds.push(Command::Work(WorkOp::StartWatcher { key, dir }));
        }
        self.sync_heartbeat(cmds);
    }

    fn issue_read(&mut self, key: &str, kind: ReadKind, cmds: &mut Vec<Command>) {
        let Some(reader) = self.sessions.get_mut(key).and_then(RunSession::take_reader) else {
            return;
        };
        cmds.push(Command::Work(WorkOp::Read {
            key: key.to_string(),
            kind,
            reader,
        }));
    }

    fn on_file_changed(&mut self, key: String, events: crate::live::WatchEvents, cmds: &mut Vec<Command>) {
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };
        if !session.has_watcher() {
            return;
        }
        let idle = !session.read_in_flight();
        if !idle {
            // the read in flight may already have hit end of file
            session.mark_reread();
        }
        cmds.push(Command::Work(WorkOp::WaitForWatcher {
            key: key.clone(),
            events,
        }));
        if self.heartbeat_running {
            cmds.push(Command::Heartbeat(HeartbeatControl::Reset));
        }
        if idle {
            self.issue_read(&key, ReadKind::Live, cmds);
        }
    }

    fn on_heartbeat(&mut self, cmds: &mut Vec<Command>) {
        if !self.heartbeat_running {
            return;
        }
        cmds.push(Command::Heartbeat(HeartbeatControl::Reset));
        let mut due: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.backlog_done && s.is_live() && !s.read_in_flight())
            .map(|s| s.key.clone())
            .collect();
        due.sort();
        for key in due {
            self.issue_read(&key, ReadKind::Live, cmds);
        }
    }

    /// Starts the heartbeat with the first live session and stops it with
    /// the last.
    fn sync_heartbeat(&mut self, cmds: &mut Vec<Command>) {
        let any_live = self
            .sessions
            .values()
            .any(|s| s.backlog_done && s.is_live());
        self.live.set(any_live);
        if any_live && !self.heartbeat_running {
            self.heartbeat_running = true;
            info!(event = "heartbeat_started");
            cmds.push(Command::Heartbeat(HeartbeatControl::Start));
        } else if !any_live && self.heartbeat_running {
            self.heartbeat_running = false;
            info!(event = "heartbeat_stopped");
            cmds.push(Command::Heartbeat(HeartbeatControl::Stop));
        }
    }

    fn metric_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .selected
            .iter()
            .filter_map(|key| self.sessions.get(key))
            .flat_map(|session| session.metrics.keys())
            .filter(|name| self.metric_filter.matches(name))
            .collect();
        names.into_iter().cloned().collect()
    }

    fn sync_views(&mut self) {
        let names = self.metric_names();
        self.charts.show(names);
        let key = self.highlighted_key().map(str::to_string);
        let session = key.as_deref().and_then(|key| self.sessions.get(key));
        self.console.show(session);
        self.overview.show(session, &self.overview_filter);
        self.system.show(session, &self.system_filter);
    }

    /// Sizes first, then the pager windows that depend on them, then focus,
    /// which depends on what is now visible and non-empty.
    fn relayout(&mut self) {
        let (width, height) = (self.width, self.height);
        self.runs
            .anim
            .set_expanded(layout::sidebar_width(width, self.overview.anim.is_open()));
        self.overview
            .anim
            .set_expanded(layout::sidebar_width(width, self.runs.anim.is_open()));
        self.console.anim.set_expanded(layout::pane_height(
            height,
            self.system.anim.is_open(),
            CONSOLE_MIN_HEIGHT,
        ));
        self.system.anim.set_expanded(layout::pane_height(
            height,
            self.console.anim.is_open(),
            SYSTEM_MIN_HEIGHT,
        ));
        self.layout = layout::compute(
            Rect::new(0, 0, width, height),
            self.runs.anim.value(),
            self.overview.anim.value(),
            self.system.anim.value(),
            self.console.anim.value(),
        );

        let runs_inner = layout::inner(self.layout.runs);
        self.runs
            .list
            .set_viewport(usize::from(runs_inner.width), layout::list_rows(self.layout.runs));

        let geometry = ConsoleGeometry::for_area(self.layout.console);
        self.console
            .pager
            .set_viewport(geometry.value_width, geometry.content_rows);

        self.chart_grid = layout::fit_grid(
            layout::chart_grid_area(self.layout.charts),
            self.config.metrics_grid,
        );
        self.charts.pager.set_viewport(0, self.chart_grid.capacity());
        self.system_grid = layout::fit_grid(
            layout::system_grid_area(self.layout.system),
            self.config.system_grid,
        );
        self.system
            .grid
            .pager
            .set_viewport(0, self.system_grid.capacity());

        let bands = layout::overview_bands(self.layout.overview, self.overview.visible_count());
        let rows: Vec<usize> = bands
            .iter()
            .map(|band| usize::from(band.height.saturating_sub(1)))
            .collect();
        let overview_width = usize::from(layout::inner(self.layout.overview).width);
        self.overview.set_viewports(overview_width, &rows);

        let infos = self.region_infos();
        self.focus
            .resolve_after_visibility_change(move |region| infos[region.index()]);
    }
}
