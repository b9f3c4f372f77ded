//! Dashboard panels. Each is a thin pairing of an [`AnimatedValue`] for its
//! collapsible dimension and one or more [`Pager`]s for its content.

use crate::animation::AnimatedValue;
use crate::filter::PatternFilter;
use crate::pager::{FollowPolicy, Pager, PagerItem};
use crate::session::RunSession;
use runwatch_core::console::ConsoleLine;
use serde_json::Value;
use std::time::Duration;

/// One row of an overview section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl PagerItem for KeyValue {}

pub struct RunsSidebar {
    pub anim: AnimatedValue,
    pub list: Pager<String>,
}

impl RunsSidebar {
    pub fn new(width: u16, visible: bool, duration: Duration) -> Self {
        Self {
            anim: AnimatedValue::new(width, visible, duration),
            list: Pager::new(FollowPolicy::Off),
        }
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.list.current().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewSection {
    Run,
    Environment,
    Config,
    Summary,
}

impl OverviewSection {
    pub const ALL: [OverviewSection; 4] = [
        OverviewSection::Run,
        OverviewSection::Environment,
        OverviewSection::Config,
        OverviewSection::Summary,
    ];

    pub fn title(self) -> &'static str {
        match self {
            OverviewSection::Run => "Run",
            OverviewSection::Environment => "Environment",
            OverviewSection::Config => "Config",
            OverviewSection::Summary => "Summary",
        }
    }
}

/// Right-hand sidebar. Only non-empty sections are drawn and focusable, so
/// section indices used by focus count non-empty sections only.
pub struct OverviewSidebar {
    pub anim: AnimatedValue,
    sections: [Pager<KeyValue>; 4],
}

impl OverviewSidebar {
    pub fn new(width: u16, visible: bool, duration: Duration) -> Self {
        Self {
            anim: AnimatedValue::new(width, visible, duration),
            sections: std::array::from_fn(|_| Pager::new(FollowPolicy::Off)),
        }
    }

    pub fn visible_sections(&self) -> Vec<OverviewSection> {
        OverviewSection::ALL
            .into_iter()
            .zip(self.sections.iter())
            .filter(|(_, pager)| !pager.is_empty())
            .map(|(section, _)| section)
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.sections.iter().filter(|pager| !pager.is_empty()).count()
    }

    pub fn section(&self, section: OverviewSection) -> &Pager<KeyValue> {
        &self.sections[section as usize]
    }

    /// The `index`-th visible section.
    pub fn visible_mut(&mut self, index: usize) -> Option<&mut Pager<KeyValue>> {
        let section = *self.visible_sections().get(index)?;
        Some(&mut self.sections[section as usize])
    }

    pub fn set_viewports(&mut self, width: usize, rows: &[usize]) {
        for (section, rows) in self.visible_sections().into_iter().zip(rows) {
            self.sections[section as usize].set_viewport(width, *rows);
        }
    }

    /// Refreshes rows from `session`, keeping rows whose key or value
    /// matches `filter`; unchanged sections keep their scroll.
    pub fn show(&mut self, session: Option<&RunSession>, filter: &PatternFilter) {
        for section in OverviewSection::ALL {
            let mut rows = session.map(|s| section_rows(section, s)).unwrap_or_default();
            if filter.is_active() {
                rows.retain(|row| filter.matches(&row.key) || filter.matches(&row.value));
            }
            let pager = &mut self.sections[section as usize];
            if pager.items() != rows.as_slice() {
                pager.set_items(rows);
            }
        }
    }
}

fn section_rows(section: OverviewSection, session: &RunSession) -> Vec<KeyValue> {
    match section {
        OverviewSection::Run => run_rows(session),
        OverviewSection::Environment => session
            .environment
            .iter()
            .map(|(k, v)| KeyValue::new(k.as_str(), v.as_str()))
            .collect(),
        OverviewSection::Config => session
            .metadata
            .iter()
            .flat_map(|meta| meta.config.iter())
            .map(|(k, v)| KeyValue::new(k.as_str(), config_value(v)))
            .collect(),
        OverviewSection::Summary => session
            .summary()
            .into_iter()
            .map(|(name, value)| KeyValue::new(name, format_number(value)))
            .collect(),
    }
}

fn run_rows(session: &RunSession) -> Vec<KeyValue> {
    let Some(meta) = &session.metadata else {
        return Vec::new();
    };
    let mut rows = vec![
        KeyValue::new("ID", meta.run_id.as_str()),
        KeyValue::new("Name", session.display_name()),
        KeyValue::new("State", session.state.as_str()),
    ];
    if let Some(project) = &meta.project {
        rows.push(KeyValue::new("Project", project.as_str()));
    }
    if let Some(entity) = &meta.entity {
        rows.push(KeyValue::new("Entity", entity.as_str()));
    }
    if let Some(started) = meta.started_at {
        rows.push(KeyValue::new("Started", started.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Some(step) = session.last_step {
        rows.push(KeyValue::new("Step", step.to_string()));
    }
    if let Some(code) = session.exit_code {
        rows.push(KeyValue::new("Exit code", code.to_string()));
    }
    if !meta.tags.is_empty() {
        rows.push(KeyValue::new("Tags", meta.tags.join(", ")));
    }
    rows
}

fn config_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e12 {
        format!("{value:.0}")
    } else if value.abs() >= 1e4 || value.abs() < 1e-3 {
        format!("{value:.3e}")
    } else {
        format!("{value:.4}")
    }
}

/// Console pane. Follows the highlighted run's console output.
pub struct ConsoleLogsPane {
    pub anim: AnimatedValue,
    pub pager: Pager<ConsoleLine>,
    synced: Option<(String, u64)>,
    first_index: usize,
}

impl ConsoleLogsPane {
    pub fn new(height: u16, visible: bool, duration: Duration) -> Self {
        Self {
            anim: AnimatedValue::new(height, visible, duration),
            pager: Pager::new(FollowPolicy::Tail),
            synced: None,
            first_index: 0,
        }
    }

    pub fn run_key(&self) -> Option<&str> {
        self.synced.as_ref().map(|(key, _)| key.as_str())
    }

    pub fn show(&mut self, session: Option<&RunSession>) {
        let Some(session) = session else {
            if self.synced.take().is_some() {
                self.reset();
            }
            return;
        };
        let revision = session.console.revision();
        let seen = match &self.synced {
            Some((key, seen)) if *key == session.key => Some(*seen),
            _ => None,
        };
        match seen {
            Some(seen) if seen == revision => return,
            Some(_) => {}
            None => {
                // another run: start over at its tail
                self.reset();
                self.first_index = session.console.first_index();
            }
        }
        let lines: Vec<ConsoleLine> = session.console.lines().cloned().collect();
        let evicted = session.console.first_index().saturating_sub(self.first_index);
        self.pager.set_items_shifted(lines, evicted);
        self.first_index = session.console.first_index();
        self.synced = Some((session.key.clone(), revision));
    }

    fn reset(&mut self) {
        let (width, rows) = self.pager.viewport();
        self.pager = Pager::new(FollowPolicy::Tail);
        self.pager.set_viewport(width, rows);
    }
}

/// Metric chart grid. Each item is a metric name; one page is one screen
/// of charts.
pub struct ChartGrid {
    pub pager: Pager<String>,
}

impl Default for ChartGrid {
    fn default() -> Self {
        Self {
            pager: Pager::new(FollowPolicy::Off),
        }
    }
}

impl ChartGrid {
    pub fn show(&mut self, names: Vec<String>) {
        if self.pager.items() != names.as_slice() {
            self.pager.set_items(names);
        }
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.pager.current().map(String::as_str)
    }
}

/// Resource charts for the highlighted run, under the metric grid.
pub struct SystemMetricsPane {
    pub anim: AnimatedValue,
    pub grid: ChartGrid,
}

impl SystemMetricsPane {
    pub fn new(height: u16, visible: bool, duration: Duration) -> Self {
        Self {
            anim: AnimatedValue::new(height, visible, duration),
            grid: ChartGrid::default(),
        }
    }

    pub fn show(&mut self, session: Option<&RunSession>, filter: &PatternFilter) {
        let names = session
            .map(|s| {
                s.resources
                    .keys()
                    .filter(|name| filter.matches(name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.grid.show(names);
    }
}
