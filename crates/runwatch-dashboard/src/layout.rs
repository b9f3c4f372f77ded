//! Screen partitioning. Pure functions of the terminal size and the current
//! animated panel sizes, shared by the controller (pager capacities, mouse
//! hit-testing) and the renderer.

use crate::config::GridSize;
use ratatui::layout::Rect;

pub const STATUS_BAR_HEIGHT: u16 = 1;

/// Golden-ratio split for a single side panel.
pub const PANEL_RATIO: f64 = 0.382;
/// Used for each panel when both panels on an axis are open.
pub const PANEL_RATIO_BOTH: f64 = 0.236;

pub const SIDEBAR_MIN_WIDTH: u16 = 40;
pub const SIDEBAR_MAX_WIDTH: u16 = 120;

// top border + header + bottom padding
const CONSOLE_CHROME_ROWS: u16 = 3;
pub const CONSOLE_MIN_HEIGHT: u16 = CONSOLE_CHROME_ROWS + 1;
const CONSOLE_KEY_WIDTH_RATIO: f64 = 0.12;
const TIMESTAMP_FULL_WIDTH: usize = "00:00:00".len();
const TIMESTAMP_SHORT_WIDTH: usize = "00:00".len();

pub const CHART_MIN_WIDTH: u16 = 24;
pub const CHART_MIN_HEIGHT: u16 = 8;
// top border + header
const SYSTEM_CHROME_ROWS: u16 = 2;
pub const SYSTEM_MIN_HEIGHT: u16 = SYSTEM_CHROME_ROWS + CHART_MIN_HEIGHT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardLayout {
    pub runs: Rect,
    pub charts: Rect,
    pub system: Rect,
    pub console: Rect,
    pub overview: Rect,
    pub status: Rect,
}

pub fn sidebar_width(total_width: u16, other_open: bool) -> u16 {
    let ratio = if other_open { PANEL_RATIO_BOTH } else { PANEL_RATIO };
    let width = (f64::from(total_width) * ratio) as u16;
    width.clamp(SIDEBAR_MIN_WIDTH, SIDEBAR_MAX_WIDTH)
}

pub fn pane_height(total_height: u16, other_open: bool, min_height: u16) -> u16 {
    let available = total_height.saturating_sub(STATUS_BAR_HEIGHT);
    let ratio = if other_open { PANEL_RATIO_BOTH } else { PANEL_RATIO };
    ((f64::from(available) * ratio) as u16).max(min_height)
}

/// Splits the screen given the current (possibly mid-animation) panel sizes.
pub fn compute(area: Rect, runs_w: u16, overview_w: u16, system_h: u16, console_h: u16) -> DashboardLayout {
    let body_h = area.height.saturating_sub(STATUS_BAR_HEIGHT);
    let status = Rect::new(area.x, area.y + body_h, area.width, area.height.min(STATUS_BAR_HEIGHT));

    let runs_w = runs_w.min(area.width);
    let overview_w = overview_w.min(area.width - runs_w);
    let middle_w = area.width - runs_w - overview_w;
    let middle_x = area.x + runs_w;

    let console_h = console_h.min(body_h);
    let system_h = system_h.min(body_h - console_h);
    let charts_h = body_h - console_h - system_h;

    DashboardLayout {
        runs: Rect::new(area.x, area.y, runs_w, body_h),
        charts: Rect::new(middle_x, area.y, middle_w, charts_h),
        system: Rect::new(middle_x, area.y + charts_h, middle_w, system_h),
        console: Rect::new(middle_x, area.y + charts_h + system_h, middle_w, console_h),
        overview: Rect::new(middle_x + middle_w, area.y, overview_w, body_h),
        status,
    }
}

/// Column split of the console pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleGeometry {
    pub key_width: usize,
    pub value_width: usize,
    pub content_rows: usize,
}

impl ConsoleGeometry {
    pub fn for_area(area: Rect) -> Self {
        let width = usize::from(area.width);
        let key_width = ((width as f64) * CONSOLE_KEY_WIDTH_RATIO) as usize;
        let value_width = width.saturating_sub(key_width + 1);
        let content_rows = if area.height < CONSOLE_MIN_HEIGHT {
            0
        } else {
            usize::from(area.height - CONSOLE_CHROME_ROWS)
        };
        Self {
            key_width,
            value_width,
            content_rows,
        }
    }

    /// `HH:MM:SS` when it fits, `HH:MM` when only minutes fit, else nothing.
    pub fn timestamp_format(&self) -> Option<&'static str> {
        // one column of padding on the left
        let available = self.key_width.saturating_sub(1);
        if available >= TIMESTAMP_FULL_WIDTH {
            Some("%H:%M:%S")
        } else if available >= TIMESTAMP_SHORT_WIDTH {
            Some("%H:%M")
        } else {
            None
        }
    }
}

/// Inside of a fully bordered box.
pub fn inner(area: Rect) -> Rect {
    Rect::new(
        area.x.saturating_add(1),
        area.y.saturating_add(1),
        area.width.saturating_sub(2),
        area.height.saturating_sub(2),
    )
}

/// Rows left for list items in a bordered box with one header line.
pub fn list_rows(area: Rect) -> usize {
    usize::from(inner(area).height.saturating_sub(1))
}

/// Chart grid that fits `area`, never exceeding the configured size.
pub fn fit_grid(area: Rect, configured: GridSize) -> GridSize {
    let rows = (area.height / CHART_MIN_HEIGHT).clamp(1, configured.rows.max(1));
    let cols = (area.width / CHART_MIN_WIDTH).clamp(1, configured.cols.max(1));
    GridSize { rows, cols }
}

/// Area left for charts inside the metrics block (borders and header).
pub fn chart_grid_area(area: Rect) -> Rect {
    let inner = inner(area);
    Rect::new(
        inner.x,
        inner.y.saturating_add(1),
        inner.width,
        inner.height.saturating_sub(1),
    )
}

/// Area left for charts inside the system metrics pane.
pub fn system_grid_area(area: Rect) -> Rect {
    Rect::new(
        area.x,
        area.y.saturating_add(SYSTEM_CHROME_ROWS),
        area.width,
        area.height.saturating_sub(SYSTEM_CHROME_ROWS),
    )
}

/// Cell `index` (row-major) of a `grid` laid over `area`.
pub fn grid_cell(area: Rect, grid: GridSize, index: usize) -> Rect {
    let cols = grid.cols.max(1);
    let rows = grid.rows.max(1);
    let col = (index % usize::from(cols)) as u16;
    let row = (index / usize::from(cols)) as u16;
    let cell_w = area.width / cols;
    let cell_h = area.height / rows;
    // last column/row absorbs the remainder
    let w = if col + 1 == cols { area.width - cell_w * col } else { cell_w };
    let h = if row + 1 == rows { area.height - cell_h * row } else { cell_h };
    Rect::new(area.x + cell_w * col, area.y + cell_h * row, w, h)
}

/// Stacks `count` equal bands over `area`; the last takes the remainder.
pub fn split_rows(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let count = count.min(usize::from(u16::MAX)) as u16;
    let band = area.height / count;
    (0..count)
        .map(|i| {
            let y = area.y + band * i;
            let h = if i + 1 == count { area.height - band * i } else { band };
            Rect::new(area.x, y, area.width, h)
        })
        .collect()
}

/// Overview sidebar bands, one per visible section. Each band spends its
/// first row on the section title.
pub fn overview_bands(area: Rect, sections: usize) -> Vec<Rect> {
    split_rows(inner(area), sections)
}

pub fn contains(area: Rect, column: u16, row: u16) -> bool {
    area.width > 0
        && area.height > 0
        && column >= area.x
        && column < area.x + area.width
        && row >= area.y
        && row < area.y + area.height
}
