use crate::app::{Dashboard, FilterTarget, Region};
use crate::filter::PatternFilter;
use crate::keys::{Category, BINDINGS};
use crate::layout::{self, ConsoleGeometry};
use crate::panels::format_number;
use crate::session::Series;
use crate::text::{display_width, with_ellipsis, wrap_text};
use crate::theme::{self, icons};
use chrono::Local;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, Paragraph},
    Frame,
};

/// Draws one frame from committed dashboard state. Layout was computed by
/// the controller; nothing here mutates it.
pub fn render(f: &mut Frame, app: &Dashboard) {
    let layout = app.layout;
    if layout.runs.width > 0 {
        render_runs(f, app, layout.runs);
    }
    if layout.charts.width > 0 && layout.charts.height > 0 {
        render_charts(f, app, layout.charts);
    }
    if layout.system.height > 0 && layout.system.width > 0 {
        render_system(f, app, layout.system);
    }
    if layout.console.height > 0 && layout.console.width > 0 {
        render_console(f, app, layout.console);
    }
    if layout.overview.width > 0 {
        render_overview(f, app, layout.overview);
    }
    render_status(f, app, layout.status);
    if app.help_open {
        render_help(f, f.size());
    }
}

fn titled(name: &str, nav: Option<String>) -> String {
    match nav {
        Some(nav) => format!(" {name} {nav} "),
        None => format!(" {name} "),
    }
}

fn pad_to(text: &str, width: usize) -> String {
    let clipped = with_ellipsis(text, width);
    let fill = width.saturating_sub(display_width(&clipped));
    format!("{clipped}{}", " ".repeat(fill))
}

fn render_runs(f: &mut Frame, app: &Dashboard, area: Rect) {
    let focused = app.focus.is_focused(Region::RunList);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(titled("Runs", app.runs.list.nav_info()))
        .border_style(theme::border_style(focused));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = usize::from(inner.width);
    let mut lines = vec![Line::styled(
        format!("{} selected", app.selected().count()),
        theme::HEADER_STYLE,
    )];
    for (index, key) in app.runs.list.visible_range().zip(app.runs.list.visible()) {
        let session = app.session(key);
        let marker = if app.pinned() == Some(key.as_str()) {
            icons::PINNED
        } else if app.is_selected(key) {
            icons::SELECTED
        } else {
            icons::UNSELECTED
        };
        let label = session.map_or(key.as_str(), |s| s.display_name());
        let mut spans = vec![
            Span::styled(format!("{marker} "), Style::new().fg(theme::run_color(key))),
            Span::raw(with_ellipsis(label, width.saturating_sub(4))),
        ];
        if let Some(session) = session {
            spans.push(Span::styled(
                " •",
                Style::new().fg(theme::state_color(session.state)),
            ));
        }
        let mut line = Line::from(spans);
        if index == app.runs.list.cursor() {
            line.style = if focused {
                theme::SELECTED_STYLE
            } else {
                Style::new().add_modifier(Modifier::BOLD)
            };
        }
        lines.push(line);
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn filter_prompt(target: FilterTarget, filter: &PatternFilter) -> Vec<Span<'static>> {
    let mut spans = vec![
        Span::styled(target.prompt(), theme::KEY_STYLE),
        Span::raw(filter.draft().to_string()),
        Span::styled("▏", theme::KEY_STYLE),
        Span::styled(format!("  [{}]", filter.mode().label()), theme::MUTED_STYLE),
    ];
    if filter.is_invalid() {
        spans.push(Span::styled("  invalid pattern", theme::STDERR_STYLE));
    }
    spans
}

fn filter_header(app: &Dashboard) -> Line<'static> {
    let filter = &app.metric_filter;
    if filter.is_editing() {
        return Line::from(filter_prompt(FilterTarget::Metrics, filter));
    }
    if filter.is_active() {
        return Line::from(vec![
            Span::styled("filter: ", theme::MUTED_STYLE),
            Span::raw(filter.applied().to_string()),
            Span::styled(format!("  [{}]", filter.mode().label()), theme::MUTED_STYLE),
        ]);
    }
    Line::styled("/ to filter", theme::MUTED_STYLE)
}

fn render_charts(f: &mut Frame, app: &Dashboard, area: Rect) {
    let focused = app.focus.is_focused(Region::Charts);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(titled("Metrics", app.charts.pager.nav_info()))
        .border_style(theme::border_style(focused));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height == 0 {
        return;
    }
    f.render_widget(
        Paragraph::new(filter_header(app)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    let grid_area = layout::chart_grid_area(area);
    if app.charts.pager.is_empty() {
        let note = if app.selected().count() == 0 {
            "Select a run with Space"
        } else {
            "No metrics yet"
        };
        f.render_widget(Paragraph::new(Line::styled(note, theme::MUTED_STYLE)), grid_area);
        return;
    }

    let sessions = app.chart_sessions();
    let names = app.charts.pager.items();
    for (cell, index) in app.charts.pager.visible_range().enumerate() {
        let name = &names[index];
        let series: Vec<(&str, &Series)> = sessions
            .iter()
            .filter_map(|s| s.metrics.get(name).map(|series| (s.key.as_str(), series)))
            .collect();
        let highlighted = focused && index == app.charts.pager.cursor();
        render_chart(f, layout::grid_cell(grid_area, app.chart_grid, cell), name, &series, highlighted);
    }
}

fn merged_bounds(bounds: impl Iterator<Item = (f64, f64)>) -> (f64, f64) {
    let merged = bounds.fold(None, |acc: Option<(f64, f64)>, (lo, hi)| {
        Some(acc.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))))
    });
    match merged {
        Some((lo, hi)) if (hi - lo).abs() > f64::EPSILON => (lo, hi),
        Some((lo, _)) => (lo - 1.0, lo + 1.0),
        None => (0.0, 1.0),
    }
}

fn render_chart(f: &mut Frame, area: Rect, title: &str, series: &[(&str, &Series)], highlighted: bool) {
    let (x0, x1) = merged_bounds(series.iter().filter_map(|(_, s)| s.x_bounds()));
    let (y0, y1) = merged_bounds(series.iter().filter_map(|(_, s)| s.y_bounds()));
    let latest = series
        .last()
        .and_then(|(_, s)| s.last())
        .map(|(_, y)| format_number(y));
    let title_width = usize::from(area.width.saturating_sub(4));
    let title = match latest {
        Some(latest) => with_ellipsis(&format!("{title} {latest}"), title_width),
        None => with_ellipsis(title, title_width),
    };

    let datasets: Vec<Dataset> = series
        .iter()
        .map(|(key, s)| {
            Dataset::default()
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::new().fg(theme::run_color(key)))
                .data(s.points())
        })
        .collect();
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {title} "))
                .border_style(theme::border_style(highlighted)),
        )
        .x_axis(
            Axis::default()
                .bounds([x0, x1])
                .style(theme::MUTED_STYLE)
                .labels(vec![Span::raw(format_number(x0)), Span::raw(format_number(x1))]),
        )
        .y_axis(
            Axis::default()
                .bounds([y0, y1])
                .style(theme::MUTED_STYLE)
                .labels(vec![Span::raw(format_number(y0)), Span::raw(format_number(y1))]),
        );
    f.render_widget(chart, area);
}

fn render_system(f: &mut Frame, app: &Dashboard, area: Rect) {
    let block = Block::default()
        .borders(Borders::TOP)
        .title(titled("System", app.system.grid.pager.nav_info()))
        .border_style(theme::border_style(false));
    f.render_widget(block, area);

    let session = app.highlighted_run();
    let header = match session {
        Some(s) => Line::styled(s.display_name().to_string(), theme::HEADER_STYLE),
        None => Line::styled("No run selected", theme::MUTED_STYLE),
    };
    if area.height > 1 {
        f.render_widget(Paragraph::new(header), Rect::new(area.x, area.y + 1, area.width, 1));
    }
    let Some(session) = session else {
        return;
    };

    let grid_area = layout::system_grid_area(area);
    let names = app.system.grid.pager.items();
    for (cell, index) in app.system.grid.pager.visible_range().enumerate() {
        let name = &names[index];
        let series: Vec<(&str, &Series)> = session
            .resources
            .get(name)
            .map(|s| (session.key.as_str(), s))
            .into_iter()
            .collect();
        render_chart(f, layout::grid_cell(grid_area, app.system_grid, cell), name, &series, false);
    }
}

fn render_console(f: &mut Frame, app: &Dashboard, area: Rect) {
    let focused = app.focus.is_focused(Region::ConsoleLogs);
    let block = Block::default()
        .borders(Borders::TOP)
        .title(titled("Logs", app.console.pager.nav_info()))
        .border_style(theme::border_style(focused));
    f.render_widget(block, area);

    let header = match app.highlighted_run() {
        Some(s) => Line::styled(s.display_name().to_string(), theme::HEADER_STYLE),
        None => Line::styled("No run selected", theme::MUTED_STYLE),
    };
    if area.height > 1 {
        f.render_widget(Paragraph::new(header), Rect::new(area.x, area.y + 1, area.width, 1));
    }

    let geometry = ConsoleGeometry::for_area(area);
    if geometry.content_rows == 0 {
        return;
    }
    let format = geometry.timestamp_format();
    let pager = &app.console.pager;
    let mut lines = Vec::new();
    'items: for (index, line) in pager.visible_range().zip(pager.visible()) {
        let value_style = if line.is_stderr {
            theme::STDERR_STYLE
        } else {
            Style::new()
        };
        for (row, text) in wrap_text(line.text(), geometry.value_width).into_iter().enumerate() {
            if lines.len() == geometry.content_rows {
                break 'items;
            }
            let stamp = match format {
                Some(format) if row == 0 => {
                    line.timestamp.with_timezone(&Local).format(format).to_string()
                }
                _ => String::new(),
            };
            let mut rendered = Line::from(vec![
                Span::styled(format!(" {}", pad_to(&stamp, geometry.key_width.saturating_sub(1))), theme::MUTED_STYLE),
                Span::raw(" "),
                Span::styled(text, value_style),
            ]);
            if focused && index == pager.cursor() {
                rendered.style = theme::SELECTED_STYLE;
            }
            lines.push(rendered);
        }
    }
    let content = Rect::new(
        area.x,
        area.y + 2,
        area.width,
        geometry.content_rows.min(usize::from(u16::MAX)) as u16,
    );
    f.render_widget(Paragraph::new(lines), content);
}

fn render_overview(f: &mut Frame, app: &Dashboard, area: Rect) {
    let focused = app.focus.is_focused(Region::Overview);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Overview ")
        .border_style(theme::border_style(focused));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let sections = app.overview.visible_sections();
    if sections.is_empty() {
        f.render_widget(
            Paragraph::new(Line::styled("No run selected", theme::MUTED_STYLE)),
            inner,
        );
        return;
    }
    let bands = layout::overview_bands(area, sections.len());
    let active = app.focus.section_of(Region::Overview);
    for (position, (section, band)) in sections.iter().zip(bands).enumerate() {
        let pager = app.overview.section(*section);
        let section_focused = active == Some(position);
        let title_style = if section_focused {
            theme::SELECTED_STYLE
        } else {
            theme::HEADER_STYLE
        };
        let mut lines = vec![Line::styled(
            titled(section.title(), pager.nav_info()).trim().to_string(),
            title_style,
        )];

        let width = usize::from(band.width);
        let key_width = pager
            .items()
            .iter()
            .map(|kv| display_width(&kv.key))
            .max()
            .unwrap_or(0)
            .min(width / 2);
        for (index, kv) in pager.visible_range().zip(pager.visible()) {
            let value_width = width.saturating_sub(key_width + 1);
            let mut line = Line::from(vec![
                Span::styled(pad_to(&kv.key, key_width), theme::KEY_STYLE),
                Span::raw(" "),
                Span::raw(with_ellipsis(&kv.value, value_width)),
            ]);
            if section_focused && index == pager.cursor() {
                line.style = theme::SELECTED_STYLE;
            }
            lines.push(line);
        }
        f.render_widget(Paragraph::new(lines), band);
    }
}

fn render_status(f: &mut Frame, app: &Dashboard, area: Rect) {
    let sep = Span::styled(" │ ", theme::MUTED_STYLE);
    let mut spans = vec![
        Span::styled(" runwatch", theme::HEADER_STYLE),
        sep.clone(),
        Span::raw(app.runs_dir().display().to_string()),
        sep.clone(),
        Span::raw(format!(
            "{} runs, {} selected",
            app.runs.list.len(),
            app.selected().count()
        )),
        sep.clone(),
        Span::raw(format!("focus: {}", app.focused_region().label())),
    ];
    for target in FilterTarget::ALL {
        let filter = app.filter(target);
        if !filter.is_editing() && filter.is_active() {
            spans.push(sep.clone());
            spans.push(Span::raw(format!("{}: {}", target.label(), filter.applied())));
        }
    }
    // the metric prompt lives in the chart header
    if let Some(target) = app.editing_filter().filter(|t| *t != FilterTarget::Metrics) {
        spans.push(sep.clone());
        spans.push(Span::styled(format!("{} ", target.label()), theme::MUTED_STYLE));
        spans.extend(filter_prompt(target, app.filter(target)));
    }
    if let Some(note) = &app.status_note {
        spans.push(sep.clone());
        spans.push(Span::styled(note.clone(), theme::STDERR_STYLE));
    }
    spans.push(sep);
    spans.push(Span::styled("? help", theme::KEY_STYLE));
    f.render_widget(Paragraph::new(Line::from(spans)).style(theme::STATUS_BAR_STYLE), area);
}

fn help_lines() -> Vec<Line<'static>> {
    let key_width = BINDINGS.iter().map(|b| display_width(b.keys)).max().unwrap_or(0);
    let mut lines = Vec::new();
    let mut current: Option<Category> = None;
    for binding in BINDINGS {
        if current != Some(binding.category) {
            if current.is_some() {
                lines.push(Line::from(""));
            }
            lines.push(Line::styled(binding.category.title(), theme::HEADER_STYLE));
            current = Some(binding.category);
        }
        lines.push(Line::from(vec![
            Span::styled(format!("  {}", pad_to(binding.keys, key_width)), theme::KEY_STYLE),
            Span::raw(format!("  {}", binding.description)),
        ]));
    }
    lines
}

fn render_help(f: &mut Frame, screen: Rect) {
    let lines = help_lines();
    let width = 64.min(screen.width);
    let height = (lines.len() as u16 + 2).min(screen.height);
    let area = Rect::new(
        screen.x + (screen.width - width) / 2,
        screen.y + (screen.height - height) / 2,
        width,
        height,
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .border_style(theme::border_style(true));
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(lines).block(block), area);
}
