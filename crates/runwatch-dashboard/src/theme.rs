use ratatui::style::{Color, Modifier, Style};
use runwatch_core::RunState;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const STDERR_STYLE: Style = Style::new().fg(Color::Rgb(251, 73, 52));
pub const KEY_STYLE: Style = Style::new().fg(Color::Rgb(131, 165, 152));
pub const STATUS_BAR_STYLE: Style = Style::new()
    .bg(Color::Rgb(40, 40, 40))
    .fg(Color::Rgb(235, 219, 178));

pub fn border_style(focused: bool) -> Style {
    if focused {
        Style::new().fg(Color::Rgb(250, 189, 47))
    } else {
        Style::new().fg(Color::Rgb(80, 73, 69))
    }
}

const RUN_PALETTE: [Color; 12] = [
    Color::Rgb(131, 165, 152),
    Color::Rgb(250, 189, 47),
    Color::Rgb(211, 134, 155),
    Color::Rgb(184, 187, 38),
    Color::Rgb(254, 128, 25),
    Color::Rgb(69, 133, 136),
    Color::Rgb(142, 192, 124),
    Color::Rgb(177, 98, 134),
    Color::Rgb(215, 153, 33),
    Color::Rgb(104, 157, 106),
    Color::Rgb(214, 93, 14),
    Color::Rgb(189, 174, 147),
];

/// Stable color per run key, so a run keeps its color across restarts.
pub fn run_color(key: &str) -> Color {
    let mut hash: u64 = 1469598103934665603;
    for b in key.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    RUN_PALETTE[(hash as usize) % RUN_PALETTE.len()]
}

pub fn state_color(state: RunState) -> Color {
    match state {
        RunState::Running => Color::Rgb(184, 187, 38),
        RunState::Finished => Color::Rgb(131, 165, 152),
        RunState::Failed => Color::Rgb(251, 73, 52),
        RunState::Idle => Color::Rgb(146, 131, 116),
    }
}

pub mod icons {
    pub const PINNED: &str = "▶";
    pub const SELECTED: &str = "●";
    pub const UNSELECTED: &str = "○";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_colors_are_stable() {
        let key = "run-20250101_000000-abc";
        assert_eq!(run_color(key), run_color(key));
        assert!(RUN_PALETTE.contains(&run_color("anything")));
    }
}
