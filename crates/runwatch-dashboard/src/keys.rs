use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Everything the keyboard can ask the dashboard to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    CloseOverlay,
    ToggleRunsSidebar,
    ToggleOverviewSidebar,
    ToggleConsoleLogs,
    ToggleSystemMetrics,
    FocusNext,
    FocusPrev,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    ScrollToEnd,
    ToggleRunSelected,
    TogglePin,
    NextChartPage,
    PrevChartPage,
    NextSystemPage,
    PrevSystemPage,
    EnterFilter,
    ClearFilter,
    EnterSystemFilter,
    ClearSystemFilter,
    EnterOverviewFilter,
    ClearOverviewFilter,
}

/// Keys while a filter prompt is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterInput {
    Insert(char),
    Backspace,
    ToggleMode,
    Apply,
    Cancel,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Panels,
    Navigation,
    Runs,
    Charts,
    Overview,
}

impl Category {
    pub fn title(self) -> &'static str {
        match self {
            Category::General => "General",
            Category::Panels => "Panels",
            Category::Navigation => "Navigation",
            Category::Runs => "Runs",
            Category::Charts => "Charts",
            Category::Overview => "Run overview",
        }
    }
}

pub struct Binding {
    pub keys: &'static str,
    pub description: &'static str,
    pub category: Category,
}

/// Rendered by the help overlay; keep in step with `action_for`.
pub const BINDINGS: &[Binding] = &[
    Binding { keys: "q / Ctrl+C", description: "Quit", category: Category::General },
    Binding { keys: "? / h", description: "Toggle help", category: Category::General },
    Binding { keys: "[", description: "Toggle runs sidebar", category: Category::Panels },
    Binding { keys: "]", description: "Toggle run overview", category: Category::Panels },
    Binding { keys: "l", description: "Toggle console logs", category: Category::Panels },
    Binding { keys: "s", description: "Toggle system metrics", category: Category::Panels },
    Binding { keys: "Tab / Shift+Tab", description: "Cycle focus", category: Category::Navigation },
    Binding { keys: "j k / Down Up", description: "Move in focused panel", category: Category::Navigation },
    Binding { keys: "Left / Right", description: "Page in focused panel", category: Category::Navigation },
    Binding { keys: "g / Home", description: "Jump to start", category: Category::Navigation },
    Binding { keys: "G / End", description: "Jump to end and follow", category: Category::Navigation },
    Binding { keys: "Space", description: "Select / deselect run", category: Category::Runs },
    Binding { keys: "p", description: "Pin / unpin run", category: Category::Runs },
    Binding { keys: "n / PgDn", description: "Next chart page", category: Category::Charts },
    Binding { keys: "N / PgUp", description: "Previous chart page", category: Category::Charts },
    Binding { keys: "m / M", description: "Next / previous system page", category: Category::Charts },
    Binding { keys: "/", description: "Filter metrics (Tab: regex/glob)", category: Category::Charts },
    Binding { keys: "Ctrl+L", description: "Clear metric filter", category: Category::Charts },
    Binding { keys: "\\", description: "Filter system metrics", category: Category::Charts },
    Binding { keys: "Ctrl+\\", description: "Clear system metrics filter", category: Category::Charts },
    Binding { keys: "o", description: "Filter overview rows", category: Category::Overview },
    Binding { keys: "Ctrl+O", description: "Clear overview filter", category: Category::Overview },
];

pub fn action_for(key: KeyEvent, help_open: bool) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            KeyCode::Char('l') => Some(Action::ClearFilter),
            // Ctrl+\ arrives as `\` or `4` depending on the terminal
            KeyCode::Char('\\') | KeyCode::Char('4') => Some(Action::ClearSystemFilter),
            KeyCode::Char('o') => Some(Action::ClearOverviewFilter),
            _ => None,
        };
    }
    if help_open {
        return match key.code {
            KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => Some(Action::ToggleHelp),
            KeyCode::Esc => Some(Action::CloseOverlay),
            KeyCode::Char('q') => Some(Action::Quit),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => Action::ToggleHelp,
        KeyCode::Esc => Action::CloseOverlay,
        KeyCode::Char('[') => Action::ToggleRunsSidebar,
        KeyCode::Char(']') => Action::ToggleOverviewSidebar,
        KeyCode::Char('l') => Action::ToggleConsoleLogs,
        KeyCode::Char('s') => Action::ToggleSystemMetrics,
        KeyCode::Tab => Action::FocusNext,
        KeyCode::BackTab => Action::FocusPrev,
        KeyCode::Up | KeyCode::Char('k') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') => Action::Down,
        KeyCode::Left => Action::PageUp,
        KeyCode::Right => Action::PageDown,
        KeyCode::Home | KeyCode::Char('g') => Action::Home,
        KeyCode::End | KeyCode::Char('G') => Action::ScrollToEnd,
        KeyCode::Char(' ') => Action::ToggleRunSelected,
        KeyCode::Char('p') => Action::TogglePin,
        KeyCode::Char('n') | KeyCode::PageDown => Action::NextChartPage,
        KeyCode::Char('N') | KeyCode::PageUp => Action::PrevChartPage,
        KeyCode::Char('m') => Action::NextSystemPage,
        KeyCode::Char('M') => Action::PrevSystemPage,
        KeyCode::Char('/') => Action::EnterFilter,
        KeyCode::Char('\\') => Action::EnterSystemFilter,
        KeyCode::Char('o') => Action::EnterOverviewFilter,
        _ => return None,
    };
    Some(action)
}

pub fn filter_input_for(key: KeyEvent) -> Option<FilterInput> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(FilterInput::Cancel),
            KeyCode::Char('l') => Some(FilterInput::Clear),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char(ch) => Some(FilterInput::Insert(ch)),
        KeyCode::Backspace => Some(FilterInput::Backspace),
        KeyCode::Tab => Some(FilterInput::ToggleMode),
        KeyCode::Enter => Some(FilterInput::Apply),
        KeyCode::Esc => Some(FilterInput::Cancel),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn panel_toggles_map_to_actions() {
        assert_eq!(action_for(key(KeyCode::Char('l')), false), Some(Action::ToggleConsoleLogs));
        assert_eq!(action_for(key(KeyCode::Char('[')), false), Some(Action::ToggleRunsSidebar));
        assert_eq!(action_for(key(KeyCode::Char(']')), false), Some(Action::ToggleOverviewSidebar));
        assert_eq!(action_for(key(KeyCode::BackTab), false), Some(Action::FocusPrev));
    }

    #[test]
    fn ctrl_chords_take_priority() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(action_for(ctrl_c, false), Some(Action::Quit));
        let ctrl_l = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(action_for(ctrl_l, false), Some(Action::ClearFilter));
    }

    #[test]
    fn help_overlay_swallows_most_keys() {
        assert_eq!(action_for(key(KeyCode::Char('l')), true), None);
        assert_eq!(action_for(key(KeyCode::Esc), true), Some(Action::CloseOverlay));
        assert_eq!(action_for(key(KeyCode::Char('?')), true), Some(Action::ToggleHelp));
    }

    #[test]
    fn filter_prompt_captures_printable_keys() {
        assert_eq!(filter_input_for(key(KeyCode::Char('q'))), Some(FilterInput::Insert('q')));
        assert_eq!(filter_input_for(key(KeyCode::Tab)), Some(FilterInput::ToggleMode));
        assert_eq!(filter_input_for(key(KeyCode::Enter)), Some(FilterInput::Apply));
        let ctrl_l = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(filter_input_for(ctrl_l), Some(FilterInput::Clear));
    }

    #[test]
    fn system_and_overview_filters_have_their_own_keys() {
        assert_eq!(action_for(key(KeyCode::Char('\\')), false), Some(Action::EnterSystemFilter));
        assert_eq!(action_for(key(KeyCode::Char('o')), false), Some(Action::EnterOverviewFilter));
        let ctrl_backslash = KeyEvent::new(KeyCode::Char('\\'), KeyModifiers::CONTROL);
        assert_eq!(action_for(ctrl_backslash, false), Some(Action::ClearSystemFilter));
        let ctrl_o = KeyEvent::new(KeyCode::Char('o'), KeyModifiers::CONTROL);
        assert_eq!(action_for(ctrl_o, false), Some(Action::ClearOverviewFilter));
    }

    #[test]
    fn unbound_keys_are_ignored() {
        assert_eq!(action_for(key(KeyCode::Char('z')), false), None);
        assert_eq!(action_for(key(KeyCode::F(5)), false), None);
    }
}
