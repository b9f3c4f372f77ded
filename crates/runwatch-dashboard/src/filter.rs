use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Regex,
    Glob,
}

impl FilterMode {
    pub fn label(self) -> &'static str {
        match self {
            FilterMode::Regex => "regex",
            FilterMode::Glob => "glob",
        }
    }

    fn toggled(self) -> Self {
        match self {
            FilterMode::Regex => FilterMode::Glob,
            FilterMode::Glob => FilterMode::Regex,
        }
    }
}

/// Name filter with an editable draft and an applied pattern. Used for
/// metric charts, system charts and overview rows.
///
/// While editing, matching previews the draft; cancelling restores the
/// last applied pattern.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    applied: String,
    applied_mode: FilterMode,
    draft: String,
    mode: FilterMode,
    editing: bool,
    compiled: Option<Regex>,
    invalid: bool,
}

impl PatternFilter {
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_active(&self) -> bool {
        !self.effective_pattern().is_empty()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn applied(&self) -> &str {
        &self.applied
    }

    pub fn mode(&self) -> FilterMode {
        if self.editing {
            self.mode
        } else {
            self.applied_mode
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn begin(&mut self) {
        self.editing = true;
        self.draft = self.applied.clone();
        self.mode = self.applied_mode;
        self.recompile();
    }

    pub fn insert(&mut self, ch: char) {
        self.draft.push(ch);
        self.recompile();
    }

    pub fn backspace(&mut self) {
        self.draft.pop();
        self.recompile();
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
        self.recompile();
    }

    pub fn apply(&mut self) {
        self.applied = self.draft.clone();
        self.applied_mode = self.mode;
        self.editing = false;
        self.recompile();
    }

    pub fn cancel(&mut self) {
        self.editing = false;
        self.recompile();
    }

    pub fn clear(&mut self) {
        self.applied.clear();
        self.draft.clear();
        self.editing = false;
        self.recompile();
    }

    fn effective_pattern(&self) -> &str {
        if self.editing {
            &self.draft
        } else {
            &self.applied
        }
    }

    fn recompile(&mut self) {
        let pattern = self.effective_pattern().to_string();
        let mode = self.mode();
        self.invalid = false;
        self.compiled = None;
        if pattern.is_empty() {
            return;
        }
        let source = match mode {
            FilterMode::Regex => format!("(?i){pattern}"),
            FilterMode::Glob => glob_to_regex(&pattern),
        };
        match Regex::new(&source) {
            Ok(regex) => self.compiled = Some(regex),
            Err(_) => self.invalid = true,
        }
    }

    /// An empty pattern matches everything; an invalid one matches nothing.
    pub fn matches(&self, name: &str) -> bool {
        if self.invalid {
            return false;
        }
        match &self.compiled {
            Some(regex) => regex.is_match(name),
            None => true,
        }
    }
}

/// Globs without wildcards match as substrings, e.g. `loss` finds
/// `train/loss`.
fn glob_to_regex(glob: &str) -> String {
    let has_wildcard = glob.contains(['*', '?']);
    let mut out = String::from("(?i)");
    if has_wildcard {
        out.push('^');
    }
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    if has_wildcard {
        out.push('$');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(pattern: &str) -> PatternFilter {
        let mut filter = PatternFilter::default();
        filter.begin();
        for ch in pattern.chars() {
            filter.insert(ch);
        }
        filter
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = PatternFilter::default();
        assert!(filter.matches("train/loss"));
        assert!(!filter.is_active());
    }

    #[test]
    fn regex_preview_then_apply() {
        let mut filter = typed("^val/");
        assert!(filter.matches("val/acc"));
        assert!(!filter.matches("train/acc"));
        filter.apply();
        assert!(!filter.is_editing());
        assert!(filter.matches("VAL/loss"));
    }

    #[test]
    fn cancel_restores_applied_pattern() {
        let mut filter = typed("loss");
        filter.apply();
        filter.begin();
        filter.insert('x');
        assert!(!filter.matches("train/loss"));
        filter.cancel();
        assert!(filter.matches("train/loss"));
        assert_eq!(filter.applied(), "loss");
    }

    #[test]
    fn glob_mode() {
        let mut filter = typed("train/*");
        filter.toggle_mode();
        assert_eq!(filter.mode(), FilterMode::Glob);
        assert!(filter.matches("train/loss"));
        assert!(!filter.matches("val/train/loss"));

        filter.clear();
        let mut filter = typed("acc");
        filter.toggle_mode();
        assert!(filter.matches("val/accuracy"));
    }

    #[test]
    fn clear_while_editing_closes_prompt() {
        let mut filter = typed("loss");
        filter.apply();
        filter.begin();
        filter.insert('x');
        filter.clear();
        assert!(!filter.is_editing());
        assert!(!filter.is_active());
        assert!(filter.matches("val/acc"));
    }

    #[test]
    fn invalid_regex_matches_nothing() {
        let filter = typed("(unclosed");
        assert!(filter.is_invalid());
        assert!(!filter.matches("anything"));
    }
}
