//! Display-width aware wrapping shared by the pager and the renderer, so
//! scroll arithmetic and drawn rows always agree.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const ELLIPSIS: char = '…';

pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Splits `text` into rows no wider than `width` columns. Always yields at
/// least one row; zero width yields the text unwrapped.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width && used > 0 {
            rows.push(std::mem::take(&mut row));
            used = 0;
        }
        row.push(ch);
        used += w;
    }
    rows.push(row);
    rows
}

/// Number of rows `text` occupies at `width`; never less than one.
pub fn wrapped_line_count(text: &str, width: usize) -> usize {
    if width == 0 || text.is_empty() {
        return 1;
    }
    let mut rows = 1usize;
    let mut used = 0usize;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width && used > 0 {
            rows += 1;
            used = 0;
        }
        used += w;
    }
    rows
}

/// Truncates `text` to `width` columns, marking the cut with an ellipsis.
pub fn with_ellipsis(text: &str, width: usize) -> String {
    if display_width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let budget = width - 1;
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_text_splits_on_width() {
        assert_eq!(wrap_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(wrap_text("abc", 3), vec!["abc"]);
        assert_eq!(wrap_text("", 3), vec![""]);
        assert_eq!(wrap_text("abc", 0), vec!["abc"]);
    }

    #[test]
    fn wide_chars_do_not_straddle_rows() {
        assert_eq!(wrap_text("a日本", 2), vec!["a", "日", "本"]);
        assert_eq!(wrapped_line_count("a日本", 2), 3);
    }

    #[test]
    fn line_count_matches_wrap() {
        for text in ["", "x", "hello world", "a much longer line of console output"] {
            for width in 1..12 {
                assert_eq!(
                    wrapped_line_count(text, width),
                    wrap_text(text, width).len(),
                    "text={text:?} width={width}"
                );
            }
        }
        assert_eq!(wrapped_line_count("anything at all", 0), 1);
    }

    #[test]
    fn ellipsis_truncation() {
        assert_eq!(with_ellipsis("hello", 10), "hello");
        assert_eq!(with_ellipsis("hello", 5), "hello");
        assert_eq!(with_ellipsis("hello world", 6), "hello…");
        assert_eq!(with_ellipsis("hello", 1), "…");
        assert_eq!(with_ellipsis("hello", 0), "");
    }
}
