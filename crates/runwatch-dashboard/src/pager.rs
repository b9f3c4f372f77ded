//! Virtualized, wrap-aware scroll state over an ordered list of items.
//!
//! Every scrollable panel (console logs, run list, chart grids, sidebar
//! sections) is a `Pager` with a different item type.

use crate::text::wrapped_line_count;
use std::ops::Range;

/// How many terminal rows an item needs at a given width.
pub trait PagerItem {
    fn rows(&self, _width: usize) -> usize {
        1
    }
}

impl PagerItem for String {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowPolicy {
    /// Stick to the newest item until the user scrolls away.
    Tail,
    /// Never follow; the window stays where the user left it.
    Off,
}

#[derive(Debug, Clone)]
pub struct Pager<T> {
    items: Vec<T>,
    cursor: usize,
    top: usize,
    auto_follow: bool,
    policy: FollowPolicy,
    last_width: usize,
    last_rows: usize,
}

impl<T> Default for Pager<T> {
    fn default() -> Self {
        Self::new(FollowPolicy::Tail)
    }
}

impl<T> Pager<T> {
    pub fn new(policy: FollowPolicy) -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
            top: 0,
            auto_follow: policy == FollowPolicy::Tail,
            policy,
            last_width: 0,
            last_rows: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn current(&self) -> Option<&T> {
        self.items.get(self.cursor)
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn viewport(&self) -> (usize, usize) {
        (self.last_width, self.last_rows)
    }
}

impl<T: PagerItem> Pager<T> {
    /// Replaces the whole item set.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.reconcile();
    }

    /// Replaces the item set after `evicted` items were dropped from the
    /// front, keeping the window on the same content.
    pub fn set_items_shifted(&mut self, items: Vec<T>, evicted: usize) {
        self.cursor = self.cursor.saturating_sub(evicted);
        self.top = self.top.saturating_sub(evicted);
        self.set_items(items);
    }

    pub fn append(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
        self.reconcile();
    }

    /// Records the content area the pager is drawn into.
    pub fn set_viewport(&mut self, width: usize, rows: usize) {
        if (width, rows) == (self.last_width, self.last_rows) {
            return;
        }
        self.last_width = width;
        self.last_rows = rows;
        self.reconcile();
    }

    fn reconcile(&mut self) {
        if self.items.is_empty() {
            self.cursor = 0;
            self.top = 0;
            self.auto_follow = self.policy == FollowPolicy::Tail;
            return;
        }
        let last = self.items.len() - 1;
        self.cursor = self.cursor.min(last);
        self.top = self.top.min(last);
        if self.auto_follow {
            self.scroll_to_end_inner();
        } else {
            self.ensure_cursor_visible();
        }
    }

    fn row_count(&self, index: usize) -> usize {
        if self.last_width == 0 {
            return 1;
        }
        self.items[index].rows(self.last_width).max(1)
    }

    pub fn up(&mut self) {
        if self.items.is_empty() {
            return;
        }
        if self.cursor == 0 {
            self.cursor = self.items.len() - 1;
            self.scroll_to_end_inner();
        } else {
            self.cursor -= 1;
            self.ensure_cursor_visible();
        }
        self.update_auto_follow();
    }

    pub fn down(&mut self) {
        if self.items.is_empty() {
            return;
        }
        if self.cursor == self.items.len() - 1 {
            self.cursor = 0;
            self.top = 0;
        } else {
            self.cursor += 1;
            self.ensure_cursor_visible();
        }
        self.update_auto_follow();
    }

    pub fn page_down(&mut self) {
        if self.items.is_empty() {
            return;
        }
        if self.last_rows == 0 {
            self.down();
            return;
        }
        let end = self.visible_end(self.top);
        if end >= self.items.len() {
            self.cursor = 0;
            self.top = 0;
            self.update_auto_follow();
            return;
        }
        self.top = end;
        self.cursor = end;
        self.ensure_cursor_visible();
        self.update_auto_follow();
    }

    pub fn page_up(&mut self) {
        if self.items.is_empty() {
            return;
        }
        if self.last_rows == 0 {
            self.up();
            return;
        }
        if self.top == 0 {
            self.cursor = self.items.len() - 1;
            self.scroll_to_end_inner();
            self.update_auto_follow();
            return;
        }

        let rows = self.last_rows;
        let mut new_top = self.top;
        let mut used = 0;
        while new_top > 0 && used < rows {
            let h = self.row_count(new_top - 1);
            if used + h > rows && used > 0 {
                break;
            }
            used += h.min(rows - used);
            new_top -= 1;
        }
        self.top = new_top;
        self.cursor = new_top;
        self.ensure_cursor_visible();
        self.update_auto_follow();
    }

    pub fn home(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.cursor = 0;
        self.top = 0;
        self.update_auto_follow();
    }

    /// Jumps to the newest item and resumes following it.
    pub fn scroll_to_end(&mut self) {
        self.auto_follow = self.policy == FollowPolicy::Tail;
        self.scroll_to_end_inner();
    }

    /// Moves the cursor to `index` (clamped), e.g. on a mouse click.
    pub fn select(&mut self, index: usize) {
        if self.items.is_empty() {
            return;
        }
        self.cursor = index.min(self.items.len() - 1);
        self.ensure_cursor_visible();
        self.update_auto_follow();
    }

    fn update_auto_follow(&mut self) {
        if self.policy == FollowPolicy::Off {
            self.auto_follow = false;
            return;
        }
        if self.items.is_empty() {
            self.auto_follow = true;
            return;
        }
        if self.cursor == self.items.len() - 1 {
            self.auto_follow = true;
            self.scroll_to_end_inner();
            return;
        }
        self.auto_follow = false;
    }

    pub fn ensure_cursor_visible(&mut self) {
        if self.items.is_empty() {
            self.cursor = 0;
            self.top = 0;
            return;
        }
        let last = self.items.len() - 1;
        self.cursor = self.cursor.min(last);
        self.top = self.top.min(last);
        if self.last_rows == 0 {
            // collapsed; keep the scroll position for when it opens again
            return;
        }

        if self.cursor < self.top {
            self.top = self.cursor;
            return;
        }
        while self.cursor >= self.visible_end(self.top) && self.top < last {
            self.top += 1;
        }
    }

    fn scroll_to_end_inner(&mut self) {
        if self.items.is_empty() {
            self.cursor = 0;
            self.top = 0;
            return;
        }
        self.cursor = self.items.len() - 1;
        let rows = self.last_rows;
        if rows == 0 {
            self.top = self.cursor;
            return;
        }

        let mut top = self.cursor;
        let mut used = self.row_count(top).min(rows);
        while top > 0 && used < rows {
            let h = self.row_count(top - 1);
            if used + h > rows {
                break;
            }
            used += h;
            top -= 1;
        }
        self.top = top;
    }

    /// Exclusive end of the items that fit in the viewport starting at
    /// `start`. A partially fitting trailing item counts as visible.
    pub fn visible_end(&self, start: usize) -> usize {
        if self.items.is_empty() {
            return 0;
        }
        let rows = self.last_rows;
        let mut used = 0;
        let mut i = start.min(self.items.len() - 1);
        while i < self.items.len() && used < rows {
            used += self.row_count(i).min(rows - used);
            i += 1;
        }
        i
    }

    pub fn visible_range(&self) -> Range<usize> {
        self.top..self.visible_end(self.top)
    }

    pub fn visible(&self) -> &[T] {
        &self.items[self.visible_range()]
    }

    /// `[X-Y of N]` for the current window, or `None` when empty.
    pub fn nav_info(&self) -> Option<String> {
        if self.items.is_empty() {
            return None;
        }
        let range = self.visible_range();
        Some(format!(
            "[{}-{} of {}]",
            range.start + 1,
            range.end,
            self.items.len()
        ))
    }
}

impl PagerItem for runwatch_core::console::ConsoleLine {
    fn rows(&self, width: usize) -> usize {
        wrapped_line_count(self.text(), width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Line(String);

    impl PagerItem for Line {
        fn rows(&self, width: usize) -> usize {
            wrapped_line_count(&self.0, width)
        }
    }

    fn lines(range: Range<usize>) -> Vec<Line> {
        range.map(|i| Line(format!("line {i}"))).collect()
    }

    fn pager(count: usize, rows: usize) -> Pager<Line> {
        let mut pager = Pager::new(FollowPolicy::Tail);
        pager.set_viewport(80, rows);
        pager.set_items(lines(0..count));
        pager
    }

    #[test]
    fn follow_scroll_up_append_then_scroll_to_end() {
        let mut pager = pager(10, 2);
        assert_eq!(pager.nav_info().as_deref(), Some("[9-10 of 10]"));
        assert!(pager.auto_follow());

        pager.up();
        assert!(!pager.auto_follow());
        pager.append(lines(10..11));
        assert_eq!(pager.nav_info().as_deref(), Some("[9-10 of 11]"));

        pager.scroll_to_end();
        assert_eq!(pager.nav_info().as_deref(), Some("[10-11 of 11]"));
        assert!(pager.auto_follow());
    }

    #[test]
    fn page_down_at_end_wraps_to_start_and_back() {
        let mut pager = pager(5, 2);
        assert_eq!(pager.nav_info().as_deref(), Some("[4-5 of 5]"));

        pager.page_down();
        assert_eq!(pager.nav_info().as_deref(), Some("[1-2 of 5]"));
        assert_eq!(pager.cursor(), 0);
        assert!(!pager.auto_follow());

        pager.page_up();
        assert_eq!(pager.nav_info().as_deref(), Some("[4-5 of 5]"));
        assert!(pager.auto_follow());
    }

    #[test]
    fn paging_walks_screenfuls() {
        let mut pager = pager(5, 2);
        pager.home();
        pager.page_down();
        assert_eq!(pager.nav_info().as_deref(), Some("[3-4 of 5]"));
        // landing on the last item resumes following and re-anchors the tail
        pager.page_down();
        assert_eq!(pager.nav_info().as_deref(), Some("[4-5 of 5]"));
        assert!(pager.auto_follow());
        pager.page_up();
        assert_eq!(pager.nav_info().as_deref(), Some("[2-3 of 5]"));
        assert!(!pager.auto_follow());
    }

    #[test]
    fn collapsed_viewport_keeps_scroll_position() {
        let mut pager = pager(10, 3);
        pager.home();
        pager.down();
        assert_eq!(pager.cursor(), 1);
        assert_eq!(pager.nav_info().as_deref(), Some("[1-3 of 10]"));

        pager.set_viewport(80, 0);
        assert_eq!(pager.top(), 0);
        pager.set_viewport(80, 3);
        assert_eq!(pager.cursor(), 1);
        assert_eq!(pager.nav_info().as_deref(), Some("[1-3 of 10]"));
    }

    #[test]
    fn up_and_down_wrap_at_the_ends() {
        let mut pager = pager(5, 2);
        pager.down();
        assert_eq!(pager.cursor(), 0);
        assert_eq!(pager.nav_info().as_deref(), Some("[1-2 of 5]"));

        pager.up();
        assert_eq!(pager.cursor(), 4);
        assert!(pager.auto_follow());
        assert_eq!(pager.nav_info().as_deref(), Some("[4-5 of 5]"));
    }

    #[test]
    fn appending_while_following_shows_last_item() {
        let mut pager = pager(3, 2);
        for batch in 0..4 {
            let start = 3 + batch * 3;
            pager.append(lines(start..start + 3));
            let range = pager.visible_range();
            assert_eq!(range.end, pager.len());
            assert_eq!(pager.cursor(), pager.len() - 1);
        }
    }

    #[test]
    fn appending_after_scrolling_away_keeps_window() {
        let mut pager = pager(20, 4);
        for _ in 0..7 {
            pager.up();
        }
        let top = pager.top();
        let shown = pager.items()[top].clone();
        pager.append(lines(20..40));
        assert_eq!(pager.top(), top);
        assert_eq!(pager.items()[pager.top()], shown);
        assert!(pager.visible_range().contains(&pager.cursor()));
    }

    #[test]
    fn wrapped_items_consume_multiple_rows() {
        let mut pager = Pager::new(FollowPolicy::Tail);
        pager.set_viewport(4, 3);
        pager.set_items(vec![
            Line("aaaa".into()),
            Line("bbbbbbbb".into()),
            Line("cc".into()),
            Line("dddddddddddd".into()),
        ]);
        // the last item alone fills the three rows
        assert_eq!(pager.visible_range(), 3..4);

        pager.home();
        assert_eq!(pager.visible_range(), 0..2);
        assert_eq!(pager.visible_end(1), 3);

        // a partially fitting trailing item still counts as visible
        pager.page_down();
        assert_eq!(pager.top(), 2);
        assert_eq!(pager.visible_range(), 2..4);
        pager.page_up();
        assert_eq!(pager.top(), 0);
    }

    #[test]
    fn zero_width_counts_one_row_per_item() {
        let mut pager = Pager::new(FollowPolicy::Tail);
        pager.set_viewport(0, 2);
        pager.set_items(vec![Line("x".repeat(500)), Line("y".repeat(500)), Line("z".into())]);
        assert_eq!(pager.visible_range(), 1..3);
    }

    #[test]
    fn empty_list_resets_and_follows() {
        let mut pager = pager(10, 2);
        pager.up();
        pager.up();
        assert!(!pager.auto_follow());
        pager.set_items(Vec::new());
        assert_eq!(pager.cursor(), 0);
        assert_eq!(pager.top(), 0);
        assert!(pager.auto_follow());
        assert!(pager.nav_info().is_none());

        pager.up();
        pager.page_down();
        assert_eq!(pager.cursor(), 0);
    }

    #[test]
    fn shrinking_replacement_clamps_cursor() {
        let mut pager = pager(10, 3);
        pager.home();
        pager.select(6);
        pager.set_items(lines(0..4));
        assert_eq!(pager.cursor(), 3);
        assert!(pager.visible_range().contains(&3));
    }

    #[test]
    fn eviction_shift_keeps_content_in_view() {
        let mut pager = pager(10, 3);
        pager.select(4);
        let shown = pager.current().cloned();
        let mut kept = lines(2..10);
        kept.extend(lines(10..12));
        pager.set_items_shifted(kept, 2);
        assert_eq!(pager.current().cloned(), shown);
    }

    #[test]
    fn off_policy_never_follows() {
        let mut pager: Pager<String> = Pager::new(FollowPolicy::Off);
        pager.set_viewport(0, 3);
        pager.set_items((0..7).map(|i| format!("chart {i}")).collect());
        assert_eq!(pager.visible_range(), 0..3);
        pager.page_down();
        pager.page_down();
        assert_eq!(pager.visible_range(), 6..7);
        assert!(!pager.auto_follow());
        pager.page_down();
        assert_eq!(pager.visible_range(), 0..3);
        pager.page_up();
        assert_eq!(pager.visible_range(), 4..7);
        assert!(!pager.auto_follow());
    }

    #[test]
    fn resizing_while_following_keeps_tail() {
        let mut pager = pager(10, 2);
        pager.set_viewport(80, 5);
        assert_eq!(pager.visible_range(), 5..10);
    }
}
