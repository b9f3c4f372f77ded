//! Keyboard focus arbitration across dashboard regions.

use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn step(self, index: usize, by: usize, len: usize) -> usize {
        match self {
            Direction::Forward => (index + by) % len,
            Direction::Backward => (index + len - (by % len)) % len,
        }
    }
}

/// What the controller currently knows about one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionInfo {
    pub available: bool,
    /// Focusable sub-sections; zero for plain regions.
    pub sections: usize,
}

impl RegionInfo {
    pub fn plain(available: bool) -> Self {
        Self {
            available,
            sections: 0,
        }
    }

    pub fn composite(available: bool, sections: usize) -> Self {
        Self {
            available: available && sections > 0,
            sections,
        }
    }
}

/// Exactly one region owns focus at any time. Composite regions also track
/// which of their sub-sections is active.
#[derive(Debug, Clone)]
pub struct FocusController<R> {
    order: Vec<R>,
    default: R,
    current: R,
    section: usize,
}

impl<R: Copy + Eq + Debug> FocusController<R> {
    /// `order` is the canonical Tab order; `default` is the region focused
    /// when nothing else is available.
    pub fn new(order: Vec<R>, default: R) -> Self {
        Self {
            order,
            default,
            current: default,
            section: 0,
        }
    }

    pub fn current(&self) -> R {
        self.current
    }

    pub fn is_focused(&self, region: R) -> bool {
        self.current == region
    }

    /// Active sub-section of `region`, if it is the focused region.
    pub fn section_of(&self, region: R) -> Option<usize> {
        (self.current == region).then_some(self.section)
    }

    fn index_of(&self, region: R) -> Option<usize> {
        self.order.iter().position(|r| *r == region)
    }

    /// Focuses `region`, entering a composite at its first or last section.
    pub fn activate(&mut self, region: R, direction: Direction, info: impl Fn(R) -> RegionInfo) {
        let sections = info(region).sections;
        self.current = region;
        self.section = match direction {
            Direction::Forward => 0,
            Direction::Backward => sections.saturating_sub(1),
        };
    }

    /// Focuses a specific section of a composite region (mouse click).
    pub fn activate_section(&mut self, region: R, section: usize, info: impl Fn(R) -> RegionInfo) {
        let sections = info(region).sections;
        self.current = region;
        self.section = section.min(sections.saturating_sub(1));
    }

    /// Moves between sub-sections of the focused composite region. Returns
    /// false at a boundary, where focus should leave the region instead.
    pub fn cycle_within_composite(
        &mut self,
        direction: Direction,
        info: impl Fn(R) -> RegionInfo,
    ) -> bool {
        let current = info(self.current);
        if !current.available || current.sections == 0 {
            return false;
        }
        match direction {
            Direction::Forward if self.section + 1 < current.sections => {
                self.section += 1;
                true
            }
            Direction::Backward if self.section > 0 => {
                self.section -= 1;
                true
            }
            _ => false,
        }
    }

    /// Focuses the next available region in `direction`, wrapping. Leaves
    /// focus untouched when no other region is available.
    pub fn cycle(&mut self, direction: Direction, info: impl Fn(R) -> RegionInfo) {
        let len = self.order.len();
        if len == 0 {
            return;
        }
        let start = self.index_of(self.current).unwrap_or(match direction {
            Direction::Forward => len - 1,
            Direction::Backward => 0,
        });
        for step in 1..=len {
            let candidate = self.order[direction.step(start, step, len)];
            if info(candidate).available {
                self.activate(candidate, direction, &info);
                return;
            }
        }
    }

    /// Tab / Shift+Tab: sub-sections first, then neighbouring regions.
    pub fn tab(&mut self, direction: Direction, info: impl Fn(R) -> RegionInfo) {
        if !self.cycle_within_composite(direction, &info) {
            self.cycle(direction, &info);
        }
    }

    /// Repairs focus after panels appeared, disappeared or emptied.
    pub fn resolve_after_visibility_change(&mut self, info: impl Fn(R) -> RegionInfo) {
        if info(self.current).available {
            self.clamp_section(&info);
            return;
        }

        let len = self.order.len();
        let start = self.index_of(self.current).unwrap_or(len.saturating_sub(1));
        let next = (1..=len)
            .map(|step| self.order[Direction::Forward.step(start, step, len)])
            .find(|candidate| info(*candidate).available);
        let target = next.unwrap_or(self.default);
        self.activate(target, Direction::Forward, &info);
    }

    /// Keeps the active section inside the focused region's section count.
    pub fn clamp_section(&mut self, info: impl Fn(R) -> RegionInfo) {
        let sections = info(self.current).sections;
        self.section = self.section.min(sections.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Region {
        Runs,
        Charts,
        Logs,
        Overview,
    }

    struct Avail {
        runs: bool,
        charts: bool,
        logs: bool,
        overview_sections: usize,
    }

    impl Avail {
        fn all() -> Self {
            Self {
                runs: true,
                charts: true,
                logs: true,
                overview_sections: 3,
            }
        }

        fn info(&self) -> impl Fn(Region) -> RegionInfo + '_ {
            move |region| match region {
                Region::Runs => RegionInfo::plain(self.runs),
                Region::Charts => RegionInfo::plain(self.charts),
                Region::Logs => RegionInfo::plain(self.logs),
                Region::Overview => RegionInfo::composite(true, self.overview_sections),
            }
        }
    }

    fn controller() -> FocusController<Region> {
        FocusController::new(
            vec![Region::Runs, Region::Charts, Region::Logs, Region::Overview],
            Region::Runs,
        )
    }

    #[test]
    fn tab_walks_regions_and_sections_in_order() {
        let avail = Avail::all();
        let mut focus = controller();
        let mut seen = Vec::new();
        for _ in 0..7 {
            focus.tab(Direction::Forward, avail.info());
            seen.push((focus.current(), focus.section_of(Region::Overview)));
        }
        assert_eq!(
            seen,
            vec![
                (Region::Charts, None),
                (Region::Logs, None),
                (Region::Overview, Some(0)),
                (Region::Overview, Some(1)),
                (Region::Overview, Some(2)),
                (Region::Runs, None),
                (Region::Charts, None),
            ]
        );
    }

    #[test]
    fn shift_tab_enters_composite_at_last_section() {
        let avail = Avail::all();
        let mut focus = controller();
        focus.tab(Direction::Backward, avail.info());
        assert_eq!(focus.current(), Region::Overview);
        assert_eq!(focus.section_of(Region::Overview), Some(2));
        focus.tab(Direction::Backward, avail.info());
        assert_eq!(focus.section_of(Region::Overview), Some(1));
    }

    #[test]
    fn cycle_skips_unavailable_regions() {
        let avail = Avail {
            charts: false,
            logs: false,
            ..Avail::all()
        };
        let mut focus = controller();
        focus.cycle(Direction::Forward, avail.info());
        assert_eq!(focus.current(), Region::Overview);
    }

    #[test]
    fn cycle_with_nothing_else_available_keeps_focus() {
        let avail = Avail {
            runs: true,
            charts: false,
            logs: false,
            overview_sections: 0,
        };
        let mut focus = controller();
        focus.tab(Direction::Forward, avail.info());
        assert_eq!(focus.current(), Region::Runs);
    }

    #[test]
    fn collapsing_focused_region_moves_forward() {
        let mut avail = Avail::all();
        let mut focus = controller();
        focus.activate(Region::Logs, Direction::Forward, avail.info());

        avail.logs = false;
        focus.resolve_after_visibility_change(avail.info());
        assert_eq!(focus.current(), Region::Overview);
        assert_eq!(focus.section_of(Region::Overview), Some(0));
    }

    #[test]
    fn resolution_wraps_past_the_end_of_the_order() {
        let mut avail = Avail::all();
        let mut focus = controller();
        focus.activate(Region::Overview, Direction::Forward, avail.info());

        avail.overview_sections = 0;
        focus.resolve_after_visibility_change(avail.info());
        assert_eq!(focus.current(), Region::Runs);
    }

    #[test]
    fn collapsing_other_region_keeps_focus() {
        let mut avail = Avail::all();
        let mut focus = controller();
        focus.activate(Region::Logs, Direction::Forward, avail.info());

        avail.overview_sections = 0;
        avail.runs = false;
        focus.resolve_after_visibility_change(avail.info());
        assert_eq!(focus.current(), Region::Logs);
    }

    #[test]
    fn nothing_available_falls_back_to_default() {
        let avail = Avail {
            runs: false,
            charts: false,
            logs: false,
            overview_sections: 0,
        };
        let mut focus = controller();
        focus.activate(Region::Charts, Direction::Forward, Avail::all().info());
        focus.resolve_after_visibility_change(avail.info());
        assert_eq!(focus.current(), Region::Runs);
    }

    #[test]
    fn shrinking_composite_clamps_section() {
        let mut avail = Avail::all();
        let mut focus = controller();
        focus.activate(Region::Overview, Direction::Backward, avail.info());
        assert_eq!(focus.section_of(Region::Overview), Some(2));

        avail.overview_sections = 2;
        focus.resolve_after_visibility_change(avail.info());
        assert_eq!(focus.section_of(Region::Overview), Some(1));
    }

    #[test]
    fn only_one_region_is_ever_focused() {
        let avail = Avail::all();
        let mut focus = controller();
        for i in 0..20 {
            let direction = if i % 3 == 0 {
                Direction::Backward
            } else {
                Direction::Forward
            };
            focus.tab(direction, avail.info());
            let focused = [Region::Runs, Region::Charts, Region::Logs, Region::Overview]
                .into_iter()
                .filter(|r| focus.is_focused(*r))
                .count();
            assert_eq!(focused, 1);
        }
    }
}
