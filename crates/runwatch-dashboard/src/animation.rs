use std::time::{Duration, Instant};

pub const DEFAULT_ANIMATION_DURATION: Duration = Duration::from_millis(150);
pub const DEFAULT_ANIMATION_FRAME: Duration = Duration::from_millis(16);

/// A panel dimension that eases between 0 and its expanded size.
#[derive(Debug, Clone)]
pub struct AnimatedValue {
    current: u16,
    target: u16,
    expanded: u16,
    start: Option<Instant>,
    duration: Duration,
}

impl AnimatedValue {
    pub fn new(expanded: u16, visible: bool, duration: Duration) -> Self {
        let initial = if visible { expanded } else { 0 };
        Self {
            current: initial,
            target: initial,
            expanded,
            start: None,
            duration,
        }
    }

    pub fn value(&self) -> u16 {
        self.current
    }

    pub fn expanded(&self) -> u16 {
        self.expanded
    }

    pub fn is_animating(&self) -> bool {
        self.start.is_some()
    }

    /// Anything on screen, including mid-animation.
    pub fn is_visible(&self) -> bool {
        self.current > 0
    }

    pub fn is_expanded(&self) -> bool {
        self.target > 0 && self.current == self.target
    }

    pub fn is_collapsed(&self) -> bool {
        self.target == 0 && self.current == 0
    }

    /// Expanded or on its way there.
    pub fn is_open(&self) -> bool {
        self.target > 0
    }

    pub fn is_expanding(&self) -> bool {
        self.is_animating() && self.target > 0
    }

    pub fn is_collapsing(&self) -> bool {
        self.is_animating() && self.target == 0
    }

    /// Starts animating towards the opposite state. Ignored while a previous
    /// animation is still in flight; returns whether the toggle was accepted.
    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.is_animating() {
            return false;
        }
        self.target = if self.target > 0 { 0 } else { self.expanded };
        if self.target == self.current {
            return true;
        }
        self.start = Some(now);
        true
    }

    /// Advances towards the target. Returns true once at rest.
    pub fn update(&mut self, now: Instant) -> bool {
        let Some(start) = self.start else {
            self.current = self.target;
            return true;
        };

        let progress = if self.duration.is_zero() {
            1.0
        } else {
            now.saturating_duration_since(start).as_secs_f64() / self.duration.as_secs_f64()
        };
        if progress >= 1.0 {
            self.current = self.target;
            self.start = None;
            return true;
        }

        let eased = ease_out_cubic(progress);
        let expanded = f64::from(self.expanded);
        let next = if self.target > 0 {
            eased * expanded
        } else {
            (1.0 - eased) * expanded
        };
        self.current = (next.round() as u16).min(self.expanded);
        false
    }

    /// Changes the expanded size. Snaps immediately when stably expanded so a
    /// resize never animates; otherwise only the future target moves.
    pub fn set_expanded(&mut self, size: u16) {
        if self.is_expanded() && !self.is_animating() {
            self.expanded = size;
            self.current = size;
            self.target = size;
            return;
        }
        self.expanded = size;
        if self.target > 0 {
            self.target = size;
        }
        self.current = self.current.min(size);
    }

    pub fn force_expand(&mut self) {
        self.current = self.expanded;
        self.target = self.expanded;
        self.start = None;
    }

    pub fn force_collapse(&mut self) {
        self.current = 0;
        self.target = 0;
        self.start = None;
    }
}

fn ease_out_cubic(t: f64) -> f64 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION: Duration = Duration::from_millis(100);

    #[test]
    fn toggle_expands_to_full_size() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(40, false, DURATION);
        assert!(value.is_collapsed());

        assert!(value.toggle(start));
        assert!(value.is_expanding());
        assert!(!value.update(start + Duration::from_millis(50)));
        let mid = value.value();
        assert!(mid > 20 && mid < 40, "ease-out should pass halfway early: {mid}");

        assert!(value.update(start + DURATION));
        assert_eq!(value.value(), 40);
        assert!(value.is_expanded());
        assert!(!value.is_animating());
    }

    #[test]
    fn toggle_mid_flight_is_ignored() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(30, true, DURATION);
        assert!(value.toggle(start));
        value.update(start + Duration::from_millis(20));

        assert!(!value.toggle(start + Duration::from_millis(30)));
        assert!(value.is_collapsing());

        assert!(value.update(start + Duration::from_millis(200)));
        assert!(value.is_collapsed());
    }

    #[test]
    fn value_stays_in_bounds_across_updates() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(17, false, DURATION);
        let mut now = start;
        for round in 0..6 {
            value.toggle(now);
            for _ in 0..15 {
                now += Duration::from_millis(7 + round);
                value.update(now);
                assert!(value.value() <= 17);
            }
        }
    }

    #[test]
    fn set_expanded_snaps_when_stably_expanded() {
        let mut value = AnimatedValue::new(40, true, DURATION);
        value.set_expanded(60);
        assert_eq!(value.value(), 60);
        assert!(value.is_expanded());
    }

    #[test]
    fn set_expanded_defers_while_collapsed() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(40, false, DURATION);
        value.set_expanded(60);
        assert_eq!(value.value(), 0);
        assert!(value.is_collapsed());

        value.toggle(start);
        value.update(start + DURATION);
        assert_eq!(value.value(), 60);
    }

    #[test]
    fn shrinking_mid_expand_retargets() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(40, false, DURATION);
        value.toggle(start);
        value.update(start + Duration::from_millis(90));
        value.set_expanded(10);
        assert!(value.value() <= 10);
        value.update(start + DURATION);
        assert_eq!(value.value(), 10);
    }

    #[test]
    fn force_helpers_skip_animation() {
        let mut value = AnimatedValue::new(12, false, DURATION);
        value.force_expand();
        assert!(value.is_expanded());
        value.force_collapse();
        assert!(value.is_collapsed());
    }
}
