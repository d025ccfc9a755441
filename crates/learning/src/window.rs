//! Rolling-hour admission window for auto-applications.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Counts events in the trailing hour, pruned on each use.
///
/// The cap is supplied per check rather than stored, so a template
/// settings change takes effect immediately. Capacity checks and
/// recording are separate: a caller only records once its work
/// actually happened, so no-ops never consume a slot.
#[derive(Debug, Default)]
pub struct RollingWindow {
    events: VecDeque<DateTime<Utc>>,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the trailing hour already holds `cap` events.
    pub fn at_capacity(&mut self, now: DateTime<Utc>, cap: usize) -> bool {
        let cutoff = now - Duration::hours(1);
        while self.events.front().is_some_and(|t| *t < cutoff) {
            self.events.pop_front();
        }
        self.events.len() >= cap
    }

    /// Record one admitted event at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.events.push_back(now);
    }

    /// Check-and-record in one step.
    pub fn try_acquire(&mut self, now: DateTime<Utc>, cap: usize) -> bool {
        if self.at_capacity(now, cap) {
            return false;
        }
        self.record(now);
        true
    }

    /// Events currently inside the window.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn admits_up_to_cap() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let mut w = RollingWindow::new();
        assert!(w.try_acquire(now, 2));
        assert!(w.try_acquire(now, 2));
        assert!(!w.try_acquire(now, 2));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn old_events_expire() {
        let start = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let mut w = RollingWindow::new();
        assert!(w.try_acquire(start, 1));
        assert!(!w.try_acquire(start + Duration::minutes(30), 1));
        assert!(w.try_acquire(start + Duration::minutes(61), 1));
    }

    #[test]
    fn raised_cap_applies_to_existing_window() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let mut w = RollingWindow::new();
        assert!(w.try_acquire(now, 1));
        assert!(!w.try_acquire(now, 1));
        assert!(w.try_acquire(now, 3));
    }

    #[test]
    fn unrecorded_check_consumes_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let mut w = RollingWindow::new();
        assert!(!w.at_capacity(now, 1));
        assert!(!w.at_capacity(now, 1));
        assert!(w.is_empty());
        w.record(now);
        assert!(w.at_capacity(now, 1));
    }
}
