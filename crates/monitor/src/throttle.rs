//! Cooldown throttling for outgoing alerts.
//!
//! Process-local by design: the deployment target is single-instance.
//! Stale keys are pruned opportunistically on each write so the map
//! cannot grow without bound.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Keys idle longer than this are pruned.
const STALE_AFTER: Duration = Duration::from_secs(3600);

/// Tracks when each alert key last fired.
#[derive(Debug, Default)]
pub struct AlertThrottle {
    last_sent: HashMap<String, Instant>,
}

impl AlertThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an alert for `key` may fire at `now`, recording it if so.
    pub fn should_send_at(&mut self, key: &str, cooldown: Duration, now: Instant) -> bool {
        self.prune(now);
        match self.last_sent.get(key) {
            Some(last) if now.duration_since(*last) < cooldown => false,
            _ => {
                self.last_sent.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Convenience wrapper using the current time.
    pub fn should_send(&mut self, key: &str, cooldown: Duration) -> bool {
        self.should_send_at(key, cooldown, Instant::now())
    }

    fn prune(&mut self, now: Instant) {
        self.last_sent
            .retain(|_, last| now.duration_since(*last) < STALE_AFTER);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(300);

    #[test]
    fn first_send_passes_second_is_suppressed() {
        let mut t = AlertThrottle::new();
        let now = Instant::now();
        assert!(t.should_send_at("routing_failure:tpl_1", COOLDOWN, now));
        assert!(!t.should_send_at(
            "routing_failure:tpl_1",
            COOLDOWN,
            now + Duration::from_secs(60)
        ));
    }

    #[test]
    fn passes_again_after_cooldown() {
        let mut t = AlertThrottle::new();
        let now = Instant::now();
        assert!(t.should_send_at("k", COOLDOWN, now));
        assert!(t.should_send_at("k", COOLDOWN, now + COOLDOWN));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let mut t = AlertThrottle::new();
        let now = Instant::now();
        assert!(t.should_send_at("a:tpl_1", COOLDOWN, now));
        assert!(t.should_send_at("a:tpl_2", COOLDOWN, now));
        assert!(t.should_send_at("b:tpl_1", COOLDOWN, now));
    }

    #[test]
    fn stale_keys_are_pruned_on_write() {
        let mut t = AlertThrottle::new();
        let now = Instant::now();
        t.should_send_at("old", COOLDOWN, now);
        assert_eq!(t.len(), 1);

        t.should_send_at("new", COOLDOWN, now + STALE_AFTER + Duration::from_secs(1));
        assert_eq!(t.len(), 1, "stale key must have been pruned");
    }
}
