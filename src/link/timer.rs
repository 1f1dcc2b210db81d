//! Logical clock driving restart and keepalive timers.
//!
//! Timers never block: the owner advances the clock and gets back the keys
//! that expired, which it then feeds into the same event path as packets.

use std::collections::HashMap;
use std::time::Duration;

/// Timer identity within one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Restart timer of the protocol with this number
    Restart(u16),
    /// LCP keepalive
    Echo,
}

/// Deadlines on a single logical clock
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    deadlines: HashMap<TimerKey, Duration>,
}

impl TimerQueue {
    /// Empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Arm (or re-arm) `key` to fire `after` from now
    pub fn arm(&mut self, key: TimerKey, after: Duration) {
        self.deadlines.insert(key, self.now + after);
    }

    /// Disarm `key`
    pub fn cancel(&mut self, key: TimerKey) {
        self.deadlines.remove(&key);
    }

    /// Disarm everything
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Whether `key` is armed
    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.deadlines.contains_key(&key)
    }

    /// Time until the earliest deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines
            .values()
            .min()
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    /// Move the clock forward and return expired keys, earliest first.
    /// Expired keys are disarmed.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<TimerKey> {
        self.now += elapsed;
        let mut expired: Vec<(Duration, TimerKey)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= self.now)
            .map(|(key, deadline)| (*deadline, *key))
            .collect();
        expired.sort_by_key(|(deadline, _)| *deadline);

        for (_, key) in &expired {
            self.deadlines.remove(key);
        }
        expired.into_iter().map(|(_, key)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.arm(TimerKey::Restart(0x8021), Duration::from_secs(3));
        timers.arm(TimerKey::Restart(0xc021), Duration::from_secs(1));
        timers.arm(TimerKey::Echo, Duration::from_secs(30));

        assert!(timers.advance(Duration::from_millis(500)).is_empty());
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(500)));

        let fired = timers.advance(Duration::from_secs(3));
        assert_eq!(
            fired,
            vec![TimerKey::Restart(0xc021), TimerKey::Restart(0x8021)]
        );
        assert!(timers.is_armed(TimerKey::Echo));
        assert!(!timers.is_armed(TimerKey::Restart(0xc021)));
    }

    #[test]
    fn test_rearm_and_cancel() {
        let mut timers = TimerQueue::new();
        timers.arm(TimerKey::Echo, Duration::from_secs(1));
        timers.advance(Duration::from_millis(900));
        timers.arm(TimerKey::Echo, Duration::from_secs(1));
        assert!(timers.advance(Duration::from_millis(200)).is_empty());

        timers.cancel(TimerKey::Echo);
        assert!(timers.advance(Duration::from_secs(5)).is_empty());
        assert_eq!(timers.next_deadline(), None);
    }
}
