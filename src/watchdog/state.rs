use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct WatchdogState {
    pub last_check_time: Instant,
    pub consecutive_unresponsive_ticks: u32,
}

impl WatchdogState {
    pub fn new(now: Instant) -> Self {
        Self {
            last_check_time: now,
            consecutive_unresponsive_ticks: 0,
        }
    }

    /// Records one tick at `now`.
    ///
    /// Returns `Some(true)` when the tick arrived on time, `Some(false)` once
    /// `required_ticks` late ticks have been seen back to back, and `None` for a
    /// late tick that has not reached that count yet.
    pub fn observe(&mut self, now: Instant, threshold: Duration, required_ticks: u32) -> Option<bool> {
        let elapsed = now.saturating_duration_since(self.last_check_time);
        self.last_check_time = now;

        if elapsed > threshold {
            self.consecutive_unresponsive_ticks = self.consecutive_unresponsive_ticks.saturating_add(1);
            if self.consecutive_unresponsive_ticks >= required_ticks {
                return Some(false);
            }
            return None;
        }

        self.consecutive_unresponsive_ticks = 0;
        Some(true)
    }
}
