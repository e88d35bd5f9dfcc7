use std::time::Duration;

/// Delay schedule between the sessions of one device. Every failed session doubles the delay up to `cap`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    failures: u32,
    base: Duration,
    cap: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { failures: 0, base, cap }
    }

    /// Called after a session that ended cleanly.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Returns the delay before the next session and advances the schedule.
    /// Always zero for a zero base.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base.saturating_mul(1u32 << self.failures.min(31)).min(self.cap);
        self.failures = self.failures.saturating_add(1);
        delay
    }
}
