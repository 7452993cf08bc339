use std::time::Duration;
use tokio::time::Instant;

/// Per-account fixed-window request budget.
///
/// Every admitted call bumps the counter. Once the counter exceeds the budget
/// the caller waits out the remainder of the window, after which the window
/// restarts from zero.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, now: Instant) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            window_start: now,
            count: 0,
        }
    }

    /// Record one call at `now`. Returns how long the caller must suspend
    /// before issuing it, or `None` when it may proceed immediately.
    ///
    /// When the budget is exceeded the window is reset as of `now`; the
    /// caller is expected to honor the returned wait before calling again.
    pub fn admit(&mut self, now: Instant) -> Option<Duration> {
        self.count += 1;
        if self.count <= self.max_requests {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        let wait = self.window.checked_sub(elapsed).filter(|d| !d.is_zero());

        self.count = 0;
        self.window_start = now + wait.unwrap_or_default();
        wait
    }

    /// Calls recorded in the current window
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }
}
