use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window send budget for one dispatch run.
///
/// Constructed fresh for every invocation and threaded `&mut` through the
/// batch loop, so it only constrains sends within that run; cross-run pacing
/// comes from the external schedule. When the budget is exhausted the
/// dispatcher defers remaining work to the next invocation instead of
/// sleeping out the window.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    window_start: Instant,
    sent_in_window: u32,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Instant::now(),
            sent_in_window: 0,
        }
    }

    /// Remaining send budget in the current window. Callers clamp their batch
    /// to this value so the cap is never exceeded mid-batch. Resets the
    /// window lazily once 60 seconds have elapsed.
    pub fn allowance(&mut self) -> u32 {
        if self.window_start.elapsed() >= self.window {
            self.window_start = Instant::now();
            self.sent_in_window = 0;
        }
        self.limit.saturating_sub(self.sent_in_window)
    }

    /// Record `n` send attempts against the current window. Failures count
    /// too: the cap is on attempts issued, not on deliveries.
    pub fn record(&mut self, n: u32) {
        self.sent_in_window = self.sent_in_window.saturating_add(n);
    }
}
