//! Fixed-window per-client rate limiter.
//!
//! Counts requests in non-overlapping, clock-aligned windows keyed by
//! `(client, window_index)`. Because windows are fixed rather than sliding, a
//! client can burst up to `max_requests` at the end of one window and again
//! at the start of the next — up to `2 * max_requests` in a short span. This
//! imprecision is accepted.
//!
//! Entries older than the previous window are swept whenever the clock
//! advances into a new window, keeping the counter map bounded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct RateLimiter {
    max_requests: u32,
    window_seconds: u64,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    counts: HashMap<(String, u64), u32>,
    latest_window: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds: window_seconds.max(1),
            state: Mutex::new(LimiterState {
                counts: HashMap::new(),
                latest_window: 0,
            }),
        }
    }

    /// Record one request from `client` and return whether it may proceed.
    ///
    /// Increment-and-compare runs under the lock, so concurrent requests from
    /// the same client never double-admit past the limit.
    pub fn check(&self, client: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(client, now)
    }

    fn check_at(&self, client: &str, now_secs: u64) -> bool {
        let window = now_secs / self.window_seconds;
        let mut state = self.state.lock().unwrap();

        if window > state.latest_window {
            // Old windows are never revisited; keep only the current and
            // previous window's counters.
            state.counts.retain(|(_, w), _| w + 1 >= window);
            state.latest_window = window;
        }

        let count = state
            .counts
            .entry((client.to_string(), window))
            .or_insert(0);
        *count += 1;
        *count <= self.max_requests
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.state.lock().unwrap().counts.len()
    }
}
