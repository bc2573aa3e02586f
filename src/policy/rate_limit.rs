//! Fixed-window rate limiting
//!
//! Counts requests per proxy id inside aligned wall-clock windows. The
//! check and the count are one operation under the per-key shard lock,
//! so concurrent callers cannot both slip under the limit. Stale
//! windows reset lazily on the next hit; [`FixedWindowLimiter::sweep`]
//! drops keys that have gone quiet.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    /// Window index, `timestamp / window_seconds`
    slot: i64,
    count: u32,
}

/// Concurrent fixed-window counter keyed by proxy id
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    windows: Arc<DashMap<String, WindowCounter>>,
    window_seconds: i64,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            window_seconds: window.as_secs().max(1) as i64,
        }
    }

    /// Count one request against `key` if the window still has room.
    ///
    /// Returns false without counting when the window already holds
    /// `limit` requests.
    pub fn check_and_count(&self, key: &str, limit: u32, now: DateTime<Utc>) -> bool {
        let slot = now.timestamp().div_euclid(self.window_seconds);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(WindowCounter { slot, count: 0 });

        if entry.slot != slot {
            entry.slot = slot;
            entry.count = 0;
        }

        if entry.count >= limit {
            return false;
        }

        entry.count += 1;
        true
    }

    /// Drop counters whose window has already closed.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let current_slot = now.timestamp().div_euclid(self.window_seconds);
        self.windows.retain(|_, counter| counter.slot >= current_slot);
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
