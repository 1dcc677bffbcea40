//! Per-user sliding-window admission control
//!
//! Counts admitted requests per user over a trailing wall-clock window,
//! pruning expired timestamps lazily on every call that touches a user's
//! record. Check ([`is_allowed`](RateLimiter::is_allowed)) and record
//! ([`record_request`](RateLimiter::record_request)) are deliberately separate
//! calls: two near-simultaneous requests at the limit boundary can both pass
//! the check before either records, a bounded overshoot the admission path
//! accepts.
//!
//! State is process-lifetime only; counts reset to zero on restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::UserId;

/// Sliding-window rate limiter keyed by user identity
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<UserId, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `max_requests` per user per `window`
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the user has a free slot in the current window
    pub fn is_allowed(&self, user: UserId) -> bool {
        self.with_pruned(user, |timestamps| {
            timestamps.map_or(0, VecDeque::len) < self.max_requests
        })
    }

    /// Record an admitted request for the user
    ///
    /// Callers must check [`is_allowed`](Self::is_allowed) first; the limiter
    /// appends unconditionally.
    pub fn record_request(&self, user: UserId) {
        let now = Instant::now();
        let mut map = self.lock_map();
        let timestamps = map.entry(user).or_default();
        Self::prune(timestamps, now, self.window);
        timestamps.push_back(now);
    }

    /// Remaining free slots for the user in the current window
    pub fn remaining(&self, user: UserId) -> usize {
        self.with_pruned(user, |timestamps| {
            self.max_requests
                .saturating_sub(timestamps.map_or(0, VecDeque::len))
        })
    }

    /// Seconds until the user's oldest counted request expires
    ///
    /// Returns 0 when the user has no live timestamps. Monotonically
    /// non-increasing as time advances with no new requests.
    pub fn reset_seconds(&self, user: UserId) -> u64 {
        let window = self.window;
        self.with_pruned(user, |timestamps| {
            timestamps
                .and_then(|ts| ts.front())
                .map_or(0, |oldest| {
                    let expires_at = *oldest + window;
                    expires_at
                        .saturating_duration_since(Instant::now())
                        .as_secs()
                })
        })
    }

    /// Prune a user's record and run `f` over what remains
    ///
    /// Records that are empty after pruning are evicted from the map so the
    /// per-user table does not grow without bound across all-time users.
    fn with_pruned<T>(&self, user: UserId, f: impl FnOnce(Option<&VecDeque<Instant>>) -> T) -> T {
        let now = Instant::now();
        let mut map = self.lock_map();
        if let Some(timestamps) = map.get_mut(&user) {
            Self::prune(timestamps, now, self.window);
            if timestamps.is_empty() {
                map.remove(&user);
                return f(None);
            }
        }
        f(map.get(&user))
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, VecDeque<Instant>>> {
        // A poisoned lock means a panic while holding it; the window state is
        // still structurally valid, so keep serving.
        match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.lock_map().len()
    }
}
