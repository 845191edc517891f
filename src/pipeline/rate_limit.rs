use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RateLimitSettings;
use crate::time::SharedClock;

/// Admission decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Seconds until the current window expires, set when rejected
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter keyed by `route:caller`.
///
/// Each key maps to `(window_start, count)`; a request increments the count
/// while the window is open and resets it once the window has elapsed.
/// Distinct routes use distinct key namespaces, so one route's budget never
/// starves another.
///
/// Counters live in process memory, which is only correct for a single
/// instance; horizontally scaled deployments need an external counting
/// store. Best-effort abuse guard, not an exact accounting ledger.
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
    clock: SharedClock,
}

impl FixedWindowLimiter {
    pub fn new(clock: SharedClock) -> Self {
        Self { windows: Mutex::new(HashMap::new()), clock }
    }

    /// Count this request against `key` and decide admission.
    pub fn admit(&self, key: &str, settings: RateLimitSettings) -> Admission {
        let now = self.clock.now();
        let window = Duration::seconds(settings.window_secs as i64);

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows
            .entry(key.to_string())
            .or_insert(Window { start: now, count: 0 });

        if now - entry.start >= window {
            entry.start = now;
            entry.count = 0;
        }
        entry.count += 1;

        if entry.count <= settings.requests {
            Admission { allowed: true, retry_after_secs: None }
        } else {
            let elapsed = (now - entry.start).num_seconds().max(0) as u64;
            let retry_after = settings.window_secs.saturating_sub(elapsed).max(1);
            Admission { allowed: false, retry_after_secs: Some(retry_after) }
        }
    }
}

/// Compose the namespaced limiter key for a route and caller.
pub fn limiter_key(route: &str, caller: &str) -> String {
    format!("{}:{}", route, caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn fixture() -> (Arc<ManualClock>, FixedWindowLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let limiter = FixedWindowLimiter::new(clock.clone());
        (clock, limiter)
    }

    const TWO_PER_MINUTE: RateLimitSettings = RateLimitSettings { requests: 2, window_secs: 60 };

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let (_, limiter) = fixture();
        assert!(limiter.admit("list:user-a", TWO_PER_MINUTE).allowed);
        assert!(limiter.admit("list:user-a", TWO_PER_MINUTE).allowed);

        let rejected = limiter.admit("list:user-a", TWO_PER_MINUTE);
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_secs.is_some());
    }

    #[test]
    fn window_resets_after_elapsing() {
        let (clock, limiter) = fixture();
        limiter.admit("list:user-a", TWO_PER_MINUTE);
        limiter.admit("list:user-a", TWO_PER_MINUTE);
        assert!(!limiter.admit("list:user-a", TWO_PER_MINUTE).allowed);

        clock.advance(chrono::Duration::seconds(61));
        assert!(limiter.admit("list:user-a", TWO_PER_MINUTE).allowed);
    }

    #[test]
    fn retry_after_shrinks_as_window_ages() {
        let (clock, limiter) = fixture();
        limiter.admit("k", TWO_PER_MINUTE);
        limiter.admit("k", TWO_PER_MINUTE);

        let first = limiter.admit("k", TWO_PER_MINUTE).retry_after_secs.unwrap();
        clock.advance(chrono::Duration::seconds(30));
        let later = limiter.admit("k", TWO_PER_MINUTE).retry_after_secs.unwrap();
        assert!(later < first, "retry hint should shrink: {} -> {}", first, later);
    }

    #[test]
    fn keys_are_independent_across_routes_and_callers() {
        let (_, limiter) = fixture();
        limiter.admit(&limiter_key("list", "user-a"), TWO_PER_MINUTE);
        limiter.admit(&limiter_key("list", "user-a"), TWO_PER_MINUTE);
        assert!(!limiter.admit(&limiter_key("list", "user-a"), TWO_PER_MINUTE).allowed);

        // Same caller on another route, and another caller on the same route
        assert!(limiter.admit(&limiter_key("create", "user-a"), TWO_PER_MINUTE).allowed);
        assert!(limiter.admit(&limiter_key("list", "user-b"), TWO_PER_MINUTE).allowed);
    }
}
