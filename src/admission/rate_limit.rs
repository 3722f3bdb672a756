use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Configuration for rate limiting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Window duration
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Ordinary API requests: 50 per 10 seconds
    pub fn http() -> Self {
        Self::new(50, Duration::from_secs(10))
    }

    /// WebSocket upgrade attempts: 5 per 2 seconds
    pub fn upgrade() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Result of one rate-limit check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the oldest counted hit leaves the window
    pub retry_after: Duration,
}

// Prune idle clients every this many checks
const PURGE_EVERY: u64 = 1024;

/// Exact sliding-window limiter keyed by client.
///
/// Each client keeps the instants of its admitted hits inside the window; a
/// hit is admitted while fewer than `max_requests` remain after expiring
/// anything older than `window`. Denied hits are not counted.
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, Mutex<VecDeque<Instant>>>,
    checks: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, client_key: &str, now: Instant) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_idle(now);
        }

        let max = self.config.max_requests as usize;
        let entry = self
            .clients
            .entry(client_key.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(max.min(64))));
        let mut hits = entry.lock();

        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        let allowed = hits.len() < max;
        if allowed {
            hits.push_back(now);
        }
        let retry_after = hits
            .front()
            .map(|oldest| {
                self.config
                    .window
                    .saturating_sub(now.saturating_duration_since(*oldest))
            })
            .unwrap_or_default();

        RateDecision {
            allowed,
            remaining: max.saturating_sub(hits.len()) as u32,
            retry_after,
        }
    }

    /// Forget clients whose every hit has left the window
    pub fn purge_idle(&self, now: Instant) {
        let window = self.config.window;
        self.clients.retain(|_, hits| {
            hits.get_mut()
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixth_hit_in_window_denied() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::upgrade());
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_millis(i * 100);
            assert!(limiter.check("1.2.3.4", at).allowed, "hit {i}");
        }
        let sixth = limiter.check("1.2.3.4", start + Duration::from_millis(1500));
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.retry_after, Duration::from_millis(500));

        // another client is unaffected
        assert!(limiter.check("5.6.7.8", start + Duration::from_millis(1500)).allowed);
    }

    #[test]
    fn test_first_hit_after_window_allowed() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::upgrade());
        let start = Instant::now();
        for _ in 0..5 {
            limiter.check("c", start);
        }
        assert!(!limiter.check("c", start + Duration::from_millis(1999)).allowed);

        let after = limiter.check("c", start + Duration::from_secs(2));
        assert!(after.allowed);
        assert_eq!(after.remaining, 4);
    }

    #[test]
    fn test_window_slides_per_hit() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::new(2, Duration::from_secs(10)));
        let start = Instant::now();
        assert!(limiter.check("c", start).allowed);
        assert!(limiter.check("c", start + Duration::from_secs(6)).allowed);
        assert!(!limiter.check("c", start + Duration::from_secs(9)).allowed);
        // first hit expired, second still counts
        assert!(limiter.check("c", start + Duration::from_secs(10)).allowed);
        assert!(!limiter.check("c", start + Duration::from_secs(11)).allowed);
    }

    #[test]
    fn test_purge_idle() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::upgrade());
        let start = Instant::now();
        limiter.check("old", start);
        limiter.check("new", start + Duration::from_secs(3));

        limiter.purge_idle(start + Duration::from_secs(3));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
