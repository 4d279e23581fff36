//! Per-token sliding-window rate limiter for the action endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::config;

/// Outcome of an over-limit check: how long the caller should wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter {
    pub retry_after_ms: u64,
}

pub struct RateLimiter {
    limit: usize,
    window_ms: u64,
    windows: Mutex<HashMap<String, VecDeque<u64>>>,
    last_sweep_ms: Mutex<u64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(config::ACTIONS_PER_SECOND, config::RATE_WINDOW_MS)
    }
}

impl RateLimiter {
    pub fn new(limit: usize, window_ms: u64) -> Self {
        Self {
            limit,
            window_ms,
            windows: Mutex::new(HashMap::new()),
            last_sweep_ms: Mutex::new(0),
        }
    }

    /// Record one request. `Err` carries the retry-after hint.
    pub fn check(&self, token: &str, now_ms: u64) -> Result<(), RetryAfter> {
        self.sweep(now_ms);

        let mut windows = match self.windows.lock() {
            Ok(w) => w,
            // A poisoned limiter fails open; dropping actions would be worse.
            Err(_) => return Ok(()),
        };
        let window = windows.entry(token.to_string()).or_default();
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while window.front().map_or(false, |&t| t <= cutoff) {
            window.pop_front();
        }

        if window.len() >= self.limit {
            let oldest = window.front().copied().unwrap_or(now_ms);
            return Err(RetryAfter {
                retry_after_ms: (oldest + self.window_ms).saturating_sub(now_ms).max(1),
            });
        }
        window.push_back(now_ms);
        Ok(())
    }

    /// Tokens idle for twice the window are forgotten.
    fn sweep(&self, now_ms: u64) {
        {
            let Ok(mut last) = self.last_sweep_ms.lock() else { return };
            if now_ms.saturating_sub(*last) < self.window_ms * 2 {
                return;
            }
            *last = now_ms;
        }
        if let Ok(mut windows) = self.windows.lock() {
            let cutoff = now_ms.saturating_sub(self.window_ms * 2);
            windows.retain(|_, w| w.back().map_or(false, |&t| t > cutoff));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new(5, 1_000);
        for i in 0..5 {
            assert!(limiter.check("tok", 10_000 + i).is_ok(), "request {i} within limit");
        }
        assert!(limiter.check("tok", 10_010).is_err());
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, 1_000);
        assert!(limiter.check("tok", 10_000).is_ok());
        assert!(limiter.check("tok", 10_100).is_ok());
        assert!(limiter.check("tok", 10_200).is_err());
        // The first request leaves the window after a second.
        assert!(limiter.check("tok", 11_050).is_ok());
    }

    #[test]
    fn retry_hint_points_at_window_exit() {
        let limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.check("tok", 10_000).is_ok());
        let err = limiter.check("tok", 10_400).unwrap_err();
        assert_eq!(err.retry_after_ms, 600);
    }

    #[test]
    fn tokens_are_isolated() {
        let limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.check("a", 10_000).is_ok());
        assert!(limiter.check("b", 10_000).is_ok());
        assert!(limiter.check("a", 10_001).is_err());
    }

    #[test]
    fn idle_tokens_self_expire() {
        let limiter = RateLimiter::new(1, 1_000);
        limiter.check("old", 10_000).ok();
        // A check far in the future sweeps the stale window.
        limiter.check("fresh", 20_000).ok();
        assert!(!limiter.windows.lock().unwrap().contains_key("old"));
    }
}
