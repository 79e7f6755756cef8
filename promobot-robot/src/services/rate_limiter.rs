//! Request pacing for the source fetchers
//!
//! Two limits: a minimum spacing between consecutive requests, and a ceiling
//! on requests per rolling minute. Reaching the ceiling sleeps for a
//! cool-down and starts a fresh window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct WindowState {
    last_request: Option<Instant>,
    recent: VecDeque<Instant>,
}

/// Shared by every source; callers are serialized while waiting
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<WindowState>,
    min_interval: Duration,
    max_per_window: usize,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_per_window: usize, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState::default()),
            min_interval,
            max_per_window: max_per_window.max(1),
            cooldown,
        }
    }

    /// From `[fetcher]` settings
    pub fn from_config(config: &promobot_common::config::FetcherConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.max_requests_per_minute,
            Duration::from_secs(config.cooldown_secs),
        )
    }

    /// Wait until a request is allowed, then count it
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        while let Some(oldest) = state.recent.front() {
            if now.duration_since(*oldest) >= WINDOW {
                state.recent.pop_front();
            } else {
                break;
            }
        }

        if state.recent.len() >= self.max_per_window {
            tracing::warn!(
                requests = state.recent.len(),
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Request ceiling reached, cooling down"
            );
            tokio::time::sleep(self.cooldown).await;
            state.recent.clear();
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let stamp = Instant::now();
        state.last_request = Some(stamp);
        state.recent.push_back(stamp);
    }

    /// Requests counted in the current window
    pub async fn window_len(&self) -> usize {
        self.state.lock().await.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_min_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(100), 30, Duration::from_secs(60));

        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_ceiling_forces_cooldown() {
        let limiter = RateLimiter::new(Duration::ZERO, 2, Duration::from_millis(150));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.window_len().await, 2);

        // Third request hits the ceiling
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(limiter.window_len().await, 1);
    }
}
