//! Per-user sliding-window admission control for generation requests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::store::UserId;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per window
    pub max_requests: usize,
    /// Trailing window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let max_requests = std::env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let window_secs = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        tracing::info!(max_requests, window_secs, "Rate limit config loaded");

        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Sliding-window rate limiter keyed by user id.
///
/// Each user's window is an ordered queue of admission timestamps.
/// Admissions only ever append, so expired entries sit at the front and
/// pruning pops until it hits a live one instead of rescanning the whole
/// window. The map-wide write lock makes prune-check-append atomic per
/// user: two racing admits cannot both take the last remaining slot.
/// Windows are never deleted; they live as long as the process does.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<UserId, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    /// Admit or reject a request for this user.
    ///
    /// Admission appends the current timestamp; rejection leaves the
    /// window untouched.
    pub async fn admit(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let window = windows.entry(user_id.to_string()).or_default();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            window.pop_front();
        }

        if window.len() >= self.max_requests {
            return false;
        }

        window.push_back(now);
        true
    }

    /// Requests this user could still make in the current window.
    pub async fn remaining(&self, user_id: &str) -> usize {
        let now = Instant::now();
        let windows = self.windows.read().await;

        let recent = windows
            .get(user_id)
            .map(|window| {
                window
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0);

        self.max_requests.saturating_sub(recent)
    }
}
