//! Adaptive rate limiter for upstream API requests.
//!
//! This is a heuristic, not a gate: it never rejects a request. Callers ask it
//! for a recommended poll interval and batch loops let it insert short pauses
//! when the rolling window is getting full.

use super::window::RateWindow;
use crate::config::RateLimiterSettings;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Snapshot of the limiter state, for logs and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub requests_in_window: usize,
    pub max_requests: usize,
    pub usage_ratio: f64,
    pub window_seconds: u64,
    pub recommended_interval_secs: f64,
}

pub struct AdaptiveRateLimiter {
    window: RateWindow,
    max_requests: usize,
    min_interval: Duration,
    base_interval: Duration,
    max_interval: Duration,
}

impl AdaptiveRateLimiter {
    pub fn new(settings: &RateLimiterSettings) -> Self {
        Self {
            window: RateWindow::new(Duration::from_secs(settings.window_seconds)),
            max_requests: settings.max_requests.max(1),
            min_interval: settings.min_interval,
            base_interval: settings.base_interval,
            max_interval: settings.max_interval,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&RateLimiterSettings::default())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Record `count` requests made to the upstream API.
    pub fn record(&self, count: usize) {
        self.window.record(count);
        debug!(
            "Rate limiter: recorded {} req, total in window: {}",
            count,
            self.window.count()
        );
    }

    pub fn requests_in_window(&self) -> usize {
        self.window.count()
    }

    /// Current usage as a ratio of `max_requests` (can exceed 1.0).
    pub fn usage_ratio(&self) -> f64 {
        self.window.count() as f64 / self.max_requests as f64
    }

    /// Recommended delay before the next poll.
    ///
    /// Tiers use strict greater-than: a usage of exactly 0.8 selects the
    /// `2 * base_interval` tier, not `max_interval`.
    pub fn next_interval(&self) -> Duration {
        let usage = self.usage_ratio();
        let interval = self.interval_for_usage(usage);
        debug!(
            "Rate limiter: usage={:.1}%, next_interval={:?}",
            usage * 100.0,
            interval
        );
        interval
    }

    fn interval_for_usage(&self, usage: f64) -> Duration {
        if usage > 0.8 {
            self.max_interval
        } else if usage > 0.5 {
            self.base_interval * 2
        } else if usage > 0.2 {
            self.base_interval
        } else {
            self.min_interval
        }
    }

    /// Pause a batch loop when the window is close to full.
    ///
    /// Returns how long it waited; zero in the common case.
    pub async fn wait_if_needed(&self) -> Duration {
        let usage = self.usage_ratio();
        let wait = if usage > 0.9 {
            Duration::from_secs(3)
        } else if usage > 0.7 {
            Duration::from_secs(1)
        } else {
            return Duration::ZERO;
        };

        info!(
            "Rate limiter: usage={:.1}%, waiting {:?}",
            usage * 100.0,
            wait
        );
        tokio::time::sleep(wait).await;
        wait
    }

    pub fn stats(&self) -> RateLimiterStats {
        let count = self.window.count();
        let usage_ratio = count as f64 / self.max_requests as f64;
        RateLimiterStats {
            requests_in_window: count,
            max_requests: self.max_requests,
            usage_ratio,
            window_seconds: self.window.window().as_secs(),
            recommended_interval_secs: self.interval_for_usage(usage_ratio).as_secs_f64(),
        }
    }
}
