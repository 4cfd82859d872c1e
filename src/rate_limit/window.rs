//! Rolling time-window request counter.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Counts requests made during the trailing `window`.
///
/// Timestamps live in process memory only and are lost on restart.
/// All methods take `&self` and serialize through an internal mutex, so the
/// window can be shared between the timer-driven poll, manual polls and
/// metadata batch loops.
pub struct RateWindow {
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `n` requests made now.
    pub fn record(&self, n: usize) {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..n {
            requests.push_back(now);
        }
        Self::prune(&mut requests, now, self.window);
    }

    /// Number of requests newer than `now - window`. Older entries are dropped.
    pub fn count(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut requests, now, self.window);
        requests.len()
    }

    fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while let Some(front) = requests.front() {
            if *front < cutoff {
                requests.pop_front();
            } else {
                break;
            }
        }
    }
}
