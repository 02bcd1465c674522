//! Sliding-window admission control for an external endpoint family.
//!
//! One limiter instance is shared by every call to the same service, so
//! the throughput bound holds across concurrent analyses.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Admits at most `max_calls` calls within any trailing `window`.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    max_calls: usize,
    window: Duration,
    /// Admission timestamps, oldest first. Never longer than `max_calls`.
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A `max_calls` of zero is treated as one.
    pub fn new(name: &'static str, max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            name,
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Create a limiter from a per-window call budget in whole seconds.
    pub fn per_seconds(name: &'static str, max_calls: usize, window_seconds: u64) -> Self {
        Self::new(name, max_calls, Duration::from_secs(window_seconds))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until issuing one more call keeps the window under budget,
    /// then record it.
    ///
    /// The queue lock is held while waiting. Tokio's mutex is fair, so
    /// callers are admitted in arrival order and the eviction, check and
    /// append happen as one step.
    pub async fn admit(&self) {
        let mut calls = self.calls.lock().await;

        loop {
            let now = Instant::now();

            while let Some(&oldest) = calls.front() {
                if now.duration_since(oldest) >= self.window {
                    calls.pop_front();
                } else {
                    break;
                }
            }

            if calls.len() < self.max_calls {
                calls.push_back(now);
                return;
            }

            let Some(&oldest) = calls.front() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(
                "{} rate limit reached ({} calls / {:?}), waiting {:?}",
                self.name, self.max_calls, self.window, wait
            );
            sleep(wait).await;
        }
    }

    /// Number of admissions still inside the trailing window.
    pub async fn in_flight_window(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}
