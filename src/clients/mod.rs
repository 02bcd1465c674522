//! HTTP clients for the external data services.
//!
//! Both clients share the same request discipline: every attempt, retries
//! included, is admitted by the service's [`RateLimiter`] first.

pub mod ensembl;
pub mod panelapp;
pub mod rate_limiter;

pub use ensembl::{AnnotationSource, EnsemblClient, EnsemblGene, GeneQuery};
pub use panelapp::{PanelAppClient, PanelSource};
pub use rate_limiter::RateLimiter;

use crate::error::{PanelCheckError, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry settings for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: usize,
    /// Delay before the first retry; doubled for each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: usize, backoff_ms: u64) -> Self {
        Self {
            retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Statuses worth another attempt.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("cannot connect: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}

/// Send a request through `limiter`, retrying transport errors, 429 and 5xx.
///
/// Any other response, successful or not, is returned for the caller to map.
pub(crate) async fn send_with_retry<F>(
    service: &'static str,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        limiter.admit().await;

        let failure = match build().send().await {
            Ok(response) if is_transient(response.status()) => {
                format!("HTTP {}", response.status())
            }
            Ok(response) => return Ok(response),
            Err(e) => describe_transport_error(&e),
        };

        if attempt >= policy.retries {
            return Err(PanelCheckError::upstream(service, failure));
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        warn!(
            "{} request failed ({}), retry {}/{} in {:?}",
            service, failure, attempt, policy.retries, delay
        );
        sleep(delay).await;
    }
}
