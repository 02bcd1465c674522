//! Error types for the panel comparison core.
//!
//! Only panel-level failures ever reach the caller. Per-gene lookup
//! failures are downgraded to an absent annotation by the fetch layer.

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, PanelCheckError>;

/// Failures surfaced by the panel comparison core.
#[derive(Debug, Error)]
pub enum PanelCheckError {
    /// The requested panel (or other resource) does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure or non-2xx response from an external service.
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        service: &'static str,
        message: String,
    },

    /// The request was rejected before any network call was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The run exceeded its overall deadline and was cancelled.
    #[error("analysis timed out after {0}s")]
    TimedOut(u64),
}

impl PanelCheckError {
    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service,
            message: message.into(),
        }
    }

    /// Whether a caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. } | Self::TimedOut(_))
    }
}
