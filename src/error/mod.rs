//! Error taxonomy and classification for the ingestion pipeline
//!
//! Every failure raised by the pipeline is a [`PipelineError`]. Before a
//! failure is recorded or acted on it passes through [`classify`], which maps
//! it onto the fixed category taxonomy ([`ErrorCategory`]) together with a
//! criticality flag. Retry eligibility and orchestration aborts are decided
//! from the category, never from the raw error.

pub mod classification;
pub mod classifier;

use thiserror::Error;

pub use classification::{
    ApiReason, CategorizedError, ErrorCategory, SystemReason, ValidationReason,
};
pub use classifier::classify;

/// The raw failure type shared by every pipeline component.
///
/// Variants are built through the per-kind factory functions below rather
/// than constructed inline, so call sites stay uniform and the classifier can
/// rely on the variant shape.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The marketplace API answered with a non-success HTTP status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },
    /// The request never produced an HTTP response (DNS, TCP, TLS, reset).
    #[error("network error: {0}")]
    Network(String),
    /// The response arrived but its body could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
    /// An operation lost the race against its timer.
    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },
    /// A structural or business-rule check failed. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The pipeline is misconfigured (missing token, bad taxonomy data).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// A defect in the pipeline itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP failure with the status code and whatever body text was readable.
    pub fn status(status: u16, endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            endpoint: endpoint.into(),
            body: body.into(),
        }
    }

    /// Transport-level failure without an HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Undecodable response body.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody(message.into())
    }

    /// Timer fired before the labelled operation completed.
    pub fn timeout(label: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            label: label.into(),
            timeout_ms,
        }
    }

    /// Structural or business-rule failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Misconfiguration detected before or during a run.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Failure reported by the storage collaborator.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Unexpected defect; always classified as critical.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_functions_build_expected_variants() {
        assert!(matches!(
            PipelineError::status(503, "/brands", "unavailable"),
            PipelineError::Status { status: 503, .. }
        ));
        assert!(matches!(
            PipelineError::timeout("brand suggestion", 2_000),
            PipelineError::Timeout {
                timeout_ms: 2_000,
                ..
            }
        ));
        assert!(matches!(
            PipelineError::validation("missing price"),
            PipelineError::Validation(_)
        ));
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::status(429, "/catalog/items", "slow down");
        assert_eq!(err.to_string(), "HTTP 429 from /catalog/items: slow down");

        let err = PipelineError::timeout("listing fetch", 5_000);
        assert_eq!(err.to_string(), "listing fetch timed out after 5000ms");
    }
}
