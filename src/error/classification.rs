//! The fixed error category taxonomy
//!
//! Categories are grouped by concern: API-facing failures, structural
//! validation failures, and system failures. The grouping drives the two
//! decisions the rest of the pipeline makes about an error: whether it may be
//! retried and whether it is critical enough to abort an orchestration run.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// The category assigned to a classified failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failures raised while talking to the marketplace API.
    Api(ApiReason),
    /// Structural or business-rule failures in fetched data.
    Validation(ValidationReason),
    /// Failures in the pipeline's own environment. Always critical.
    System(SystemReason),
}

/// Reasons for API-facing failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiReason {
    /// Transport-level failure with no usable HTTP response.
    Connection,
    /// HTTP 401 or 403.
    Authentication,
    /// HTTP 429.
    RateLimit,
    /// HTTP 404.
    NotFound,
    /// HTTP 5xx.
    ServerError,
    /// The body could not be decoded into the expected shape.
    InvalidResponse,
}

/// Reasons for validation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationReason {
    /// A price field is missing, non-numeric, or out of range.
    Price,
    /// Any other malformed or inconsistent payload.
    Integrity,
    /// An operation exceeded its declared time budget.
    Timeout,
}

/// Reasons for system failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemReason {
    /// The pipeline is misconfigured.
    Configuration,
    /// The storage collaborator failed.
    Database,
    /// An unrecognized defect.
    Internal,
}

impl ErrorCategory {
    /// True for every `System` category; a critical failure aborts the whole
    /// orchestration run.
    pub fn is_critical(&self) -> bool {
        matches!(self, ErrorCategory::System(_))
    }

    /// Retry eligibility under the default policy. Only transient API
    /// failures qualify; retrying a malformed payload cannot succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Api(ApiReason::Connection)
                | ErrorCategory::Api(ApiReason::RateLimit)
                | ErrorCategory::Api(ApiReason::ServerError)
        )
    }

    /// Stable snake_case identifier, used in logs and serialized reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Api(ApiReason::Connection) => "api_connection",
            ErrorCategory::Api(ApiReason::Authentication) => "api_authentication",
            ErrorCategory::Api(ApiReason::RateLimit) => "api_rate_limit",
            ErrorCategory::Api(ApiReason::NotFound) => "api_not_found",
            ErrorCategory::Api(ApiReason::ServerError) => "api_server_error",
            ErrorCategory::Api(ApiReason::InvalidResponse) => "api_invalid_response",
            ErrorCategory::Validation(ValidationReason::Price) => "validation_price",
            ErrorCategory::Validation(ValidationReason::Integrity) => "validation_integrity",
            ErrorCategory::Validation(ValidationReason::Timeout) => "validation_timeout",
            ErrorCategory::System(SystemReason::Configuration) => "system_configuration",
            ErrorCategory::System(SystemReason::Database) => "system_database",
            ErrorCategory::System(SystemReason::Internal) => "system_internal",
        }
    }

    /// The user-facing hint surfaced in validation reports for this category.
    pub fn recommendation(&self) -> &'static str {
        match self {
            ErrorCategory::Api(ApiReason::Connection) => {
                "check network connectivity to the marketplace API"
            }
            ErrorCategory::Api(ApiReason::Authentication) => "check token validity",
            ErrorCategory::Api(ApiReason::RateLimit) => "wait and retry; reduce request rate",
            ErrorCategory::Api(ApiReason::NotFound) => "verify endpoint paths and resource ids",
            ErrorCategory::Api(ApiReason::ServerError) => {
                "marketplace API is degraded; retry later"
            }
            ErrorCategory::Api(ApiReason::InvalidResponse) => {
                "API response shape changed; update the wire types"
            }
            ErrorCategory::Validation(ValidationReason::Price) => "check expected price ranges",
            ErrorCategory::Validation(ValidationReason::Integrity) => {
                "inspect payloads for missing or malformed fields"
            }
            ErrorCategory::Validation(ValidationReason::Timeout) => "increase timeout budget",
            ErrorCategory::System(SystemReason::Configuration) => {
                "review pipeline configuration"
            }
            ErrorCategory::System(SystemReason::Database) => {
                "check storage availability and schema"
            }
            ErrorCategory::System(SystemReason::Internal) => {
                "inspect logs for an internal defect"
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A failure after classification: exactly one category from the fixed
/// taxonomy, a human-readable message, the criticality flag, the rendered
/// original error, and optional key-value context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorizedError {
    /// The assigned category.
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Whether this failure must abort the whole orchestration run.
    pub is_critical: bool,
    /// Display rendering of the original [`PipelineError`](super::PipelineError).
    pub original: String,
    /// Additional context as key-value pairs.
    pub context: HashMap<String, String>,
}

impl CategorizedError {
    /// Creates a categorized error; criticality follows the category.
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        original: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            is_critical: category.is_critical(),
            original: original.into(),
            context: HashMap::new(),
        }
    }

    /// Adds a context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CategorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

impl std::error::Error for CategorizedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_categories_are_critical() {
        assert!(ErrorCategory::System(SystemReason::Configuration).is_critical());
        assert!(ErrorCategory::System(SystemReason::Database).is_critical());
        assert!(ErrorCategory::System(SystemReason::Internal).is_critical());
        assert!(!ErrorCategory::Api(ApiReason::Authentication).is_critical());
        assert!(!ErrorCategory::Validation(ValidationReason::Price).is_critical());
    }

    #[test]
    fn test_only_transient_api_categories_are_retryable() {
        let retryable = [
            ErrorCategory::Api(ApiReason::Connection),
            ErrorCategory::Api(ApiReason::RateLimit),
            ErrorCategory::Api(ApiReason::ServerError),
        ];
        for category in retryable {
            assert!(category.is_retryable(), "{category} should be retryable");
        }

        let terminal = [
            ErrorCategory::Api(ApiReason::Authentication),
            ErrorCategory::Api(ApiReason::NotFound),
            ErrorCategory::Api(ApiReason::InvalidResponse),
            ErrorCategory::Validation(ValidationReason::Price),
            ErrorCategory::Validation(ValidationReason::Integrity),
            ErrorCategory::Validation(ValidationReason::Timeout),
            ErrorCategory::System(SystemReason::Configuration),
            ErrorCategory::System(SystemReason::Database),
            ErrorCategory::System(SystemReason::Internal),
        ];
        for category in terminal {
            assert!(!category.is_retryable(), "{category} should not be retryable");
        }
    }

    #[test]
    fn test_as_str_covers_all_twelve_categories() {
        let all = [
            ErrorCategory::Api(ApiReason::Connection),
            ErrorCategory::Api(ApiReason::Authentication),
            ErrorCategory::Api(ApiReason::RateLimit),
            ErrorCategory::Api(ApiReason::NotFound),
            ErrorCategory::Api(ApiReason::ServerError),
            ErrorCategory::Api(ApiReason::InvalidResponse),
            ErrorCategory::Validation(ValidationReason::Price),
            ErrorCategory::Validation(ValidationReason::Integrity),
            ErrorCategory::Validation(ValidationReason::Timeout),
            ErrorCategory::System(SystemReason::Configuration),
            ErrorCategory::System(SystemReason::Database),
            ErrorCategory::System(SystemReason::Internal),
        ];
        let names: std::collections::HashSet<&str> = all.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn test_categorized_error_criticality_follows_category() {
        let err = CategorizedError::new(
            ErrorCategory::System(SystemReason::Database),
            "count query failed",
            "storage error: connection pool exhausted",
        );
        assert!(err.is_critical);

        let err = CategorizedError::new(
            ErrorCategory::Api(ApiReason::RateLimit),
            "throttled",
            "HTTP 429 from /brands: slow down",
        );
        assert!(!err.is_critical);
    }

    #[test]
    fn test_categorized_error_context_builder() {
        let err = CategorizedError::new(
            ErrorCategory::Api(ApiReason::ServerError),
            "upstream exploded",
            "HTTP 500 from /catalog/items: oops",
        )
        .with_context("status", "500")
        .with_context("endpoint", "/catalog/items");

        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context.get("status"), Some(&"500".to_string()));
    }

    #[test]
    fn test_display_leads_with_category() {
        let err = CategorizedError::new(
            ErrorCategory::Validation(ValidationReason::Price),
            "non-numeric amount",
            "validation failed: non-numeric amount",
        );
        assert_eq!(format!("{err}"), "[validation_price] non-numeric amount");
    }
}
