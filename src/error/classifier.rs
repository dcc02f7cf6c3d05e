//! Maps raw pipeline failures onto the fixed category taxonomy
//!
//! Classification is a pure function over the failure's shape: HTTP status
//! ranges first, then the declared kind, with a keyword pattern deciding
//! whether a validation failure concerns pricing. The same error always
//! classifies to the same category.

use std::sync::OnceLock;

use regex::Regex;

use super::classification::{
    ApiReason, CategorizedError, ErrorCategory, SystemReason, ValidationReason,
};
use super::PipelineError;

/// Matches validation messages that concern pricing rather than structure.
fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(price|amount|currency)\b").expect("price pattern must compile")
    })
}

/// Classifies a raw failure into exactly one category with criticality.
pub fn classify(error: &PipelineError) -> CategorizedError {
    let original = error.to_string();
    match error {
        PipelineError::Status {
            status,
            endpoint,
            body,
        } => {
            let reason = match status {
                401 | 403 => ApiReason::Authentication,
                404 => ApiReason::NotFound,
                429 => ApiReason::RateLimit,
                s if *s >= 500 => ApiReason::ServerError,
                _ => ApiReason::Connection,
            };
            CategorizedError::new(
                ErrorCategory::Api(reason),
                format!("marketplace API returned HTTP {status}: {body}"),
                original,
            )
            .with_context("status", status.to_string())
            .with_context("endpoint", endpoint.clone())
        }
        PipelineError::Network(message) => CategorizedError::new(
            ErrorCategory::Api(ApiReason::Connection),
            message.clone(),
            original,
        ),
        PipelineError::InvalidBody(message) => CategorizedError::new(
            ErrorCategory::Api(ApiReason::InvalidResponse),
            message.clone(),
            original,
        ),
        PipelineError::Timeout { label, timeout_ms } => CategorizedError::new(
            ErrorCategory::Validation(ValidationReason::Timeout),
            format!("{label} exceeded its {timeout_ms}ms budget"),
            original,
        )
        .with_context("label", label.clone())
        .with_context("timeout_ms", timeout_ms.to_string()),
        PipelineError::Validation(message) => {
            let reason = if price_pattern().is_match(message) {
                ValidationReason::Price
            } else {
                ValidationReason::Integrity
            };
            CategorizedError::new(
                ErrorCategory::Validation(reason),
                message.clone(),
                original,
            )
        }
        PipelineError::Configuration(message) => CategorizedError::new(
            ErrorCategory::System(SystemReason::Configuration),
            message.clone(),
            original,
        ),
        PipelineError::Storage(message) => CategorizedError::new(
            ErrorCategory::System(SystemReason::Database),
            message.clone(),
            original,
        ),
        PipelineError::Internal(message) => CategorizedError::new(
            ErrorCategory::System(SystemReason::Internal),
            message.clone(),
            original,
        ),
    }
}
