//! Complete-validation orchestration
//!
//! Drives the whole pipeline through a fixed sequence of stages:
//! token check, per-product analysis tests (strictly sequential), integrity
//! checks, then report generation. Non-critical failures are recorded
//! against their test and execution continues; any `System*` failure aborts
//! every remaining stage. The orchestrator owns the one mutable report and
//! appends outcomes in execution order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::analysis::{AnalysisRequest, MarketAnalysisAggregator};
use crate::api::MarketplaceApi;
use crate::error::{classify, CategorizedError, ErrorCategory, PipelineError};
use crate::integrity::IntegrityValidator;
use crate::recovery::with_timeout;

/// Stages of a validation run. `Failed` is absorbing: it is entered on the
/// first critical failure and no later stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Idle,
    TokenValidating,
    ProductTesting,
    IntegrityChecking,
    Reporting,
    Done,
    Failed,
}

/// One configured product test.
#[derive(Debug, Clone, Serialize)]
pub struct ProductTestCase {
    pub name: String,
    pub product_name: String,
    pub catalog_id: u32,
}

impl ProductTestCase {
    pub fn new(name: &str, product_name: &str, catalog_id: u32) -> Self {
        Self {
            name: name.to_string(),
            product_name: product_name.to_string(),
            catalog_id,
        }
    }
}

/// Recorded outcome of one test, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestOutcome {
    fn passed(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            category: None,
            message: Some(message.into()),
        }
    }

    fn failed(name: &str, error: &CategorizedError) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            category: Some(error.category),
            message: Some(error.message.clone()),
        }
    }
}

/// The final report handed back to the invoking layer. Raw errors never
/// surface here; failures appear as categories and recommendation strings.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub overall_success: bool,
    pub outcomes: Vec<TestOutcome>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub product_tests: Vec<ProductTestCase>,
    /// Minimum fraction of passed outcomes for overall success.
    pub pass_threshold: f64,
    /// Budget for the token probe call.
    pub token_check_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            product_tests: vec![
                ProductTestCase::new("smartphone analysis", "iphone 14 pro", 311),
                ProductTestCase::new("designer handbag analysis", "louis vuitton neverfull", 411),
                ProductTestCase::new("headphones analysis", "apple airpods pro", 321),
            ],
            pass_threshold: 0.8,
            token_check_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives token check, product tests, and integrity checks into one report.
pub struct ValidationOrchestrator {
    api: Arc<dyn MarketplaceApi>,
    aggregator: MarketAnalysisAggregator,
    integrity: IntegrityValidator,
    config: OrchestratorConfig,
    state: ValidationState,
}

impl ValidationOrchestrator {
    pub fn new(
        api: Arc<dyn MarketplaceApi>,
        aggregator: MarketAnalysisAggregator,
        integrity: IntegrityValidator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            api,
            aggregator,
            integrity,
            config,
            state: ValidationState::Idle,
        }
    }

    /// The current stage, mostly useful to tests and progress displays.
    pub fn state(&self) -> ValidationState {
        self.state
    }

    /// Runs the complete validation sequence. A missing or rejected token is
    /// fatal; product tests degrade gracefully on non-critical failures; any
    /// critical failure aborts all remaining work.
    pub async fn execute_complete_validation(&mut self, token: Option<&str>) -> ValidationReport {
        let mut outcomes: Vec<TestOutcome> = Vec::new();
        let mut critical = false;

        self.state = ValidationState::TokenValidating;
        let token = match self.validate_token(token).await {
            Ok(token) => {
                outcomes.push(TestOutcome::passed("token check", "token accepted"));
                token
            }
            Err(err) => {
                let classified = classify(&err);
                error!(category = %classified.category, "token validation failed");
                outcomes.push(TestOutcome::failed("token check", &classified));
                self.state = ValidationState::Failed;
                return self.build_report(outcomes, true);
            }
        };

        self.state = ValidationState::ProductTesting;
        let tests = self.config.product_tests.clone();
        for (index, test) in tests.iter().enumerate() {
            let request = AnalysisRequest {
                product_name: test.product_name.clone(),
                catalog_id: test.catalog_id,
            };
            match self.aggregator.analyze_product(&request, &token).await {
                Ok(result) => {
                    info!(test = %test.name, samples = result.sales_volume, "product test passed");
                    outcomes.push(TestOutcome::passed(
                        &test.name,
                        format!(
                            "{} samples, avg {:.2}",
                            result.sales_volume, result.avg_price
                        ),
                    ));
                }
                Err(err) => {
                    let classified = classify(&err);
                    outcomes.push(TestOutcome::failed(&test.name, &classified));
                    if classified.is_critical {
                        error!(
                            test = %test.name,
                            category = %classified.category,
                            skipped = tests.len() - index - 1,
                            "critical failure; aborting remaining tests"
                        );
                        critical = true;
                        break;
                    }
                    warn!(test = %test.name, category = %classified.category, "product test failed");
                }
            }
        }

        if !critical {
            self.state = ValidationState::IntegrityChecking;
            match self.run_integrity_stage().await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    let classified = classify(&err);
                    outcomes.push(TestOutcome::failed("integrity check", &classified));
                    if classified.is_critical {
                        error!(category = %classified.category, "integrity stage failed critically");
                        critical = true;
                    }
                }
            }
        }

        self.state = if critical {
            ValidationState::Failed
        } else {
            ValidationState::Reporting
        };
        let report = self.build_report(outcomes, critical);
        if !critical {
            self.state = ValidationState::Done;
        }
        report
    }

    /// Probes the suggestion endpoint with a fixed term. Any failure here is
    /// fatal to the run regardless of its category.
    async fn validate_token(&self, token: Option<&str>) -> Result<String, PipelineError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::configuration("no access token provided"))?;

        with_timeout(
            "token check",
            self.config.token_check_timeout,
            self.api.suggest_brands("nike", token),
        )
        .await?;
        Ok(token.to_string())
    }

    /// Orphan detection plus the expired-row sweep, folded into one outcome.
    /// Storage failures propagate and are treated as critical upstream.
    async fn run_integrity_stage(&self) -> Result<TestOutcome, PipelineError> {
        let consistency = self.integrity.detect_orphaned_data().await?;
        let cleanup = self.integrity.cleanup_expired_data().await;

        if consistency.is_consistent && cleanup.errors.is_empty() {
            return Ok(TestOutcome::passed(
                "integrity check",
                format!("no orphans; {} expired rows removed", cleanup.removed_count),
            ));
        }

        let mut parts = Vec::new();
        if !consistency.is_consistent {
            parts.push(format!(
                "orphaned data in: {}",
                consistency
                    .orphan_ids
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !cleanup.errors.is_empty() {
            parts.push(format!("sweep errors: {}", cleanup.errors.join("; ")));
        }
        let classified = classify(&PipelineError::validation(parts.join("; ")));
        Ok(TestOutcome::failed("integrity check", &classified))
    }

    fn build_report(&self, outcomes: Vec<TestOutcome>, critical: bool) -> ValidationReport {
        let passed = outcomes.iter().filter(|o| o.passed).count();
        let pass_ratio = if outcomes.is_empty() {
            0.0
        } else {
            passed as f64 / outcomes.len() as f64
        };
        let overall_success = !critical && pass_ratio >= self.config.pass_threshold;

        // One recommendation per distinct category, in observation order.
        let mut seen = Vec::new();
        let mut recommendations = Vec::new();
        for outcome in &outcomes {
            if let Some(category) = outcome.category {
                if !seen.contains(&category) {
                    seen.push(category);
                    recommendations.push(category.recommendation().to_string());
                }
            }
        }

        info!(
            overall_success,
            passed,
            total = outcomes.len(),
            "validation report generated"
        );
        ValidationReport {
            overall_success,
            outcomes,
            recommendations,
            generated_at: Utc::now(),
        }
    }
}
