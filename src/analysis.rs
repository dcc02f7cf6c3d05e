//! Market analysis aggregation
//!
//! [`MarketAnalysisAggregator`] turns a product name and a leaf category into
//! price statistics: it resolves a brand through the suggestion endpoint,
//! walks sold-listing pages strictly sequentially (the external API rate
//! limits aggressively; never parallelize this), validates every item
//! eagerly, and computes the result in one pass. A single malformed item
//! fails the whole call; silently dropped results are not permitted.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::api::{Listing, ListingQuery, MarketplaceApi};
use crate::catalog::CatalogTaxonomy;
use crate::error::PipelineError;
use crate::recovery::{with_fallback, with_retry, with_timeout, RetryPolicy};

/// Common brand typos corrected before querying, carried over from the
/// original analysis scripts.
const BRAND_CORRECTIONS: [(&str, &str); 4] = [
    ("nik", "nike"),
    ("addidas", "adidas"),
    ("pumaa", "puma"),
    ("zaraa", "zara"),
];

/// Input for one product analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub product_name: String,
    /// Must name a level-3 category.
    pub catalog_id: u32,
}

/// The brand selected from the suggestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBrand {
    pub id: u64,
    pub name: String,
}

/// One accepted price observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSample {
    pub amount: f64,
    pub currency: String,
    pub sold_at: Option<String>,
    pub item_id: Option<u64>,
}

/// Minimum and maximum over the accepted samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// The complete analysis for one product.
///
/// Statistics are computed over sample amounts without currency conversion,
/// matching the original implementation; each sample carries its currency so
/// callers can detect mixed-currency sets.
#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalysisResult {
    pub product_name: String,
    pub resolved_brand: ResolvedBrand,
    pub price_range: PriceRange,
    pub avg_price: f64,
    pub median_price: Option<f64>,
    /// Always equals `raw_items.len()`.
    pub sales_volume: usize,
    pub raw_items: Vec<PriceSample>,
    /// Listing counts per brand title.
    pub brand_distribution: BTreeMap<String, usize>,
    /// Distinct seller logins observed.
    pub competitor_count: usize,
    /// False when the result was built from live listings because no sold
    /// ones were found.
    pub from_sold_listings: bool,
}

struct CollectedPages {
    samples: Vec<PriceSample>,
    listings: Vec<Listing>,
}

/// Orchestrates brand resolution and listing ingestion for one product.
/// Holds no mutable state between calls.
pub struct MarketAnalysisAggregator {
    api: Arc<dyn MarketplaceApi>,
    catalog: Arc<CatalogTaxonomy>,
    policy: RetryPolicy,
    request_timeout: Duration,
    page_limit: u32,
    per_page: u32,
}

impl MarketAnalysisAggregator {
    /// Creates an aggregator with the default API retry policy, a 10 s
    /// per-call timeout, a 5-page ceiling, and 96 items per page.
    pub fn new(api: Arc<dyn MarketplaceApi>, catalog: Arc<CatalogTaxonomy>) -> Self {
        Self {
            api,
            catalog,
            policy: RetryPolicy::api_default(),
            request_timeout: Duration::from_secs(10),
            page_limit: 5,
            per_page: 96,
        }
    }

    /// Replaces the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-call timeout budget.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the page-count ceiling.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Analyzes one product end to end.
    pub async fn analyze_product(
        &self,
        request: &AnalysisRequest,
        token: &str,
    ) -> Result<MarketAnalysisResult, PipelineError> {
        let validation = self.catalog.validate_category(request.catalog_id);
        if !validation.is_valid {
            return Err(PipelineError::validation(format!(
                "catalog id {} is not usable for analysis: {}",
                request.catalog_id, validation.message
            )));
        }

        let search_text = normalize_product_name(&request.product_name);
        debug!(product = %request.product_name, search = %search_text, "resolving brand");

        let brands = with_timeout(
            "brand suggestion",
            self.request_timeout,
            with_retry(&self.policy, || {
                self.api.suggest_brands(&search_text, token)
            }),
        )
        .await?;

        let Some(first) = brands.first() else {
            return Err(PipelineError::validation(format!(
                "no brand suggested for '{search_text}'"
            )));
        };
        let brand = ResolvedBrand {
            id: first.id,
            name: first.title.clone(),
        };
        info!(brand = %brand.name, brand_id = brand.id, "brand resolved");

        // Prefer sold listings; fall back to live ones only when the sold
        // search comes back empty, as the original analyzer did.
        let mut from_sold = true;
        let collected = with_fallback(
            || self.collect_pages(brand.id, request.catalog_id, token, true),
            || {
                from_sold = false;
                self.collect_pages(brand.id, request.catalog_id, token, false)
            },
            |error| matches!(error, PipelineError::Validation(m) if m.starts_with("no sold listings")),
        )
        .await?;

        let (price_range, avg_price, median_price) = price_stats(&collected.samples);
        let (brand_distribution, competitor_count) = listing_aggregates(&collected.listings);

        info!(
            product = %request.product_name,
            samples = collected.samples.len(),
            avg = avg_price,
            "analysis complete"
        );

        Ok(MarketAnalysisResult {
            product_name: request.product_name.clone(),
            resolved_brand: brand,
            price_range,
            avg_price,
            median_price,
            sales_volume: collected.samples.len(),
            raw_items: collected.samples,
            brand_distribution,
            competitor_count,
            from_sold_listings: from_sold,
        })
    }

    /// Fetches listing pages sequentially until an empty page or the page
    /// ceiling, validating every item as it arrives.
    async fn collect_pages(
        &self,
        brand_id: u64,
        catalog_id: u32,
        token: &str,
        sold_only: bool,
    ) -> Result<CollectedPages, PipelineError> {
        let mut samples = Vec::new();
        let mut listings = Vec::new();

        for page in 1..=self.page_limit {
            let query = ListingQuery {
                brand_id,
                catalog_id,
                page,
                per_page: self.per_page,
                sold_only,
            };
            let label = format!("listing fetch page {page}");
            let items = with_timeout(
                &label,
                self.request_timeout,
                with_retry(&self.policy, || self.api.fetch_listings(&query, token)),
            )
            .await?;

            if items.is_empty() {
                break;
            }
            debug!(page, count = items.len(), sold_only, "page fetched");

            for item in &items {
                samples.push(validate_item(item, samples.len())?);
            }
            listings.extend(items);
        }

        if samples.is_empty() {
            let kind = if sold_only { "sold" } else { "live" };
            return Err(PipelineError::validation(format!(
                "no {kind} listings found for brand {brand_id} in catalog {catalog_id}"
            )));
        }
        Ok(CollectedPages { samples, listings })
    }
}

/// Corrects known brand typos word by word.
pub fn normalize_product_name(product_name: &str) -> String {
    product_name
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            BRAND_CORRECTIONS
                .iter()
                .find(|(typo, _)| *typo == lower)
                .map(|(_, fixed)| fixed.to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts an item or fails the whole call: a listing must carry a title and
/// a numeric, non-negative price amount with a currency.
fn validate_item(item: &Listing, index: usize) -> Result<PriceSample, PipelineError> {
    let label = item
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("#{index}"));

    let title = item
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            PipelineError::validation(format!("listing {label} is missing a title"))
        })?;

    let price = item.price.as_ref().ok_or_else(|| {
        PipelineError::validation(format!("listing {label} ('{title}') is missing a price"))
    })?;

    let amount = parse_amount(&price.amount).ok_or_else(|| {
        PipelineError::validation(format!(
            "listing {label} ('{title}') has a non-numeric price amount {}",
            price.amount
        ))
    })?;

    if price.currency.trim().is_empty() {
        return Err(PipelineError::validation(format!(
            "listing {label} ('{title}') has a price without a currency"
        )));
    }

    Ok(PriceSample {
        amount,
        currency: price.currency.clone(),
        sold_at: item.sold_at.clone(),
        item_id: item.id,
    })
}

/// Parses a wire amount: a numeric string or a JSON number, finite and
/// non-negative. Anything else is rejected.
fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Range, mean, and median over the accepted amounts. The median averages
/// the two middle values for an even count.
fn price_stats(samples: &[PriceSample]) -> (PriceRange, f64, Option<f64>) {
    if samples.is_empty() {
        return (PriceRange { min: 0.0, max: 0.0 }, 0.0, None);
    }

    let mut amounts: Vec<f64> = samples.iter().map(|s| s.amount).collect();
    amounts.sort_by(f64::total_cmp);

    let min = amounts[0];
    let max = amounts[amounts.len() - 1];
    // Rounding to cents must not push a statistic outside the observed range
    // when amounts carry sub-cent precision.
    let avg = round2(amounts.iter().sum::<f64>() / amounts.len() as f64).clamp(min, max);
    let mid = amounts.len() / 2;
    let median = if amounts.len() % 2 == 1 {
        amounts[mid]
    } else {
        (amounts[mid - 1] + amounts[mid]) / 2.0
    };

    (PriceRange { min, max }, avg, Some(round2(median).clamp(min, max)))
}

/// Brand distribution and distinct-seller count across raw listings.
fn listing_aggregates(listings: &[Listing]) -> (BTreeMap<String, usize>, usize) {
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut sellers: HashSet<&str> = HashSet::new();

    for listing in listings {
        let brand = listing.brand_title.as_deref().unwrap_or("unknown");
        *distribution.entry(brand.to_string()).or_insert(0) += 1;
        if let Some(login) = listing.user.as_ref().and_then(|u| u.login.as_deref()) {
            sellers.insert(login);
        }
    }

    (distribution, sellers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ListingPrice;

    fn sample(amount: f64) -> PriceSample {
        PriceSample {
            amount,
            currency: "EUR".to_string(),
            sold_at: None,
            item_id: None,
        }
    }

    fn listing(title: &str, amount: serde_json::Value, currency: &str) -> Listing {
        Listing {
            id: Some(1),
            title: Some(title.to_string()),
            price: Some(ListingPrice {
                amount,
                currency: currency.to_string(),
            }),
            ..Listing::default()
        }
    }

    #[test]
    fn test_normalize_product_name_fixes_known_typos() {
        assert_eq!(normalize_product_name("nik air max"), "nike air max");
        assert_eq!(normalize_product_name("Addidas hoodie"), "adidas hoodie");
        assert_eq!(normalize_product_name("dyson dryer"), "dyson dryer");
    }

    #[test]
    fn test_parse_amount_shapes() {
        assert_eq!(parse_amount(&serde_json::json!("25.00")), Some(25.0));
        assert_eq!(parse_amount(&serde_json::json!(75.5)), Some(75.5));
        assert_eq!(parse_amount(&serde_json::json!(" 10.5 ")), Some(10.5));
        assert_eq!(parse_amount(&serde_json::json!("abc")), None);
        assert_eq!(parse_amount(&serde_json::json!(-5.0)), None);
        assert_eq!(parse_amount(&serde_json::json!(null)), None);
        assert_eq!(parse_amount(&serde_json::json!({"nested": 1})), None);
    }

    #[test]
    fn test_price_stats_mean_range_median_odd() {
        let samples = vec![sample(10.0), sample(30.0), sample(20.0)];
        let (range, avg, median) = price_stats(&samples);
        assert_eq!(range.min, 10.0);
        assert_eq!(range.max, 30.0);
        assert_eq!(avg, 20.0);
        assert_eq!(median, Some(20.0));
        assert!(range.min <= avg && avg <= range.max);
    }

    #[test]
    fn test_price_stats_median_even_count() {
        let samples = vec![sample(25.0), sample(75.0)];
        let (range, avg, median) = price_stats(&samples);
        assert_eq!(avg, 50.0);
        assert_eq!(median, Some(50.0));
        assert_eq!(range.min, 25.0);
        assert_eq!(range.max, 75.0);
    }

    #[test]
    fn test_price_stats_stay_within_range_for_subcent_amounts() {
        let samples = vec![sample(10.004), sample(10.004)];
        let (range, avg, median) = price_stats(&samples);
        assert!(range.min <= avg && avg <= range.max);
        let median = median.unwrap();
        assert!(range.min <= median && median <= range.max);

        let samples = vec![sample(0.001), sample(0.002), sample(0.003)];
        let (range, avg, median) = price_stats(&samples);
        assert!(range.min <= avg && avg <= range.max);
        assert!(median.unwrap() >= range.min);
    }

    #[test]
    fn test_validate_item_accepts_well_formed_listing() {
        let item = listing("iPhone 14 Pro", serde_json::json!("420.00"), "EUR");
        let sample = validate_item(&item, 0).unwrap();
        assert_eq!(sample.amount, 420.0);
        assert_eq!(sample.currency, "EUR");
    }

    #[test]
    fn test_validate_item_rejects_missing_title() {
        let mut item = listing("x", serde_json::json!("10.00"), "EUR");
        item.title = Some("   ".to_string());
        let err = validate_item(&item, 3).unwrap_err();
        assert!(err.to_string().contains("missing a title"));
    }

    #[test]
    fn test_validate_item_rejects_non_numeric_amount() {
        let item = listing("Bag", serde_json::json!("not-a-number"), "EUR");
        let err = validate_item(&item, 0).unwrap_err();
        assert!(err.to_string().contains("non-numeric price amount"));
    }

    #[test]
    fn test_validate_item_rejects_missing_currency() {
        let item = listing("Bag", serde_json::json!("10.00"), " ");
        let err = validate_item(&item, 0).unwrap_err();
        assert!(err.to_string().contains("without a currency"));
    }

    #[test]
    fn test_listing_aggregates_counts_brands_and_sellers() {
        use crate::api::ListingUser;

        let mut a = listing("A", serde_json::json!("1"), "EUR");
        a.brand_title = Some("Nike".to_string());
        a.user = Some(ListingUser {
            login: Some("alice".to_string()),
        });
        let mut b = listing("B", serde_json::json!("2"), "EUR");
        b.brand_title = Some("Nike".to_string());
        b.user = Some(ListingUser {
            login: Some("bob".to_string()),
        });
        let mut c = listing("C", serde_json::json!("3"), "EUR");
        c.user = Some(ListingUser {
            login: Some("alice".to_string()),
        });

        let (distribution, sellers) = listing_aggregates(&[a, b, c]);
        assert_eq!(distribution.get("Nike"), Some(&2));
        assert_eq!(distribution.get("unknown"), Some(&1));
        assert_eq!(sellers, 2);
    }
}
