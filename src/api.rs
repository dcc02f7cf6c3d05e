//! Marketplace API collaborator
//!
//! The pipeline consumes two endpoint shapes: brand suggestions
//! (`{brands: [{id, title}]}`) and sold-listing pages
//! (`{items: [{title, price: {amount, currency}, ...}]}`). The
//! [`MarketplaceApi`] trait keeps that contract narrow so tests can swap in
//! queued responses; [`HttpMarketplaceApi`] is the reqwest-backed
//! implementation. The bearer token is passed through unchanged.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::PipelineError;

/// Default marketplace API root.
pub const DEFAULT_BASE_URL: &str = "https://www.vinted.fr/api/v2";

/// Sent on every request; some marketplace frontends reject the default.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Status id marking sold listings in the catalog endpoint.
const SOLD_STATUS_ID: u32 = 2;

/// One brand guess for a free-text product name.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BrandSuggestion {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct BrandsResponse {
    #[serde(default)]
    brands: Vec<BrandSuggestion>,
}

/// Price block on a listing. Amounts arrive as strings from some backends
/// and numbers from others, so the raw value is kept for validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPrice {
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default, alias = "currency_code")]
    pub currency: String,
}

/// A single marketplace listing as consumed by the aggregator. Every field
/// is optional at the wire level; the aggregator validates eagerly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<ListingPrice>,
    #[serde(default)]
    pub brand_title: Option<String>,
    #[serde(default)]
    pub size_title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub sold_at: Option<String>,
    #[serde(default)]
    pub user: Option<ListingUser>,
}

/// Seller reference on a listing, used for competitor counting.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingUser {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    #[serde(default)]
    items: Vec<Listing>,
}

/// Parameters for one listing page fetch. Pagination is page/per-page; the
/// caller controls both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub brand_id: u64,
    pub catalog_id: u32,
    pub page: u32,
    pub per_page: u32,
    /// When true only sold listings are requested; otherwise live ones.
    pub sold_only: bool,
}

/// The narrow contract the pipeline holds against the marketplace.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Best-guess brands for a free-text product name.
    async fn suggest_brands(
        &self,
        search_text: &str,
        token: &str,
    ) -> Result<Vec<BrandSuggestion>, PipelineError>;

    /// One page of listings matching the query.
    async fn fetch_listings(
        &self,
        query: &ListingQuery,
        token: &str,
    ) -> Result<Vec<Listing>, PipelineError>;
}

/// reqwest-backed marketplace client.
pub struct HttpMarketplaceApi {
    client: Client,
    base_url: String,
}

impl HttpMarketplaceApi {
    /// Creates a client against the default API root.
    pub fn new() -> Result<Self, PipelineError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom API root (test servers, mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                PipelineError::configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| PipelineError::network(format!("request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineError::status(status.as_u16(), path, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::invalid_body(format!("decoding {path}: {e}")))
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceApi {
    async fn suggest_brands(
        &self,
        search_text: &str,
        token: &str,
    ) -> Result<Vec<BrandSuggestion>, PipelineError> {
        let response: BrandsResponse = self
            .get_json(
                "/brands",
                &[("search_text", search_text.to_string())],
                token,
            )
            .await?;
        Ok(response.brands)
    }

    async fn fetch_listings(
        &self,
        query: &ListingQuery,
        token: &str,
    ) -> Result<Vec<Listing>, PipelineError> {
        let mut params = vec![
            ("brand_ids", query.brand_id.to_string()),
            ("catalog_ids", query.catalog_id.to_string()),
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if query.sold_only {
            params.push(("status_ids", SOLD_STATUS_ID.to_string()));
        } else {
            params.push(("is_for_sale", "1".to_string()));
        }

        let response: ListingsResponse = self.get_json("/catalog/items", &params, token).await?;
        Ok(response.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brands_response_tolerates_missing_field() {
        let parsed: BrandsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.brands.is_empty());

        let parsed: BrandsResponse =
            serde_json::from_str(r#"{"brands": [{"id": 53, "title": "Nike"}]}"#).unwrap();
        assert_eq!(
            parsed.brands,
            vec![BrandSuggestion {
                id: 53,
                title: "Nike".to_string()
            }]
        );
    }

    #[test]
    fn test_listing_price_accepts_string_and_number_amounts() {
        let listing: Listing = serde_json::from_str(
            r#"{"id": 1, "title": "iPhone", "price": {"amount": "25.00", "currency": "EUR"}}"#,
        )
        .unwrap();
        assert_eq!(listing.price.unwrap().amount, serde_json::json!("25.00"));

        let listing: Listing = serde_json::from_str(
            r#"{"id": 2, "title": "iPad", "price": {"amount": 75.5, "currency_code": "EUR"}}"#,
        )
        .unwrap();
        let price = listing.price.unwrap();
        assert_eq!(price.amount, serde_json::json!(75.5));
        assert_eq!(price.currency, "EUR");
    }

    #[test]
    fn test_listing_tolerates_sparse_payloads() {
        let listing: Listing = serde_json::from_str("{}").unwrap();
        assert!(listing.title.is_none());
        assert!(listing.price.is_none());
        assert!(listing.user.is_none());
    }
}
