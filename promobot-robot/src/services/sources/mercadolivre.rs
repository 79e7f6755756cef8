//! Mercado Livre public search API

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{commission_percent, FetchError, ListingSource};
use crate::models::{CandidateListing, Category, Platform};
use crate::services::RateLimiter;

/// The search endpoint refuses larger pages
const MAX_PAGE: usize = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    title: String,
    price: Option<f64>,
    original_price: Option<f64>,
    permalink: String,
    thumbnail: Option<String>,
    #[serde(default)]
    sold_quantity: Option<i64>,
    seller: Option<SearchSeller>,
}

#[derive(Debug, Deserialize)]
struct SearchSeller {
    nickname: Option<String>,
}

/// Structured JSON search (`/sites/MLB/search`)
pub struct MercadoLivreSource {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl MercadoLivreSource {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    fn to_listing(&self, item: SearchItem, category: Category) -> Option<CandidateListing> {
        let price = item.price?;
        Some(CandidateListing {
            platform: Platform::MercadoLivre,
            platform_id: item.id,
            title: item.title,
            price,
            original_price: item.original_price,
            rating: None,
            review_count: 0,
            sales_count: item.sold_quantity.unwrap_or(0),
            product_url: item.permalink,
            // Thumbnails come back as http; the -I suffix is the small size
            image_url: item
                .thumbnail
                .map(|t| t.replace("http://", "https://").replace("-I.jpg", "-O.jpg")),
            seller: item.seller.and_then(|s| s.nickname),
            commission_percent: commission_percent(Platform::MercadoLivre, category),
            affiliate_link: None,
        })
    }
}

#[async_trait]
impl ListingSource for MercadoLivreSource {
    fn platform(&self) -> Platform {
        Platform::MercadoLivre
    }

    async fn search(&self, category: Category, limit: usize) -> Result<Vec<CandidateListing>, FetchError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/sites/MLB/search", self.base_url);
        let limit = limit.clamp(1, MAX_PAGE);
        let limit_param = limit.to_string();

        tracing::debug!(%category, url = %url, limit, "Querying Mercado Livre search");

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", category.search_query()), ("limit", limit_param.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                platform: Platform::MercadoLivre,
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let listings: Vec<CandidateListing> = body
            .results
            .into_iter()
            .filter_map(|item| self.to_listing(item, category))
            .take(limit)
            .collect();

        tracing::info!(%category, count = listings.len(), "Mercado Livre listings fetched");
        Ok(listings)
    }
}
