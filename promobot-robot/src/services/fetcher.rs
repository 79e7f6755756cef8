//! Source fetcher
//!
//! Dispatches (category, platform) requests to the registered sources,
//! sanitizes titles and attaches affiliate links. A batch runs the full
//! category × platform cross product sequentially; a failing combination is
//! logged, recorded and skipped.

use promobot_common::config::AffiliateConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::sources::{FetchError, ListingSource};
use crate::models::{CandidateListing, Category, Platform};

/// Longest title kept after sanitation
pub const MAX_TITLE_CHARS: usize = 200;

/// Keep letters (accented included), digits, whitespace and `- . , ( ) %`;
/// collapse whitespace runs; cap the length
pub fn sanitize_title(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '.' | ',' | '(' | ')' | '%'))
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

/// Query parameter carrying the affiliate id, per platform
pub fn affiliate_param(platform: Platform) -> &'static str {
    match platform {
        Platform::Amazon => "tag",
        Platform::MercadoLivre => "matt_tool",
        _ => "af_id",
    }
}

fn affiliate_id(config: &AffiliateConfig, platform: Platform) -> Option<&str> {
    let id = match platform {
        Platform::Amazon => config.amazon_tag.as_deref(),
        Platform::MercadoLivre => config.mercadolivre_id.as_deref(),
        Platform::Shopee => config.shopee_id.as_deref(),
        Platform::AliExpress => config.aliexpress_id.as_deref(),
        Platform::Magalu => config.magalu_id.as_deref(),
    };
    id.map(str::trim).filter(|s| !s.is_empty())
}

/// Append the platform's affiliate parameter to `url`
///
/// `&` when the URL already has a query string, `?` otherwise. Without a
/// configured id the URL is returned unchanged.
pub fn build_affiliate_link(config: &AffiliateConfig, platform: Platform, url: &str) -> String {
    match affiliate_id(config, platform) {
        Some(id) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", url, separator, affiliate_param(platform), id)
        }
        None => url.to_string(),
    }
}

/// One failed (category, platform) combination
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub category: Category,
    pub platform: Platform,
    pub error: String,
}

/// Batch result
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Listings with the category they were fetched for
    pub listings: Vec<(Category, CandidateListing)>,
    pub failures: Vec<FetchFailure>,
    /// Stopped early by cancellation
    pub cancelled: bool,
}

pub struct SourceFetcher {
    sources: HashMap<Platform, Arc<dyn ListingSource>>,
    affiliate: AffiliateConfig,
}

impl SourceFetcher {
    pub fn new(affiliate: AffiliateConfig) -> Self {
        Self {
            sources: HashMap::new(),
            affiliate,
        }
    }

    /// Register (or replace) the source for its platform
    pub fn with_source(mut self, source: Arc<dyn ListingSource>) -> Self {
        self.sources.insert(source.platform(), source);
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.sources.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    /// Fetch and normalize listings for one combination
    pub async fn fetch(
        &self,
        category: Category,
        platform: Platform,
        limit: usize,
    ) -> Result<Vec<CandidateListing>, FetchError> {
        let source = self
            .sources
            .get(&platform)
            .ok_or(FetchError::UnsupportedPlatform(platform))?;

        let listings = source.search(category, limit).await?;
        Ok(listings
            .into_iter()
            .take(limit)
            .map(|listing| self.normalize(listing))
            .collect())
    }

    fn normalize(&self, mut listing: CandidateListing) -> CandidateListing {
        listing.title = sanitize_title(&listing.title);
        if listing.affiliate_link.is_none() {
            listing.affiliate_link = Some(build_affiliate_link(
                &self.affiliate,
                listing.platform,
                &listing.product_url,
            ));
        }
        listing
    }

    /// Run every (category, platform) combination, skipping failures
    pub async fn fetch_batch(
        &self,
        categories: &[Category],
        platforms: &[Platform],
        limit: usize,
        cancel: &CancellationToken,
    ) -> FetchBatch {
        let mut batch = FetchBatch::default();

        for category in categories {
            for platform in platforms {
                if cancel.is_cancelled() {
                    batch.cancelled = true;
                    return batch;
                }

                match self.fetch(*category, *platform, limit).await {
                    Ok(listings) => {
                        tracing::debug!(%category, %platform, count = listings.len(), "Fetched listings");
                        batch
                            .listings
                            .extend(listings.into_iter().map(|l| (*category, l)));
                    }
                    Err(e) => {
                        tracing::warn!(%category, %platform, error = %e, "Fetch failed, skipping combination");
                        batch.failures.push(FetchFailure {
                            category: *category,
                            platform: *platform,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        batch
    }
}
