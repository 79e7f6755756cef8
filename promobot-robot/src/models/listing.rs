//! Raw listing as produced by a source fetcher

use serde::{Deserialize, Serialize};

use super::Platform;

/// Candidate listing before normalization
///
/// `commission_percent` uses the scraper-side 0–100 convention; the enricher
/// converts it to the canonical fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateListing {
    pub platform: Platform,
    pub platform_id: String,
    pub title: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub sales_count: i64,
    pub product_url: String,
    pub image_url: Option<String>,
    pub seller: Option<String>,
    pub commission_percent: f64,
    /// Tracking link, filled in by the fetcher
    pub affiliate_link: Option<String>,
}
