//! Listing sources, one per platform
//!
//! A source turns a (category, limit) request into raw candidate listings.
//! Title cleanup and affiliate links are applied by the fetcher, not here.

pub mod amazon;
pub mod mercadolivre;

pub use amazon::AmazonSource;
pub use mercadolivre::MercadoLivreSource;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CandidateListing, Category, Platform};

/// Source fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {platform}")]
    Http { platform: Platform, status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No source registered for platform {0}")]
    UnsupportedPlatform(Platform),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Parse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Up to `limit` listings for `category`
    async fn search(&self, category: Category, limit: usize) -> Result<Vec<CandidateListing>, FetchError>;
}

/// Published affiliate commission, in percent, for a platform and category
pub fn commission_percent(platform: Platform, category: Category) -> f64 {
    use Category::*;
    match platform {
        Platform::MercadoLivre => match category {
            Electronics | Games => 5.0,
            Home | Toys => 8.0,
            Fashion | Beauty => 12.0,
            Sports | Health => 10.0,
            Books => 6.0,
            General => 7.0,
        },
        Platform::Amazon => match category {
            Electronics => 4.0,
            Games => 3.0,
            Home | Toys | Sports | Health | Books => 8.0,
            Fashion => 12.0,
            Beauty => 10.0,
            General => 6.0,
        },
        Platform::Shopee | Platform::AliExpress => match category {
            Fashion | Beauty => 10.0,
            _ => 6.0,
        },
        Platform::Magalu => match category {
            Electronics | Games => 4.0,
            _ => 7.0,
        },
    }
}

/// Parse a Brazilian formatted amount ("1.234,56", "R$ 89,90")
pub fn parse_brl(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.replace('.', "").replace(',', ".").parse().ok()
}
