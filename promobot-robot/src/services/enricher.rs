//! Quality gate and listing → product draft conversion
//!
//! Sources report commission in percent; drafts carry the canonical fraction.
//! The conversion happens here and nowhere else.

use promobot_common::config::QualityConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{round_cents, CandidateListing, Category, ProductDraft};

/// Why a listing was dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("price {price} below floor {floor}")]
    PriceBelowFloor { price: f64, floor: f64 },

    #[error("estimated commission {commission} below floor {floor}")]
    CommissionBelowFloor { commission: f64, floor: f64 },

    #[error("title shorter than {min} characters")]
    TitleTooShort { min: usize },

    #[error("negative sales count {0}")]
    NegativeSales(i64),

    #[error("invalid listing: {0}")]
    Invalid(String),
}

impl Rejection {
    /// Short key used when counting rejections
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::PriceBelowFloor { .. } => "price",
            Rejection::CommissionBelowFloor { .. } => "commission",
            Rejection::TitleTooShort { .. } => "title",
            Rejection::NegativeSales(_) => "sales",
            Rejection::Invalid(_) => "invalid",
        }
    }
}

/// Inclusion thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub min_price: f64,
    /// Minimum estimated commission, in currency units
    pub min_commission: f64,
    pub min_title_length: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::from(&QualityConfig::default())
    }
}

impl From<&QualityConfig> for QualityGate {
    fn from(config: &QualityConfig) -> Self {
        Self {
            min_price: config.min_price,
            min_commission: config.min_commission,
            min_title_length: config.min_title_length,
        }
    }
}

/// Percent (0–100) to fraction (0–1), clamped
pub fn percent_to_fraction(percent: f64) -> f64 {
    if !percent.is_finite() {
        return 0.0;
    }
    (percent / 100.0).clamp(0.0, 1.0)
}

/// Drafts plus rejection counts for a batch
#[derive(Debug, Default, Clone, Serialize)]
pub struct EnrichOutcome {
    #[serde(skip)]
    pub drafts: Vec<ProductDraft>,
    pub accepted: usize,
    pub rejected: BTreeMap<&'static str, usize>,
}

impl EnrichOutcome {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Enricher {
    gate: QualityGate,
}

impl Enricher {
    pub fn new(gate: QualityGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> QualityGate {
        self.gate
    }

    /// Convert a listing or say why it doesn't make the cut
    pub fn enrich(&self, listing: &CandidateListing, category: Category) -> Result<ProductDraft, Rejection> {
        if listing.sales_count < 0 {
            return Err(Rejection::NegativeSales(listing.sales_count));
        }
        if !listing.price.is_finite() || listing.price < self.gate.min_price {
            return Err(Rejection::PriceBelowFloor {
                price: listing.price,
                floor: self.gate.min_price,
            });
        }
        if listing.title.trim().chars().count() < self.gate.min_title_length {
            return Err(Rejection::TitleTooShort {
                min: self.gate.min_title_length,
            });
        }

        let commission_rate = percent_to_fraction(listing.commission_percent);
        let estimated = round_cents(listing.price * commission_rate);
        if estimated < self.gate.min_commission {
            return Err(Rejection::CommissionBelowFloor {
                commission: estimated,
                floor: self.gate.min_commission,
            });
        }

        let draft = ProductDraft {
            platform: listing.platform,
            platform_id: listing.platform_id.clone(),
            title: listing.title.trim().to_string(),
            description: None,
            category,
            price: listing.price,
            // A list price at or below the price carries no discount
            original_price: listing.original_price.filter(|o| *o > listing.price),
            commission_rate,
            product_url: listing.product_url.clone(),
            affiliate_link: listing.affiliate_link.clone(),
            image_url: listing.image_url.clone(),
            rating: listing.rating.filter(|r| (0.0..=5.0).contains(r)),
            review_count: listing.review_count.max(0),
            sales_count: listing.sales_count,
            seller: listing.seller.clone(),
        };
        draft.validate().map_err(Rejection::Invalid)?;
        Ok(draft)
    }

    /// Enrich a batch, counting rejections by reason
    pub fn enrich_all<'a, I>(&self, listings: I) -> EnrichOutcome
    where
        I: IntoIterator<Item = &'a (Category, CandidateListing)>,
    {
        let mut outcome = EnrichOutcome::default();
        for (category, listing) in listings {
            match self.enrich(listing, *category) {
                Ok(draft) => {
                    outcome.accepted += 1;
                    outcome.drafts.push(draft);
                }
                Err(rejection) => {
                    tracing::debug!(
                        platform = %listing.platform,
                        platform_id = %listing.platform_id,
                        reason = %rejection,
                        "Listing rejected by quality gate"
                    );
                    *outcome.rejected.entry(rejection.reason()).or_insert(0) += 1;
                }
            }
        }
        outcome
    }
}
