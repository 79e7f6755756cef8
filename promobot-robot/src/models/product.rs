//! Product aggregate
//!
//! Natural key is (platform, platform_id). Discount and commission figures are
//! derived from price, original price and commission rate and are recomputed on
//! every mutation; nothing outside this module sets them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Category, CommissionQuality, Platform};

/// Round a currency amount to cents
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Figures derived from price, original price and commission rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedPricing {
    pub discount: f64,
    pub discount_percentage: i64,
    pub estimated_commission: f64,
    pub commission_quality: CommissionQuality,
}

impl DerivedPricing {
    /// `commission_rate` is a fraction (0–1)
    pub fn compute(price: f64, original_price: Option<f64>, commission_rate: f64) -> Self {
        let (discount, discount_percentage) = match original_price {
            Some(original) if original > price && original > 0.0 => {
                let discount = original - price;
                (round_cents(discount), (discount / original * 100.0).round() as i64)
            }
            _ => (0.0, 0),
        };

        Self {
            discount,
            discount_percentage,
            estimated_commission: round_cents(price * commission_rate),
            commission_quality: CommissionQuality::from_rate(commission_rate),
        }
    }
}

/// Scraped or submitted product fields, before derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub platform: Platform,
    pub platform_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    pub price: f64,
    #[serde(default)]
    pub original_price: Option<f64>,
    /// Fraction 0–1
    pub commission_rate: f64,
    pub product_url: String,
    #[serde(default)]
    pub affiliate_link: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub sales_count: i64,
    #[serde(default)]
    pub seller: Option<String>,
}

impl ProductDraft {
    /// Field-level validation shared by the API and the enricher
    pub fn validate(&self) -> Result<(), String> {
        if self.platform_id.trim().is_empty() {
            return Err("platformId is required".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        validate_pricing(self.price, self.original_price, self.commission_rate)?;
        if let Some(rating) = self.rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(format!("rating must be between 0 and 5, got {}", rating));
            }
        }
        if self.product_url.trim().is_empty() {
            return Err("productUrl is required".to_string());
        }
        if self.review_count < 0 || self.sales_count < 0 {
            return Err("reviewCount and salesCount must be non-negative".to_string());
        }
        Ok(())
    }
}

fn validate_pricing(price: f64, original_price: Option<f64>, commission_rate: f64) -> Result<(), String> {
    if !price.is_finite() || price <= 0.0 {
        return Err(format!("price must be positive, got {}", price));
    }
    if let Some(original) = original_price {
        if !original.is_finite() || original < 0.0 {
            return Err(format!("originalPrice must be non-negative, got {}", original));
        }
    }
    if !commission_rate.is_finite() || !(0.0..=1.0).contains(&commission_rate) {
        return Err(format!(
            "commissionRate must be a fraction between 0 and 1, got {}",
            commission_rate
        ));
    }
    Ok(())
}

/// Persistent product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub platform: Platform,
    pub platform_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub price: f64,
    pub original_price: Option<f64>,
    pub discount: f64,
    pub discount_percentage: i64,
    pub commission_rate: f64,
    pub estimated_commission: f64,
    pub commission_quality: CommissionQuality,
    pub product_url: String,
    pub affiliate_link: String,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub sales_count: i64,
    pub seller: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// New unapproved product from a draft
    pub fn from_draft(draft: ProductDraft, scraped_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        let affiliate_link = draft
            .affiliate_link
            .clone()
            .unwrap_or_else(|| draft.product_url.clone());
        let derived = DerivedPricing::compute(draft.price, draft.original_price, draft.commission_rate);

        Self {
            id: Uuid::new_v4(),
            platform: draft.platform,
            platform_id: draft.platform_id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            price: draft.price,
            original_price: draft.original_price,
            discount: derived.discount,
            discount_percentage: derived.discount_percentage,
            commission_rate: draft.commission_rate,
            estimated_commission: derived.estimated_commission,
            commission_quality: derived.commission_quality,
            product_url: draft.product_url,
            affiliate_link,
            image_url: draft.image_url,
            rating: draft.rating,
            review_count: draft.review_count,
            sales_count: draft.sales_count,
            seller: draft.seller,
            is_active: true,
            is_approved: false,
            approved_by: None,
            approved_at: None,
            views: 0,
            clicks: 0,
            conversions: 0,
            scraped_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite scraped fields from a fresh draft
    ///
    /// Approval state, the active flag and engagement counters are kept: a
    /// product deactivated by an operator stays deactivated across re-scrapes.
    pub fn apply_draft(&mut self, draft: ProductDraft, scraped_at: Option<DateTime<Utc>>) {
        self.title = draft.title;
        if draft.description.is_some() {
            self.description = draft.description;
        }
        self.category = draft.category;
        self.price = draft.price;
        self.original_price = draft.original_price;
        self.commission_rate = draft.commission_rate;
        self.affiliate_link = draft
            .affiliate_link
            .unwrap_or_else(|| draft.product_url.clone());
        self.product_url = draft.product_url;
        self.image_url = draft.image_url.or(self.image_url.take());
        self.rating = draft.rating;
        self.review_count = draft.review_count;
        self.sales_count = draft.sales_count;
        self.seller = draft.seller.or(self.seller.take());
        if scraped_at.is_some() {
            self.scraped_at = scraped_at;
        }
        self.touch();
    }

    /// Apply an API edit
    ///
    /// Every field is validated before any is assigned, so a rejected patch
    /// leaves the product unchanged.
    pub fn apply_patch(&mut self, patch: ProductPatch) -> Result<(), String> {
        let price = patch.price.unwrap_or(self.price);
        let original_price = match patch.original_price {
            Some(value) => value,
            None => self.original_price,
        };
        let commission_rate = patch.commission_rate.unwrap_or(self.commission_rate);
        validate_pricing(price, original_price, commission_rate)?;

        if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
            return Err("title cannot be empty".to_string());
        }
        if let Some(rating) = patch.rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(format!("rating must be between 0 and 5, got {}", rating));
            }
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(rating) = patch.rating {
            self.rating = Some(rating);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(url) = patch.product_url {
            self.product_url = url;
        }
        if let Some(link) = patch.affiliate_link {
            self.affiliate_link = link;
        }
        if let Some(image) = patch.image_url {
            self.image_url = Some(image);
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        self.price = price;
        self.original_price = original_price;
        self.commission_rate = commission_rate;
        self.touch();
        Ok(())
    }

    /// Mark approved by `approver`
    pub fn approve(&mut self, approver: &str) {
        self.is_approved = true;
        self.approved_by = Some(approver.to_string());
        self.approved_at = Some(Utc::now());
        self.touch();
    }

    /// Withdraw approval
    pub fn reject(&mut self) {
        self.is_approved = false;
        self.approved_by = None;
        self.approved_at = None;
        self.touch();
    }

    /// Recompute derived fields and bump `updated_at`
    fn touch(&mut self) {
        self.recompute_derived();
        self.updated_at = Utc::now();
    }

    /// Recompute discount and commission figures from price and rate
    pub fn recompute_derived(&mut self) {
        let derived = DerivedPricing::compute(self.price, self.original_price, self.commission_rate);
        self.discount = derived.discount;
        self.discount_percentage = derived.discount_percentage;
        self.estimated_commission = derived.estimated_commission;
        self.commission_quality = derived.commission_quality;
    }
}

/// Editable product fields (PUT /api/products/:id)
///
/// Derived fields are not part of the patch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price: Option<f64>,
    /// `null` clears the list price and with it the discount
    #[serde(default, with = "crate::models::double_option")]
    pub original_price: Option<Option<f64>>,
    pub commission_rate: Option<f64>,
    pub product_url: Option<String>,
    pub affiliate_link: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
pub(crate) fn sample_draft(platform_id: &str, price: f64, rate: f64) -> ProductDraft {
    ProductDraft {
        platform: Platform::MercadoLivre,
        platform_id: platform_id.to_string(),
        title: format!("Fone Bluetooth Modelo {}", platform_id),
        description: None,
        category: Category::Electronics,
        price,
        original_price: None,
        commission_rate: rate,
        product_url: format!("https://produto.mercadolivre.com.br/{}", platform_id),
        affiliate_link: None,
        image_url: None,
        rating: Some(4.5),
        review_count: 10,
        sales_count: 100,
        seller: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_derivation() {
        let d = DerivedPricing::compute(80.0, Some(100.0), 0.1);
        assert_eq!(d.discount, 20.0);
        assert_eq!(d.discount_percentage, 20);

        let d = DerivedPricing::compute(99.9, Some(149.9), 0.1);
        assert_eq!(d.discount, 50.0);
        assert_eq!(d.discount_percentage, 33);
    }

    #[test]
    fn test_no_discount_when_original_not_higher() {
        assert_eq!(DerivedPricing::compute(100.0, Some(90.0), 0.1).discount, 0.0);
        assert_eq!(DerivedPricing::compute(100.0, Some(100.0), 0.1).discount_percentage, 0);
        assert_eq!(DerivedPricing::compute(100.0, None, 0.1).discount, 0.0);
    }

    #[test]
    fn test_estimated_commission_rounded() {
        let d = DerivedPricing::compute(33.33, None, 0.07);
        assert_eq!(d.estimated_commission, 2.33);
        assert_eq!(d.commission_quality, CommissionQuality::Regular);
    }

    #[test]
    fn test_patch_recomputes_derived_fields() {
        let mut product = Product::from_draft(sample_draft("MLB1", 100.0, 0.05), None);
        assert_eq!(product.estimated_commission, 5.0);
        assert_eq!(product.commission_quality, CommissionQuality::Regular);

        product
            .apply_patch(ProductPatch {
                price: Some(200.0),
                commission_rate: Some(0.16),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(product.estimated_commission, round_cents(200.0 * 0.16));
        assert_eq!(product.commission_quality, CommissionQuality::Excellent);
    }

    #[test]
    fn test_patch_rejects_percentage_rate() {
        let mut product = Product::from_draft(sample_draft("MLB1", 100.0, 0.05), None);
        let err = product
            .apply_patch(ProductPatch {
                commission_rate: Some(15.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.contains("fraction"));
        // Rejected patch leaves the product untouched
        assert_eq!(product.commission_rate, 0.05);
    }

    #[test]
    fn test_apply_draft_keeps_approval() {
        let mut product = Product::from_draft(sample_draft("MLB1", 100.0, 0.05), None);
        product.approve("admin");
        product.clicks = 7;

        product.apply_draft(sample_draft("MLB1", 90.0, 0.12), Some(Utc::now()));

        assert!(product.is_approved);
        assert_eq!(product.clicks, 7);
        assert_eq!(product.price, 90.0);
        assert_eq!(product.estimated_commission, 10.8);
        assert_eq!(product.commission_quality, CommissionQuality::Good);
    }

    #[test]
    fn test_apply_draft_keeps_deactivation() {
        let mut product = Product::from_draft(sample_draft("MLB1", 100.0, 0.15), None);
        product.approve("admin");
        product.is_active = false;

        product.apply_draft(sample_draft("MLB1", 95.0, 0.15), Some(Utc::now()));

        assert!(!product.is_active);
        assert!(product.is_approved);
        assert_eq!(product.price, 95.0);
    }

    #[test]
    fn test_patch_clears_original_price() {
        let mut draft = sample_draft("MLB1", 80.0, 0.1);
        draft.original_price = Some(100.0);
        let mut product = Product::from_draft(draft, None);
        assert_eq!(product.discount, 20.0);

        let patch: ProductPatch = serde_json::from_str(r#"{"title": "Fone Bluetooth Renovado"}"#).unwrap();
        product.apply_patch(patch).unwrap();
        assert_eq!(product.original_price, Some(100.0), "Absent field keeps the list price");

        let patch: ProductPatch = serde_json::from_str(r#"{"originalPrice": null}"#).unwrap();
        product.apply_patch(patch).unwrap();
        assert_eq!(product.original_price, None);
        assert_eq!(product.discount, 0.0);
        assert_eq!(product.discount_percentage, 0);
    }

    #[test]
    fn test_rejected_patch_changes_nothing() {
        let mut product = Product::from_draft(sample_draft("MLB1", 100.0, 0.05), None);
        let before = product.title.clone();

        let err = product
            .apply_patch(ProductPatch {
                title: Some("Fone Bluetooth Edição Limitada".to_string()),
                rating: Some(7.5),
                is_active: Some(false),
                ..Default::default()
            })
            .unwrap_err();

        assert!(err.contains("rating"));
        assert_eq!(product.title, before);
        assert_eq!(product.rating, Some(4.5));
        assert!(product.is_active);
    }

    #[test]
    fn test_draft_validation() {
        assert!(sample_draft("MLB1", 100.0, 0.05).validate().is_ok());
        assert!(sample_draft("MLB1", 0.0, 0.05).validate().is_err());
        assert!(sample_draft("MLB1", 10.0, 1.5).validate().is_err());
        assert!(sample_draft("", 10.0, 0.1).validate().is_err());
    }
}
