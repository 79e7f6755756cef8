//! Product persistence
//!
//! Upserts go through the natural key (platform, platform_id). Derived
//! pricing columns are written from the model, which recomputes them on every
//! mutation.

use chrono::{DateTime, Utc};
use promobot_common::pagination::{calculate_pagination, Page, SortOrder};
use promobot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{opt_ts, parse_name, parse_opt_timestamp, parse_timestamp, parse_uuid, ts};
use crate::models::{Category, CommissionQuality, Platform, Product, ProductDraft};

const COLUMNS: &str = "id, platform, platform_id, title, description, category, price, original_price, \
    discount, discount_percentage, commission_rate, estimated_commission, commission_quality, \
    product_url, affiliate_link, image_url, rating, review_count, sales_count, seller, \
    is_active, is_approved, approved_by, approved_at, views, clicks, conversions, \
    scraped_at, created_at, updated_at";

/// Sortable API fields
pub const SORT_FIELDS: &[(&str, &'static str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("price", "price"),
    ("discountPercentage", "discount_percentage"),
    ("commissionRate", "commission_rate"),
    ("estimatedCommission", "estimated_commission"),
    ("rating", "rating"),
    ("salesCount", "sales_count"),
    ("title", "title"),
];

pub const DEFAULT_SORT: SortOrder = SortOrder {
    column: "created_at",
    descending: true,
};

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let id: String = row.get("id");
    let platform: String = row.get("platform");
    let category: String = row.get("category");
    let quality: String = row.get("commission_quality");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Product {
        id: parse_uuid(&id, "products.id")?,
        platform: parse_name(&platform)?,
        platform_id: row.get("platform_id"),
        title: row.get("title"),
        description: row.get("description"),
        category: parse_name(&category)?,
        price: row.get("price"),
        original_price: row.get("original_price"),
        discount: row.get("discount"),
        discount_percentage: row.get("discount_percentage"),
        commission_rate: row.get("commission_rate"),
        estimated_commission: row.get("estimated_commission"),
        commission_quality: parse_name(&quality)?,
        product_url: row.get("product_url"),
        affiliate_link: row.get("affiliate_link"),
        image_url: row.get("image_url"),
        rating: row.get("rating"),
        review_count: row.get("review_count"),
        sales_count: row.get("sales_count"),
        seller: row.get("seller"),
        is_active: row.get("is_active"),
        is_approved: row.get("is_approved"),
        approved_by: row.get("approved_by"),
        approved_at: parse_opt_timestamp(row.get("approved_at"), "approved_at")?,
        views: row.get("views"),
        clicks: row.get("clicks"),
        conversions: row.get("conversions"),
        scraped_at: parse_opt_timestamp(row.get("scraped_at"), "scraped_at")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// Insert a new product
///
/// A taken (platform, platform_id) pair is a `Conflict`.
pub async fn insert_product(pool: &SqlitePool, product: &Product) -> Result<()> {
    let result = sqlx::query(&format!(
        "INSERT INTO products ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    ))
    .bind(product.id.to_string())
    .bind(product.platform.as_str())
    .bind(&product.platform_id)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.category.as_str())
    .bind(product.price)
    .bind(product.original_price)
    .bind(product.discount)
    .bind(product.discount_percentage)
    .bind(product.commission_rate)
    .bind(product.estimated_commission)
    .bind(product.commission_quality.as_str())
    .bind(&product.product_url)
    .bind(&product.affiliate_link)
    .bind(&product.image_url)
    .bind(product.rating)
    .bind(product.review_count)
    .bind(product.sales_count)
    .bind(&product.seller)
    .bind(product.is_active)
    .bind(product.is_approved)
    .bind(&product.approved_by)
    .bind(opt_ts(product.approved_at))
    .bind(product.views)
    .bind(product.clicks)
    .bind(product.conversions)
    .bind(opt_ts(product.scraped_at))
    .bind(ts(product.created_at))
    .bind(ts(product.updated_at))
    .execute(pool)
    .await
    .map_err(Error::Database);

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "Product {}/{} already exists",
            product.platform, product.platform_id
        ))),
        Err(e) => Err(e),
    }
}

/// Write every mutable column of an existing product
pub async fn save_product(pool: &SqlitePool, product: &Product) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            title = ?, description = ?, category = ?, price = ?, original_price = ?,
            discount = ?, discount_percentage = ?, commission_rate = ?,
            estimated_commission = ?, commission_quality = ?, product_url = ?,
            affiliate_link = ?, image_url = ?, rating = ?, review_count = ?,
            sales_count = ?, seller = ?, is_active = ?, is_approved = ?,
            approved_by = ?, approved_at = ?, scraped_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.category.as_str())
    .bind(product.price)
    .bind(product.original_price)
    .bind(product.discount)
    .bind(product.discount_percentage)
    .bind(product.commission_rate)
    .bind(product.estimated_commission)
    .bind(product.commission_quality.as_str())
    .bind(&product.product_url)
    .bind(&product.affiliate_link)
    .bind(&product.image_url)
    .bind(product.rating)
    .bind(product.review_count)
    .bind(product.sales_count)
    .bind(&product.seller)
    .bind(product.is_active)
    .bind(product.is_approved)
    .bind(&product.approved_by)
    .bind(opt_ts(product.approved_at))
    .bind(opt_ts(product.scraped_at))
    .bind(ts(product.updated_at))
    .bind(product.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Product {}", product.id)));
    }
    Ok(())
}

pub async fn load_product(pool: &SqlitePool, id: Uuid) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("SELECT {} FROM products WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(product_from_row).transpose()
}

/// Load a product or fail with `NotFound`
pub async fn get_product(pool: &SqlitePool, id: Uuid) -> Result<Product> {
    load_product(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Product {}", id)))
}

pub async fn find_by_natural_key(
    pool: &SqlitePool,
    platform: Platform,
    platform_id: &str,
) -> Result<Option<Product>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM products WHERE platform = ? AND platform_id = ?",
        COLUMNS
    ))
    .bind(platform.as_str())
    .bind(platform_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(product_from_row).transpose()
}

/// Query-string filters for GET /api/products
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<Category>,
    pub platform: Option<Platform>,
    pub commission_quality: Option<CommissionQuality>,
    pub is_approved: Option<bool>,
    pub is_active: Option<bool>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ProductFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(platform) = filter.platform {
        builder.push(" AND platform = ").push_bind(platform.as_str());
    }
    if let Some(quality) = filter.commission_quality {
        builder.push(" AND commission_quality = ").push_bind(quality.as_str());
    }
    if let Some(approved) = filter.is_approved {
        builder.push(" AND is_approved = ").push_bind(approved);
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    if let Some(min) = filter.min_price {
        builder.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        builder.push(" AND price <= ").push_bind(max);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND title LIKE ")
            .push_bind(format!("%{}%", search));
    }
}

/// Filtered, sorted, paginated product list
pub async fn list_products(
    pool: &SqlitePool,
    filter: &ProductFilter,
    page: Option<i64>,
    limit: Option<i64>,
    sort: SortOrder,
) -> Result<Page<Product>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, page, limit);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM products", COLUMNS));
    push_filters(&mut select, filter);
    select.push(sort.to_sql());
    select
        .push(" LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = select.build().fetch_all(pool).await?;
    let docs = rows.iter().map(product_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(docs, total, pagination))
}

/// Soft delete
pub async fn deactivate_product(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Product {}", id)));
    }
    Ok(())
}

/// Engagement event recorded against a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackEvent {
    View,
    Click,
    Conversion,
}

impl TrackEvent {
    fn column(&self) -> &'static str {
        match self {
            TrackEvent::View => "views",
            TrackEvent::Click => "clicks",
            TrackEvent::Conversion => "conversions",
        }
    }
}

/// Atomically increment one engagement counter
pub async fn track_event(pool: &SqlitePool, id: Uuid, event: TrackEvent) -> Result<Product> {
    let column = event.column();
    let result = sqlx::query(&format!(
        "UPDATE products SET {col} = {col} + 1 WHERE id = ?",
        col = column
    ))
    .bind(id.to_string())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Product {}", id)));
    }
    get_product(pool, id).await
}

/// What an upsert did with one draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Errored,
}

/// Per-item bulk upsert result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertItem {
    pub platform: Platform,
    pub platform_id: String,
    pub outcome: UpsertOutcome,
    pub product_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Bulk upsert report
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpsertReport {
    pub created: usize,
    pub updated: usize,
    pub errored: usize,
    pub items: Vec<UpsertItem>,
}

/// Insert a draft as a new unapproved product, or refresh the existing one
pub async fn upsert_draft(
    pool: &SqlitePool,
    draft: ProductDraft,
    scraped_at: Option<DateTime<Utc>>,
) -> Result<(UpsertOutcome, Product)> {
    draft.validate().map_err(Error::InvalidInput)?;

    if let Some(mut existing) = find_by_natural_key(pool, draft.platform, &draft.platform_id).await? {
        existing.apply_draft(draft, scraped_at);
        save_product(pool, &existing).await?;
        return Ok((UpsertOutcome::Updated, existing));
    }

    let product = Product::from_draft(draft.clone(), scraped_at);
    match insert_product(pool, &product).await {
        Ok(()) => Ok((UpsertOutcome::Created, product)),
        // Lost a race with a concurrent insert of the same key
        Err(Error::Conflict(_)) => {
            let mut existing = find_by_natural_key(pool, draft.platform, &draft.platform_id)
                .await?
                .ok_or_else(|| Error::Internal("Product vanished during upsert".to_string()))?;
            existing.apply_draft(draft, scraped_at);
            save_product(pool, &existing).await?;
            Ok((UpsertOutcome::Updated, existing))
        }
        Err(e) => Err(e),
    }
}

/// Upsert every draft, continuing past per-item errors
pub async fn bulk_upsert(
    pool: &SqlitePool,
    drafts: Vec<ProductDraft>,
    scraped_at: Option<DateTime<Utc>>,
) -> BulkUpsertReport {
    let mut report = BulkUpsertReport::default();

    for draft in drafts {
        let platform = draft.platform;
        let platform_id = draft.platform_id.clone();

        let item = match upsert_draft(pool, draft, scraped_at).await {
            Ok((outcome, product)) => {
                match outcome {
                    UpsertOutcome::Created => report.created += 1,
                    _ => report.updated += 1,
                }
                UpsertItem {
                    platform,
                    platform_id,
                    outcome,
                    product_id: Some(product.id),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(%platform, platform_id = %platform_id, error = %e, "Product upsert failed");
                report.errored += 1;
                UpsertItem {
                    platform,
                    platform_id,
                    outcome: UpsertOutcome::Errored,
                    product_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        report.items.push(item);
    }

    report
}

/// Approved, active products in the allowed quality bands, best commission first
pub async fn select_for_delivery(
    pool: &SqlitePool,
    allow_list: &[CommissionQuality],
    max: usize,
) -> Result<Vec<Product>> {
    if allow_list.is_empty() || max == 0 {
        return Ok(Vec::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM products WHERE is_approved = 1 AND is_active = 1 AND commission_quality IN (",
        COLUMNS
    ));
    let mut separated = query.separated(", ");
    for quality in allow_list {
        separated.push_bind(quality.as_str());
    }
    separated.push_unseparated(")");
    query
        .push(" ORDER BY estimated_commission DESC, created_at ASC LIMIT ")
        .push_bind(max as i64);

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(product_from_row).collect()
}

/// Aggregate figures for GET /api/products/stats
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStats {
    pub total: i64,
    pub active: i64,
    pub approved: i64,
    pub pending_approval: i64,
    pub average_commission_rate: f64,
    pub total_estimated_commission: f64,
    pub by_quality: BTreeMap<String, i64>,
    pub by_platform: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
}

pub async fn product_stats(pool: &SqlitePool) -> Result<ProductStats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(is_active), 0) AS active,
            COALESCE(SUM(CASE WHEN is_active = 1 AND is_approved = 1 THEN 1 ELSE 0 END), 0) AS approved,
            COALESCE(SUM(CASE WHEN is_active = 1 AND is_approved = 0 THEN 1 ELSE 0 END), 0) AS pending,
            COALESCE(AVG(commission_rate), 0.0) AS avg_rate,
            COALESCE(SUM(estimated_commission), 0.0) AS total_commission
        FROM products
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ProductStats {
        total: row.get("total"),
        active: row.get("active"),
        approved: row.get("approved"),
        pending_approval: row.get("pending"),
        average_commission_rate: row.get("avg_rate"),
        total_estimated_commission: row.get("total_commission"),
        by_quality: count_by(pool, "commission_quality").await?,
        by_platform: count_by(pool, "platform").await?,
        by_category: count_by(pool, "category").await?,
    })
}

async fn count_by(pool: &SqlitePool, column: &'static str) -> Result<BTreeMap<String, i64>> {
    let rows = sqlx::query(&format!(
        "SELECT {col} AS k, COUNT(*) AS n FROM products WHERE is_active = 1 GROUP BY {col}",
        col = column
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("k"), row.get::<i64, _>("n")))
        .collect())
}
