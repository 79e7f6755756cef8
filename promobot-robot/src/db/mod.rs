//! Database access for promobot-robot
//!
//! One table per aggregate. Ids are TEXT uuids, timestamps are RFC 3339 TEXT,
//! enums are stored by their lowercase names.

pub mod deliveries;
pub mod groups;
pub mod products;
pub mod templates;

use chrono::{DateTime, NaiveDate, Utc};
use promobot_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::UnknownVariant;

/// Open the database file and create missing tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = promobot_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// In-memory database with all tables, for tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = promobot_common::db::init_memory_database().await?;
    init_tables(&pool).await?;
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        platform TEXT NOT NULL,
        platform_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL,
        price REAL NOT NULL,
        original_price REAL,
        discount REAL NOT NULL DEFAULT 0,
        discount_percentage INTEGER NOT NULL DEFAULT 0,
        commission_rate REAL NOT NULL,
        estimated_commission REAL NOT NULL,
        commission_quality TEXT NOT NULL,
        product_url TEXT NOT NULL,
        affiliate_link TEXT NOT NULL,
        image_url TEXT,
        rating REAL,
        review_count INTEGER NOT NULL DEFAULT 0,
        sales_count INTEGER NOT NULL DEFAULT 0,
        seller TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_approved INTEGER NOT NULL DEFAULT 0,
        approved_by TEXT,
        approved_at TEXT,
        views INTEGER NOT NULL DEFAULT 0,
        clicks INTEGER NOT NULL DEFAULT 0,
        conversions INTEGER NOT NULL DEFAULT 0,
        scraped_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (platform, platform_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
    "CREATE INDEX IF NOT EXISTS idx_products_selection ON products(is_approved, is_active, commission_quality)",
    "CREATE INDEX IF NOT EXISTS idx_products_commission ON products(estimated_commission DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS message_groups (
        id TEXT PRIMARY KEY,
        whatsapp_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        sending_enabled INTEGER NOT NULL DEFAULT 1,
        max_messages_per_day INTEGER NOT NULL DEFAULT 10,
        allowed_start INTEGER NOT NULL DEFAULT 8,
        allowed_end INTEGER NOT NULL DEFAULT 22,
        template_id TEXT,
        total_sent INTEGER NOT NULL DEFAULT 0,
        sent_today INTEGER NOT NULL DEFAULT 0,
        last_sent TEXT,
        counters_date TEXT,
        total_clicks INTEGER NOT NULL DEFAULT 0,
        total_reactions INTEGER NOT NULL DEFAULT 0,
        total_replies INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (allowed_end > allowed_start)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_groups_category ON message_groups(category)",
    r#"
    CREATE TABLE IF NOT EXISTS templates (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        content TEXT NOT NULL,
        variables TEXT NOT NULL DEFAULT '[]',
        is_default INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        usage_count INTEGER NOT NULL DEFAULT 0,
        last_used TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_templates_category ON templates(category, is_default)",
    r#"
    CREATE TABLE IF NOT EXISTS deliveries (
        id TEXT PRIMARY KEY,
        product_id TEXT NOT NULL,
        group_id TEXT NOT NULL,
        template_id TEXT,
        content TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        sent_at TEXT,
        failed_at TEXT,
        delivered_at TEXT,
        read_at TEXT,
        clicks INTEGER NOT NULL DEFAULT 0,
        reactions INTEGER NOT NULL DEFAULT 0,
        replies INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_deliveries_status ON deliveries(status)",
    "CREATE INDEX IF NOT EXISTS idx_deliveries_group ON deliveries(group_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_deliveries_product ON deliveries(product_id)",
];

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Database schema ready");
    Ok(())
}

pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid {} '{}': {}", column, raw, e)))
}

pub(crate) fn parse_opt_uuid(raw: Option<String>, column: &str) -> Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(&s, column)).transpose()
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_opt_timestamp(raw: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(&s, column)).transpose()
}

pub(crate) fn parse_opt_date(raw: Option<String>, column: &str) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
    })
    .transpose()
}

pub(crate) fn parse_name<T>(raw: &str) -> Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.parse().map_err(|e: UnknownVariant| Error::Internal(e.to_string()))
}

pub(crate) fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn opt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|v| v.to_rfc3339())
}
