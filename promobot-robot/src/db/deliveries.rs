//! Delivery log persistence
//!
//! Rows are append-only. Status moves forward along the allowed transitions,
//! each stamping its own timestamp column; engagement only ever increments.

use chrono::{DateTime, Utc};
use promobot_common::pagination::{calculate_pagination, Page, SortOrder};
use promobot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_name, parse_opt_timestamp, parse_opt_uuid, parse_timestamp, parse_uuid, ts};
use crate::models::{Delivery, DeliveryStatus, EngagementDelta};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const COLUMNS: &str = "id, product_id, group_id, template_id, content, status, error, attempts, \
    created_at, sent_at, failed_at, delivered_at, read_at, clicks, reactions, replies";

pub const SORT_FIELDS: &[(&str, &'static str)] = &[
    ("createdAt", "created_at"),
    ("sentAt", "sent_at"),
    ("status", "status"),
    ("attempts", "attempts"),
    ("clicks", "clicks"),
];

pub const DEFAULT_SORT: SortOrder = SortOrder {
    column: "created_at",
    descending: true,
};

fn delivery_from_row(row: &SqliteRow) -> Result<Delivery> {
    let id: String = row.get("id");
    let product_id: String = row.get("product_id");
    let group_id: String = row.get("group_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(Delivery {
        id: parse_uuid(&id, "deliveries.id")?,
        product_id: parse_uuid(&product_id, "product_id")?,
        group_id: parse_uuid(&group_id, "group_id")?,
        template_id: parse_opt_uuid(row.get("template_id"), "template_id")?,
        content: row.get("content"),
        status: parse_name(&status)?,
        error: row.get("error"),
        attempts: row.get("attempts"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        sent_at: parse_opt_timestamp(row.get("sent_at"), "sent_at")?,
        failed_at: parse_opt_timestamp(row.get("failed_at"), "failed_at")?,
        delivered_at: parse_opt_timestamp(row.get("delivered_at"), "delivered_at")?,
        read_at: parse_opt_timestamp(row.get("read_at"), "read_at")?,
        clicks: row.get("clicks"),
        reactions: row.get("reactions"),
        replies: row.get("replies"),
    })
}

pub async fn insert_delivery(pool: &SqlitePool, delivery: &Delivery) -> Result<()> {
    let id = delivery.id.to_string();
    let product_id = delivery.product_id.to_string();
    let group_id = delivery.group_id.to_string();
    let template_id = delivery.template_id.map(|t| t.to_string());
    let created_at = ts(delivery.created_at);

    retry_on_lock("insert_delivery", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO deliveries (id, product_id, group_id, template_id, content, status, error, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&product_id)
        .bind(&group_id)
        .bind(&template_id)
        .bind(&delivery.content)
        .bind(delivery.status.as_str())
        .bind(&delivery.error)
        .bind(delivery.attempts)
        .bind(&created_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

pub async fn load_delivery(pool: &SqlitePool, id: Uuid) -> Result<Option<Delivery>> {
    let row = sqlx::query(&format!("SELECT {} FROM deliveries WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(delivery_from_row).transpose()
}

pub async fn get_delivery(pool: &SqlitePool, id: Uuid) -> Result<Delivery> {
    load_delivery(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Delivery {}", id)))
}

/// Details recorded with a status change
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    pub error: Option<String>,
    pub attempts: Option<i64>,
}

fn timestamp_column(status: DeliveryStatus) -> Option<&'static str> {
    match status {
        DeliveryStatus::Pending => None,
        DeliveryStatus::Sent => Some("sent_at"),
        DeliveryStatus::Failed => Some("failed_at"),
        DeliveryStatus::Delivered => Some("delivered_at"),
        DeliveryStatus::Read => Some("read_at"),
    }
}

/// Move a delivery to `next`, stamping the matching timestamp
///
/// Disallowed transitions are `InvalidInput`. The update is conditional on
/// the status read, so a concurrent transition makes this one a `Conflict`.
pub async fn transition_status(
    pool: &SqlitePool,
    id: Uuid,
    next: DeliveryStatus,
    details: TransitionDetails,
    at: DateTime<Utc>,
) -> Result<Delivery> {
    let current = get_delivery(pool, id).await?;
    if !current.status.can_transition_to(next) {
        return Err(Error::InvalidInput(format!(
            "Cannot change delivery status from {} to {}",
            current.status, next
        )));
    }

    let mut query = QueryBuilder::<Sqlite>::new("UPDATE deliveries SET status = ");
    query.push_bind(next.as_str());
    if let Some(column) = timestamp_column(next) {
        query.push(format!(", {} = ", column)).push_bind(ts(at));
    }
    if let Some(error) = details.error {
        query.push(", error = ").push_bind(error);
    }
    if let Some(attempts) = details.attempts {
        query.push(", attempts = ").push_bind(attempts);
    }
    query
        .push(" WHERE id = ")
        .push_bind(id.to_string())
        .push(" AND status = ")
        .push_bind(current.status.as_str());

    let result = query.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!("Delivery {} changed concurrently", id)));
    }

    get_delivery(pool, id).await
}

pub async fn mark_sent(pool: &SqlitePool, id: Uuid, attempts: u32, at: DateTime<Utc>) -> Result<Delivery> {
    transition_status(
        pool,
        id,
        DeliveryStatus::Sent,
        TransitionDetails {
            error: None,
            attempts: Some(attempts as i64),
        },
        at,
    )
    .await
}

pub async fn mark_failed(
    pool: &SqlitePool,
    id: Uuid,
    attempts: u32,
    error: String,
    at: DateTime<Utc>,
) -> Result<Delivery> {
    transition_status(
        pool,
        id,
        DeliveryStatus::Failed,
        TransitionDetails {
            error: Some(error),
            attempts: Some(attempts as i64),
        },
        at,
    )
    .await
}

/// Increment engagement counters; returns the updated record
pub async fn add_engagement(pool: &SqlitePool, id: Uuid, delta: EngagementDelta) -> Result<Delivery> {
    let result = sqlx::query(
        "UPDATE deliveries SET clicks = clicks + ?, reactions = reactions + ?, replies = replies + ? WHERE id = ?",
    )
    .bind(delta.clicks)
    .bind(delta.reactions)
    .bind(delta.replies)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Delivery {}", id)));
    }
    get_delivery(pool, id).await
}

/// Query-string filters for GET /api/deliveries
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
    pub group_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &DeliveryFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(group_id) = filter.group_id {
        builder.push(" AND group_id = ").push_bind(group_id.to_string());
    }
    if let Some(product_id) = filter.product_id {
        builder.push(" AND product_id = ").push_bind(product_id.to_string());
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ").push_bind(ts(from));
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at <= ").push_bind(ts(to));
    }
}

pub async fn list_deliveries(
    pool: &SqlitePool,
    filter: &DeliveryFilter,
    page: Option<i64>,
    limit: Option<i64>,
    sort: SortOrder,
) -> Result<Page<Delivery>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM deliveries");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, page, limit);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM deliveries", COLUMNS));
    push_filters(&mut select, filter);
    select.push(sort.to_sql());
    select
        .push(" LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = select.build().fetch_all(pool).await?;
    let docs = rows.iter().map(delivery_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(docs, total, pagination))
}

/// Aggregate figures for GET /api/deliveries/stats
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    /// Share of finished deliveries (not pending) that reached the gateway
    pub success_rate: f64,
    pub total_clicks: i64,
    pub total_reactions: i64,
    pub total_replies: i64,
}

pub async fn delivery_stats(pool: &SqlitePool) -> Result<DeliveryStats> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM deliveries GROUP BY status")
        .fetch_all(pool)
        .await?;
    let by_status: BTreeMap<String, i64> = rows
        .iter()
        .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
        .collect();

    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(clicks), 0) AS clicks,
               COALESCE(SUM(reactions), 0) AS reactions,
               COALESCE(SUM(replies), 0) AS replies
        FROM deliveries
        "#,
    )
    .fetch_one(pool)
    .await?;

    let count = |status: DeliveryStatus| by_status.get(status.as_str()).copied().unwrap_or(0);
    let reached = count(DeliveryStatus::Sent) + count(DeliveryStatus::Delivered) + count(DeliveryStatus::Read);
    let finished = reached + count(DeliveryStatus::Failed);
    let success_rate = if finished > 0 {
        reached as f64 / finished as f64
    } else {
        0.0
    };

    Ok(DeliveryStats {
        total: totals.get("total"),
        success_rate,
        total_clicks: totals.get("clicks"),
        total_reactions: totals.get("reactions"),
        total_replies: totals.get("replies"),
        by_status,
    })
}
