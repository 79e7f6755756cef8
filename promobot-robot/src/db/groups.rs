//! Message group persistence
//!
//! Daily counters are reset lazily: every eligibility load and every send
//! increment first compares `counters_date` with the local date.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use promobot_common::pagination::{calculate_pagination, Page, SortOrder};
use promobot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{parse_name, parse_opt_date, parse_opt_timestamp, parse_opt_uuid, parse_timestamp, parse_uuid, ts};
use crate::models::{AllowedHours, Category, EngagementDelta, Group, GroupInput};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const COLUMNS: &str = "id, whatsapp_id, name, description, category, is_active, sending_enabled, \
    max_messages_per_day, allowed_start, allowed_end, template_id, total_sent, sent_today, \
    last_sent, counters_date, total_clicks, total_reactions, total_replies, created_at, updated_at";

pub const SORT_FIELDS: &[(&str, &'static str)] = &[
    ("name", "name"),
    ("createdAt", "created_at"),
    ("totalSent", "total_sent"),
    ("sentToday", "sent_today"),
    ("lastSent", "last_sent"),
];

pub const DEFAULT_SORT: SortOrder = SortOrder {
    column: "name",
    descending: false,
};

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn group_from_row(row: &SqliteRow) -> Result<Group> {
    let id: String = row.get("id");
    let category: String = row.get("category");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let start: i64 = row.get("allowed_start");
    let end: i64 = row.get("allowed_end");

    Ok(Group {
        id: parse_uuid(&id, "message_groups.id")?,
        whatsapp_id: row.get("whatsapp_id"),
        name: row.get("name"),
        description: row.get("description"),
        category: parse_name(&category)?,
        is_active: row.get("is_active"),
        sending_enabled: row.get("sending_enabled"),
        max_messages_per_day: row.get("max_messages_per_day"),
        allowed_hours: AllowedHours {
            start: start.clamp(0, 24) as u32,
            end: end.clamp(0, 24) as u32,
        },
        template_id: parse_opt_uuid(row.get("template_id"), "template_id")?,
        total_sent: row.get("total_sent"),
        sent_today: row.get("sent_today"),
        last_sent: parse_opt_timestamp(row.get("last_sent"), "last_sent")?,
        counters_date: parse_opt_date(row.get("counters_date"), "counters_date")?,
        total_clicks: row.get("total_clicks"),
        total_reactions: row.get("total_reactions"),
        total_replies: row.get("total_replies"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// Insert a new group; a taken `whatsapp_id` is a `Conflict`
pub async fn insert_group(pool: &SqlitePool, group: &Group) -> Result<()> {
    let result = sqlx::query(&format!(
        "INSERT INTO message_groups ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    ))
    .bind(group.id.to_string())
    .bind(&group.whatsapp_id)
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.category.as_str())
    .bind(group.is_active)
    .bind(group.sending_enabled)
    .bind(group.max_messages_per_day)
    .bind(group.allowed_hours.start as i64)
    .bind(group.allowed_hours.end as i64)
    .bind(group.template_id.map(|id| id.to_string()))
    .bind(group.total_sent)
    .bind(group.sent_today)
    .bind(group.last_sent.map(ts))
    .bind(group.counters_date.map(date_key))
    .bind(group.total_clicks)
    .bind(group.total_reactions)
    .bind(group.total_replies)
    .bind(ts(group.created_at))
    .bind(ts(group.updated_at))
    .execute(pool)
    .await
    .map_err(Error::Database);

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "Group with whatsappId {} already exists",
            group.whatsapp_id
        ))),
        Err(e) => Err(e),
    }
}

/// Write the configurable columns of a group
///
/// Counters are only changed through the increment functions.
pub async fn save_group(pool: &SqlitePool, group: &Group) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE message_groups SET
            name = ?, description = ?, category = ?, is_active = ?, sending_enabled = ?,
            max_messages_per_day = ?, allowed_start = ?, allowed_end = ?, template_id = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.category.as_str())
    .bind(group.is_active)
    .bind(group.sending_enabled)
    .bind(group.max_messages_per_day)
    .bind(group.allowed_hours.start as i64)
    .bind(group.allowed_hours.end as i64)
    .bind(group.template_id.map(|id| id.to_string()))
    .bind(ts(group.updated_at))
    .bind(group.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Group {}", group.id)));
    }
    Ok(())
}

pub async fn load_group(pool: &SqlitePool, id: Uuid) -> Result<Option<Group>> {
    let row = sqlx::query(&format!("SELECT {} FROM message_groups WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(group_from_row).transpose()
}

pub async fn get_group(pool: &SqlitePool, id: Uuid) -> Result<Group> {
    load_group(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Group {}", id)))
}

/// Hard delete; delivery records keep their dangling `group_id`
pub async fn delete_group(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM message_groups WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Group {}", id)));
    }
    Ok(())
}

/// Query-string filters for GET /api/groups
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFilter {
    pub category: Option<Category>,
    pub is_active: Option<bool>,
    pub sending_enabled: Option<bool>,
    pub search: Option<String>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &GroupFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    if let Some(enabled) = filter.sending_enabled {
        builder.push(" AND sending_enabled = ").push_bind(enabled);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND name LIKE ").push_bind(format!("%{}%", search));
    }
}

pub async fn list_groups(
    pool: &SqlitePool,
    filter: &GroupFilter,
    page: Option<i64>,
    limit: Option<i64>,
    sort: SortOrder,
) -> Result<Page<Group>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM message_groups");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, page, limit);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM message_groups", COLUMNS));
    push_filters(&mut select, filter);
    select.push(sort.to_sql());
    select
        .push(" LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = select.build().fetch_all(pool).await?;
    let docs = rows.iter().map(group_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(docs, total, pagination))
}

/// Zero `sent_today` on every row whose counter belongs to another day
///
/// Returns the number of rows reset.
pub async fn refresh_daily_counters(pool: &SqlitePool, today: NaiveDate) -> Result<u64> {
    let today = date_key(today);
    let result = retry_on_lock("refresh_daily_counters", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE message_groups SET sent_today = 0, counters_date = ?
            WHERE counters_date IS NULL OR counters_date <> ?
            "#,
        )
        .bind(&today)
        .bind(&today)
        .execute(pool)
        .await
        .map_err(Error::Database)
    })
    .await?;
    Ok(result.rows_affected())
}

/// Groups eligible to receive a message at local time `now`
pub async fn eligible_groups(pool: &SqlitePool, now: NaiveDateTime) -> Result<Vec<Group>> {
    refresh_daily_counters(pool, now.date()).await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM message_groups WHERE is_active = 1 AND sending_enabled = 1 ORDER BY name",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let mut eligible = Vec::new();
    for row in &rows {
        let group = group_from_row(row)?;
        if group.is_eligible_at(now) {
            eligible.push(group);
        }
    }
    Ok(eligible)
}

/// Count one successful send against the group's counters
///
/// A counter from another day restarts at 1.
pub async fn record_sent(pool: &SqlitePool, id: Uuid, sent_at: DateTime<Utc>, today: NaiveDate) -> Result<()> {
    let today = date_key(today);
    let sent_at = ts(sent_at);
    let id = id.to_string();

    let result = retry_on_lock("record_sent", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE message_groups SET
                sent_today = CASE WHEN counters_date = ? THEN sent_today + 1 ELSE 1 END,
                counters_date = ?,
                total_sent = total_sent + 1,
                last_sent = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&today)
        .bind(&today)
        .bind(&sent_at)
        .bind(&sent_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)
    })
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Group {}", id)));
    }
    Ok(())
}

/// Add engagement to the group's aggregates
pub async fn add_engagement(pool: &SqlitePool, id: Uuid, delta: EngagementDelta) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE message_groups SET
            total_clicks = total_clicks + ?,
            total_reactions = total_reactions + ?,
            total_replies = total_replies + ?
        WHERE id = ?
        "#,
    )
    .bind(delta.clicks)
    .bind(delta.reactions)
    .bind(delta.replies)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Result of importing the gateway's group list
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

/// Upsert groups by `whatsapp_id` from `(whatsapp_id, name)` pairs
///
/// New groups start with sending disabled so nothing is posted to a group an
/// operator has not reviewed.
pub async fn sync_groups(pool: &SqlitePool, remote: &[(String, String)]) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let now = ts(Utc::now());

    for (whatsapp_id, name) in remote {
        let updated = sqlx::query("UPDATE message_groups SET name = ?, updated_at = ? WHERE whatsapp_id = ?")
            .bind(name)
            .bind(&now)
            .bind(whatsapp_id)
            .execute(pool)
            .await?;

        if updated.rows_affected() > 0 {
            report.updated += 1;
            continue;
        }

        let group = Group::new(GroupInput {
            whatsapp_id: whatsapp_id.clone(),
            name: name.clone(),
            description: None,
            category: Category::General,
            is_active: Some(true),
            sending_enabled: Some(false),
            max_messages_per_day: None,
            allowed_hours: None,
            template_id: None,
        });
        insert_group(pool, &group).await?;
        report.created += 1;
    }

    Ok(report)
}
