//! Template persistence and resolution

use chrono::{DateTime, Utc};
use promobot_common::pagination::{calculate_pagination, Page, SortOrder};
use promobot_common::{Error, Result};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{opt_ts, parse_name, parse_opt_timestamp, parse_timestamp, parse_uuid, ts};
use crate::models::{Category, Template, TemplateVariable};

const COLUMNS: &str = "id, name, category, content, variables, is_default, is_active, \
    usage_count, last_used, created_at, updated_at";

pub const SORT_FIELDS: &[(&str, &'static str)] = &[
    ("name", "name"),
    ("createdAt", "created_at"),
    ("usageCount", "usage_count"),
    ("lastUsed", "last_used"),
];

pub const DEFAULT_SORT: SortOrder = SortOrder {
    column: "created_at",
    descending: true,
};

fn template_from_row(row: &SqliteRow) -> Result<Template> {
    let id: String = row.get("id");
    let category: String = row.get("category");
    let variables: String = row.get("variables");
    let variables: Vec<TemplateVariable> = serde_json::from_str(&variables)
        .map_err(|e| Error::Internal(format!("Failed to deserialize variables: {}", e)))?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Template {
        id: parse_uuid(&id, "templates.id")?,
        name: row.get("name"),
        category: parse_name(&category)?,
        content: row.get("content"),
        variables,
        is_default: row.get("is_default"),
        is_active: row.get("is_active"),
        usage_count: row.get("usage_count"),
        last_used: parse_opt_timestamp(row.get("last_used"), "last_used")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn variables_json(template: &Template) -> Result<String> {
    serde_json::to_string(&template.variables)
        .map_err(|e| Error::Internal(format!("Failed to serialize variables: {}", e)))
}

/// Insert a template; a new default replaces the category's previous default
pub async fn insert_template(pool: &SqlitePool, template: &Template) -> Result<()> {
    let variables = variables_json(template)?;
    let mut tx = pool.begin().await?;

    if template.is_default {
        clear_default(&mut tx, template.category, template.id).await?;
    }

    sqlx::query(&format!(
        "INSERT INTO templates ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    ))
    .bind(template.id.to_string())
    .bind(&template.name)
    .bind(template.category.as_str())
    .bind(&template.content)
    .bind(&variables)
    .bind(template.is_default)
    .bind(template.is_active)
    .bind(template.usage_count)
    .bind(opt_ts(template.last_used))
    .bind(ts(template.created_at))
    .bind(ts(template.updated_at))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Write the editable columns of a template
pub async fn save_template(pool: &SqlitePool, template: &Template) -> Result<()> {
    let variables = variables_json(template)?;
    let mut tx = pool.begin().await?;

    if template.is_default {
        clear_default(&mut tx, template.category, template.id).await?;
    }

    let result = sqlx::query(
        r#"
        UPDATE templates SET
            name = ?, category = ?, content = ?, variables = ?, is_default = ?,
            is_active = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&template.name)
    .bind(template.category.as_str())
    .bind(&template.content)
    .bind(&variables)
    .bind(template.is_default)
    .bind(template.is_active)
    .bind(ts(template.updated_at))
    .bind(template.id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Template {}", template.id)));
    }
    tx.commit().await?;
    Ok(())
}

async fn clear_default(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    category: Category,
    keep: Uuid,
) -> Result<()> {
    sqlx::query("UPDATE templates SET is_default = 0 WHERE category = ? AND id <> ? AND is_default = 1")
        .bind(category.as_str())
        .bind(keep.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn load_template(pool: &SqlitePool, id: Uuid) -> Result<Option<Template>> {
    let row = sqlx::query(&format!("SELECT {} FROM templates WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(template_from_row).transpose()
}

pub async fn get_template(pool: &SqlitePool, id: Uuid) -> Result<Template> {
    load_template(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Template {}", id)))
}

pub async fn delete_template(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM templates WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Template {}", id)));
    }
    Ok(())
}

/// Query-string filters for GET /api/templates
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFilter {
    pub category: Option<Category>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TemplateFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    if let Some(is_default) = filter.is_default {
        builder.push(" AND is_default = ").push_bind(is_default);
    }
}

pub async fn list_templates(
    pool: &SqlitePool,
    filter: &TemplateFilter,
    page: Option<i64>,
    limit: Option<i64>,
    sort: SortOrder,
) -> Result<Page<Template>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM templates");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let pagination = calculate_pagination(total, page, limit);

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM templates", COLUMNS));
    push_filters(&mut select, filter);
    select.push(sort.to_sql());
    select
        .push(" LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = select.build().fetch_all(pool).await?;
    let docs = rows.iter().map(template_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(docs, total, pagination))
}

async fn active_default(pool: &SqlitePool, category: Category) -> Result<Option<Template>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM templates WHERE category = ? AND is_default = 1 AND is_active = 1 \
         ORDER BY updated_at DESC LIMIT 1",
        COLUMNS
    ))
    .bind(category.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(template_from_row).transpose()
}

/// Template for a (group, product) pair
///
/// First match wins: the group's assigned template if active, the active
/// default of the product's category, the active `general` default.
pub async fn resolve_template(
    pool: &SqlitePool,
    assigned: Option<Uuid>,
    category: Category,
) -> Result<Option<Template>> {
    if let Some(id) = assigned {
        match load_template(pool, id).await? {
            Some(template) if template.is_active => return Ok(Some(template)),
            Some(_) => tracing::debug!(template_id = %id, "Assigned template inactive, falling back"),
            None => tracing::debug!(template_id = %id, "Assigned template missing, falling back"),
        }
    }

    if let Some(template) = active_default(pool, category).await? {
        return Ok(Some(template));
    }
    if category != Category::General {
        return active_default(pool, Category::General).await;
    }
    Ok(None)
}

/// Count one use of a template
pub async fn record_usage(pool: &SqlitePool, id: Uuid, used_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE templates SET usage_count = usage_count + 1, last_used = ? WHERE id = ?")
        .bind(ts(used_at))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
