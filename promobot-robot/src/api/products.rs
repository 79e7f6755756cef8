//! Product endpoints
//!
//! Derived pricing fields are never read from the request; they are recomputed
//! from price, original price and commission rate on every write.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use promobot_common::api::ApiResponse;
use promobot_common::pagination::Page;
use serde::Deserialize;
use uuid::Uuid;

use super::ListParams;
use crate::db::products::{self, BulkUpsertReport, ProductFilter, ProductStats, TrackEvent};
use crate::error::{ApiError, ApiResult};
use crate::models::{Product, ProductDraft, ProductPatch};
use crate::AppState;

/// POST /api/products/bulk request
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub products: Vec<ProductDraft>,
}

/// POST /api/products/:id/approve request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub approved_by: Option<String>,
}

/// POST /api/products/:id/track request
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub event: TrackEvent,
}

/// GET /api/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<ApiResponse<Page<Product>>>> {
    let sort = params.sort_order(products::SORT_FIELDS, products::DEFAULT_SORT);
    let page = products::list_products(&state.db, &filter, params.page, params.limit, sort).await?;
    Ok(Json(ApiResponse::ok("Products listed", page)))
}

/// POST /api/products
///
/// Manual creation; the product starts unapproved. 409 when the
/// (platform, platformId) pair already exists.
pub async fn create_product(
    State(state): State<AppState>,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Product>>)> {
    draft.validate().map_err(ApiError::BadRequest)?;
    let product = Product::from_draft(draft, None);
    products::insert_product(&state.db, &product).await?;

    tracing::info!(product_id = %product.id, platform = %product.platform, "Product created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Product created", product))))
}

/// GET /api/products/stats
pub async fn product_stats(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<ProductStats>>> {
    let stats = products::product_stats(&state.db).await?;
    Ok(Json(ApiResponse::ok("Product statistics", stats)))
}

/// POST /api/products/bulk
///
/// Upsert by natural key; per-item failures are reported, not fatal.
pub async fn bulk_upsert(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> ApiResult<Json<ApiResponse<BulkUpsertReport>>> {
    if request.products.is_empty() {
        return Err(ApiError::BadRequest("products must not be empty".to_string()));
    }
    let report = products::bulk_upsert(&state.db, request.products, Some(Utc::now())).await;
    let message = format!(
        "{} created, {} updated, {} errored",
        report.created, report.updated, report.errored
    );
    Ok(Json(ApiResponse::ok(message, report)))
}

/// GET /api/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let product = products::get_product(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Product found", product)))
}

/// PUT /api/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let mut product = products::get_product(&state.db, id).await?;
    product.apply_patch(patch).map_err(ApiError::BadRequest)?;
    products::save_product(&state.db, &product).await?;
    Ok(Json(ApiResponse::ok("Product updated", product)))
}

/// DELETE /api/products/:id (soft delete)
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    products::deactivate_product(&state.db, id).await?;
    let product = products::get_product(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Product deactivated", product)))
}

/// POST /api/products/:id/approve
pub async fn approve_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let approver = body
        .and_then(|Json(request)| request.approved_by)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "admin".to_string());

    let mut product = products::get_product(&state.db, id).await?;
    product.approve(&approver);
    products::save_product(&state.db, &product).await?;

    tracing::info!(product_id = %id, approved_by = %approver, "Product approved");
    Ok(Json(ApiResponse::ok("Product approved", product)))
}

/// POST /api/products/:id/reject
pub async fn reject_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let mut product = products::get_product(&state.db, id).await?;
    product.reject();
    products::save_product(&state.db, &product).await?;
    Ok(Json(ApiResponse::ok("Product rejected", product)))
}

/// POST /api/products/:id/track
pub async fn track_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let product = products::track_event(&state.db, id, request.event).await?;
    Ok(Json(ApiResponse::ok("Event tracked", product)))
}

/// Build product routes
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/stats", get(product_stats))
        .route("/api/products/bulk", post(bulk_upsert))
        .route(
            "/api/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/products/:id/approve", post(approve_product))
        .route("/api/products/:id/reject", post(reject_product))
        .route("/api/products/:id/track", post(track_product))
}
