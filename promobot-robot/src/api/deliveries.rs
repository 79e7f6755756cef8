//! Delivery record endpoints
//!
//! Records are append-only: the API can only move a record along the status
//! machine and add engagement.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use promobot_common::api::ApiResponse;
use promobot_common::pagination::Page;
use serde::Deserialize;
use uuid::Uuid;

use super::ListParams;
use crate::db::deliveries::{self, DeliveryFilter, DeliveryStats, TransitionDetails};
use crate::db::groups;
use crate::error::{ApiError, ApiResult};
use crate::models::{Delivery, DeliveryStatus, EngagementDelta};
use crate::AppState;

/// PUT /api/deliveries/:id/status request
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /api/deliveries
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<DeliveryFilter>,
) -> ApiResult<Json<ApiResponse<Page<Delivery>>>> {
    let sort = params.sort_order(deliveries::SORT_FIELDS, deliveries::DEFAULT_SORT);
    let page = deliveries::list_deliveries(&state.db, &filter, params.page, params.limit, sort).await?;
    Ok(Json(ApiResponse::ok("Deliveries listed", page)))
}

/// GET /api/deliveries/stats
pub async fn delivery_stats(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<DeliveryStats>>> {
    let stats = deliveries::delivery_stats(&state.db).await?;
    Ok(Json(ApiResponse::ok("Delivery statistics", stats)))
}

/// GET /api/deliveries/:id
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    let delivery = deliveries::get_delivery(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Delivery found", delivery)))
}

/// PUT /api/deliveries/:id/status
///
/// 400 when the transition is not allowed from the current status.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    let details = TransitionDetails {
        error: request.error,
        attempts: None,
    };
    let delivery = deliveries::transition_status(&state.db, id, request.status, details, Utc::now()).await?;
    Ok(Json(ApiResponse::ok(format!("Delivery {}", delivery.status), delivery)))
}

/// POST /api/deliveries/:id/engagement
///
/// Increments the record and its group's aggregates.
pub async fn add_engagement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(delta): Json<EngagementDelta>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    delta.validate().map_err(ApiError::BadRequest)?;
    let delivery = deliveries::add_engagement(&state.db, id, delta).await?;
    // The group may be gone; its aggregates are then simply not updated
    groups::add_engagement(&state.db, delivery.group_id, delta).await?;
    Ok(Json(ApiResponse::ok("Engagement recorded", delivery)))
}

/// Build delivery routes
pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/api/deliveries", get(list_deliveries))
        .route("/api/deliveries/stats", get(delivery_stats))
        .route("/api/deliveries/:id", get(get_delivery))
        .route("/api/deliveries/:id/status", put(update_status))
        .route("/api/deliveries/:id/engagement", post(add_engagement))
}
