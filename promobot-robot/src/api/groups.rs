//! Message target ("group") endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use promobot_common::api::ApiResponse;
use promobot_common::pagination::Page;
use uuid::Uuid;

use super::ListParams;
use crate::db::groups::{self, GroupFilter, SyncReport};
use crate::error::{ApiError, ApiResult};
use crate::models::{Group, GroupInput, GroupPatch};
use crate::AppState;

/// GET /api/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<GroupFilter>,
) -> ApiResult<Json<ApiResponse<Page<Group>>>> {
    let sort = params.sort_order(groups::SORT_FIELDS, groups::DEFAULT_SORT);
    let page = groups::list_groups(&state.db, &filter, params.page, params.limit, sort).await?;
    Ok(Json(ApiResponse::ok("Groups listed", page)))
}

/// POST /api/groups
pub async fn create_group(
    State(state): State<AppState>,
    Json(input): Json<GroupInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Group>>)> {
    input.validate().map_err(ApiError::BadRequest)?;
    let group = Group::new(input);
    groups::insert_group(&state.db, &group).await?;

    tracing::info!(group_id = %group.id, whatsapp_id = %group.whatsapp_id, "Group created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Group created", group))))
}

/// GET /api/groups/eligible
///
/// Groups the robot could post to right now.
pub async fn eligible_groups(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<Group>>>> {
    let now = state.orchestrator.clock().now_local();
    let eligible = groups::eligible_groups(&state.db, now).await?;
    let message = format!("{} eligible groups", eligible.len());
    Ok(Json(ApiResponse::ok(message, eligible)))
}

/// POST /api/groups/sync
///
/// Import the gateway's group list. New groups arrive with sending disabled.
pub async fn sync_groups(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<SyncReport>>> {
    let remote = state.orchestrator.transport().list_groups().await?;
    let pairs: Vec<(String, String)> = remote.into_iter().map(|g| (g.id, g.subject)).collect();
    let report = groups::sync_groups(&state.db, &pairs).await?;

    tracing::info!(created = report.created, updated = report.updated, "Groups synchronized");
    let message = format!("{} created, {} updated", report.created, report.updated);
    Ok(Json(ApiResponse::ok(message, report)))
}

/// GET /api/groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Group>>> {
    let group = groups::get_group(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Group found", group)))
}

/// PUT /api/groups/:id
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<GroupPatch>,
) -> ApiResult<Json<ApiResponse<Group>>> {
    let mut group = groups::get_group(&state.db, id).await?;
    group.apply_patch(patch).map_err(ApiError::BadRequest)?;
    groups::save_group(&state.db, &group).await?;
    Ok(Json(ApiResponse::ok("Group updated", group)))
}

/// DELETE /api/groups/:id
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Uuid>>> {
    groups::delete_group(&state.db, id).await?;
    tracing::info!(group_id = %id, "Group deleted");
    Ok(Json(ApiResponse::ok("Group deleted", id)))
}

/// Build group routes
pub fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/eligible", get(eligible_groups))
        .route("/api/groups/sync", post(sync_groups))
        .route(
            "/api/groups/:id",
            get(get_group).put(update_group).delete(delete_group),
        )
}
