//! Message template endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use promobot_common::api::ApiResponse;
use promobot_common::pagination::Page;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ListParams;
use crate::db::{products, templates, templates::TemplateFilter};
use crate::error::{ApiError, ApiResult};
use crate::models::{Template, TemplateInput, TemplatePatch};
use crate::services::template_renderer::{placeholders, product_context, render, RenderContext};
use crate::AppState;

/// POST /api/templates/:id/preview request
///
/// Context comes from `productId` when given; `variables` override it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub variables: RenderContext,
}

/// POST /api/templates/:id/preview response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub template_id: Uuid,
    pub content: String,
    pub placeholders: Vec<String>,
}

/// GET /api/templates
pub async fn list_templates(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<TemplateFilter>,
) -> ApiResult<Json<ApiResponse<Page<Template>>>> {
    let sort = params.sort_order(templates::SORT_FIELDS, templates::DEFAULT_SORT);
    let page = templates::list_templates(&state.db, &filter, params.page, params.limit, sort).await?;
    Ok(Json(ApiResponse::ok("Templates listed", page)))
}

/// POST /api/templates
///
/// A new default template replaces the category's previous default.
pub async fn create_template(
    State(state): State<AppState>,
    Json(input): Json<TemplateInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Template>>)> {
    input.validate().map_err(ApiError::BadRequest)?;
    let template = Template::new(input);
    templates::insert_template(&state.db, &template).await?;

    tracing::info!(
        template_id = %template.id,
        category = %template.category,
        is_default = template.is_default,
        "Template created"
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Template created", template))))
}

/// GET /api/templates/:id
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Template>>> {
    let template = templates::get_template(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Template found", template)))
}

/// PUT /api/templates/:id
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TemplatePatch>,
) -> ApiResult<Json<ApiResponse<Template>>> {
    let mut template = templates::get_template(&state.db, id).await?;
    template.apply_patch(patch).map_err(ApiError::BadRequest)?;
    templates::save_template(&state.db, &template).await?;
    Ok(Json(ApiResponse::ok("Template updated", template)))
}

/// DELETE /api/templates/:id
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Uuid>>> {
    templates::delete_template(&state.db, id).await?;
    Ok(Json(ApiResponse::ok("Template deleted", id)))
}

/// POST /api/templates/:id/preview
pub async fn preview_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<PreviewRequest>>,
) -> ApiResult<Json<ApiResponse<PreviewResponse>>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let template = templates::get_template(&state.db, id).await?;

    let mut context = match request.product_id {
        Some(product_id) => product_context(&products::get_product(&state.db, product_id).await?),
        None => RenderContext::new(),
    };
    context.extend(request.variables);

    let content = render(&template, &context)?;
    Ok(Json(ApiResponse::ok(
        "Template rendered",
        PreviewResponse {
            template_id: template.id,
            content,
            placeholders: placeholders(&template.content),
        },
    )))
}

/// Build template routes
pub fn template_routes() -> Router<AppState> {
    Router::new()
        .route("/api/templates", get(list_templates).post(create_template))
        .route(
            "/api/templates/:id",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/api/templates/:id/preview", post(preview_template))
}
