//! Messaging gateway endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use promobot_common::api::ApiResponse;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::delivery::{dispatch, ConnectionState, OutboundMessage, RemoteGroup, SendReceipt};
use crate::AppState;

/// POST /api/whatsapp/test request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMessageRequest {
    pub chat_id: String,
    pub message: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// GET /api/whatsapp/status
pub async fn gateway_status(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<ConnectionState>>> {
    let connection = state.orchestrator.transport().connection_state().await?;
    let message = if connection.is_open() {
        "Gateway connected"
    } else {
        "Gateway not connected"
    };
    Ok(Json(ApiResponse::ok(message, connection)))
}

/// GET /api/whatsapp/groups
pub async fn gateway_groups(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<RemoteGroup>>>> {
    let groups = state.orchestrator.transport().list_groups().await?;
    let message = format!("{} groups on the gateway", groups.len());
    Ok(Json(ApiResponse::ok(message, groups)))
}

/// POST /api/whatsapp/test
///
/// Single attempt, no delivery record.
pub async fn send_test_message(
    State(state): State<AppState>,
    Json(request): Json<TestMessageRequest>,
) -> ApiResult<Json<ApiResponse<SendReceipt>>> {
    if request.chat_id.trim().is_empty() || request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("chatId and message are required".to_string()));
    }

    let message = OutboundMessage {
        chat_id: request.chat_id,
        text: request.message,
        media_url: request.media_url,
    };
    let receipt = dispatch(state.orchestrator.transport().as_ref(), &message).await?;

    tracing::info!(chat_id = %message.chat_id, "Test message sent");
    Ok(Json(ApiResponse::ok("Test message sent", receipt)))
}

/// Build gateway routes
pub fn whatsapp_routes() -> Router<AppState> {
    Router::new()
        .route("/api/whatsapp/status", get(gateway_status))
        .route("/api/whatsapp/groups", get(gateway_groups))
        .route("/api/whatsapp/test", post(send_test_message))
}
