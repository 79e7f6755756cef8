//! API error type and its HTTP mapping
//!
//! Every error leaves the service as the `{success: false, message, error: {code}}`
//! envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use promobot_common::api::ErrorBody;
use thiserror::Error;

use crate::services::{RobotError, TemplateError, TransportError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a robot run already active
    #[error("{0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Common(#[from] promobot_common::Error),

    #[error(transparent)]
    Robot(#[from] RobotError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Messaging gateway error: {0}")]
    Transport(#[from] TransportError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        use promobot_common::Error as Common;

        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(err) | ApiError::Robot(RobotError::Storage(err)) => match err {
                Common::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                Common::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                Common::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                Common::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Robot(RobotError::AlreadyRunning) => (StatusCode::CONFLICT, "ROBOT_RUNNING"),
            ApiError::Robot(RobotError::InvalidConfig(_)) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG"),
            ApiError::Robot(RobotError::Template(_)) | ApiError::Template(_) => {
                (StatusCode::BAD_REQUEST, "TEMPLATE_ERROR")
            }
            ApiError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "GATEWAY_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        (status, Json(ErrorBody::new(code, self.to_string()))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(promobot_common::Error::NotFound("Product x".into())), StatusCode::NOT_FOUND),
            (ApiError::from(promobot_common::Error::InvalidInput("bad".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(promobot_common::Error::Conflict("dup".into())), StatusCode::CONFLICT),
            (ApiError::from(RobotError::AlreadyRunning), StatusCode::CONFLICT),
            (
                ApiError::from(TemplateError::MissingVariable("price".into())),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_storage_error_inside_robot_error() {
        let err = ApiError::from(RobotError::Storage(promobot_common::Error::NotFound("Group".into())));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
