//! Uniform response envelope
//!
//! Every endpoint answers `{success, message, data}`; errors carry
//! `{success: false, message, error: {code}}`.

use serde::{Deserialize, Serialize};

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Successful response with a human-readable message
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Machine-readable error code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: ErrorDetail,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: ErrorDetail { code: code.into() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok("Listed", vec![1, 2])).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Listed");
        assert_eq!(body["data"][1], 2);

        let err = serde_json::to_value(ErrorBody::new("NOT_FOUND", "Product not found")).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"]["code"], "NOT_FOUND");
    }
}
