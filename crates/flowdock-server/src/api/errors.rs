//! Error handling for the Flowdock Server API
//!
//! This module contains standardized error handling for the API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ServerError;

fn error_body(status: StatusCode, error_code: &str, message: &str) -> Response {
    let body = Json(json!({
        "success": false,
        "error": message,
        "errorDetails": {
            "errorCode": error_code,
            "errorMessage": message,
        }
    }));

    (status, body).into_response()
}

/// Convert a server error into a standardized error response.
///
/// Client errors carry their own message; everything else is reported as a
/// 500 with `context` in front of the error text.
pub fn api_error_response(err: &ServerError, context: &str) -> Response {
    let (status_code, error_code, error_message) = match err {
        ServerError::ValidationError(validation) => (
            StatusCode::BAD_REQUEST,
            validation.code.to_string(),
            validation.message.clone(),
        ),
        ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST".to_string(), msg.clone()),
        ServerError::DocumentStoreError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_DOCUMENT_STORE_ERROR".to_string(),
            format!("{}: {}", context, err),
        ),
        ServerError::ConfigError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_CONFIG_ERROR".to_string(),
            format!("{}: {}", context, err),
        ),
        ServerError::InternalError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_INTERNAL_SERVER_ERROR".to_string(),
            format!("{}: {}", context, err),
        ),
    };

    error_body(status_code, &error_code, &error_message)
}
