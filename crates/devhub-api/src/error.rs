//! API error types and conversions

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use devhub_core::GatewayError;

/// API error wrapper that converts the gateway taxonomy to HTTP responses
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

/// Standard error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.0.code();
        let message = self.0.to_string();

        // Log errors at appropriate levels
        if status.is_server_error() {
            tracing::error!(error = code, %message, "API error");
        } else if status.is_client_error() {
            tracing::debug!(error = code, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        let resp = ApiError(GatewayError::Timeout).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

        let resp = ApiError(GatewayError::InvalidOrigin("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = ApiError(GatewayError::PluginNotFound("p".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
