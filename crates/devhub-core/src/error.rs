//! Common error types for the gateway

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while routing a request through the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No registered plugin matches the requested target or capability
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// The target plugin is registered but currently unreachable
    #[error("Plugin not connected: {0}")]
    NotConnected(String),

    /// The caller's token is missing, expired, or lacks the capability
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller's declared origin is not allowed by policy
    #[error("Origin not allowed: {0}")]
    InvalidOrigin(String),

    /// Malformed or missing request parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No reply arrived before the request deadline
    #[error("Request timed out")]
    Timeout,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable wire-level error code surfaced in response envelopes
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::PluginNotFound(_) => "plugin_not_found",
            GatewayError::NotConnected(_) => "not_connected",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::InvalidOrigin(_) => "invalid_origin",
            GatewayError::InvalidParameter(_) => "invalid_parameter",
            GatewayError::Timeout => "timeout",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::PluginNotFound(_) => 404,
            GatewayError::NotConnected(_) => 503,
            GatewayError::Unauthorized(_) => 403,
            GatewayError::InvalidOrigin(_) => 403,
            GatewayError::InvalidParameter(_) => 400,
            GatewayError::Timeout => 504,
            GatewayError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GatewayError::Timeout.code(), "timeout");
        assert_eq!(
            GatewayError::PluginNotFound("x".into()).code(),
            "plugin_not_found"
        );
        assert_eq!(GatewayError::InvalidOrigin("x".into()).code(), "invalid_origin");
    }

    #[test]
    fn status_codes() {
        assert_eq!(GatewayError::Unauthorized("no token".into()).status_code(), 403);
        assert_eq!(GatewayError::Timeout.status_code(), 504);
        assert_eq!(GatewayError::NotConnected("p".into()).status_code(), 503);
    }
}
