//! Request and response envelopes
//!
//! `GatewayRequest` is what clients submit; `DispatchEnvelope`/`ReplyEnvelope`
//! travel across the plugin connection boundary. Every dispatch is
//! send-now/receive-later — the reply is paired back to its request purely
//! through the correlation id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Inbound client request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Requested capability (e.g. "battery", "service_discovery")
    pub capability: String,
    /// Optional sub-interface within the capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Optional attribute within the capability/interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Target plugin id; absent means "all capable plugins" (fan-out)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Caller-declared origin, checked against the allowlist
    pub origin: String,
    /// Access token; may be absent for exempt capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Capability-specific request payload
    #[serde(default)]
    pub payload: Value,
}

/// Result marker in a response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Error body carried inside an error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code (see `GatewayError::code`)
    pub code: String,
    pub message: String,
}

/// Outbound client response
///
/// Single-target requests carry the plugin reply in `payload`. Fan-out
/// requests carry the collected partial results in `services`, which may be
/// shorter than the destination count when some plugins never replied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Value>>,
}

impl GatewayResponse {
    /// Successful single-target response
    pub fn ok(payload: Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            error: None,
            payload,
            services: None,
        }
    }

    /// Successful fan-out response aggregating the collected partial results
    pub fn aggregate(services: Vec<Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            error: None,
            payload: Value::Null,
            services: Some(services),
        }
    }

    /// Error response carrying the taxonomy code and message
    pub fn error(err: &GatewayError) -> Self {
        Self {
            status: ResponseStatus::Error,
            error: Some(ErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            payload: Value::Null,
            services: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// Message dispatched to a plugin over its connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    /// Pairs the eventual reply back to the pending request; 0 for
    /// fire-and-forget messages that expect no reply
    pub correlation_id: u64,
    pub capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Target plugin id as resolved by the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Reply sent back by a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub correlation_id: u64,
    #[serde(default)]
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_response_carries_code_and_message() {
        let resp = GatewayResponse::error(&GatewayError::Timeout);
        assert_eq!(resp.status, ResponseStatus::Error);
        let body = resp.error.unwrap();
        assert_eq!(body.code, "timeout");
        assert_eq!(body.message, "Request timed out");
    }

    #[test]
    fn aggregate_serializes_services_list() {
        let resp = GatewayResponse::aggregate(vec![serde_json::json!({"id": "p1"})]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["services"][0]["id"], "p1");
        // single-target payload field is omitted entirely
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn request_defaults_optional_fields() {
        let req: GatewayRequest = serde_json::from_value(serde_json::json!({
            "capability": "battery",
            "origin": "http://localhost:3000",
        }))
        .unwrap();
        assert!(req.service_id.is_none());
        assert!(req.access_token.is_none());
        assert_eq!(req.payload, Value::Null);
    }
}
