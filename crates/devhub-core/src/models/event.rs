//! Event message delivered to subscribed client sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A plugin-originated event, re-addressed to one subscribing session.
///
/// The `access_token` is always the *session's* granted credential — the
/// broker replaces whatever token the plugin attached before delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Session the event is addressed to
    pub session_id: String,
    /// Capability the event belongs to
    pub capability: String,
    /// Sub-resource (attribute) within the capability, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Plugin that originated the event
    pub service_id: String,
    /// The subscribing session's own credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Event payload
    #[serde(default)]
    pub payload: Value,
    /// When the broker accepted the event
    pub received_at: DateTime<Utc>,
}
