//! Service discovery and the admin plugin listing

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use devhub_core::{GatewayRequest, GatewayResponse, PluginDescriptor, SERVICE_DISCOVERY};

use crate::error::ApiError;
use crate::handlers::dispatch;
use crate::state::AppState;

/// Query parameters for discovery: same credentials as any other request
#[derive(Debug, Deserialize)]
pub struct DiscoveryQuery {
    pub origin: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// GET /gateway/v1/services
///
/// Fans `service_discovery` out to every online plugin and aggregates the
/// partial results; plugins that never answer are simply missing from the
/// list.
pub async fn discover_services(
    State(state): State<AppState>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<Json<GatewayResponse>, ApiError> {
    let request = GatewayRequest {
        capability: SERVICE_DISCOVERY.to_string(),
        interface: None,
        attribute: None,
        service_id: None,
        origin: query.origin,
        access_token: query.access_token,
        payload: Value::Null,
    };
    dispatch::execute(&state, request).await.map(Json)
}

/// Response for the admin plugin listing
#[derive(Debug, Serialize)]
pub struct PluginListResponse {
    pub items: Vec<PluginDescriptor>,
}

/// GET /gateway/v1/admin/plugins
pub async fn list_plugins(State(state): State<AppState>) -> Json<PluginListResponse> {
    Json(PluginListResponse {
        items: state.registry.list(),
    })
}
