//! Inbound request handling
//!
//! The single enforcement path for every capability request: origin check,
//! token check, destination resolution, async dispatch, await finalization.
//! Origin and token failures reject before anything is dispatched.

use axum::extract::State;
use axum::Json;

use devhub_core::{GatewayError, GatewayRequest, GatewayResponse};
use devhub_gateway::FinalizePolicy;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /gateway/v1/request
pub async fn dispatch_request(
    State(state): State<AppState>,
    Json(request): Json<GatewayRequest>,
) -> Result<Json<GatewayResponse>, ApiError> {
    execute(&state, request).await.map(Json)
}

/// Shared request execution used by the generic endpoint and discovery
pub(crate) async fn execute(
    state: &AppState,
    request: GatewayRequest,
) -> Result<GatewayResponse, ApiError> {
    // Admission gates first: no side effects on rejection
    state.policy.check(&request.origin)?;
    state
        .authority
        .validate(request.access_token.as_deref(), &request.capability)?;

    if request.capability.trim().is_empty() {
        return Err(GatewayError::InvalidParameter("capability is required".into()).into());
    }

    let (destinations, policy) = match &request.service_id {
        Some(id) => {
            let (handle, online) = state
                .registry
                .lookup(id)
                .ok_or_else(|| GatewayError::PluginNotFound(id.clone()))?;
            if !online {
                return Err(GatewayError::NotConnected(id.clone()).into());
            }
            if !handle.descriptor.has_capability(&request.capability) {
                return Err(GatewayError::PluginNotFound(format!(
                    "{id} does not implement {}",
                    request.capability
                ))
                .into());
            }
            (vec![handle], FinalizePolicy::Single)
        }
        // Absent target: fan out to every online plugin with the capability
        None => (
            state.registry.resolve(&request.capability, None),
            FinalizePolicy::Aggregate,
        ),
    };

    let timeout = state.router.default_timeout();
    let (_correlation_id, receiver) = state
        .router
        .dispatch(&request, destinations, timeout, policy)
        .await?;

    let response = receiver
        .await
        .map_err(|_| GatewayError::Internal("router dropped the request".into()))?;
    Ok(response)
}
