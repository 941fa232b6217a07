//! Admin endpoints for the origin allowlist

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use devhub_auth::AllowlistEntry;
use devhub_core::GatewayError;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AllowlistResponse {
    pub enabled: bool,
    pub items: Vec<AllowlistEntry>,
}

/// GET /gateway/v1/admin/allowlist
pub async fn list_allowlist(State(state): State<AppState>) -> Json<AllowlistResponse> {
    Json(AllowlistResponse {
        enabled: state.policy.is_enabled(),
        items: state.policy.list(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AddEntryRequest {
    pub pattern: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct AddEntryResponse {
    pub added: bool,
}

/// POST /gateway/v1/admin/allowlist
pub async fn add_allowlist_entry(
    State(state): State<AppState>,
    Json(request): Json<AddEntryRequest>,
) -> Result<(StatusCode, Json<AddEntryResponse>), ApiError> {
    let added = state.policy.add(&request.pattern, &request.title)?;
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(AddEntryResponse { added })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveEntryRequest {
    pub pattern: String,
}

/// DELETE /gateway/v1/admin/allowlist
pub async fn remove_allowlist_entry(
    State(state): State<AppState>,
    Json(request): Json<RemoveEntryRequest>,
) -> Result<StatusCode, ApiError> {
    if state.policy.remove(&request.pattern)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::InvalidParameter(format!(
            "no allowlist entry: {}",
            request.pattern
        ))
        .into())
    }
}
