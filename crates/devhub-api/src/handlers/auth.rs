//! Client registration and token grant/revoke endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use devhub_auth::AccessTokenData;
use devhub_core::GatewayError;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub origin: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterClientResponse {
    pub client_id: String,
}

/// POST /gateway/v1/auth/clients
///
/// Origin-gated: a caller whose origin the policy rejects cannot obtain a
/// client identity at all.
pub async fn register_client(
    State(state): State<AppState>,
    Json(request): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<RegisterClientResponse>), ApiError> {
    state.policy.check(&request.origin)?;
    let client_id = state.authority.register_client(&request.origin);
    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse { client_id }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub client_id: String,
    pub capabilities: Vec<String>,
}

/// POST /gateway/v1/auth/token
pub async fn grant_token(
    State(state): State<AppState>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<AccessTokenData>, ApiError> {
    let data = state
        .authority
        .issue_or_extend(&request.client_id, &request.capabilities)?;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
}

/// DELETE /gateway/v1/auth/token
pub async fn revoke_token(
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
    if state.authority.revoke(&request.token) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::InvalidParameter("unknown token".into()).into())
    }
}

/// DELETE /gateway/v1/admin/clients/{client_id}
///
/// Drops the client identity and every grant it holds.
pub async fn remove_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.authority.revoke_all(&client_id);
    if state.authority.unregister_client(&client_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::InvalidParameter(format!("unknown client: {client_id}")).into())
    }
}
