//! Session event channel (SSE) and subscription endpoints

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use devhub_core::GatewayError;
use devhub_gateway::{EventBroker, Subscription};

use crate::error::ApiError;
use crate::state::AppState;

/// Detaches the session (and thereby all its subscriptions) when the SSE
/// stream is dropped, so a vanished client cannot leak subscriptions.
struct SessionGuard {
    broker: Arc<EventBroker>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.broker.detach_session(&self.session_id);
    }
}

/// GET /gateway/v1/events/{session_id}
///
/// The session's long-lived event channel. Each event is one SSE message
/// carrying the serialized `EventMessage`.
pub async fn event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let mut rx = state.broker.attach_session(&session_id);
    let guard = SessionGuard {
        broker: Arc::clone(&state.broker),
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(message) = rx.recv().await {
            yield Ok::<_, Infallible>(
                Event::default().data(serde_json::to_string(&message).unwrap_or_default()),
            );
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub capability: String,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub plugin_id: Option<String>,
    pub access_token: String,
}

/// POST /gateway/v1/events/{session_id}/subscriptions
pub async fn subscribe(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubscribeRequest>,
) -> Result<StatusCode, ApiError> {
    state.broker.subscribe(Subscription {
        session_id,
        capability: request.capability,
        attribute: request.attribute,
        plugin_id: request.plugin_id,
        access_token: request.access_token,
    })?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub capability: String,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// DELETE /gateway/v1/events/{session_id}/subscriptions
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<StatusCode, ApiError> {
    let removed = state.broker.unsubscribe(
        &session_id,
        &request.capability,
        request.attribute.as_deref(),
    );
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::InvalidParameter(format!(
            "no such subscription: {}",
            request.capability
        ))
        .into())
    }
}
