//! devhub-api - HTTP layer for the devhub gateway
//!
//! Thin axum surface over the routing core: one generic capability-request
//! endpoint, SSE event channels per session, and the administrative
//! endpoints (allowlist, tokens, plugin listing). All enforcement lives in
//! the injected services; handlers only translate.
//!
//! # Usage
//!
//! ```ignore
//! use devhub_api::{create_router, AppState};
//!
//! let state = AppState::new(registry, router, broker, authority, policy);
//! let app = create_router(state);
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the devhub REST API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Capability requests
        .route("/gateway/v1/request", post(handlers::dispatch::dispatch_request))
        // Discovery (fan-out aggregate)
        .route("/gateway/v1/services", get(handlers::services::discover_services))
        // Session event channel + subscriptions
        .route("/gateway/v1/events/{session_id}", get(handlers::events::event_stream))
        .route(
            "/gateway/v1/events/{session_id}/subscriptions",
            post(handlers::events::subscribe).delete(handlers::events::unsubscribe),
        )
        // Authorization
        .route("/gateway/v1/auth/clients", post(handlers::auth::register_client))
        .route(
            "/gateway/v1/auth/token",
            post(handlers::auth::grant_token).delete(handlers::auth::revoke_token),
        )
        // Administration
        .route("/gateway/v1/admin/plugins", get(handlers::services::list_plugins))
        .route(
            "/gateway/v1/admin/allowlist",
            get(handlers::allowlist::list_allowlist)
                .post(handlers::allowlist::add_allowlist_entry)
                .delete(handlers::allowlist::remove_allowlist_entry),
        )
        .route(
            "/gateway/v1/admin/clients/{client_id}",
            axum::routing::delete(handlers::auth::remove_client),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
