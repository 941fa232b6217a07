//! Application state for the devhub API

use std::sync::Arc;

use devhub_auth::{OriginPolicy, TokenAuthority};
use devhub_gateway::{EventBroker, PluginRegistry, RequestRouter};

/// Application state shared across all handlers.
///
/// Everything is an `Arc` to an explicitly constructed instance — the
/// daemon's composition root owns the only long-lived references.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PluginRegistry>,
    pub router: Arc<RequestRouter>,
    pub broker: Arc<EventBroker>,
    pub authority: Arc<TokenAuthority>,
    pub policy: Arc<OriginPolicy>,
}

impl AppState {
    pub fn new(
        registry: Arc<PluginRegistry>,
        router: Arc<RequestRouter>,
        broker: Arc<EventBroker>,
        authority: Arc<TokenAuthority>,
        policy: Arc<OriginPolicy>,
    ) -> Self {
        Self {
            registry,
            router,
            broker,
            authority,
            policy,
        }
    }
}
