//! Event broker
//!
//! Client sessions attach a long-lived channel, register subscriptions
//! against it, and receive plugin-originated events matching those
//! subscriptions. Delivery is fire-and-forget per subscriber: a full or
//! closed session channel is logged and skipped, never blocking delivery to
//! the remaining subscribers. Before delivery the broker swaps in the
//! subscribing session's own credential — the plugin's token never leaks to
//! clients.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use devhub_auth::TokenAuthority;
use devhub_core::{DispatchEnvelope, EventMessage, GatewayError, GatewayResult};

use crate::registry::{PluginHandle, RegistryListener};

/// Queue depth of each session's event channel
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// One session's event-channel registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub session_id: String,
    pub capability: String,
    /// Sub-resource (attribute); `None` is a wildcard matching all
    pub attribute: Option<String>,
    /// Target plugin; `None` subscribes capability-wide across plugins
    pub plugin_id: Option<String>,
    /// The credential the subscribe was granted under; events delivered to
    /// this session are tagged with it
    pub access_token: String,
}

impl Subscription {
    fn matches(&self, plugin_id: &str, capability: &str, attribute: Option<&str>) -> bool {
        if !self.capability.eq_ignore_ascii_case(capability) {
            return false;
        }
        if let Some(bound) = &self.plugin_id {
            if bound != plugin_id {
                return false;
            }
        }
        match (&self.attribute, attribute) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        }
    }

    fn same_key(&self, other: &Subscription) -> bool {
        self.session_id == other.session_id
            && self.capability.eq_ignore_ascii_case(&other.capability)
            && self.attribute == other.attribute
            && self.plugin_id == other.plugin_id
    }
}

#[derive(Default)]
struct BrokerState {
    sessions: HashMap<String, mpsc::Sender<EventMessage>>,
    subscriptions: Vec<Subscription>,
}

/// Tracks per-session subscriptions and fans out plugin events
pub struct EventBroker {
    authority: Arc<TokenAuthority>,
    state: RwLock<BrokerState>,
}

impl EventBroker {
    pub fn new(authority: Arc<TokenAuthority>) -> Self {
        Self {
            authority,
            state: RwLock::new(BrokerState::default()),
        }
    }

    /// Open (or replace) the session's event channel; the HTTP layer
    /// consumes the receiver over the session's long-lived connection.
    pub fn attach_session(&self, session_id: &str) -> mpsc::Receiver<EventMessage> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let mut state = self.state.write();
        if state.sessions.insert(session_id.to_string(), tx).is_some() {
            debug!(%session_id, "Replaced existing session channel");
        }
        info!(%session_id, "Session attached");
        rx
    }

    /// Drop the session's channel and every subscription it holds; called
    /// on explicit detach and on session disconnect.
    pub fn detach_session(&self, session_id: &str) {
        let removed_subs = {
            let mut state = self.state.write();
            state.sessions.remove(session_id);
            let before = state.subscriptions.len();
            state.subscriptions.retain(|s| s.session_id != session_id);
            before - state.subscriptions.len()
        };
        info!(%session_id, removed_subscriptions = removed_subs, "Session detached");
    }

    /// Register a subscription, validating the credential first.
    /// Duplicate subscriptions (same session/capability/attribute/target)
    /// are collapsed, keeping the newest credential.
    pub fn subscribe(&self, subscription: Subscription) -> GatewayResult<()> {
        self.authority
            .validate(Some(&subscription.access_token), &subscription.capability)?;

        let mut state = self.state.write();
        if !state.sessions.contains_key(&subscription.session_id) {
            return Err(GatewayError::InvalidParameter(format!(
                "no attached session: {}",
                subscription.session_id
            )));
        }
        if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.same_key(&subscription))
        {
            existing.access_token = subscription.access_token;
            return Ok(());
        }
        info!(
            session_id = %subscription.session_id,
            capability = %subscription.capability,
            attribute = ?subscription.attribute,
            plugin_id = ?subscription.plugin_id,
            "Subscription added"
        );
        state.subscriptions.push(subscription);
        Ok(())
    }

    /// Remove one subscription. Returns false if nothing matched.
    pub fn unsubscribe(
        &self,
        session_id: &str,
        capability: &str,
        attribute: Option<&str>,
    ) -> bool {
        let mut state = self.state.write();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| {
            !(s.session_id == session_id
                && s.capability.eq_ignore_ascii_case(capability)
                && s.attribute.as_deref() == attribute)
        });
        let removed = state.subscriptions.len() < before;
        if removed {
            info!(%session_id, %capability, "Subscription removed");
        }
        removed
    }

    /// Remove every subscription held by a session; returns the count
    pub fn unsubscribe_all(&self, session_id: &str) -> usize {
        let mut state = self.state.write();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.session_id != session_id);
        before - state.subscriptions.len()
    }

    /// A plugin emitted an event: deliver it to every matching session,
    /// each tagged with that session's own credential.
    pub fn on_plugin_event(
        &self,
        plugin_id: &str,
        capability: &str,
        attribute: Option<&str>,
        payload: Value,
    ) {
        let targets: Vec<(Subscription, mpsc::Sender<EventMessage>)> = {
            let state = self.state.read();
            state
                .subscriptions
                .iter()
                .filter(|s| s.matches(plugin_id, capability, attribute))
                .filter_map(|s| {
                    state
                        .sessions
                        .get(&s.session_id)
                        .map(|tx| (s.clone(), tx.clone()))
                })
                .collect()
        };

        if targets.is_empty() {
            debug!(%plugin_id, %capability, "Event matched no subscriptions");
            return;
        }

        let received_at = Utc::now();
        for (sub, tx) in targets {
            let message = EventMessage {
                session_id: sub.session_id.clone(),
                capability: capability.to_string(),
                attribute: attribute.map(str::to_string),
                service_id: plugin_id.to_string(),
                access_token: Some(sub.access_token.clone()),
                payload: payload.clone(),
                received_at,
            };
            // One slow or vanished subscriber never blocks the rest
            if let Err(e) = tx.try_send(message) {
                warn!(
                    session_id = %sub.session_id,
                    capability = %capability,
                    error = %e,
                    "Dropping event for unreachable session"
                );
            }
        }
    }

    /// Subscriptions a given plugin would need to serve (used when a plugin
    /// comes back online)
    fn subscriptions_for_plugin(&self, plugin: &PluginHandle) -> Vec<Subscription> {
        let state = self.state.read();
        state
            .subscriptions
            .iter()
            .filter(|s| match &s.plugin_id {
                Some(bound) => *bound == plugin.descriptor.id,
                None => plugin.descriptor.has_capability(&s.capability),
            })
            .cloned()
            .collect()
    }

    /// Re-issue event-channel registrations toward a plugin that just came
    /// online, so standing subscriptions survive a plugin restart.
    fn resubscribe_plugin(&self, plugin: &PluginHandle) {
        let subs = self.subscriptions_for_plugin(plugin);
        if subs.is_empty() {
            return;
        }
        info!(
            plugin_id = %plugin.descriptor.id,
            count = subs.len(),
            "Re-issuing event registrations to plugin"
        );
        for sub in subs {
            let envelope = DispatchEnvelope {
                correlation_id: 0,
                capability: sub.capability,
                interface: None,
                attribute: sub.attribute,
                service_id: Some(plugin.descriptor.id.clone()),
                payload: serde_json::json!({ "event_registration": true }),
            };
            let conn = Arc::clone(&plugin.connection);
            tokio::spawn(async move {
                if let Err(e) = conn.send(envelope).await {
                    warn!(error = %e, "Event re-registration send failed");
                }
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.state.read().subscriptions.len()
    }
}

impl RegistryListener for EventBroker {
    fn on_plugin_online(&self, plugin: &PluginHandle) {
        self.resubscribe_plugin(plugin);
    }
}
