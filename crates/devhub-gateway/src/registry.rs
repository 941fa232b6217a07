//! Plugin registry
//!
//! Tracks which plugins are reachable right now. Availability is a single
//! struct read and written under one lock, so the composite online check
//! (subscribed && online && fresh last-seen) always evaluates one
//! consistent snapshot — the three flags can never be observed mid-update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use devhub_core::PluginDescriptor;

use crate::connection::PluginConnection;

/// A plugin's last-seen timestamp must be within this window for the plugin
/// to count as online
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Shareable handle to a registered plugin
#[derive(Clone)]
pub struct PluginHandle {
    pub descriptor: PluginDescriptor,
    pub connection: Arc<dyn PluginConnection>,
}

/// Liveness snapshot for one plugin. All three conditions are required;
/// none alone is sufficient.
#[derive(Debug, Clone, Copy)]
struct Availability {
    online: bool,
    event_subscribed: bool,
    last_seen: Instant,
}

impl Availability {
    fn is_online(&self, now: Instant) -> bool {
        self.online
            && self.event_subscribed
            && now.duration_since(self.last_seen) <= FRESHNESS_WINDOW
    }
}

struct PluginEntry {
    descriptor: PluginDescriptor,
    connection: Arc<dyn PluginConnection>,
    availability: Availability,
}

impl PluginEntry {
    fn handle(&self) -> PluginHandle {
        PluginHandle {
            descriptor: self.descriptor.clone(),
            connection: Arc::clone(&self.connection),
        }
    }
}

/// Callbacks fired on registry transitions. The event broker uses these to
/// re-issue event-channel registrations when a plugin comes back.
pub trait RegistryListener: Send + Sync {
    fn on_plugin_registered(&self, plugin: &PluginHandle) {
        let _ = plugin;
    }
    fn on_plugin_online(&self, plugin: &PluginHandle) {
        let _ = plugin;
    }
    fn on_plugin_offline(&self, plugin_id: &str) {
        let _ = plugin_id;
    }
    fn on_plugin_unregistered(&self, plugin_id: &str) {
        let _ = plugin_id;
    }
}

/// Registry of currently reachable plugins
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginEntry>>,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, f: impl Fn(&dyn RegistryListener)) {
        let listeners: Vec<_> = self.listeners.read().clone();
        for l in listeners {
            f(l.as_ref());
        }
    }

    /// Register a plugin (or replace a stale registration with the same id).
    /// New registrations start online and seen-now, but not yet subscribed
    /// to the event channel.
    pub fn register(&self, descriptor: PluginDescriptor, connection: Arc<dyn PluginConnection>) {
        let id = descriptor.id.clone();
        let handle = {
            let mut plugins = self.plugins.write();
            let entry = PluginEntry {
                descriptor,
                connection,
                availability: Availability {
                    online: true,
                    event_subscribed: false,
                    last_seen: Instant::now(),
                },
            };
            let handle = entry.handle();
            if plugins.insert(id.clone(), entry).is_some() {
                debug!(plugin_id = %id, "Replaced existing plugin registration");
            }
            handle
        };
        info!(plugin_id = %id, capabilities = ?handle.descriptor.capabilities, "Registered plugin");
        self.notify(|l| l.on_plugin_registered(&handle));
    }

    /// Remove a plugin. Subscriptions held by sessions are unaffected; they
    /// simply stop matching until a plugin with the same id returns.
    pub fn unregister(&self, plugin_id: &str) -> bool {
        let removed = self.plugins.write().remove(plugin_id).is_some();
        if removed {
            info!(%plugin_id, "Unregistered plugin");
            self.notify(|l| l.on_plugin_unregistered(plugin_id));
        }
        removed
    }

    /// Look up one plugin: `(handle, is_online)`
    pub fn lookup(&self, plugin_id: &str) -> Option<(PluginHandle, bool)> {
        let now = Instant::now();
        let plugins = self.plugins.read();
        plugins
            .get(plugin_id)
            .map(|e| (e.handle(), e.availability.is_online(now)))
    }

    /// Online plugins implementing `capability`, in deterministic
    /// (id-sorted) order; with a target id, at most that one plugin.
    /// Empty if nothing matches.
    pub fn resolve(&self, capability: &str, target: Option<&str>) -> Vec<PluginHandle> {
        let now = Instant::now();
        let plugins = self.plugins.read();
        let mut matches: Vec<&PluginEntry> = plugins
            .values()
            .filter(|e| e.availability.is_online(now) && e.descriptor.has_capability(capability))
            .filter(|e| target.map_or(true, |id| e.descriptor.id == id))
            .collect();
        matches.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        matches.iter().map(|e| e.handle()).collect()
    }

    /// Refresh a plugin's last-seen timestamp (any traffic from the plugin)
    pub fn mark_seen(&self, plugin_id: &str) {
        if let Some(entry) = self.plugins.write().get_mut(plugin_id) {
            entry.availability.last_seen = Instant::now();
        }
    }

    /// Flip a plugin's online flag, firing listener callbacks when the
    /// composite status actually changed
    pub fn set_online(&self, plugin_id: &str, online: bool) {
        self.update_availability(plugin_id, |a| a.online = online);
    }

    /// Mark whether the gateway holds a live event channel to the plugin
    pub fn set_event_subscribed(&self, plugin_id: &str, subscribed: bool) {
        self.update_availability(plugin_id, |a| a.event_subscribed = subscribed);
    }

    fn update_availability(&self, plugin_id: &str, f: impl FnOnce(&mut Availability)) {
        let now = Instant::now();
        let transition = {
            let mut plugins = self.plugins.write();
            let Some(entry) = plugins.get_mut(plugin_id) else {
                warn!(%plugin_id, "Availability update for unknown plugin");
                return;
            };
            let was_online = entry.availability.is_online(now);
            f(&mut entry.availability);
            let is_online = entry.availability.is_online(now);
            if was_online == is_online {
                None
            } else {
                Some((entry.handle(), is_online))
            }
        };
        match transition {
            Some((handle, true)) => {
                info!(%plugin_id, "Plugin is online");
                self.notify(|l| l.on_plugin_online(&handle));
            }
            Some((_, false)) => {
                info!(%plugin_id, "Plugin went offline");
                self.notify(|l| l.on_plugin_offline(plugin_id));
            }
            None => {}
        }
    }

    /// Descriptors of all registered plugins (admin surface)
    pub fn list(&self) -> Vec<PluginDescriptor> {
        let plugins = self.plugins.read();
        let mut out: Vec<PluginDescriptor> =
            plugins.values().map(|e| e.descriptor.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(id: &str, caps: &[&str]) -> PluginDescriptor {
        PluginDescriptor {
            id: id.into(),
            name: format!("Plugin {id}"),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            version: None,
        }
    }

    fn register(registry: &PluginRegistry, id: &str, caps: &[&str]) {
        let (conn, _rx) = ChannelConnection::new(4);
        registry.register(descriptor(id, caps), Arc::new(conn));
    }

    #[test]
    fn online_requires_all_three_conditions() {
        let registry = PluginRegistry::new();
        register(&registry, "p1", &["battery"]);

        // Fresh + online, but not yet event-subscribed
        assert!(registry.resolve("battery", None).is_empty());

        registry.set_event_subscribed("p1", true);
        assert_eq!(registry.resolve("battery", None).len(), 1);

        registry.set_online("p1", false);
        assert!(registry.resolve("battery", None).is_empty());

        registry.set_online("p1", true);
        assert_eq!(registry.resolve("battery", None).len(), 1);
    }

    #[test]
    fn resolve_is_id_sorted_and_capability_filtered() {
        let registry = PluginRegistry::new();
        for id in ["p3", "p1", "p2"] {
            register(&registry, id, &["battery"]);
            registry.set_event_subscribed(id, true);
        }
        register(&registry, "p0", &["camera"]);
        registry.set_event_subscribed("p0", true);

        let ids: Vec<String> = registry
            .resolve("battery", None)
            .iter()
            .map(|h| h.descriptor.id.clone())
            .collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn unregister_removes_and_lookup_misses() {
        let registry = PluginRegistry::new();
        register(&registry, "p1", &["battery"]);
        assert!(registry.lookup("p1").is_some());
        assert!(registry.unregister("p1"));
        assert!(registry.lookup("p1").is_none());
        assert!(!registry.unregister("p1"));
    }

    #[test]
    fn listener_sees_online_transitions() {
        #[derive(Default)]
        struct Counter {
            online: AtomicUsize,
            offline: AtomicUsize,
        }
        impl RegistryListener for Counter {
            fn on_plugin_online(&self, _plugin: &PluginHandle) {
                self.online.fetch_add(1, Ordering::SeqCst);
            }
            fn on_plugin_offline(&self, _plugin_id: &str) {
                self.offline.fetch_add(1, Ordering::SeqCst);
            }
        }

        let registry = PluginRegistry::new();
        let counter = Arc::new(Counter::default());
        registry.add_listener(counter.clone());

        register(&registry, "p1", &["battery"]);
        registry.set_event_subscribed("p1", true); // offline -> online
        registry.set_event_subscribed("p1", true); // no transition
        registry.set_online("p1", false); // online -> offline

        assert_eq!(counter.online.load(Ordering::SeqCst), 1);
        assert_eq!(counter.offline.load(Ordering::SeqCst), 1);
    }
}
