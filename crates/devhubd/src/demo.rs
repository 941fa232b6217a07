//! Built-in demo plugin
//!
//! An in-process plugin behind the same `PluginConnection` seam external
//! plugins use, so the full dispatch/correlate/reply loop is exercisable
//! out of the box. Serves discovery, a fake battery, and an echo
//! capability, and emits a periodic battery event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use devhub_core::{DispatchEnvelope, PluginDescriptor, SERVICE_DISCOVERY};
use devhub_gateway::{
    ChannelConnection, EventBroker, PluginMessage, PluginRegistry, RequestRouter,
};

pub const DEMO_PLUGIN_ID: &str = "demo_host";

const EVENT_INTERVAL: Duration = Duration::from_secs(30);

/// Register the demo plugin and spawn its serving task
pub fn spawn(
    registry: Arc<PluginRegistry>,
    router: Arc<RequestRouter>,
    broker: Arc<EventBroker>,
) {
    let descriptor = PluginDescriptor {
        id: DEMO_PLUGIN_ID.to_string(),
        name: "Demo Host Plugin".to_string(),
        capabilities: vec![
            SERVICE_DISCOVERY.to_string(),
            "battery".to_string(),
            "echo".to_string(),
        ],
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    let (connection, mut rx) = ChannelConnection::new(32);
    registry.register(descriptor.clone(), Arc::new(connection));
    // In-process plugin: the channel itself is the event subscription
    registry.set_event_subscribed(DEMO_PLUGIN_ID, true);

    tokio::spawn(async move {
        info!(plugin_id = DEMO_PLUGIN_ID, "Demo plugin serving");
        let mut ticker = tokio::time::interval(EVENT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut level: f64 = 0.93;

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(PluginMessage::Dispatch(envelope)) => {
                            registry.mark_seen(DEMO_PLUGIN_ID);
                            handle_dispatch(&descriptor, &router, envelope);
                        }
                        Some(PluginMessage::Cancel(correlation_id)) => {
                            debug!(%correlation_id, "Demo plugin ignoring cancel");
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    registry.mark_seen(DEMO_PLUGIN_ID);
                    level = (level - 0.01).max(0.05);
                    broker.on_plugin_event(
                        DEMO_PLUGIN_ID,
                        "battery",
                        Some("level"),
                        json!({ "level": level }),
                    );
                }
            }
        }
        info!(plugin_id = DEMO_PLUGIN_ID, "Demo plugin stopped");
    });
}

fn handle_dispatch(
    descriptor: &PluginDescriptor,
    router: &RequestRouter,
    envelope: DispatchEnvelope,
) {
    // Correlation id 0 means nobody is waiting (event registrations etc.)
    if envelope.correlation_id == 0 {
        return;
    }
    let payload = match envelope.capability.as_str() {
        SERVICE_DISCOVERY => json!({
            "id": descriptor.id,
            "name": descriptor.name,
            "online": true,
            "capabilities": descriptor.capabilities,
        }),
        "battery" => json!({ "level": 0.93, "charging": false }),
        "echo" => envelope.payload,
        other => json!({ "unsupported": other }),
    };
    router.on_reply(envelope.correlation_id, payload);
}
