//! devhub-gateway - routing core of the devhub gateway
//!
//! Three cooperating services, all dependency-injected and owned by the
//! process composition root (no hidden statics):
//!
//! - [`registry::PluginRegistry`] — which plugins are reachable right now
//! - [`router::RequestRouter`] — async dispatch, reply correlation, timeouts
//! - [`broker::EventBroker`] — per-session subscriptions and event fan-out
//!
//! Plugins are reached exclusively through the [`connection::PluginConnection`]
//! trait; the wire transport behind it is someone else's problem.

pub mod broker;
pub mod connection;
pub mod registry;
pub mod router;

pub use broker::{EventBroker, Subscription};
pub use connection::{ChannelConnection, ConnectionError, PluginConnection, PluginMessage};
pub use registry::{PluginHandle, PluginRegistry, RegistryListener, FRESHNESS_WINDOW};
pub use router::{FinalizePolicy, RequestRouter, RouterConfig};
