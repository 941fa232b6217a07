//! devhub-core - shared data model for the devhub gateway
//!
//! Holds the envelope types that cross the three process boundaries
//! (client <-> gateway, gateway <-> plugin, gateway <-> session) and the
//! error taxonomy every layer maps into. Behavior lives in the other crates;
//! this one is deliberately passive.

pub mod error;
pub mod models;

pub use error::{GatewayError, GatewayResult};
pub use models::{
    DispatchEnvelope, ErrorBody, EventMessage, GatewayRequest, GatewayResponse, PluginDescriptor,
    ReplyEnvelope, ResponseStatus,
};

/// Capability name of the built-in discovery operation: requests without a
/// target plugin id fan out, and this one is the canonical fan-out consumer.
pub const SERVICE_DISCOVERY: &str = "service_discovery";
