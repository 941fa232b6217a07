//! Shared data model

pub mod event;
pub mod plugin;
pub mod request;

pub use event::EventMessage;
pub use plugin::PluginDescriptor;
pub use request::{
    DispatchEnvelope, ErrorBody, GatewayRequest, GatewayResponse, ReplyEnvelope, ResponseStatus,
};
