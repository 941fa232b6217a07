//! HTTP handlers, grouped by surface

pub mod allowlist;
pub mod auth;
pub mod dispatch;
pub mod events;
pub mod services;
