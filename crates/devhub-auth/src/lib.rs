//! devhub-auth - admission control for the devhub gateway
//!
//! Two gates guard every inbound request: the origin allowlist (who may talk
//! to the gateway at all) and the capability token authority (what a given
//! client may ask for). Both are plain shared-state services, injected into
//! the routing layer — nothing here is a global.

pub mod origin;
pub mod token;

pub use origin::{compile_glob, normalize_origin, AllowlistEntry, OriginInfo, OriginPolicy};
pub use token::{
    is_exempt, AccessTokenData, CapabilityGrant, TokenAuthority, DEFAULT_GRANT_TTL,
    DEFAULT_TOKEN_RETENTION, EXEMPT_CAPABILITIES,
};
