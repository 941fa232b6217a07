//! Capability token authority
//!
//! Tokens are bound to a client identity (one client per declared origin)
//! and hold a set of per-capability grants, each with its own grant
//! timestamp and time-to-live. Re-granting extends the set — the granted
//! set only ever grows — and refreshes timestamps only for the capabilities
//! the new grant actually names.
//!
//! Records are shared as `Arc` snapshots: extension swaps the whole record
//! under the write lock, so a concurrent validator sees either the old or
//! the new grant set, never a half-updated one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use devhub_core::{GatewayError, GatewayResult};

/// Capabilities that never require a token. Covers the plumbing a client
/// needs before it can hold a token at all (requesting one, probing the
/// gateway) — same exemption set the discovery path relies on.
pub const EXEMPT_CAPABILITIES: &[&str] = &["authorization", "availability", "system"];

/// Default per-capability grant lifetime
pub const DEFAULT_GRANT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// How long an orphaned token survives after its last access before
/// `cleanup` may collect it
pub const DEFAULT_TOKEN_RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// True if the capability is exempt from token checks
pub fn is_exempt(capability: &str) -> bool {
    EXEMPT_CAPABILITIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(capability))
}

/// One capability grant inside a token
#[derive(Debug, Clone, Copy)]
struct Grant {
    granted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Grant {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Grant info returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub capability: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Token data returned from `issue_or_extend`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenData {
    pub token: String,
    pub client_id: String,
    pub grants: Vec<CapabilityGrant>,
}

struct TokenRecord {
    token: String,
    client_id: String,
    /// Keyed by lowercased capability name
    grants: HashMap<String, Grant>,
    /// Millisecond timestamp of the last validation touch; atomic so
    /// validators only need the read lock
    last_access_ms: AtomicI64,
}

impl TokenRecord {
    fn last_access(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_access_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_access_ms
            .store(now.timestamp_millis(), Ordering::Relaxed);
    }

    fn has_live_grant(&self, now: DateTime<Utc>) -> bool {
        self.grants.values().any(|g| !g.is_expired(now))
    }

    fn to_data(&self) -> AccessTokenData {
        let mut grants: Vec<CapabilityGrant> = self
            .grants
            .iter()
            .map(|(cap, g)| CapabilityGrant {
                capability: cap.clone(),
                granted_at: g.granted_at,
                expires_at: g.expires_at,
            })
            .collect();
        grants.sort_by(|a, b| a.capability.cmp(&b.capability));
        AccessTokenData {
            token: self.token.clone(),
            client_id: self.client_id.clone(),
            grants,
        }
    }
}

#[derive(Debug, Clone)]
struct ClientRecord {
    id: String,
    origin: String,
}

#[derive(Default)]
struct AuthorityState {
    clients: HashMap<String, ClientRecord>,
    client_by_origin: HashMap<String, String>,
    tokens: HashMap<String, Arc<TokenRecord>>,
    token_by_client: HashMap<String, String>,
}

/// Issues, extends, validates, and revokes capability tokens
pub struct TokenAuthority {
    state: RwLock<AuthorityState>,
    grant_ttl: chrono::Duration,
    retention: chrono::Duration,
}

impl Default for TokenAuthority {
    fn default() -> Self {
        Self::new(DEFAULT_GRANT_TTL, DEFAULT_TOKEN_RETENTION)
    }
}

impl TokenAuthority {
    pub fn new(grant_ttl: Duration, retention: Duration) -> Self {
        Self {
            state: RwLock::new(AuthorityState::default()),
            grant_ttl: chrono::Duration::from_std(grant_ttl)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::days(30)),
        }
    }

    /// Register a client for the given origin, returning its client id.
    ///
    /// Re-registering an origin replaces the previous client; the old
    /// client's token becomes orphaned and is eventually collected by
    /// `cleanup`.
    pub fn register_client(&self, origin: &str) -> String {
        let mut state = self.state.write();
        if let Some(old_id) = state.client_by_origin.remove(origin) {
            state.clients.remove(&old_id);
            state.token_by_client.remove(&old_id);
            debug!(%origin, client_id = %old_id, "Replacing client registration");
        }
        let id = Uuid::new_v4().to_string();
        state.clients.insert(
            id.clone(),
            ClientRecord {
                id: id.clone(),
                origin: origin.to_string(),
            },
        );
        state.client_by_origin.insert(origin.to_string(), id.clone());
        info!(%origin, client_id = %id, "Registered client");
        id
    }

    /// Remove a client identity. Its token is left behind for `cleanup`.
    pub fn unregister_client(&self, client_id: &str) -> bool {
        let mut state = self.state.write();
        let removed = state.clients.remove(client_id);
        if let Some(client) = &removed {
            state.client_by_origin.remove(&client.origin);
            state.token_by_client.remove(client_id);
            info!(client_id = %client.id, "Unregistered client");
        }
        removed.is_some()
    }

    /// Look up the client registered for an origin
    pub fn client_for_origin(&self, origin: &str) -> Option<String> {
        self.state.read().client_by_origin.get(origin).cloned()
    }

    /// Issue a token for the client, or extend the existing one.
    ///
    /// Extension is a set union: capabilities already granted keep their
    /// timestamps unless re-requested; requested capabilities get fresh
    /// grant/expiry timestamps. Atomic with respect to `validate`.
    pub fn issue_or_extend(
        &self,
        client_id: &str,
        capabilities: &[String],
    ) -> GatewayResult<AccessTokenData> {
        if capabilities.is_empty() {
            return Err(GatewayError::InvalidParameter(
                "no capabilities requested".into(),
            ));
        }
        let now = Utc::now();
        let mut state = self.state.write();
        if !state.clients.contains_key(client_id) {
            return Err(GatewayError::InvalidParameter(format!(
                "unknown client: {client_id}"
            )));
        }

        let existing = state
            .token_by_client
            .get(client_id)
            .and_then(|t| state.tokens.get(t))
            .filter(|rec| rec.has_live_grant(now))
            .cloned();

        let mut grants = match &existing {
            Some(rec) => rec.grants.clone(),
            None => HashMap::new(),
        };
        for cap in capabilities {
            grants.insert(
                cap.to_ascii_lowercase(),
                Grant {
                    granted_at: now,
                    expires_at: now + self.grant_ttl,
                },
            );
        }

        let token = match &existing {
            Some(rec) => rec.token.clone(),
            None => Uuid::new_v4().to_string(),
        };

        // Drop a fully expired predecessor before installing the new record
        if existing.is_none() {
            if let Some(old) = state.token_by_client.remove(client_id) {
                state.tokens.remove(&old);
            }
        }

        let record = Arc::new(TokenRecord {
            token: token.clone(),
            client_id: client_id.to_string(),
            grants,
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
        });
        let data = record.to_data();
        state.tokens.insert(token.clone(), record);
        state.token_by_client.insert(client_id.to_string(), token);

        info!(
            client_id = %client_id,
            capabilities = ?capabilities,
            extended = existing.is_some(),
            "Issued capability grant"
        );
        Ok(data)
    }

    /// Check that `token` grants `capability` right now.
    ///
    /// Requires the token to exist, its owning client to still exist, and
    /// the capability's own grant window to be open. Exempt capabilities
    /// always pass. Touches the token's last-access time on success.
    pub fn validate(&self, token: Option<&str>, capability: &str) -> GatewayResult<()> {
        if is_exempt(capability) {
            return Ok(());
        }
        let token = token.ok_or_else(|| GatewayError::Unauthorized("access token required".into()))?;

        let now = Utc::now();
        let state = self.state.read();
        let record = state
            .tokens
            .get(token)
            .ok_or_else(|| GatewayError::Unauthorized("unknown access token".into()))?;
        if !state.clients.contains_key(&record.client_id) {
            return Err(GatewayError::Unauthorized("client no longer registered".into()));
        }
        let grant = record
            .grants
            .get(&capability.to_ascii_lowercase())
            .ok_or_else(|| {
                GatewayError::Unauthorized(format!("capability not granted: {capability}"))
            })?;
        if grant.is_expired(now) {
            return Err(GatewayError::Unauthorized(format!(
                "capability grant expired: {capability}"
            )));
        }
        record.touch(now);
        Ok(())
    }

    /// Client identity a token belongs to, if the token exists
    pub fn client_for_token(&self, token: &str) -> Option<String> {
        self.state.read().tokens.get(token).map(|r| r.client_id.clone())
    }

    /// Revoke a single token. Subsequent validations fail.
    pub fn revoke(&self, token: &str) -> bool {
        let mut state = self.state.write();
        match state.tokens.remove(token) {
            Some(record) => {
                state.token_by_client.remove(&record.client_id);
                info!(client_id = %record.client_id, "Revoked access token");
                true
            }
            None => false,
        }
    }

    /// Revoke every grant held by a client identity
    pub fn revoke_all(&self, client_id: &str) -> bool {
        let mut state = self.state.write();
        match state.token_by_client.remove(client_id) {
            Some(token) => {
                state.tokens.remove(&token);
                info!(%client_id, "Revoked all grants for client");
                true
            }
            None => false,
        }
    }

    /// Garbage-collect tokens whose owning client no longer exists and whose
    /// last access predates the retention window. Never touches a token with
    /// a live owner, no matter how old.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write();
        let cutoff = now - self.retention;
        let stale: Vec<String> = state
            .tokens
            .values()
            .filter(|rec| {
                !state.clients.contains_key(&rec.client_id) && rec.last_access() < cutoff
            })
            .map(|rec| rec.token.clone())
            .collect();
        for token in &stale {
            state.tokens.remove(token);
        }
        if !stale.is_empty() {
            info!(removed = stale.len(), "Token cleanup removed orphaned tokens");
        }
        stale.len()
    }

    /// Number of live tokens (admin/diagnostic surface)
    pub fn token_count(&self) -> usize {
        self.state.read().tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn authority() -> TokenAuthority {
        TokenAuthority::default()
    }

    #[test]
    fn validate_passes_after_grant_and_fails_after_revoke() {
        let auth = authority();
        let client = auth.register_client("http://localhost:3000");
        let data = auth
            .issue_or_extend(&client, &["battery".to_string()])
            .unwrap();

        assert!(auth.validate(Some(&data.token), "battery").is_ok());
        assert!(auth.validate(Some(&data.token), "camera").is_err());

        assert!(auth.revoke(&data.token));
        assert!(auth.validate(Some(&data.token), "battery").is_err());
    }

    #[test]
    fn extension_is_a_union() {
        let auth = authority();
        let client = auth.register_client("http://localhost:3000");
        let first = auth
            .issue_or_extend(&client, &["battery".to_string()])
            .unwrap();
        let second = auth
            .issue_or_extend(&client, &["camera".to_string()])
            .unwrap();

        // Same token, grown grant set
        assert_eq!(first.token, second.token);
        let caps: Vec<&str> = second.grants.iter().map(|g| g.capability.as_str()).collect();
        assert_eq!(caps, vec!["battery", "camera"]);
        assert!(auth.validate(Some(&second.token), "battery").is_ok());
        assert!(auth.validate(Some(&second.token), "camera").is_ok());
    }

    #[test]
    fn extension_refreshes_only_requested_grants() {
        let auth = authority();
        let client = auth.register_client("http://localhost:3000");
        let first = auth
            .issue_or_extend(&client, &["battery".to_string()])
            .unwrap();
        let battery_granted_at = first.grants[0].granted_at;

        let second = auth
            .issue_or_extend(&client, &["camera".to_string()])
            .unwrap();
        let battery = second
            .grants
            .iter()
            .find(|g| g.capability == "battery")
            .unwrap();
        let camera = second
            .grants
            .iter()
            .find(|g| g.capability == "camera")
            .unwrap();

        assert_eq!(battery.granted_at, battery_granted_at);
        assert!(camera.granted_at >= battery_granted_at);
    }

    #[test]
    fn expired_grant_fails_validation() {
        let auth = TokenAuthority::new(Duration::ZERO, DEFAULT_TOKEN_RETENTION);
        let client = auth.register_client("http://localhost:3000");
        let data = auth
            .issue_or_extend(&client, &["battery".to_string()])
            .unwrap();
        // Zero TTL: expired as soon as the clock moves past the grant instant
        std::thread::sleep(Duration::from_millis(5));
        assert!(auth.validate(Some(&data.token), "battery").is_err());
    }

    #[test]
    fn exempt_capabilities_need_no_token() {
        let auth = authority();
        assert!(auth.validate(None, "authorization").is_ok());
        assert!(auth.validate(None, "availability").is_ok());
        assert!(auth.validate(None, "battery").is_err());
    }

    #[test]
    fn cleanup_only_collects_orphaned_stale_tokens() {
        let auth = TokenAuthority::new(DEFAULT_GRANT_TTL, Duration::ZERO);
        let keep = auth.register_client("http://keep.example.com");
        auth.issue_or_extend(&keep, &["battery".to_string()]).unwrap();

        let orphan = auth.register_client("http://gone.example.com");
        auth.issue_or_extend(&orphan, &["battery".to_string()]).unwrap();
        auth.unregister_client(&orphan);

        std::thread::sleep(Duration::from_millis(5));
        let removed = auth.cleanup();
        assert_eq!(removed, 1);
        assert_eq!(auth.token_count(), 1);
    }

    #[test]
    fn reregistering_origin_replaces_client() {
        let auth = authority();
        let first = auth.register_client("http://app.example.com");
        let data = auth
            .issue_or_extend(&first, &["battery".to_string()])
            .unwrap();
        let second = auth.register_client("http://app.example.com");

        assert_ne!(first, second);
        // Old client is gone, so its token no longer validates
        assert!(auth.validate(Some(&data.token), "battery").is_err());
    }
}
