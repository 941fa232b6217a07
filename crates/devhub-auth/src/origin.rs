//! Origin allowlist policy
//!
//! Admission gate for caller-declared origins. Entries are either glob
//! patterns (`*` any run, `?` one char) compiled to anchored regexes, or
//! exact origins compared after scheme/host/port normalization with the
//! scheme's default port substituted when unspecified.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use devhub_core::{GatewayError, GatewayResult};

/// One persisted allowlist entry, de-duplicated by `pattern`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub pattern: String,
    pub title: String,
}

/// Normalized exact-origin record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginInfo {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

/// Normalize an origin string to `(scheme, host, port)`.
///
/// Returns `None` for strings that do not parse as an absolute URL with a
/// host. Unknown schemes with no explicit port normalize to port 0 so two
/// such origins still compare equal.
pub fn normalize_origin(origin: &str) -> Option<OriginInfo> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url.port_or_known_default().unwrap_or(0);
    Some(OriginInfo {
        scheme: url.scheme().to_ascii_lowercase(),
        host,
        port,
    })
}

/// Compile a glob pattern to an anchored, case-insensitive regex.
///
/// `*` matches any run of characters, `?` exactly one; everything else is
/// literal (regex metacharacters, `.` included, are escaped).
pub fn compile_glob(pattern: &str) -> GatewayResult<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c if "\\.+()[]{}|^$".contains(c) => {
                expr.push('\\');
                expr.push(c);
            }
            c => expr.push(c),
        }
    }
    expr.push('$');
    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| GatewayError::InvalidParameter(format!("bad origin pattern {pattern:?}: {e}")))
}

enum Matcher {
    Glob(Regex),
    Exact(OriginInfo),
}

struct CompiledEntry {
    entry: AllowlistEntry,
    matcher: Matcher,
}

impl CompiledEntry {
    fn compile(entry: AllowlistEntry) -> GatewayResult<Self> {
        // Patterns with wildcards are globs; plain origins get normalized
        // exact comparison; anything else falls back to a literal glob.
        let matcher = if entry.pattern.contains('*') || entry.pattern.contains('?') {
            Matcher::Glob(compile_glob(&entry.pattern)?)
        } else if let Some(info) = normalize_origin(&entry.pattern) {
            Matcher::Exact(info)
        } else {
            Matcher::Glob(compile_glob(&entry.pattern)?)
        };
        Ok(Self { entry, matcher })
    }

    fn matches(&self, origin: &str) -> bool {
        match &self.matcher {
            Matcher::Glob(re) => re.is_match(origin),
            Matcher::Exact(info) => normalize_origin(origin).as_ref() == Some(info),
        }
    }
}

/// Serialized allowlist file format (TOML)
#[derive(Debug, Default, Serialize, Deserialize)]
struct AllowlistFile {
    #[serde(default)]
    entries: Vec<AllowlistEntry>,
}

/// Origin allowlist with compiled-once, read-mostly entries
pub struct OriginPolicy {
    enabled: AtomicBool,
    entries: RwLock<Vec<CompiledEntry>>,
    persist_path: RwLock<Option<PathBuf>>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OriginPolicy {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            entries: RwLock::new(Vec::new()),
            persist_path: RwLock::new(None),
        }
    }

    /// Load entries from a TOML allowlist file; a missing file yields an
    /// empty policy that will create the file on first `add`.
    pub fn load(enabled: bool, path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let policy = Self::new(enabled);
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| GatewayError::Internal(format!("read allowlist: {e}")))?;
            let file: AllowlistFile = toml::from_str(&raw)
                .map_err(|e| GatewayError::Internal(format!("parse allowlist: {e}")))?;
            let mut entries = policy.entries.write();
            for entry in file.entries {
                match CompiledEntry::compile(entry) {
                    Ok(compiled) => entries.push(compiled),
                    Err(e) => warn!(error = %e, "Skipping unparseable allowlist entry"),
                }
            }
            debug!(count = entries.len(), path = %path.display(), "Loaded origin allowlist");
        }
        *policy.persist_path.write() = Some(path);
        Ok(policy)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// True iff any stored pattern or exact-origin record matches.
    /// Callers consult `is_enabled` first; `allows` itself is pure.
    pub fn allows(&self, origin: &str) -> bool {
        self.entries.read().iter().any(|e| e.matches(origin))
    }

    /// Add an entry. Returns false if an entry with the same pattern value
    /// already exists (de-duplicated by value, not identity).
    pub fn add(&self, pattern: &str, title: &str) -> GatewayResult<bool> {
        let entry = AllowlistEntry {
            pattern: pattern.to_string(),
            title: title.to_string(),
        };
        let compiled = CompiledEntry::compile(entry)?;
        {
            let mut entries = self.entries.write();
            if entries.iter().any(|e| e.entry.pattern == pattern) {
                return Ok(false);
            }
            entries.push(compiled);
        }
        info!(%pattern, %title, "Added origin allowlist entry");
        self.persist()?;
        Ok(true)
    }

    /// Remove the entry with the given pattern value
    pub fn remove(&self, pattern: &str) -> GatewayResult<bool> {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|e| e.entry.pattern != pattern);
            entries.len() < before
        };
        if removed {
            info!(%pattern, "Removed origin allowlist entry");
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<AllowlistEntry> {
        self.entries.read().iter().map(|e| e.entry.clone()).collect()
    }

    fn persist(&self) -> GatewayResult<()> {
        let path = self.persist_path.read().clone();
        let Some(path) = path else { return Ok(()) };
        let file = AllowlistFile {
            entries: self.list(),
        };
        let raw = toml::to_string_pretty(&file)
            .map_err(|e| GatewayError::Internal(format!("serialize allowlist: {e}")))?;
        fs::write(&path, raw)
            .map_err(|e| GatewayError::Internal(format!("write allowlist {}: {e}", path.display())))
    }

    /// Persist to this path on every mutation from now on
    pub fn persist_to(&self, path: impl Into<PathBuf>) {
        *self.persist_path.write() = Some(path.into());
    }
}

impl OriginPolicy {
    /// Convenience admission check: passes when enforcement is disabled,
    /// otherwise requires a non-empty origin matching some entry.
    pub fn check(&self, origin: &str) -> GatewayResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if origin.is_empty() {
            return Err(GatewayError::InvalidOrigin("origin is required".into()));
        }
        if self.allows(origin) {
            Ok(())
        } else {
            Err(GatewayError::InvalidOrigin(origin.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn glob_is_anchored() {
        let re = compile_glob("*.example.com").unwrap();
        assert!(re.is_match("http://foo.example.com"));
        assert!(!re.is_match("http://example.com.evil.org"));
    }

    #[test]
    fn glob_question_mark_matches_single_char() {
        let re = compile_glob("http://host?").unwrap();
        assert!(re.is_match("http://host1"));
        assert!(!re.is_match("http://host12"));
        assert!(!re.is_match("http://host"));
    }

    #[test]
    fn glob_escapes_literal_dot() {
        let re = compile_glob("http://a.b").unwrap();
        assert!(re.is_match("http://a.b"));
        // '.' must not behave as a regex wildcard
        assert!(!re.is_match("http://axb"));
    }

    #[test]
    fn exact_origin_normalizes_default_ports() {
        assert_eq!(
            normalize_origin("http://App.Example.com"),
            normalize_origin("http://app.example.com:80")
        );
        assert_eq!(
            normalize_origin("https://app.example.com"),
            normalize_origin("https://app.example.com:443")
        );
        assert_ne!(
            normalize_origin("http://app.example.com"),
            normalize_origin("https://app.example.com")
        );
    }

    #[test]
    fn allows_with_exact_and_glob_entries() {
        let policy = OriginPolicy::new(true);
        policy.add("http://localhost:3000", "local dev").unwrap();
        policy.add("*.trusted.example.com", "trusted apps").unwrap();

        assert!(policy.allows("http://localhost:3000"));
        // default port substitution on the checked origin
        assert!(policy.allows("http://localhost:3000/"));
        assert!(policy.allows("https://app.trusted.example.com"));
        assert!(!policy.allows("http://evil.example.org"));
    }

    #[test]
    fn add_deduplicates_by_value() {
        let policy = OriginPolicy::new(true);
        assert!(policy.add("http://localhost:3000", "one").unwrap());
        assert!(!policy.add("http://localhost:3000", "two").unwrap());
        assert_eq!(policy.list().len(), 1);
    }

    #[test]
    fn check_respects_enabled_flag() {
        let policy = OriginPolicy::new(false);
        assert!(policy.check("http://anything.example.com").is_ok());

        policy.set_enabled(true);
        assert!(policy.check("http://anything.example.com").is_err());
        assert!(policy.check("").is_err());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowlist.toml");

        let policy = OriginPolicy::load(true, &path).unwrap();
        policy.add("*.example.com", "example apps").unwrap();
        policy.add("http://localhost:3000", "local dev").unwrap();
        policy.remove("http://localhost:3000").unwrap();

        let reloaded = OriginPolicy::load(true, &path).unwrap();
        let entries = reloaded.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pattern, "*.example.com");
        assert!(reloaded.allows("http://foo.example.com"));
    }
}
