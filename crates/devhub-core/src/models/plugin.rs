//! Plugin descriptor shared between the registry and the admin surface

use serde::{Deserialize, Serialize};

/// Static description of a registered plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Capabilities this plugin implements
    pub capabilities: Vec<String>,
    /// Plugin software version (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PluginDescriptor {
    /// True if the plugin declares the given capability (case-insensitive,
    /// matching how capability paths are compared everywhere else).
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }
}
