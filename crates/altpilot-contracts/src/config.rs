use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Feature flags captured as a read-only snapshot when an overlay opens.
/// Later changes to the global settings never affect an open session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub auto_generate_both_enabled: bool,
    #[serde(default)]
    pub dangerous_rename_enabled: bool,
    #[serde(default)]
    pub show_keywords: bool,
}

/// Where and how to reach the metadata service. The token is an opaque
/// per-session credential attached to every call; how it is minted or
/// rotated is the host's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub features: Configuration,
    #[serde(default)]
    pub service: Option<ServiceConfig>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }
}
