use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CbxError, CbxResult};

/// Client configuration (loaded from cipherbox.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the remote store.
    pub endpoint: String,
    /// API token for worker-authenticated surfaces (optional; user sessions
    /// authenticate with credentials instead).
    pub api_token: Option<String>,
    /// Page size for item listings.
    pub page_limit: u32,
    /// Log level (default: info)
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".into(),
            api_token: None,
            page_limit: 50,
            log_level: "info".into(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> CbxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| CbxError::Config(format!("{}: {e}", path.display())))
    }
}
