//! Server configuration.
//!
//! The configuration file is JSON:
//!
//! ```json
//! {
//!   "server": { "name": "scratchpad-mcp", "version": "0.1.0" },
//!   "models": {
//!     "primary": "claude",
//!     "synthesizer": "claude",
//!     "available": {
//!       "claude": { "enabled": true, "model": "claude-sonnet-4-20250514", "apiKeyEnv": "ANTHROPIC_API_KEY" }
//!     }
//!   },
//!   "routing": { "callTimeoutSecs": 120 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::ProviderId;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub models: ModelsConfig,
    pub routing: RoutingConfig,
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found at {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Look up the entry for a provider.
    pub fn model(&self, provider: ProviderId) -> Option<&ModelEntry> {
        self.models.available.get(provider.as_str())
    }

    /// Configured timeout for a single provider call.
    pub fn call_timeout(&self) -> Option<Duration> {
        match self.routing.call_timeout_secs {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

/// Server identity reported on `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub name: String,
    pub version: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "scratchpad-mcp".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelsConfig {
    /// Primary provider.
    pub primary: ProviderId,
    /// Provider preferred for consensus synthesis.
    pub synthesizer: ProviderId,
    /// Provider entries keyed by identifier.
    pub available: BTreeMap<String, ModelEntry>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let mut available = BTreeMap::new();
        available.insert(
            "claude".into(),
            ModelEntry::new("claude-sonnet-4-20250514", "ANTHROPIC_API_KEY"),
        );
        available.insert("openai".into(), ModelEntry::new("gpt-4o", "OPENAI_API_KEY"));
        available.insert(
            "gemini".into(),
            ModelEntry::new("gemini-1.5-pro", "GEMINI_API_KEY"),
        );
        available.insert(
            "perplexity".into(),
            ModelEntry::new("sonar-pro", "PERPLEXITY_API_KEY"),
        );
        available.insert(
            "local".into(),
            ModelEntry {
                enabled: false,
                base_url: Some("http://localhost:11434/v1".into()),
                ..ModelEntry::new("llama3", "LOCAL_API_KEY")
            },
        );

        Self {
            primary: ProviderId::Claude,
            synthesizer: ProviderId::Claude,
            available,
        }
    }
}

/// One provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Model selector passed to the provider API.
    pub model: String,
    /// Environment variable holding the credential.
    pub api_key_env: String,
    /// Optional endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ModelEntry {
    pub fn new(model: impl Into<String>, api_key_env: impl Into<String>) -> Self {
        Self {
            enabled: true,
            model: model.into(),
            api_key_env: api_key_env.into(),
            base_url: None,
        }
    }

    /// Resolve the credential; empty values count as missing.
    pub fn api_key<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.api_key_env).filter(|key| !key.trim().is_empty())
    }
}

/// Routing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Per-call timeout in seconds; 0 disables it.
    pub call_timeout_secs: Option<u64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: Some(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

/// Credential lookup backed by the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_with(keys: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            keys.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_default_config_has_local_disabled() {
        let config = ServerConfig::default();
        assert_eq!(config.models.primary, ProviderId::Claude);
        assert!(!config.model(ProviderId::Local).unwrap().enabled);
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let config = ServerConfig::default();
        let lookup = lookup_with(&[("ANTHROPIC_API_KEY", "sk-test"), ("OPENAI_API_KEY", "  ")]);
        let key = |provider| config.model(provider).and_then(|entry| entry.api_key(&lookup));

        assert_eq!(key(ProviderId::Claude).as_deref(), Some("sk-test"));
        assert!(key(ProviderId::OpenAi).is_none());
        assert!(key(ProviderId::Gemini).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "models": {{
                    "primary": "openai",
                    "synthesizer": "gemini",
                    "available": {{
                        "openai": {{ "model": "gpt-4o-mini", "apiKeyEnv": "OPENAI_API_KEY" }},
                        "gemini": {{ "enabled": false, "model": "gemini-pro", "apiKeyEnv": "GEMINI_API_KEY" }}
                    }}
                }},
                "routing": {{ "callTimeoutSecs": 0 }}
            }}"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.models.primary, ProviderId::OpenAi);
        assert_eq!(config.models.synthesizer, ProviderId::Gemini);
        assert!(config.model(ProviderId::OpenAi).unwrap().enabled);
        assert!(config.model(ProviderId::Claude).is_none());
        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.server.name, "scratchpad-mcp");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load("/nonexistent/scratchpad.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ServerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
