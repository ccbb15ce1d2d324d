//! Provider client registry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::build_generator;
use crate::config::ServerConfig;
use crate::provider::{Generator, ProviderId};

/// One generator per enabled provider, in registration order.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    entries: Vec<(ProviderId, Arc<dyn Generator>)>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build generators for every enabled provider with a resolvable credential.
    ///
    /// Entries without a credential are skipped; their absence is what
    /// `list_models` reports as "not configured".
    pub fn from_config<F>(config: &ServerConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();

        for provider in ProviderId::all() {
            let Some(entry) = config.model(provider) else {
                continue;
            };
            if !entry.enabled {
                debug!(%provider, "provider disabled");
                continue;
            }
            let Some(api_key) = entry.api_key(&lookup) else {
                debug!(%provider, env = %entry.api_key_env, "no credential, skipping provider");
                continue;
            };

            match build_generator(provider, entry, api_key) {
                Ok(generator) => registry.register(provider, Arc::from(generator)),
                Err(e) => warn!(%provider, "failed to build provider client: {}", e),
            }
        }

        for name in config.models.available.keys() {
            if name.parse::<ProviderId>().is_err() {
                warn!(provider = %name, "ignoring unknown provider in config");
            }
        }

        info!(providers = ?registry.list_available(), "provider registry ready");
        registry
    }

    /// Register a generator, replacing any previous one for the same provider.
    pub fn register(&mut self, provider: ProviderId, generator: Arc<dyn Generator>) {
        match self.entries.iter_mut().find(|(p, _)| *p == provider) {
            Some(slot) => slot.1 = generator,
            None => self.entries.push((provider, generator)),
        }
    }

    /// Whether a provider has a registered client.
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.entries.iter().any(|(p, _)| *p == provider)
    }

    /// Registered providers in insertion order.
    pub fn list_available(&self) -> Vec<ProviderId> {
        self.entries.iter().map(|(p, _)| *p).collect()
    }

    /// Generator for a provider.
    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn Generator>> {
        self.entries
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, g)| g.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct Echo;

    #[async_trait::async_trait]
    impl Generator for Echo {
        async fn generate(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn test_registry_insertion_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderId::Gemini, Arc::new(Echo));
        registry.register(ProviderId::Claude, Arc::new(Echo));
        registry.register(ProviderId::Gemini, Arc::new(Echo));

        assert_eq!(
            registry.list_available(),
            vec![ProviderId::Gemini, ProviderId::Claude]
        );
        assert!(registry.is_available(ProviderId::Claude));
        assert!(!registry.is_available(ProviderId::OpenAi));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_from_config_skips_missing_credentials() {
        let config = ServerConfig::default();
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            "PERPLEXITY_API_KEY" => Some("pplx".to_string()),
            "LOCAL_API_KEY" => Some("local".to_string()),
            _ => None,
        };

        let registry = ProviderRegistry::from_config(&config, lookup);
        assert_eq!(
            registry.list_available(),
            vec![ProviderId::OpenAi, ProviderId::Perplexity]
        );
    }

    #[test]
    fn test_registered_generator_is_callable() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderId::Local, Arc::new(Echo));

        let generator = registry.get(ProviderId::Local).unwrap();
        let output = tokio_test::block_on(generator.generate("ping", None)).unwrap();
        assert_eq!(output, "ping");
        assert!(registry.get(ProviderId::Claude).is_none());
    }
}
