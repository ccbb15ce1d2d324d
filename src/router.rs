//! Model router: single dispatch and the multi-provider executors built on it.
//!
//! Every executor returns values describing success or failure. Generator
//! errors, timeouts and panics are captured in [`GenerationOutcome::error`]
//! at the dispatch boundary and never propagate.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::provider::{GenerationRequest, Generator, ProviderId};
use crate::registry::ProviderRegistry;

/// Marker replaced by the previous step's output in a chain transform.
pub const INPUT_MARKER: &str = "{input}";

/// Synthesis reported when no provider produced a usable response.
pub const CONSENSUS_FAILURE: &str = "All models failed to generate responses.";

/// Error reported by fallback when every provider failed.
pub const ALL_PROVIDERS_FAILED: &str = "All providers failed";

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound for a single provider call. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Provider preferred for consensus synthesis.
    pub synthesizer: ProviderId,
    /// Provider used to tag outcomes when no provider was given at all.
    pub primary: ProviderId,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(crate::config::DEFAULT_CALL_TIMEOUT_SECS)),
            synthesizer: ProviderId::Claude,
            primary: ProviderId::Claude,
        }
    }
}

impl From<&ServerConfig> for RouterConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            synthesizer: config.models.synthesizer,
            primary: config.models.primary,
        }
    }
}

/// Normalized result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub provider: ProviderId,
    pub content: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationOutcome {
    fn success(provider: ProviderId, content: String, latency_ms: u64) -> Self {
        Self {
            provider,
            content,
            latency_ms,
            error: None,
        }
    }

    fn failure(provider: ProviderId, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            provider,
            content: String::new(),
            latency_ms,
            error: Some(error.into()),
        }
    }

    /// Outcome for a provider with no registered client.
    pub fn unavailable(provider: ProviderId) -> Self {
        Self::failure(provider, format!("Provider {} not available", provider), 0)
    }

    /// Whether the outcome carries a non-empty error.
    pub fn is_error(&self) -> bool {
        self.error.as_deref().map_or(false, |e| !e.is_empty())
    }

    /// No error and non-empty content.
    pub fn is_valid(&self) -> bool {
        !self.is_error() && !self.content.is_empty()
    }
}

/// One step of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub provider: ProviderId,
    /// Template containing [`INPUT_MARKER`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl ChainStep {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            transform: None,
        }
    }

    pub fn with_transform(provider: ProviderId, transform: impl Into<String>) -> Self {
        Self {
            provider,
            transform: Some(transform.into()),
        }
    }

    /// Input dispatched for this step given the previous output.
    pub fn input_for(&self, previous: &str) -> String {
        match &self.transform {
            Some(template) => template.replace(INPUT_MARKER, previous),
            None => previous.to_string(),
        }
    }
}

/// Result of a chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    /// Outcomes of the steps that ran, in order.
    pub steps: Vec<GenerationOutcome>,
    /// Last output, or a message naming the step that broke the chain.
    #[serde(rename = "final")]
    pub final_output: String,
    /// Index of the failing step, if the chain broke.
    #[serde(rename = "failedStep", skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
}

impl ChainResult {
    pub fn is_complete(&self) -> bool {
        self.failed_step.is_none()
    }
}

/// Result of a consensus run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Every outcome, failures included, in request order.
    pub responses: Vec<GenerationOutcome>,
    pub synthesis: String,
    /// Provider whose synthesis call produced `synthesis`, if one ran and succeeded.
    #[serde(rename = "synthesizedBy", skip_serializing_if = "Option::is_none")]
    pub synthesized_by: Option<ProviderId>,
}

impl ConsensusResult {
    pub fn valid_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_valid()).count()
    }
}

/// Routes generation requests to registered providers.
#[derive(Clone)]
pub struct ModelRouter {
    registry: Arc<RwLock<ProviderRegistry>>,
    config: RouterConfig,
}

impl ModelRouter {
    /// Create a router over a registry.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::with_config(registry, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    pub fn with_config(registry: ProviderRegistry, config: RouterConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Register (or replace) a provider at runtime.
    pub async fn register_provider(&self, provider: ProviderId, generator: Arc<dyn Generator>) {
        self.registry.write().await.register(provider, generator);
        info!(%provider, "provider registered");
    }

    pub async fn is_available(&self, provider: ProviderId) -> bool {
        self.registry.read().await.is_available(provider)
    }

    /// Currently registered providers, in registration order.
    pub async fn available_providers(&self) -> Vec<ProviderId> {
        self.registry.read().await.list_available()
    }

    /// Send a request to one provider.
    pub async fn dispatch(
        &self,
        provider: ProviderId,
        request: &GenerationRequest,
    ) -> GenerationOutcome {
        let generator = self.registry.read().await.get(provider);
        let Some(generator) = generator else {
            debug!(%provider, "dispatch to unregistered provider");
            return GenerationOutcome::unavailable(provider);
        };

        let start = Instant::now();
        let call = AssertUnwindSafe(
            generator.generate(&request.prompt, request.system_prompt.as_deref()),
        )
        .catch_unwind();

        let result = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    let latency_ms = elapsed_ms(start);
                    warn!(%provider, latency_ms, "provider call timed out");
                    return GenerationOutcome::failure(
                        provider,
                        Error::Timeout(format!("{} after {}s", provider, limit.as_secs_f64()))
                            .to_string(),
                        latency_ms,
                    );
                }
            },
            None => call.await,
        };
        let latency_ms = elapsed_ms(start);

        match result {
            Ok(Ok(content)) => {
                debug!(%provider, latency_ms, chars = content.len(), "provider call succeeded");
                GenerationOutcome::success(provider, content, latency_ms)
            }
            Ok(Err(e)) => {
                warn!(%provider, latency_ms, "provider call failed: {}", e);
                GenerationOutcome::failure(provider, e.to_string(), latency_ms)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(%provider, latency_ms, "provider call panicked: {}", message);
                GenerationOutcome::failure(provider, message, latency_ms)
            }
        }
    }

    /// Send the same request to every provider concurrently.
    ///
    /// Waits for all calls to settle; output order matches `providers`.
    pub async fn parallel(
        &self,
        providers: &[ProviderId],
        request: &GenerationRequest,
    ) -> Vec<GenerationOutcome> {
        join_all(providers.iter().map(|p| self.dispatch(*p, request))).await
    }

    /// Try providers one at a time until one returns usable content.
    pub async fn fallback(
        &self,
        providers: &[ProviderId],
        request: &GenerationRequest,
    ) -> GenerationOutcome {
        for provider in providers {
            let outcome = self.dispatch(*provider, request).await;
            if outcome.is_valid() {
                return outcome;
            }
            debug!(%provider, "fallback moving past provider");
        }

        let tag = providers.first().copied().unwrap_or(self.config.primary);
        warn!(tried = providers.len(), "fallback exhausted");
        GenerationOutcome::failure(tag, ALL_PROVIDERS_FAILED, 0)
    }

    /// Run steps sequentially, feeding each output into the next step.
    pub async fn chain(
        &self,
        steps: &[ChainStep],
        initial_input: &str,
        system_prompt: Option<&str>,
    ) -> ChainResult {
        let mut outcomes = Vec::with_capacity(steps.len());
        let mut current = initial_input.to_string();
        let base = GenerationRequest {
            prompt: current.clone(),
            system_prompt: system_prompt.map(str::to_string),
        };

        for (index, step) in steps.iter().enumerate() {
            let request = base.with_prompt(step.input_for(&current));
            let outcome = self.dispatch(step.provider, &request).await;

            if outcome.is_error() {
                let final_output = format!(
                    "Chain failed at step {} ({}): {}",
                    index + 1,
                    step.provider,
                    outcome.error.as_deref().unwrap_or_default()
                );
                warn!(step = index + 1, provider = %step.provider, "chain broken");
                outcomes.push(outcome);
                return ChainResult {
                    steps: outcomes,
                    final_output,
                    failed_step: Some(index),
                };
            }

            current = outcome.content.clone();
            outcomes.push(outcome);
        }

        ChainResult {
            steps: outcomes,
            final_output: current,
            failed_step: None,
        }
    }

    /// Fan out, then merge the valid responses into one answer.
    ///
    /// One valid response is passed through without a second call; zero yields
    /// [`CONSENSUS_FAILURE`]. A failed synthesis call degrades to the first
    /// valid response.
    pub async fn consensus(
        &self,
        providers: &[ProviderId],
        request: &GenerationRequest,
    ) -> ConsensusResult {
        let responses = self.parallel(providers, request).await;
        let (synthesis, synthesized_by) = self.synthesize(&request.prompt, &responses).await;

        ConsensusResult {
            responses,
            synthesis,
            synthesized_by,
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        responses: &[GenerationOutcome],
    ) -> (String, Option<ProviderId>) {
        let valid: Vec<&GenerationOutcome> = responses.iter().filter(|r| r.is_valid()).collect();

        let first = match valid.as_slice() {
            [] => {
                warn!(queried = responses.len(), "consensus: no valid responses");
                return (CONSENSUS_FAILURE.to_string(), None);
            }
            [only] => {
                debug!(provider = %only.provider, "consensus: single valid response, passing through");
                return (only.content.clone(), None);
            }
            [first, ..] => *first,
        };

        let synthesizer = if self.is_available(self.config.synthesizer).await {
            self.config.synthesizer
        } else {
            first.provider
        };
        info!(%synthesizer, inputs = valid.len(), "consensus: synthesizing");

        let prompt = synthesis_prompt(query, &valid);
        let outcome = self
            .dispatch(synthesizer, &GenerationRequest::new(prompt))
            .await;

        if outcome.is_valid() {
            (outcome.content, Some(synthesizer))
        } else {
            warn!(
                %synthesizer,
                "synthesis failed, using first valid response: {}",
                outcome.error.as_deref().unwrap_or("empty response")
            );
            (first.content.clone(), None)
        }
    }
}

/// Prompt asking one model to merge several answers to the same query.
pub fn synthesis_prompt(query: &str, responses: &[&GenerationOutcome]) -> String {
    let sections = responses
        .iter()
        .map(|r| {
            format!(
                "--- {} ---\n{}",
                r.provider.as_str().to_uppercase(),
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Several AI models answered the same query. Merge their answers into one \
coherent response that:\n\
1. States the points they agree on with confidence\n\
2. Calls out meaningful disagreements\n\
3. Keeps the strongest insight from each answer\n\
4. Reads as a single, improved answer\n\n\
Original query: {}\n\n\
Model responses:\n{}\n\n\
Synthesized response:",
        query, sections
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("provider panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("provider panicked: {}", s)
    } else {
        "provider panicked".to_string()
    }
}
