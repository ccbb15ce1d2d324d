//! Orchestration facade: strategy execution and smart routing.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::provider::{GenerationRequest, ProviderId};
use crate::router::{ChainStep, ModelRouter, ALL_PROVIDERS_FAILED};
use crate::strategy::{OrchestrationMode, OrchestrationStrategy, TaskType};

/// Uniform result of an orchestration, whatever the mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: EnvelopeMetadata,
}

impl OrchestrationEnvelope {
    /// Text payload for `single`, `consensus` and `chain` results.
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            Some(Value::String(s)) => Some(s),
            Some(Value::Object(map)) => map
                .get("synthesis")
                .or_else(|| map.get("final"))
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Envelope metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub request_id: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<ProviderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
}

/// What a strategy executor produced.
struct Execution {
    success: bool,
    data: Value,
    error: Option<String>,
    provider_used: Option<ProviderId>,
}

/// Orchestrator over a [`ModelRouter`].
#[derive(Clone)]
pub struct Orchestrator {
    router: ModelRouter,
}

impl Orchestrator {
    pub fn new(router: ModelRouter) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Run a strategy. Never fails: every problem is reported in the envelope.
    pub async fn orchestrate(
        &self,
        strategy: &OrchestrationStrategy,
        request: &GenerationRequest,
    ) -> OrchestrationEnvelope {
        self.run(strategy, request, None).await
    }

    /// Route by task type, filtered to the providers available right now.
    pub async fn smart_route(
        &self,
        task_type: TaskType,
        request: &GenerationRequest,
    ) -> OrchestrationEnvelope {
        let strategy = self.resolve_strategy(task_type).await;
        info!(
            %task_type,
            mode = %strategy.mode,
            providers = ?strategy.providers,
            "smart route resolved"
        );
        self.run(&strategy, request, Some(task_type)).await
    }

    /// Default strategy for a task, restricted to currently available providers.
    pub async fn resolve_strategy(&self, task_type: TaskType) -> OrchestrationStrategy {
        let available = self.router.available_providers().await;
        task_type.default_strategy().resolve(&available)
    }

    async fn run(
        &self,
        strategy: &OrchestrationStrategy,
        request: &GenerationRequest,
        task_type: Option<TaskType>,
    ) -> OrchestrationEnvelope {
        let request_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let span = info_span!("orchestrate", request_id = %request_id, mode = %strategy.mode);

        let mut metadata = EnvelopeMetadata {
            request_id,
            mode: strategy.mode.to_string(),
            task_type,
            provider_used: None,
            elapsed_ms: None,
            started_at,
        };

        if let OrchestrationMode::Unknown(name) = &strategy.mode {
            let _entered = span.enter();
            error!("unknown orchestration mode: {}", name);
            metadata.elapsed_ms = Some(elapsed_ms(start.elapsed()));
            return OrchestrationEnvelope {
                success: false,
                data: None,
                error: Some(format!("Unknown orchestration mode: {}", name)),
                metadata,
            };
        }

        let result = AssertUnwindSafe(self.execute(strategy, request))
            .catch_unwind()
            .instrument(span)
            .await;
        metadata.elapsed_ms = Some(elapsed_ms(start.elapsed()));

        match result {
            Ok(Ok(execution)) => {
                info!(
                    request_id = %metadata.request_id,
                    success = execution.success,
                    elapsed_ms = metadata.elapsed_ms,
                    "orchestration finished"
                );
                metadata.provider_used = execution.provider_used;
                OrchestrationEnvelope {
                    success: execution.success,
                    data: Some(execution.data),
                    error: execution.error,
                    metadata,
                }
            }
            Ok(Err(e)) => {
                error!(request_id = %metadata.request_id, "orchestration failed: {}", e);
                OrchestrationEnvelope {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    metadata,
                }
            }
            Err(_) => {
                error!(request_id = %metadata.request_id, "orchestration panicked");
                OrchestrationEnvelope {
                    success: false,
                    data: None,
                    error: Some(Error::Internal("orchestration panicked".into()).to_string()),
                    metadata,
                }
            }
        }
    }

    async fn execute(
        &self,
        strategy: &OrchestrationStrategy,
        request: &GenerationRequest,
    ) -> Result<Execution> {
        match &strategy.mode {
            OrchestrationMode::Single => {
                let primary = strategy.providers.first().copied().ok_or_else(|| {
                    Error::NoProviders("strategy lists no provider".into())
                })?;

                let sequence = strategy.fallback_sequence();
                let outcome = if sequence.len() > 1 {
                    self.router.fallback(&sequence, request).await
                } else {
                    self.router.dispatch(primary, request).await
                };

                Ok(Execution {
                    success: !outcome.is_error(),
                    provider_used: Some(outcome.provider),
                    data: Value::String(outcome.content),
                    error: outcome.error,
                })
            }
            OrchestrationMode::Parallel => {
                let outcomes = self.router.parallel(&strategy.providers, request).await;
                let success = outcomes.iter().any(|o| !o.is_error());

                Ok(Execution {
                    success,
                    data: serde_json::to_value(&outcomes)?,
                    error: (!success).then(|| ALL_PROVIDERS_FAILED.to_string()),
                    provider_used: None,
                })
            }
            OrchestrationMode::Consensus => {
                let result = self.router.consensus(&strategy.providers, request).await;
                let valid_count = result.valid_count();

                Ok(Execution {
                    success: !result.synthesis.is_empty(),
                    data: json!({
                        "synthesis": result.synthesis,
                        "synthesizedBy": result.synthesized_by,
                        "synthesisStrategy": strategy.synthesis_strategy,
                        "validCount": valid_count,
                        "individualResponses": result.responses,
                    }),
                    error: None,
                    provider_used: result.synthesized_by,
                })
            }
            OrchestrationMode::Chain => {
                if strategy.providers.is_empty() {
                    return Err(Error::NoProviders("chain has no steps".into()));
                }
                let steps: Vec<ChainStep> =
                    strategy.providers.iter().copied().map(ChainStep::new).collect();
                let result = self
                    .router
                    .chain(&steps, &request.prompt, request.system_prompt.as_deref())
                    .await;

                Ok(Execution {
                    success: !result.final_output.is_empty(),
                    provider_used: result.steps.last().map(|s| s.provider),
                    data: serde_json::to_value(&result)?,
                    error: None,
                })
            }
            OrchestrationMode::Unknown(name) => Err(Error::InvalidParams(format!(
                "Unknown orchestration mode: {}",
                name
            ))),
        }
    }

    /// Get orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let config = self.router.config();
        OrchestratorStatus {
            available_providers: self.router.available_providers().await,
            primary: config.primary,
            synthesizer: config.synthesizer,
            call_timeout: config.call_timeout,
        }
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

/// Orchestrator status.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    /// Registered providers.
    pub available_providers: Vec<ProviderId>,
    pub primary: ProviderId,
    pub synthesizer: ProviderId,
    pub call_timeout: Option<Duration>,
}
