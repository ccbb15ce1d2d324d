//! MCP tools exposing the router and orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::provider::{GenerationRequest, ProviderId};
use crate::router::{ChainStep, GenerationOutcome};
use crate::strategy::{OrchestrationStrategy, TaskType};

const CONSENSUS_EXCERPT_CHARS: usize = 500;
const CHAIN_EXCERPT_CHARS: usize = 300;

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult>;
}

/// Context passed to tools during execution.
pub struct ToolContext {
    pub orchestrator: Arc<Orchestrator>,
    /// Configuration the registry was built from.
    pub config: Arc<ServerConfig>,
}

impl ToolContext {
    pub fn new(orchestrator: Orchestrator, config: ServerConfig) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
        }
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    /// Create a tool registry with the default tools.
    pub fn new(context: ToolContext) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
            context: Arc::new(context),
        };
        registry.register_default_tools();
        registry
    }

    fn register_default_tools(&mut self) {
        self.register(Arc::new(GenerateTool));
        self.register(Arc::new(ParallelTool));
        self.register(Arc::new(ConsensusTool));
        self.register(Arc::new(ChainTool));
        self.register(Arc::new(FallbackTool));
        self.register(Arc::new(OrchestrateTool));
        self.register(Arc::new(SmartRouteTool));
        self.register(Arc::new(ListModelsTool));
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::InvalidParams(format!("unknown tool: {}", name)))?;

        tool.execute(arguments, &self.context).await
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: serde_json::Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn parse_providers(names: &[String]) -> Result<Vec<ProviderId>> {
    names.iter().map(|n| n.parse()).collect()
}

fn request_for(prompt: String, system_prompt: Option<String>) -> GenerationRequest {
    GenerationRequest {
        prompt,
        system_prompt,
    }
}

fn provider_names() -> Vec<&'static str> {
    ProviderId::all().iter().map(|p| p.as_str()).collect()
}

/// First `max_chars` characters, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn render_outcome(outcome: &GenerationOutcome) -> String {
    match &outcome.error {
        Some(error) if !error.is_empty() => format!(
            "## {} (Error, {}ms)\n\n{}",
            outcome.provider, outcome.latency_ms, error
        ),
        _ => format!(
            "## {} ({}ms)\n\n{}",
            outcome.provider, outcome.latency_ms, outcome.content
        ),
    }
}

/// Tool for a single provider call.
pub struct GenerateTool;

#[derive(Debug, Deserialize)]
struct GenerateArgs {
    prompt: String,
    model: String,
    system_prompt: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GenerateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_generate".into(),
            description: "Generate a response using a specific AI model.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The prompt" },
                    "model": {
                        "type": "string",
                        "enum": provider_names(),
                        "description": "Model to use"
                    },
                    "system_prompt": { "type": "string", "description": "Optional system/persona prompt" }
                },
                "required": ["prompt", "model"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: GenerateArgs = parse_args(arguments)?;
        let provider: ProviderId = args.model.parse()?;

        let outcome = context
            .orchestrator
            .router()
            .dispatch(provider, &request_for(args.prompt, args.system_prompt))
            .await;

        Ok(match outcome.error {
            Some(error) if !error.is_empty() => ToolCallResult::error_text(format!("Error: {}", error)),
            _ => ToolCallResult::text(outcome.content),
        })
    }
}

/// Tool for fanning one prompt out to several providers.
pub struct ParallelTool;

#[derive(Debug, Deserialize)]
struct MultiModelArgs {
    prompt: String,
    #[serde(default)]
    models: Option<Vec<String>>,
    system_prompt: Option<String>,
}

impl MultiModelArgs {
    /// Requested providers, or every available one when omitted.
    async fn providers(&self, context: &ToolContext) -> Result<Vec<ProviderId>> {
        match &self.models {
            Some(names) if !names.is_empty() => parse_providers(names),
            _ => Ok(context.orchestrator.router().available_providers().await),
        }
    }
}

fn multi_model_schema(models_description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": { "type": "string", "description": "The prompt to send" },
            "models": {
                "type": "array",
                "items": { "type": "string", "enum": provider_names() },
                "description": models_description
            },
            "system_prompt": { "type": "string", "description": "Optional system/persona prompt" }
        },
        "required": ["prompt"]
    })
}

#[async_trait::async_trait]
impl Tool for ParallelTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_parallel".into(),
            description: "Send the same prompt to several AI models concurrently.".into(),
            input_schema: multi_model_schema("Models to query (default: all available)"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: MultiModelArgs = parse_args(arguments)?;
        let providers = args.providers(context).await?;
        if providers.is_empty() {
            return Err(Error::NoProviders("no models configured".into()));
        }

        let outcomes = context
            .orchestrator
            .router()
            .parallel(&providers, &request_for(args.prompt, args.system_prompt))
            .await;

        let answered = outcomes.iter().filter(|o| !o.is_error()).count();
        let body = outcomes
            .iter()
            .map(render_outcome)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        Ok(ToolCallResult::text(format!(
            "# Parallel Responses ({} of {} responded)\n\n{}",
            answered,
            outcomes.len(),
            body
        )))
    }
}

/// Tool for consensus across several providers.
pub struct ConsensusTool;

#[async_trait::async_trait]
impl Tool for ConsensusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_consensus".into(),
            description: "Get consensus from multiple AI models: they all respond, then one synthesizes.".into(),
            input_schema: multi_model_schema("Models to query (default: all available)"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: MultiModelArgs = parse_args(arguments)?;
        let providers = args.providers(context).await?;

        let result = context
            .orchestrator
            .router()
            .consensus(&providers, &request_for(args.prompt, args.system_prompt))
            .await;

        let responses = result
            .responses
            .iter()
            .map(|r| match &r.error {
                Some(error) => format!("**{}** ({}ms, failed): {}", r.provider, r.latency_ms, error),
                None => format!(
                    "**{}** ({}ms):\n{}",
                    r.provider,
                    r.latency_ms,
                    excerpt(&r.content, CONSENSUS_EXCERPT_CHARS)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ToolCallResult::text(format!(
            "## Consensus Response\n\n{}\n\n---\n\n### Individual Model Responses ({} of {} valid)\n\n{}",
            result.synthesis,
            result.valid_count(),
            result.responses.len(),
            responses
        )))
    }
}

/// Tool for sequential model chains.
pub struct ChainTool;

#[derive(Debug, Deserialize)]
struct ChainArgs {
    prompt: String,
    chain: Vec<ChainStepArg>,
    system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainStepArg {
    model: String,
    transform: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ChainTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_chain".into(),
            description: "Chain models: the output of one becomes the input of the next.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Initial prompt" },
                    "chain": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "model": { "type": "string", "enum": provider_names() },
                                "transform": {
                                    "type": "string",
                                    "description": "Optional template; {input} is replaced by the previous output"
                                }
                            },
                            "required": ["model"]
                        },
                        "minItems": 1,
                        "description": "Ordered chain steps"
                    },
                    "system_prompt": { "type": "string", "description": "Optional system/persona prompt" }
                },
                "required": ["prompt", "chain"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: ChainArgs = parse_args(arguments)?;
        if args.chain.is_empty() {
            return Err(Error::InvalidParams("chain needs at least one step".into()));
        }

        let steps = args
            .chain
            .into_iter()
            .map(|s| -> Result<ChainStep> {
                Ok(ChainStep {
                    provider: s.model.parse()?,
                    transform: s.transform,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let result = context
            .orchestrator
            .router()
            .chain(&steps, &args.prompt, args.system_prompt.as_deref())
            .await;

        let steps_text = result
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "**Step {} ({}):**\n{}",
                    i + 1,
                    s.provider,
                    excerpt(&s.content, CHAIN_EXCERPT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let text = format!(
            "## Chain Result\n\n{}\n\n---\n\n### Steps\n\n{}",
            result.final_output, steps_text
        );
        Ok(if result.is_complete() {
            ToolCallResult::text(text)
        } else {
            ToolCallResult::error_text(text)
        })
    }
}

/// Tool for ordered fallback.
pub struct FallbackTool;

#[async_trait::async_trait]
impl Tool for FallbackTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_fallback".into(),
            description: "Try models in order and return the first usable response.".into(),
            input_schema: multi_model_schema("Models in priority order (default: all available)"),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: MultiModelArgs = parse_args(arguments)?;
        let providers = args.providers(context).await?;

        let outcome = context
            .orchestrator
            .router()
            .fallback(&providers, &request_for(args.prompt, args.system_prompt))
            .await;

        Ok(if outcome.is_valid() {
            ToolCallResult::text(render_outcome(&outcome))
        } else {
            ToolCallResult::error_text(render_outcome(&outcome))
        })
    }
}

/// Tool for running an explicit strategy.
pub struct OrchestrateTool;

#[derive(Debug, Deserialize)]
struct OrchestrateArgs {
    prompt: String,
    mode: String,
    models: Vec<String>,
    fallback_order: Option<Vec<String>>,
    system_prompt: Option<String>,
}

#[async_trait::async_trait]
impl Tool for OrchestrateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "model_orchestrate".into(),
            description: "Run a prompt with an explicit orchestration mode and model list; returns the JSON envelope.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The prompt" },
                    "mode": {
                        "type": "string",
                        "enum": ["single", "parallel", "consensus", "chain"],
                        "description": "Orchestration mode"
                    },
                    "models": {
                        "type": "array",
                        "items": { "type": "string", "enum": provider_names() },
                        "description": "Ordered models"
                    },
                    "fallback_order": {
                        "type": "array",
                        "items": { "type": "string", "enum": provider_names() },
                        "description": "Backup models for single mode"
                    },
                    "system_prompt": { "type": "string", "description": "Optional system/persona prompt" }
                },
                "required": ["prompt", "mode", "models"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: OrchestrateArgs = parse_args(arguments)?;
        let mut strategy = OrchestrationStrategy::new(args.mode.as_str(), parse_providers(&args.models)?);
        if let Some(order) = &args.fallback_order {
            strategy = strategy.with_fallback(parse_providers(order)?);
        }

        let envelope = context
            .orchestrator
            .orchestrate(&strategy, &request_for(args.prompt, args.system_prompt))
            .await;

        let text = serde_json::to_string_pretty(&envelope)?;
        Ok(if envelope.success {
            ToolCallResult::text(text)
        } else {
            ToolCallResult::error_text(text)
        })
    }
}

/// Tool for task-type routing.
pub struct SmartRouteTool;

#[derive(Debug, Deserialize)]
struct SmartRouteArgs {
    prompt: String,
    task_type: String,
    system_prompt: Option<String>,
}

#[async_trait::async_trait]
impl Tool for SmartRouteTool {
    fn definition(&self) -> ToolDefinition {
        let task_types: Vec<&str> = TaskType::all().iter().map(|t| t.as_str()).collect();
        ToolDefinition {
            name: "model_smart_route".into(),
            description: "Automatically route to the best model(s) for a task type.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The prompt" },
                    "task_type": {
                        "type": "string",
                        "enum": task_types,
                        "description": "Type of task for routing"
                    },
                    "system_prompt": { "type": "string", "description": "Optional system/persona prompt" }
                },
                "required": ["prompt", "task_type"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: SmartRouteArgs = parse_args(arguments)?;
        let task_type = TaskType::parse_lenient(&args.task_type);

        let envelope = context
            .orchestrator
            .smart_route(task_type, &request_for(args.prompt, args.system_prompt))
            .await;

        if !envelope.success {
            return Ok(ToolCallResult::error_text(format!(
                "Error: {}",
                envelope.error.as_deref().unwrap_or("orchestration failed")
            )));
        }

        let text = match envelope.text() {
            Some(text) => text.to_string(),
            None => serde_json::to_string_pretty(&envelope.data)?,
        };
        // A broken chain still carries its failure message as the final text.
        let chain_broken = envelope
            .data
            .as_ref()
            .is_some_and(|data| data.get("failedStep").is_some());
        Ok(if chain_broken {
            ToolCallResult::error_text(text)
        } else {
            ToolCallResult::text(text)
        })
    }
}

/// Tool for listing configured models and their availability.
pub struct ListModelsTool;

#[async_trait::async_trait]
impl Tool for ListModelsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_models".into(),
            description: "List AI models and whether each one is available.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let status = context.orchestrator.status().await;

        let lines = context
            .config
            .models
            .available
            .iter()
            .map(|(name, entry)| {
                let available = name
                    .parse::<ProviderId>()
                    .map_or(false, |p| status.available_providers.contains(&p));
                let state = if available {
                    "✅ Available"
                } else if !entry.enabled {
                    "⏸ Disabled"
                } else {
                    "❌ Not configured (missing API key)"
                };
                format!("**{}** (`{}`): {}", name, entry.model, state)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let timeout = status
            .call_timeout
            .map_or("none".to_string(), |t| format!("{}s", t.as_secs()));

        Ok(ToolCallResult::text(format!(
            "## Available Models\n\n{}\n\nCurrent primary: {}\nSynthesizer: {}\nCall timeout: {}",
            lines, status.primary, status.synthesizer, timeout
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ContentItem;
    use crate::router::ModelRouter;
    use crate::testing::{registry_of, CallLog, FakeGenerator};
    use ProviderId::*;

    fn tools(generators: Vec<FakeGenerator>) -> ToolRegistry {
        let orchestrator = Orchestrator::new(ModelRouter::new(registry_of(generators)));
        ToolRegistry::new(ToolContext::new(orchestrator, ServerConfig::default()))
    }

    fn text_of(result: &ToolCallResult) -> &str {
        match &result.content[0] {
            ContentItem::Text { text } => text,
        }
    }

    #[test]
    fn test_definitions_cover_all_tools() {
        let registry = tools(vec![]);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "list_models",
                "model_chain",
                "model_consensus",
                "model_fallback",
                "model_generate",
                "model_orchestrate",
                "model_parallel",
                "model_smart_route",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let registry = tools(vec![]);
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_generate_reports_unavailable_as_tool_error() {
        let registry = tools(vec![]);
        let result = registry
            .execute("model_generate", json!({ "prompt": "hi", "model": "gemini" }))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(text_of(&result).contains("not available"));

        let err = registry
            .execute("model_generate", json!({ "prompt": "hi", "model": "grok" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_consensus_defaults_to_available_models() {
        let log = CallLog::new();
        let registry = tools(vec![
            FakeGenerator::ok(Claude, "synth", &log),
            FakeGenerator::ok(Gemini, "g", &log),
        ]);

        let result = registry
            .execute("model_consensus", json!({ "prompt": "q" }))
            .await
            .unwrap();
        let text = text_of(&result);
        assert!(text.starts_with("## Consensus Response\n\nsynth"));
        assert!(text.contains("(2 of 2 valid)"));
    }

    #[tokio::test]
    async fn test_chain_tool_passes_transform() {
        let log = CallLog::new();
        let registry = tools(vec![
            FakeGenerator::ok(Claude, "one", &log),
            FakeGenerator::echo(OpenAi, "", &log),
        ]);

        let result = registry
            .execute(
                "model_chain",
                json!({
                    "prompt": "start",
                    "chain": [
                        { "model": "claude" },
                        { "model": "openai", "transform": "Improve: {input}" }
                    ]
                }),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(log.prompts_for(OpenAi), vec!["Improve: one".to_string()]);
        assert!(text_of(&result).starts_with("## Chain Result\n\nImprove: one"));
    }

    #[tokio::test]
    async fn test_orchestrate_tool_rejects_unknown_mode() {
        let log = CallLog::new();
        let registry = tools(vec![FakeGenerator::ok(Claude, "x", &log)]);

        let result = registry
            .execute(
                "model_orchestrate",
                json!({ "prompt": "q", "mode": "bogus", "models": ["claude"] }),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        let envelope: serde_json::Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(envelope["success"], false);
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_smart_route_tool_returns_text() {
        let log = CallLog::new();
        let registry = tools(vec![FakeGenerator::ok(Gemini, "routed", &log)]);

        let result = registry
            .execute("model_smart_route", json!({ "prompt": "q", "task_type": "chat" }))
            .await
            .unwrap();
        assert_eq!(text_of(&result), "routed");
    }

    #[tokio::test]
    async fn test_smart_route_flags_broken_chain() {
        let log = CallLog::new();
        let registry = tools(vec![
            FakeGenerator::ok(Claude, "draft", &log),
            FakeGenerator::fail(OpenAi, "quota exceeded", &log),
        ]);

        let result = registry
            .execute("model_smart_route", json!({ "prompt": "q", "task_type": "code" }))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(text_of(&result).starts_with("Chain failed at step 2 (openai)"));
    }

    #[tokio::test]
    async fn test_list_models_marks_availability() {
        let log = CallLog::new();
        let registry = tools(vec![FakeGenerator::ok(OpenAi, "x", &log)]);

        let result = registry.execute("list_models", json!({})).await.unwrap();
        let text = text_of(&result);
        assert!(text.contains("**openai** (`gpt-4o`): ✅ Available"));
        assert!(text.contains("**claude** (`claude-sonnet-4-20250514`): ❌ Not configured"));
        assert!(text.contains("**local** (`llama3`): ⏸ Disabled"));
        assert!(text.contains("Current primary: claude"));
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        assert_eq!(excerpt("héllo wörld", 4), "héll...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
