//! Multi-Provider Model Routing MCP Server
//!
//! This crate provides an MCP server that routes prompts across several
//! hosted and local language-model providers. It enables:
//!
//! - Direct calls to a named provider
//! - Concurrent fan-out, ordered fallback and sequential chains
//! - Consensus: fan out, then have one model merge the answers
//! - Smart routing from a task type to a default strategy
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       MCP client (stdio)                        │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ JSON-RPC over stdio
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         scratchpad-mcp                          │
//! │  ┌────────────┐ ┌──────────────┐ ┌────────────┐ ┌───────────┐  │
//! │  │ Tools      │ │ Orchestrator │ │ Router     │ │ Registry  │  │
//! │  └────────────┘ └──────────────┘ └────────────┘ └───────────┘  │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ HTTPS
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//! ┌───────────────┐ ┌───────────────┐ ┌───────────────┐
//! │  Anthropic    │ │ OpenAI-style  │ │  Gemini       │
//! │  Messages API │ │ (OpenAI,      │ │  generate     │
//! │               │ │  Perplexity,  │ │  Content      │
//! │               │ │  local)       │ │               │
//! └───────────────┘ └───────────────┘ └───────────────┘
//! ```
//!
//! # MCP Tools
//!
//! | Tool | Description |
//! |------|-------------|
//! | `model_generate` | Call one named model |
//! | `model_parallel` | Same prompt to several models concurrently |
//! | `model_consensus` | Fan out, then synthesize one answer |
//! | `model_chain` | Feed each model's output into the next |
//! | `model_fallback` | First usable answer from an ordered list |
//! | `model_orchestrate` | Run an explicit strategy, returns the JSON envelope |
//! | `model_smart_route` | Route by task type |
//! | `list_models` | Configured models and their availability |

pub mod clients;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod router;
pub mod server;
pub mod strategy;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use orchestrator::{OrchestrationEnvelope, Orchestrator};
pub use protocol::{McpRequest, McpResponse};
pub use provider::{GenerationRequest, Generator, ProviderId};
pub use registry::ProviderRegistry;
pub use router::{ModelRouter, RouterConfig};
pub use server::ScratchpadServer;
pub use strategy::{OrchestrationMode, OrchestrationStrategy, TaskType};
