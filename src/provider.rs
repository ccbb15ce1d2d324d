//! Provider identities and the generation capability every backend implements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A hosted language-model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Anthropic Claude.
    Claude,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini.
    Gemini,
    /// Perplexity (OpenAI-compatible API).
    Perplexity,
    /// Self-hosted OpenAI-compatible endpoint.
    Local,
}

impl ProviderId {
    /// All known providers, in canonical order.
    pub fn all() -> Vec<ProviderId> {
        vec![
            ProviderId::Claude,
            ProviderId::OpenAi,
            ProviderId::Gemini,
            ProviderId::Perplexity,
            ProviderId::Local,
        ]
    }

    /// Lowercase identifier used in configuration and tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Perplexity => "perplexity",
            ProviderId::Local => "local",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderId::Claude),
            "openai" | "chatgpt" | "gpt" => Ok(ProviderId::OpenAi),
            "gemini" => Ok(ProviderId::Gemini),
            "perplexity" => Ok(ProviderId::Perplexity),
            "local" => Ok(ProviderId::Local),
            _ => Err(Error::InvalidParams(format!("unknown provider: {}", s))),
        }
    }
}

/// A prompt plus optional system/persona prompt. Built per call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Same system prompt, different prompt text.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Text generation capability of a single backend.
///
/// Implementations own their credentials and transport. Failures are returned
/// as `Err` carrying a human-readable message; the router turns them into
/// outcomes.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}
