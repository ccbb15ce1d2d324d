//! Orchestration strategies and the task-type routing table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::ProviderId;

/// Dispatch topology.
///
/// Unrecognised names are kept as [`OrchestrationMode::Unknown`] so the
/// orchestrator can reject them explicitly instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrchestrationMode {
    Single,
    Parallel,
    Consensus,
    Chain,
    Unknown(String),
}

impl OrchestrationMode {
    pub fn as_str(&self) -> &str {
        match self {
            OrchestrationMode::Single => "single",
            OrchestrationMode::Parallel => "parallel",
            OrchestrationMode::Consensus => "consensus",
            OrchestrationMode::Chain => "chain",
            OrchestrationMode::Unknown(name) => name,
        }
    }
}

impl From<&str> for OrchestrationMode {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "single" => OrchestrationMode::Single,
            "parallel" => OrchestrationMode::Parallel,
            "consensus" => OrchestrationMode::Consensus,
            "chain" => OrchestrationMode::Chain,
            _ => OrchestrationMode::Unknown(s.to_string()),
        }
    }
}

impl From<String> for OrchestrationMode {
    fn from(s: String) -> Self {
        OrchestrationMode::from(s.as_str())
    }
}

impl From<OrchestrationMode> for String {
    fn from(mode: OrchestrationMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for OrchestrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How multiple outputs should be combined. Informational; consensus always merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStrategy {
    Vote,
    Merge,
    Best,
    Debate,
}

/// Mode plus ordered provider set for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationStrategy {
    pub mode: OrchestrationMode,
    /// Order matters for fallback and chain.
    pub providers: Vec<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_strategy: Option<SynthesisStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_order: Option<Vec<ProviderId>>,
}

impl OrchestrationStrategy {
    pub fn new(mode: impl Into<OrchestrationMode>, providers: Vec<ProviderId>) -> Self {
        Self {
            mode: mode.into(),
            providers,
            synthesis_strategy: None,
            fallback_order: None,
        }
    }

    pub fn single(provider: ProviderId) -> Self {
        Self::new(OrchestrationMode::Single, vec![provider])
    }

    pub fn with_synthesis(mut self, strategy: SynthesisStrategy) -> Self {
        self.synthesis_strategy = Some(strategy);
        self
    }

    pub fn with_fallback(mut self, order: Vec<ProviderId>) -> Self {
        self.fallback_order = Some(order);
        self
    }

    /// Primary provider followed by the fallback order, without duplicates.
    pub fn fallback_sequence(&self) -> Vec<ProviderId> {
        let mut sequence: Vec<ProviderId> = Vec::new();
        let candidates = self
            .providers
            .first()
            .into_iter()
            .chain(self.fallback_order.iter().flatten());
        for provider in candidates {
            if !sequence.contains(provider) {
                sequence.push(*provider);
            }
        }
        sequence
    }

    /// Copy of this strategy restricted to `available`.
    ///
    /// When no listed provider is available, degrades to `single` on the first
    /// available provider. With nothing available at all the provider list is
    /// left empty and execution reports the failure.
    pub fn resolve(&self, available: &[ProviderId]) -> OrchestrationStrategy {
        let providers: Vec<ProviderId> = self
            .providers
            .iter()
            .copied()
            .filter(|p| available.contains(p))
            .collect();
        let fallback_order = self.fallback_order.as_ref().map(|order| {
            order
                .iter()
                .copied()
                .filter(|p| available.contains(p))
                .collect::<Vec<_>>()
        });

        if providers.is_empty() {
            warn!(
                mode = %self.mode,
                wanted = ?self.providers,
                "no preferred provider available, degrading to single"
            );
            return OrchestrationStrategy {
                mode: OrchestrationMode::Single,
                providers: available.first().copied().into_iter().collect(),
                synthesis_strategy: self.synthesis_strategy,
                fallback_order: None,
            };
        }

        OrchestrationStrategy {
            mode: self.mode.clone(),
            providers,
            synthesis_strategy: self.synthesis_strategy,
            fallback_order,
        }
    }
}

/// Task hint used by smart routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Research,
    Creative,
    Code,
    Analysis,
    Chat,
}

impl TaskType {
    pub fn all() -> [TaskType; 5] {
        [
            TaskType::Research,
            TaskType::Creative,
            TaskType::Code,
            TaskType::Analysis,
            TaskType::Chat,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Research => "research",
            TaskType::Creative => "creative",
            TaskType::Code => "code",
            TaskType::Analysis => "analysis",
            TaskType::Chat => "chat",
        }
    }

    /// Parse a task tag, treating anything unrecognised as chat.
    pub fn parse_lenient(s: &str) -> TaskType {
        s.parse().unwrap_or_else(|_| {
            warn!(task_type = %s, "unknown task type, routing as chat");
            TaskType::Chat
        })
    }

    /// Default strategy for this task, before availability filtering.
    pub fn default_strategy(&self) -> OrchestrationStrategy {
        use ProviderId::*;

        match self {
            TaskType::Research => OrchestrationStrategy::new(
                OrchestrationMode::Consensus,
                vec![Perplexity, Claude, Gemini],
            )
            .with_synthesis(SynthesisStrategy::Merge),
            TaskType::Creative => OrchestrationStrategy::single(Claude),
            // One model writes, the next reviews.
            TaskType::Code => OrchestrationStrategy::new(OrchestrationMode::Chain, vec![Claude, OpenAi]),
            TaskType::Analysis => {
                OrchestrationStrategy::new(OrchestrationMode::Parallel, vec![Claude, Gemini])
            }
            TaskType::Chat => OrchestrationStrategy::single(Claude).with_fallback(vec![OpenAi, Gemini]),
        }
    }
}

impl FromStr for TaskType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(TaskType::Research),
            "creative" => Ok(TaskType::Creative),
            "code" => Ok(TaskType::Code),
            "analysis" => Ok(TaskType::Analysis),
            "chat" => Ok(TaskType::Chat),
            _ => Err(crate::error::Error::InvalidParams(format!(
                "unknown task type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
