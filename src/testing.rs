//! Scripted generators for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::provider::{Generator, ProviderId};
use crate::registry::ProviderRegistry;

/// One recorded generator call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub(crate) provider: ProviderId,
    pub(crate) prompt: String,
    pub(crate) system_prompt: Option<String>,
}

/// Shared record of every call, in the order calls started.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, provider: ProviderId, prompt: &str, system_prompt: Option<&str>) {
        self.0.lock().unwrap().push(Call {
            provider,
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
        });
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn providers(&self) -> Vec<ProviderId> {
        self.calls().into_iter().map(|c| c.provider).collect()
    }

    pub(crate) fn prompts_for(&self, provider: ProviderId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.provider == provider)
            .map(|c| c.prompt)
            .collect()
    }

    /// System prompts seen by `provider`, in call order.
    pub(crate) fn system_prompts_for(&self, provider: ProviderId) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.provider == provider)
            .map(|c| c.system_prompt)
            .collect()
    }

    pub(crate) fn count_for(&self, provider: ProviderId) -> usize {
        self.prompts_for(provider).len()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

enum Reply {
    Text(String),
    Echo(String),
    Fail(String),
    Panic,
    Hang,
}

pub(crate) struct FakeGenerator {
    provider: ProviderId,
    reply: Reply,
    delay: Option<Duration>,
    log: CallLog,
}

impl FakeGenerator {
    fn new(provider: ProviderId, reply: Reply, log: &CallLog) -> Self {
        Self {
            provider,
            reply,
            delay: None,
            log: log.clone(),
        }
    }

    pub(crate) fn ok(provider: ProviderId, text: &str, log: &CallLog) -> Self {
        Self::new(provider, Reply::Text(text.into()), log)
    }

    /// Replies with `prefix` followed by the prompt.
    pub(crate) fn echo(provider: ProviderId, prefix: &str, log: &CallLog) -> Self {
        Self::new(provider, Reply::Echo(prefix.into()), log)
    }

    pub(crate) fn fail(provider: ProviderId, message: &str, log: &CallLog) -> Self {
        Self::new(provider, Reply::Fail(message.into()), log)
    }

    pub(crate) fn panics(provider: ProviderId, log: &CallLog) -> Self {
        Self::new(provider, Reply::Panic, log)
    }

    pub(crate) fn hangs(provider: ProviderId, log: &CallLog) -> Self {
        Self::new(provider, Reply::Hang, log)
    }

    pub(crate) fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }
}

#[async_trait::async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        self.log.push(self.provider, prompt, system_prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Echo(prefix) => Ok(format!("{}{}", prefix, prompt)),
            Reply::Fail(message) => Err(Error::Provider(message.clone())),
            Reply::Panic => panic!("generator blew up"),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

/// Registry holding the given fakes, in order.
pub(crate) fn registry_of(generators: Vec<FakeGenerator>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for generator in generators {
        registry.register(generator.provider, Arc::new(generator));
    }
    registry
}
