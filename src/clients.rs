//! HTTP generators for hosted provider APIs.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::config::ModelEntry;
use crate::error::{Error, Result};
use crate::provider::{Generator, ProviderId};

/// System prompt used when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const MAX_TOKENS: u32 = 8192;
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const PERPLEXITY_URL: &str = "https://api.perplexity.ai";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn http_client() -> Result<reqwest::Client> {
    // Outer bound only; the router applies the configured per-call timeout.
    reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(Error::from)
}

/// Build the generator for a configured provider.
pub fn build_generator(
    provider: ProviderId,
    entry: &ModelEntry,
    api_key: String,
) -> Result<Box<dyn Generator>> {
    let base_url = entry.base_url.clone();
    let model = entry.model.clone();

    let generator: Box<dyn Generator> = match provider {
        ProviderId::Claude => Box::new(AnthropicClient::new(api_key, model, base_url)?),
        ProviderId::Gemini => Box::new(GeminiClient::new(api_key, model, base_url)?),
        ProviderId::OpenAi => Box::new(OpenAiCompatibleClient::new(
            api_key,
            model,
            base_url.unwrap_or_else(|| OPENAI_URL.into()),
            Some(MAX_TOKENS),
        )?),
        // Perplexity rejects max_tokens above its own limits; leave it to the API.
        ProviderId::Perplexity => Box::new(OpenAiCompatibleClient::new(
            api_key,
            model,
            base_url.unwrap_or_else(|| PERPLEXITY_URL.into()),
            None,
        )?),
        ProviderId::Local => {
            let base_url = base_url.ok_or_else(|| {
                Error::Config("local provider requires a baseUrl".into())
            })?;
            Box::new(OpenAiCompatibleClient::new(api_key, model, base_url, None)?)
        }
    };

    Ok(generator)
}

/// Turn a non-2xx response into a provider error, otherwise parse the body.
async fn read_json(response: reqwest::Response, label: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Provider(format!("{} API error ({}): {}", label, status, body)));
    }
    Ok(response.json().await?)
}

/// Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_URL.into()),
            client: http_client()?,
        })
    }

    fn request_body(&self, prompt: &str, system_prompt: Option<&str>) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
            "messages": [{ "role": "user", "content": prompt }]
        })
    }
}

#[async_trait::async_trait]
impl Generator for AnthropicClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        debug!(model = %self.model, "anthropic request");
        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt, system_prompt))
            .send()
            .await?;

        let body = read_json(response, "Claude").await?;
        Ok(anthropic_text(&body))
    }
}

/// Chat-completions API shared by OpenAI, Perplexity and local servers.
pub struct OpenAiCompatibleClient {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url,
            max_tokens,
            client: http_client()?,
        })
    }

    fn request_body(&self, prompt: &str, system_prompt: Option<&str>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT) },
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait::async_trait]
impl Generator for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        debug!(model = %self.model, base_url = %self.base_url, "chat completions request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, system_prompt))
            .send()
            .await?;

        let body = read_json(response, "Chat completions").await?;
        Ok(chat_completion_text(&body))
    }
}

/// Gemini `generateContent` API.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| GEMINI_URL.into()),
            client: http_client()?,
        })
    }

    fn request_body(&self, prompt: &str, system_prompt: Option<&str>) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        if let Some(system) = system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

#[async_trait::async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        debug!(model = %self.model, "gemini request");
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt, system_prompt))
            .send()
            .await?;

        let body = read_json(response, "Gemini").await?;
        Ok(gemini_text(&body))
    }
}

/// First text block of a Messages response.
fn anthropic_text(body: &Value) -> String {
    body["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
        .and_then(|b| b["text"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn chat_completion_text(body: &Value) -> String {
    body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Concatenated text parts of the first candidate.
fn gemini_text(body: &Value) -> String {
    body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_text_skips_non_text_blocks() {
        let body = json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "hello" }
            ]
        });
        assert_eq!(anthropic_text(&body), "hello");
        assert_eq!(anthropic_text(&json!({})), "");
    }

    #[test]
    fn test_chat_completion_text() {
        let body = json!({ "choices": [{ "message": { "content": "hi there" } }] });
        assert_eq!(chat_completion_text(&body), "hi there");
        assert_eq!(chat_completion_text(&json!({ "choices": [] })), "");
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(gemini_text(&body), "ab");
    }

    #[test]
    fn test_anthropic_body_defaults_system_prompt() {
        let client =
            AnthropicClient::new("key".into(), "claude-test".into(), None).unwrap();
        let body = client.request_body("ping", None);
        assert_eq!(body["system"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["max_tokens"], MAX_TOKENS);
        assert_eq!(body["messages"][0]["content"], "ping");
    }

    #[test]
    fn test_perplexity_body_omits_max_tokens() {
        let client = OpenAiCompatibleClient::new(
            "key".into(),
            "sonar".into(),
            PERPLEXITY_URL.into(),
            None,
        )
        .unwrap();
        let body = client.request_body("q", Some("persona"));
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"][0]["content"], "persona");
    }

    #[test]
    fn test_gemini_body_system_instruction_only_when_present() {
        let client = GeminiClient::new("key".into(), "gemini-test".into(), None).unwrap();
        assert!(client.request_body("q", None).get("systemInstruction").is_none());
        let body = client.request_body("q", Some("sys"));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
    }

    #[test]
    fn test_local_requires_base_url() {
        let entry = ModelEntry::new("llama3", "LOCAL_API_KEY");
        let result = build_generator(ProviderId::Local, &entry, "k".into());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
