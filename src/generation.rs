//! Text-generation backends for the reply composer.
//!
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions`, requires `OPENAI_API_KEY`.
//! - **[`OllamaGenerator`]**: `POST /api/chat` on a local Ollama instance.
//! - **[`DisabledGenerator`]**: always fails, so every reply degrades to a
//!   typed generation failure.
//!
//! Both HTTP backends share the embedding clients' retry policy: 429 and
//! 5xx are retried with exponential backoff, other 4xx fail immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use replydesk_core::compose::TextGenerator;

use crate::config::GenerationConfig;
use crate::embedding::post_with_retry;

/// Always fails.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

/// Chat-completions client for the OpenAI API (or any compatible endpoint
/// via `generation.url`).
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Build with an explicit key instead of reading the environment.
    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let json = post_with_retry(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Chat client for a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [{"role": "user", "content": prompt}],
        });
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let json =
            post_with_retry(&self.client, &url, None, &body, self.max_retries, "Ollama").await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the configured [`TextGenerator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_chat() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Dear User,\nHello"}}]
        });
        assert_eq!(parse_openai_chat(&json).unwrap(), "Dear User,\nHello");
    }

    #[test]
    fn test_parse_openai_chat_missing_content() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_openai_chat(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let mut config = GenerationConfig::default();
        config.provider = "disabled".to_string();
        let generator = create_generator(&config).unwrap();
        assert!(generator.complete("hi").await.is_err());
    }
}
