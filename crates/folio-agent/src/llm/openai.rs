use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use folio_core::config::LlmConfig;

use crate::llm::{LlmClient, LlmError, OutputSchema, Prompt};

/// OpenAI-compatible chat completions client using JSON-schema output.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiClient {
    /// Build a client, reading the API key from the configured env var.
    pub fn from_env(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Unavailable(format!(
                    "API key environment variable {} is not set",
                    config.api_key_env
                ))
            })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let context = serde_json::to_string_pretty(&prompt.context)
            .map_err(|e| LlmError::MalformedOutput(e.to_string()))?;
        let system = format!("{}\n\nSession context:\n{}", prompt.instructions, context);

        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt.input },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.json_schema,
                    "strict": true
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Unavailable(format!("authentication failed: {}", text)),
                429 => LlmError::Unavailable("rate limit exceeded".to_string()),
                code => LlmError::Unavailable(format!("HTTP {}: {}", code, text)),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedOutput(e.to_string()))?;

        let message = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::MalformedOutput("No message in response".to_string()))?;

        if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
            return Err(LlmError::MalformedOutput(format!("model refused: {}", refusal)));
        }

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::MalformedOutput("Empty content".to_string()))?;

        debug!(schema = %schema.name, bytes = content.len(), "OpenAI reply received");

        serde_json::from_str(content).map_err(|e| LlmError::MalformedOutput(e.to_string()))
    }
}
