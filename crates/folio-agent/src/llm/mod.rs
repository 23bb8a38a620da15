//! Language model capability.
//!
//! The agent only needs one thing from a model: given a prompt and a JSON
//! schema, return a JSON value matching that schema. `LlmClient` is that
//! seam. [`generate`] wraps a call with a deadline and validates the result
//! before any of it reaches session state.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod heuristic;
pub mod mock;
pub mod openai;
pub mod schema;

pub use heuristic::HeuristicLlm;
pub use mock::MockLlm;
pub use openai::OpenAiClient;
pub use schema::OutputSchema;

/// Failure kinds of a structured generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Transport, authentication, rate limit, or server failure.
    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model timed out")]
    Timeout,

    /// The reply could not be parsed or failed validation.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

/// Input to a structured generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// System instructions for this call site.
    pub instructions: String,
    /// The user's latest message.
    pub input: String,
    /// Structured session context the model may consult.
    pub context: serde_json::Value,
}

impl Prompt {
    pub fn new(instructions: &str, input: &str, context: serde_json::Value) -> Self {
        Self {
            instructions: instructions.to_string(),
            input: input.to_string(),
            context,
        }
    }
}

/// A provider that turns a prompt into JSON conforming to a schema.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    async fn generate_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Semantic checks applied after a model reply deserializes.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Run one structured call with a deadline, then deserialize and validate.
pub async fn generate<T>(
    client: &dyn LlmClient,
    prompt: &Prompt,
    schema: &OutputSchema,
    timeout: Duration,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + Validate,
{
    let started = Instant::now();
    let value = match tokio::time::timeout(timeout, client.generate_structured(prompt, schema)).await
    {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(provider = client.name(), schema = %schema.name, error = %e, "LLM call failed");
            return Err(e);
        }
        Err(_) => {
            warn!(
                provider = client.name(),
                schema = %schema.name,
                timeout_ms = timeout.as_millis() as u64,
                "LLM call timed out"
            );
            return Err(LlmError::Timeout);
        }
    };

    let parsed: T = serde_json::from_value(value).map_err(|e| {
        warn!(schema = %schema.name, error = %e, "LLM output did not match schema");
        LlmError::MalformedOutput(e.to_string())
    })?;
    parsed.validate().map_err(|reason| {
        warn!(schema = %schema.name, reason = %reason, "LLM output failed validation");
        LlmError::MalformedOutput(reason)
    })?;

    debug!(
        provider = client.name(),
        schema = %schema.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "LLM call succeeded"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::schema::IntentOutput;
    use serde_json::json;

    fn prompt() -> Prompt {
        Prompt::new("classify", "I like horror", json!({}))
    }

    #[tokio::test]
    async fn test_generate_parses_and_validates() {
        let llm = MockLlm::new(|_, _| Ok(json!({"label": "save_preferences", "confidence": 0.9})));
        let out: IntentOutput = generate(
            &llm,
            &prompt(),
            &OutputSchema::intent_classification(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(out.label, "save_preferences");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_wrong_shape_is_malformed() {
        let llm = MockLlm::new(|_, _| Ok(json!({"intent": 3})));
        let result: Result<IntentOutput, _> = generate(
            &llm,
            &prompt(),
            &OutputSchema::intent_classification(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(LlmError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_generate_failed_validation_is_malformed() {
        let llm = MockLlm::new(|_, _| Ok(json!({"label": "recommend", "confidence": 7.5})));
        let result: Result<IntentOutput, _> = generate(
            &llm,
            &prompt(),
            &OutputSchema::intent_classification(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(LlmError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_generate_passes_through_unavailable() {
        let llm = MockLlm::unavailable();
        let result: Result<IntentOutput, _> = generate(
            &llm,
            &prompt(),
            &OutputSchema::intent_classification(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_times_out() {
        let llm = MockLlm::new(|_, _| Ok(json!({"label": "recommend", "confidence": 1.0})))
            .with_delay(Duration::from_secs(60));
        let result: Result<IntentOutput, _> = generate(
            &llm,
            &prompt(),
            &OutputSchema::intent_classification(),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(result.unwrap_err(), LlmError::Timeout);
    }

    #[test]
    fn test_llm_error_display() {
        assert_eq!(
            LlmError::Unavailable("503".to_string()).to_string(),
            "language model unavailable: 503"
        );
        assert_eq!(LlmError::Timeout.to_string(), "language model timed out");
        assert_eq!(
            LlmError::MalformedOutput("missing field".to_string()).to_string(),
            "malformed model output: missing field"
        );
    }
}
