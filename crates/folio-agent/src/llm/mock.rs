//! Scriptable in-process provider for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, OutputSchema, Prompt};

type Responder = dyn Fn(&Prompt, &OutputSchema) -> Result<serde_json::Value, LlmError> + Send + Sync;

/// A provider whose replies come from a closure. Counts its calls.
pub struct MockLlm {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Prompt, &OutputSchema) -> Result<serde_json::Value, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that always fails as unreachable.
    pub fn unavailable() -> Self {
        Self::new(|_, _| Err(LlmError::Unavailable("mock provider is down".to_string())))
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(prompt, schema)
    }
}
