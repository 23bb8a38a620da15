//! Intent classifier.
//!
//! Maps the latest user message plus recent context to exactly one
//! [`ActionLabel`]. Unknown or low-confidence answers degrade to
//! `Recommend`; only a failed model call is reported to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use folio_core::types::{ActionLabel, SessionState};

use crate::context::recent_context;
use crate::error::ClassifierUnavailable;
use crate::llm::schema::IntentOutput;
use crate::llm::{generate, LlmClient, OutputSchema, Prompt};

const ROUTER_INSTRUCTIONS: &str = "You route messages for a book recommendation assistant. \
Choose exactly one label: \
recommend (the user wants book suggestions, or anything else conversational), \
save_preferences (the user states genres, topics, or authors they like), \
save_read_books (the user says which books they have already read), \
talk_with_data (the user asks about what they told you or what you recommended), \
summarize (the user wants a recap or is ending the conversation). \
Report your confidence between 0 and 1.";

/// Result of a classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: ActionLabel,
    pub confidence: f32,
    /// The model gave no confident, known label and `Recommend` was assumed.
    pub degraded: bool,
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    recent_messages: usize,
    min_confidence: f32,
}

impl IntentClassifier {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        timeout: Duration,
        recent_messages: usize,
        min_confidence: f32,
    ) -> Self {
        Self {
            llm,
            timeout,
            recent_messages,
            min_confidence,
        }
    }

    pub async fn classify(
        &self,
        state: &SessionState,
        message: &str,
    ) -> Result<Classification, ClassifierUnavailable> {
        let prompt = Prompt::new(
            ROUTER_INSTRUCTIONS,
            message,
            recent_context(state, self.recent_messages),
        );
        let output: IntentOutput = generate(
            self.llm.as_ref(),
            &prompt,
            &OutputSchema::intent_classification(),
            self.timeout,
        )
        .await
        .map_err(ClassifierUnavailable)?;

        let classification = match output.label.parse::<ActionLabel>() {
            Ok(label) if output.confidence >= self.min_confidence => Classification {
                label,
                confidence: output.confidence,
                degraded: false,
            },
            _ => {
                info!(
                    session_id = %state.session_id,
                    label = %output.label,
                    confidence = output.confidence,
                    "Classification degraded, defaulting to recommend"
                );
                Classification {
                    label: ActionLabel::Recommend,
                    confidence: output.confidence,
                    degraded: true,
                }
            }
        };

        debug!(
            session_id = %state.session_id,
            action = %classification.label,
            confidence = classification.confidence,
            "Message classified"
        );
        Ok(classification)
    }
}
