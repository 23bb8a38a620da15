//! Save-preferences action node.

use async_trait::async_trait;
use tracing::{info, warn};

use folio_core::types::{ActionLabel, Preference, SessionState};

use crate::context::session_context;
use crate::delta::StateDelta;
use crate::llm::schema::PreferencesOutput;
use crate::llm::{generate, OutputSchema, Prompt};
use crate::nodes::{human_list, ActionNode, NodeContext};

const INSTRUCTIONS: &str = "Extract the reading preferences the user states in their message: \
genres, topics, moods, or authors they like. Return short lowercase tags. \
Return an empty list if the message states none.";

const APOLOGY: &str =
    "Sorry, I couldn't save your preferences right now. Please tell me again in a moment.";

const NONE_FOUND: &str = "I didn't catch any reading preferences there. \
You can say something like \"I enjoy historical fiction\".";

pub struct SavePreferencesNode {
    ctx: NodeContext,
}

impl SavePreferencesNode {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ActionNode for SavePreferencesNode {
    fn label(&self) -> ActionLabel {
        ActionLabel::SavePreferences
    }

    async fn execute(&self, state: &SessionState, message: &str) -> StateDelta {
        let prompt = Prompt::new(
            INSTRUCTIONS,
            message,
            session_context(state, self.ctx.recent_messages),
        );
        let output: PreferencesOutput = match generate(
            self.ctx.llm.as_ref(),
            &prompt,
            &OutputSchema::preferences(),
            self.ctx.timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "SavePreferences failed soft");
                return StateDelta::reply(APOLOGY);
            }
        };

        let mut new = Vec::new();
        let mut known = Vec::new();
        for pref in output.preferences.iter().filter_map(|p| Preference::parse(p)) {
            if state.has_preference(&pref) {
                if !known.contains(&pref) {
                    known.push(pref);
                }
            } else if !new.contains(&pref) {
                new.push(pref);
            }
        }

        info!(
            session_id = %state.session_id,
            action = %ActionLabel::SavePreferences,
            added = new.len(),
            already_known = known.len(),
            "Preferences extracted"
        );

        let names = |prefs: &[Preference]| -> String {
            human_list(&prefs.iter().map(|p| p.to_string()).collect::<Vec<_>>())
        };

        let reply = match (new.is_empty(), known.is_empty()) {
            (true, true) => NONE_FOUND.to_string(),
            (true, false) => format!("I already have {} in your preferences.", names(&known)),
            (false, true) => format!("Got it! I'll remember that you like {}.", names(&new)),
            (false, false) => format!(
                "Got it! I'll remember that you like {}. I already knew about {}.",
                names(&new),
                names(&known)
            ),
        };

        StateDelta {
            preferences: new,
            reply_text: reply,
            ..StateDelta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::llm::{HeuristicLlm, LlmClient, MockLlm};

    fn node(llm: impl LlmClient + 'static) -> SavePreferencesNode {
        SavePreferencesNode::new(NodeContext {
            llm: Arc::new(llm),
            timeout: Duration::from_secs(2),
            recent_messages: 6,
        })
    }

    #[tokio::test]
    async fn test_extracts_and_confirms_both_tags() {
        let state = SessionState::new("s1");
        let delta = node(HeuristicLlm::new())
            .execute(&state, "I like science fiction and fantasy")
            .await;
        let tags: Vec<&str> = delta.preferences.iter().map(|p| p.as_str()).collect();
        assert_eq!(tags, vec!["science fiction", "fantasy"]);
        assert!(delta.reply_text.contains("science fiction"));
        assert!(delta.reply_text.contains("fantasy"));
    }

    #[tokio::test]
    async fn test_normalizes_and_dedupes_model_output() {
        let llm = MockLlm::new(|_, _| {
            Ok(json!({"preferences": ["  Horror ", "HORROR", "", "cozy   mysteries"]}))
        });
        let delta = node(llm).execute(&SessionState::new("s1"), "x").await;
        let tags: Vec<&str> = delta.preferences.iter().map(|p| p.as_str()).collect();
        assert_eq!(tags, vec!["horror", "cozy mysteries"]);
    }

    #[tokio::test]
    async fn test_existing_tag_is_noop() {
        let mut state = SessionState::new("s1");
        state.add_preferences(vec![Preference::parse("horror").unwrap()]);

        let delta = node(HeuristicLlm::new()).execute(&state, "I like horror").await;
        assert!(delta.is_empty());
        assert!(delta.reply_text.contains("already"));
    }

    #[tokio::test]
    async fn test_zero_preferences_is_not_an_error() {
        let llm = MockLlm::new(|_, _| Ok(json!({"preferences": []})));
        let delta = node(llm).execute(&SessionState::new("s1"), "hmm").await;
        assert!(delta.is_empty());
        assert_eq!(delta.reply_text, NONE_FOUND);
    }

    #[tokio::test]
    async fn test_model_failure_is_fail_soft() {
        let delta = node(MockLlm::unavailable())
            .execute(&SessionState::new("s1"), "I like horror")
            .await;
        assert!(delta.is_empty());
        assert_eq!(delta.reply_text, APOLOGY);
    }
}
