//! Summarize action node.
//!
//! Renders the digest locally from session data, so it cannot fail.

use async_trait::async_trait;
use tracing::info;

use folio_core::types::{ActionLabel, SessionState};

use crate::delta::StateDelta;
use crate::nodes::{human_list, ActionNode};

const EMPTY: &str = "We haven't covered anything yet. Tell me what you like to read, \
or which books you've already read, and I'll start recommending.";

/// Human-readable digest of preferences, read books, and recommendations.
pub fn render_digest(state: &SessionState) -> String {
    if state.preferences.is_empty()
        && state.read_books.is_empty()
        && state.recommendations.is_empty()
    {
        return EMPTY.to_string();
    }

    let or_none = |items: Vec<String>| {
        if items.is_empty() {
            "none yet".to_string()
        } else {
            human_list(&items)
        }
    };

    let prefs = or_none(state.preferences.iter().map(|p| p.to_string()).collect());
    let read = or_none(state.read_books.iter().map(|b| b.to_string()).collect());
    let recs = or_none(
        state
            .recommendations
            .iter()
            .map(|r| r.book.to_string())
            .collect(),
    );

    format!(
        "Here's a summary of our conversation so far:\n\
         - Your preferences: {}\n\
         - Books you've read: {}\n\
         - Books I've recommended: {}",
        prefs, read, recs
    )
}

pub struct SummarizeNode;

#[async_trait]
impl ActionNode for SummarizeNode {
    fn label(&self) -> ActionLabel {
        ActionLabel::Summarize
    }

    async fn execute(&self, state: &SessionState, _message: &str) -> StateDelta {
        info!(session_id = %state.session_id, action = %ActionLabel::Summarize, "Digest rendered");
        StateDelta::reply(render_digest(state))
    }
}
