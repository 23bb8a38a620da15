//! Action nodes and their fixed registry.
//!
//! One node per [`ActionLabel`]. Every node is fail-soft: a model failure
//! yields an apologetic reply and an empty delta, never an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use folio_core::types::{ActionLabel, SessionState};

use crate::delta::StateDelta;
use crate::llm::LlmClient;

pub mod recommend;
pub mod save_preferences;
pub mod save_read_books;
pub mod summarize;
pub mod talk_with_data;

pub use recommend::RecommendNode;
pub use save_preferences::SavePreferencesNode;
pub use save_read_books::SaveReadBooksNode;
pub use summarize::{render_digest, SummarizeNode};
pub use talk_with_data::TalkWithDataNode;

/// Handler for one action label.
#[async_trait]
pub trait ActionNode: Send + Sync {
    fn label(&self) -> ActionLabel;

    /// Compute this turn's changes. Must not fail.
    async fn execute(&self, state: &SessionState, message: &str) -> StateDelta;
}

/// What every model-backed node needs.
#[derive(Clone)]
pub struct NodeContext {
    pub llm: Arc<dyn LlmClient>,
    pub timeout: Duration,
    pub recent_messages: usize,
}

/// Fixed mapping from label to node.
pub struct NodeRegistry {
    recommend: RecommendNode,
    save_preferences: SavePreferencesNode,
    save_read_books: SaveReadBooksNode,
    talk_with_data: TalkWithDataNode,
    summarize: SummarizeNode,
}

impl NodeRegistry {
    pub fn new(ctx: NodeContext, max_recommendations: usize) -> Self {
        Self {
            recommend: RecommendNode::new(ctx.clone(), max_recommendations),
            save_preferences: SavePreferencesNode::new(ctx.clone()),
            save_read_books: SaveReadBooksNode::new(ctx.clone()),
            talk_with_data: TalkWithDataNode::new(ctx),
            summarize: SummarizeNode,
        }
    }

    pub fn get(&self, label: ActionLabel) -> &dyn ActionNode {
        match label {
            ActionLabel::Recommend => &self.recommend,
            ActionLabel::SavePreferences => &self.save_preferences,
            ActionLabel::SaveReadBooks => &self.save_read_books,
            ActionLabel::TalkWithData => &self.talk_with_data,
            ActionLabel::Summarize => &self.summarize,
        }
    }
}

/// Join items as "a", "a and b", or "a, b and c".
pub(crate) fn human_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
