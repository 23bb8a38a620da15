//! Recommend action node.
//!
//! Asks the model for candidates, then filters out anything the user has
//! read, anything already recommended, and duplicates within the batch.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::{info, warn};

use folio_core::types::{ActionLabel, Book, Recommendation, SessionState};

use crate::context::session_context;
use crate::delta::StateDelta;
use crate::llm::schema::RecommendedBooksOutput;
use crate::llm::{generate, OutputSchema, Prompt};
use crate::nodes::{ActionNode, NodeContext};

const DEFAULT_COUNT: usize = 3;

const INSTRUCTIONS: &str = "You are a book expert. Recommend books based on the user's request \
and the session context. Recommend exactly `count` books. Never recommend a book listed in \
`read_books` or `previous_recommendations`. Give a one-sentence rationale for each.";

const APOLOGY: &str =
    "Sorry, I couldn't come up with recommendations right now. Please try again in a moment.";

const NOTHING_NEW: &str = "I couldn't find anything new that you haven't already read or \
heard about from me. Tell me more about what you like and I'll look again.";

static COUNT_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+|one|two|three|four|five|six|seven|eight|nine|ten)\s+(?:\w+\s+)?(?:books?|novels?|titles?|recommendations?)\b",
    )
    .expect("Invalid count regex")
});

/// Number of books explicitly asked for, e.g. "recommend two books".
pub fn requested_count(message: &str) -> Option<usize> {
    let caps = COUNT_REQUEST.captures(message)?;
    let word = caps.get(1)?.as_str().to_lowercase();
    let n = match word.as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => digits.parse().ok()?,
    };
    Some(n)
}

pub struct RecommendNode {
    ctx: NodeContext,
    max_per_turn: usize,
}

impl RecommendNode {
    pub fn new(ctx: NodeContext, max_per_turn: usize) -> Self {
        Self {
            ctx,
            max_per_turn: max_per_turn.max(1),
        }
    }
}

#[async_trait]
impl ActionNode for RecommendNode {
    fn label(&self) -> ActionLabel {
        ActionLabel::Recommend
    }

    async fn execute(&self, state: &SessionState, message: &str) -> StateDelta {
        let requested = requested_count(message);
        let count = requested.unwrap_or(DEFAULT_COUNT).clamp(1, self.max_per_turn);

        let mut context = session_context(state, self.ctx.recent_messages);
        context["count"] = json!(count);
        context["previous_recommendations"] = context["recommendations"].clone();

        let prompt = Prompt::new(INSTRUCTIONS, message, context);
        let output: RecommendedBooksOutput = match generate(
            self.ctx.llm.as_ref(),
            &prompt,
            &OutputSchema::recommended_books(),
            self.ctx.timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Recommend failed soft");
                return StateDelta::reply(APOLOGY);
            }
        };

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut dropped = 0usize;
        let mut recommendations = Vec::new();
        for candidate in output.books {
            let Some(book) = Book::new(&candidate.title, candidate.author.as_deref()) else {
                dropped += 1;
                continue;
            };
            if state.has_read(&book) || state.was_recommended(&book) || !seen.insert(book.key()) {
                dropped += 1;
                continue;
            }
            let rationale = match candidate.rationale.trim() {
                "" => "It fits what you've told me so far.".to_string(),
                r => r.to_string(),
            };
            recommendations.push(Recommendation {
                book,
                rationale,
                created_at: now,
            });
            if recommendations.len() == count {
                break;
            }
        }

        info!(
            session_id = %state.session_id,
            action = %ActionLabel::Recommend,
            emitted = recommendations.len(),
            dropped,
            "Recommendations generated"
        );

        if recommendations.is_empty() {
            return StateDelta::reply(NOTHING_NEW);
        }

        let mut reply = String::new();
        if requested.is_some_and(|n| n > self.max_per_turn) {
            reply.push_str(&format!(
                "I can only recommend up to {} books at a time. ",
                self.max_per_turn
            ));
        }
        reply.push_str("Here are some books you might enjoy:");
        for (i, rec) in recommendations.iter().enumerate() {
            reply.push_str(&format!("\n{}. {}: {}", i + 1, rec.book, rec.rationale));
        }

        StateDelta {
            recommendations,
            reply_text: reply,
            ..StateDelta::default()
        }
    }
}
