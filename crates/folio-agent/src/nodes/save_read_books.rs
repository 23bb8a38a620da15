//! Save-read-books action node.

use async_trait::async_trait;
use tracing::{info, warn};

use folio_core::types::{ActionLabel, Book, SessionState};

use crate::context::session_context;
use crate::delta::StateDelta;
use crate::llm::schema::ReadBooksOutput;
use crate::llm::{generate, OutputSchema, Prompt};
use crate::nodes::{human_list, ActionNode, NodeContext};

const INSTRUCTIONS: &str = "Extract every book the user says they have already read. \
Return the title and, if mentioned, the author. Use null for an unknown author. \
Return an empty list if no book is mentioned.";

const APOLOGY: &str =
    "Sorry, I couldn't record those books right now. Please tell me again in a moment.";

const NONE_FOUND: &str = "I couldn't tell which book you meant. \
Try something like \"I've read Dune by Frank Herbert\".";

pub struct SaveReadBooksNode {
    ctx: NodeContext,
}

impl SaveReadBooksNode {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ActionNode for SaveReadBooksNode {
    fn label(&self) -> ActionLabel {
        ActionLabel::SaveReadBooks
    }

    async fn execute(&self, state: &SessionState, message: &str) -> StateDelta {
        let prompt = Prompt::new(
            INSTRUCTIONS,
            message,
            session_context(state, self.ctx.recent_messages),
        );
        let output: ReadBooksOutput = match generate(
            self.ctx.llm.as_ref(),
            &prompt,
            &OutputSchema::read_books(),
            self.ctx.timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "SaveReadBooks failed soft");
                return StateDelta::reply(APOLOGY);
            }
        };

        let mut new: Vec<Book> = Vec::new();
        let mut known: Vec<Book> = Vec::new();
        for book in output
            .books
            .iter()
            .filter_map(|b| Book::new(&b.title, b.author.as_deref()))
        {
            if state.has_read_exactly(&book) {
                if !known.iter().any(|k| k.same_as(&book)) {
                    known.push(book);
                }
            } else if !new.iter().any(|n| n.same_as(&book)) {
                new.push(book);
            }
        }

        info!(
            session_id = %state.session_id,
            action = %ActionLabel::SaveReadBooks,
            added = new.len(),
            already_known = known.len(),
            "Read books extracted"
        );

        let names = |books: &[Book]| -> String {
            human_list(&books.iter().map(|b| b.to_string()).collect::<Vec<_>>())
        };

        let reply = match (new.is_empty(), known.is_empty()) {
            (true, true) => NONE_FOUND.to_string(),
            (true, false) => format!("I already knew you've read {}.", names(&known)),
            (false, true) => format!(
                "Thanks! I've added {} to the books you've read.",
                names(&new)
            ),
            (false, false) => format!(
                "Thanks! I've added {} to the books you've read. I already knew about {}.",
                names(&new),
                names(&known)
            ),
        };

        StateDelta {
            read_books: new,
            reply_text: reply,
            ..StateDelta::default()
        }
    }
}
