//! Talk-with-data action node. Read-only.

use async_trait::async_trait;
use tracing::{info, warn};

use folio_core::types::{ActionLabel, SessionState};

use crate::context::session_context;
use crate::delta::StateDelta;
use crate::llm::schema::DataAnswerOutput;
use crate::llm::{generate, OutputSchema, Prompt};
use crate::nodes::{ActionNode, NodeContext};

const INSTRUCTIONS: &str = "Answer the user's question using only the session context: \
their preferences, the books they have read, and the books you have recommended. \
If the context does not contain the answer, say so.";

const APOLOGY: &str =
    "Sorry, I couldn't look that up right now. Please ask me again in a moment.";

pub struct TalkWithDataNode {
    ctx: NodeContext,
}

impl TalkWithDataNode {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ActionNode for TalkWithDataNode {
    fn label(&self) -> ActionLabel {
        ActionLabel::TalkWithData
    }

    async fn execute(&self, state: &SessionState, message: &str) -> StateDelta {
        let prompt = Prompt::new(
            INSTRUCTIONS,
            message,
            session_context(state, self.ctx.recent_messages),
        );
        match generate::<DataAnswerOutput>(
            self.ctx.llm.as_ref(),
            &prompt,
            &OutputSchema::data_answer(),
            self.ctx.timeout,
        )
        .await
        {
            Ok(output) => {
                info!(session_id = %state.session_id, action = %ActionLabel::TalkWithData, "Data question answered");
                StateDelta::reply(output.answer.trim())
            }
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "TalkWithData failed soft");
                StateDelta::reply(APOLOGY)
            }
        }
    }
}
