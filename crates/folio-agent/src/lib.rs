pub mod context;
pub mod delta;
pub mod error;
pub mod llm;
pub mod nodes;
pub mod orchestrator;
pub mod router;
pub mod state_machine;

pub use delta::{MergeReport, StateDelta};
pub use error::{AgentError, ClassifierUnavailable};
pub use llm::{HeuristicLlm, LlmClient, LlmError, MockLlm, OpenAiClient};
pub use orchestrator::{Agent, TurnOutcome};
pub use router::{Classification, IntentClassifier};
pub use state_machine::TurnPhase;
