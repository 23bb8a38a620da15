//! Error types for the conversation agent.

use folio_storage::StoreError;

use crate::llm::LlmError;
use crate::state_machine::TurnPhase;

/// Errors surfaced to callers of the agent facade.
///
/// Classification and generation failures never appear here; they are
/// recovered inside the turn with a degraded reply.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session {0} was updated concurrently, please retry")]
    PersistenceConflict(String),
    #[error("persistence failure: {0}")]
    PersistenceFatal(String),
    #[error("turn timed out after {0}s")]
    TurnTimedOut(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid turn transition from {from} to {to}")]
    InvalidTransition { from: TurnPhase, to: TurnPhase },
}

impl From<StoreError> for AgentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AgentError::SessionNotFound(id),
            StoreError::Conflict { session_id, .. } => AgentError::PersistenceConflict(session_id),
            StoreError::Fatal(msg) => AgentError::PersistenceFatal(msg),
        }
    }
}

/// The router could not reach a usable classification.
#[derive(Debug, thiserror::Error)]
#[error("intent classifier unavailable: {0}")]
pub struct ClassifierUnavailable(#[source] pub LlmError);
