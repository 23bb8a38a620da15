//! Agent facade: the single entry point for conversation turns.
//!
//! Loads the session, routes the message, runs the selected node, merges
//! its delta, and persists the result. Turns on the same session are
//! serialized by a per-session lock; turns on different sessions never
//! wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use folio_core::config::{AgentConfig, StorageConfig};
use folio_core::types::{
    generate_session_id, ActionLabel, Message, Role, SessionState, SessionSummary, StoreStats,
};
use folio_core::FolioConfig;
use folio_storage::{SessionStore, StoreError};

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::nodes::{render_digest, NodeContext, NodeRegistry};
use crate::router::IntentClassifier;
use crate::state_machine::{TurnPhase, TurnProgress};

const DEGRADED_NOTICE: &str = "I'm having trouble understanding requests right now, \
so here is what I can tell you from our conversation.";

/// Result of one successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub session_id: String,
    pub last_action: ActionLabel,
    /// The session as persisted at the end of the turn.
    pub state: SessionState,
}

pub struct Agent {
    store: Arc<dyn SessionStore>,
    router: IntentClassifier,
    nodes: NodeRegistry,
    agent: AgentConfig,
    storage: StorageConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Agent {
    pub fn new(store: Arc<dyn SessionStore>, llm: Arc<dyn LlmClient>, config: &FolioConfig) -> Self {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let router = IntentClassifier::new(
            llm.clone(),
            timeout,
            config.agent.recent_context_messages,
            config.agent.classifier_min_confidence,
        );
        let nodes = NodeRegistry::new(
            NodeContext {
                llm,
                timeout,
                recent_messages: config.agent.recent_context_messages,
            },
            config.agent.max_recommendations,
        );

        Self {
            store,
            router,
            nodes,
            agent: config.agent.clone(),
            storage: config.storage.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user message.
    ///
    /// A missing or blank `session_id` starts a new session. An unknown id
    /// creates that session.
    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let message = self.sanitize(message)?;
        let session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_session_id);

        let slot = self.session_lock(&session_id);
        let _guard = slot.lock.lock().await;
        self.run_with_deadline(&session_id, message).await
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionState, AgentError> {
        self.store
            .load(session_id)?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))
    }

    /// Hard-delete a session. Deleting an unknown id is acknowledged too;
    /// the return value tells whether anything was removed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool, AgentError> {
        let deleted = self.store.delete(session_id)?;
        if deleted {
            info!(session_id = %session_id, "Session deleted");
        }
        Ok(deleted)
    }

    pub fn get_history(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        Ok(self.get_session(session_id)?.messages)
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, AgentError> {
        Ok(self.store.list()?)
    }

    pub fn stats(&self) -> Result<StoreStats, AgentError> {
        Ok(self.store.stats()?)
    }

    /// Remove sessions idle longer than the configured TTL.
    pub fn purge_expired(&self) -> Result<u64, AgentError> {
        let hours = self.storage.session_ttl_hours;
        let cutoff = i64::try_from(hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
            .ok_or_else(|| {
                AgentError::InvalidConfig(format!(
                    "storage.session_ttl_hours is out of range: {}",
                    hours
                ))
            })?;
        let purged = self.store.purge_idle_since(cutoff)?;
        if purged > 0 {
            info!(purged, ttl_hours = self.storage.session_ttl_hours, "Expired sessions purged");
        }
        Ok(purged)
    }

    // ---- internals ----

    fn sanitize<'a>(&self, message: &'a str) -> Result<&'a str, AgentError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        if trimmed.chars().count() > self.agent.max_message_length {
            return Err(AgentError::MessageTooLong(self.agent.max_message_length));
        }
        Ok(trimmed)
    }

    fn session_lock(&self, session_id: &str) -> LockSlot<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        LockSlot {
            table: &self.locks,
            session_id: session_id.to_string(),
            lock,
        }
    }

    async fn run_with_deadline(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<TurnOutcome, AgentError> {
        if self.agent.turn_timeout_secs == 0 {
            return self.run_turn(session_id, message).await;
        }
        let deadline = Duration::from_secs(self.agent.turn_timeout_secs);
        match tokio::time::timeout(deadline, self.run_turn(session_id, message)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_secs = self.agent.turn_timeout_secs,
                    "Turn timed out before persisting"
                );
                Err(AgentError::TurnTimedOut(self.agent.turn_timeout_secs))
            }
        }
    }

    /// One turn, retried once from fresh state on a write conflict.
    async fn run_turn(&self, session_id: &str, message: &str) -> Result<TurnOutcome, AgentError> {
        match self.execute_once(session_id, message).await {
            Err(AgentError::PersistenceConflict(_)) => {
                warn!(session_id = %session_id, "Write conflict, retrying turn with fresh state");
                self.execute_once(session_id, message).await
            }
            other => other,
        }
    }

    async fn execute_once(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut progress = TurnProgress::new(session_id);

        // Idle -> Routing
        progress.advance(TurnPhase::Routing)?;
        let (mut state, is_new) = match self.store.load(session_id)? {
            Some(state) => (state, false),
            None => {
                debug!(session_id = %session_id, "Creating session");
                (SessionState::new(session_id), true)
            }
        };

        let (label, notice) = match self.router.classify(&state, message).await {
            Ok(classification) => (classification.label, None),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Classifier unavailable, answering from session data");
                (ActionLabel::TalkWithData, Some(DEGRADED_NOTICE))
            }
        };

        // Routing -> Executing
        progress.advance(TurnPhase::Executing)?;
        let delta = self.nodes.get(label).execute(&state, message).await;

        // Executing -> Merging
        progress.advance(TurnPhase::Merging)?;
        let report = delta.merge_into(&mut state);

        let mut reply = match notice {
            Some(notice) => format!("{}\n\n{}", notice, delta.reply_text),
            None => delta.reply_text.clone(),
        };
        if self.agent.summarize_after_turn && label.mutates_data() && report.changed() {
            reply.push_str("\n\n");
            reply.push_str(&render_digest(&state));
        }

        let now = Utc::now();
        state.push_message(Role::User, message, now);
        state.push_message(Role::Agent, reply.clone(), now);
        state.last_action = Some(label);
        state.touch(now);

        state.version = self.store.save(&state).map_err(|e| match e {
            // Deleted mid-turn: retrying recreates it.
            StoreError::NotFound(id) => AgentError::PersistenceConflict(id),
            other => other.into(),
        })?;
        if is_new {
            self.enforce_session_cap();
        }

        // Merging -> Done
        progress.advance(TurnPhase::Done)?;
        info!(
            session_id = %session_id,
            action = %label,
            preferences_added = report.preferences_added,
            read_books_added = report.read_books_added,
            recommendations_added = report.recommendations_added,
            elapsed_ms = progress.elapsed_ms(),
            "Turn completed"
        );

        Ok(TurnOutcome {
            reply,
            session_id: session_id.to_string(),
            last_action: label,
            state,
        })
    }

    /// Evict least recently updated sessions beyond the cap. Runs only after
    /// the new session is committed, and never fails the turn.
    fn enforce_session_cap(&self) {
        let max = self.storage.max_sessions;
        let result = self.store.count().and_then(|count| {
            if count > max {
                self.store.evict_oldest(max)
            } else {
                Ok(0)
            }
        });
        match result {
            Ok(0) => {}
            Ok(evicted) => info!(evicted, max_sessions = max, "Session cap reached, evicted oldest"),
            Err(e) => warn!(error = %e, max_sessions = max, "Session cap eviction failed"),
        }
    }
}

/// A reference to one session's turn lock. Dropping it, including when the
/// turn future is cancelled while waiting, removes the table entry once no
/// other turn holds or awaits it.
struct LockSlot<'a> {
    table: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    session_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // The table's reference plus this slot's.
        if locks
            .get(&self.session_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2)
        {
            locks.remove(&self.session_id);
        }
    }
}
