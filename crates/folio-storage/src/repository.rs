//! Session persistence.
//!
//! `SessionStore` is the seam the agent depends on; `SqliteSessionStore`
//! is the production implementation on top of [`Database`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use folio_core::types::{ActionLabel, SessionState, SessionSummary, StoreStats};

use crate::db::Database;
use crate::error::StoreError;

/// Durable keyed storage for [`SessionState`] records.
///
/// Writes use optimistic concurrency: `state.version` is the revision the
/// caller loaded (zero for a brand-new session) and `save` fails with
/// [`StoreError::Conflict`] if the stored revision differs.
pub trait SessionStore: Send + Sync {
    /// Load a session, or `None` if it does not exist.
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    /// Persist a session atomically. Returns the new revision.
    fn save(&self, state: &SessionState) -> Result<u64, StoreError>;

    /// Hard-delete a session. Returns whether a record was removed.
    fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Summaries of all sessions, most recently updated first.
    fn list(&self) -> Result<Vec<SessionSummary>, StoreError>;

    fn count(&self) -> Result<u64, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Delete sessions whose last update is older than `cutoff`.
    fn purge_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete the least recently updated sessions so that at most `keep` remain.
    fn evict_oldest(&self, keep: u64) -> Result<u64, StoreError>;
}

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT data, version FROM sessions WHERE id = ?1",
                    rusqlite::params![session_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((data, version)) => {
                    let mut state: SessionState = serde_json::from_str(&data)?;
                    // The column is authoritative for the revision.
                    state.version = version as u64;
                    Ok(Some(state))
                }
                None => Ok(None),
            }
        })
    }

    fn save(&self, state: &SessionState) -> Result<u64, StoreError> {
        let expected = state.version;
        let next = expected + 1;

        let mut record = state.clone();
        record.version = next;
        let data = serde_json::to_string(&record)?;
        let last_action = record.last_action.map(|a| a.to_string());

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let found: Option<i64> = tx
                .query_row(
                    "SELECT version FROM sessions WHERE id = ?1",
                    rusqlite::params![record.session_id],
                    |row| row.get(0),
                )
                .optional()?;

            match found {
                None if expected == 0 => {
                    tx.execute(
                        "INSERT INTO sessions (id, version, created_at, updated_at, last_action,
                                               message_count, recommendation_count, data)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        rusqlite::params![
                            record.session_id,
                            next as i64,
                            record.created_at.timestamp_micros(),
                            record.updated_at.timestamp_micros(),
                            last_action,
                            record.messages.len() as i64,
                            record.recommendations.len() as i64,
                            data,
                        ],
                    )?;
                }
                None => return Err(StoreError::NotFound(record.session_id.clone())),
                Some(found) if found as u64 != expected => {
                    return Err(StoreError::Conflict {
                        session_id: record.session_id.clone(),
                        expected,
                        found: found as u64,
                    });
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE sessions
                         SET version = ?2, updated_at = ?3, last_action = ?4,
                             message_count = ?5, recommendation_count = ?6, data = ?7
                         WHERE id = ?1 AND version = ?8",
                        rusqlite::params![
                            record.session_id,
                            next as i64,
                            record.updated_at.timestamp_micros(),
                            last_action,
                            record.messages.len() as i64,
                            record.recommendations.len() as i64,
                            data,
                            expected as i64,
                        ],
                    )?;
                }
            }

            tx.commit()?;
            debug!(session_id = %record.session_id, version = next, "Session saved");
            Ok(next)
        })
    }

    fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM sessions WHERE id = ?1",
                rusqlite::params![session_id],
            )?;
            Ok(affected > 0)
        })
    }

    fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, updated_at, message_count, recommendation_count, last_action
                 FROM sessions
                 ORDER BY updated_at DESC, id ASC",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (id, created, updated, messages, recs, last_action) = row?;
                summaries.push(SessionSummary {
                    session_id: id,
                    created_at: from_micros(created)?,
                    updated_at: from_micros(updated)?,
                    message_count: messages as u64,
                    recommendation_count: recs as u64,
                    last_action: last_action.and_then(|s| s.parse::<ActionLabel>().ok()),
                });
            }
            Ok(summaries)
        })
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        self.db.with_conn(|conn| {
            let (sessions, messages, recs): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(message_count), 0),
                        COALESCE(SUM(recommendation_count), 0)
                 FROM sessions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(StoreStats {
                total_sessions: sessions as u64,
                total_messages: messages as u64,
                total_recommendations: recs as u64,
            })
        })
    }

    fn purge_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM sessions WHERE updated_at < ?1",
                rusqlite::params![cutoff.timestamp_micros()],
            )?;
            Ok(affected as u64)
        })
    }

    fn evict_oldest(&self, keep: u64) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM sessions WHERE id IN (
                    SELECT id FROM sessions
                    ORDER BY updated_at DESC, id ASC
                    LIMIT -1 OFFSET ?1
                 )",
                rusqlite::params![keep as i64],
            )?;
            Ok(affected as u64)
        })
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Fatal(format!("Timestamp out of range: {}", micros)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use folio_core::types::{Book, Preference, Role};

    fn make_store() -> SqliteSessionStore {
        SqliteSessionStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn make_state(id: &str) -> SessionState {
        let mut state = SessionState::new(id);
        state.push_message(Role::User, "I love horror", Utc::now());
        state.push_message(Role::Agent, "Noted.", Utc::now());
        state.add_preferences(vec![Preference::parse("horror").unwrap()]);
        state.last_action = Some(ActionLabel::SavePreferences);
        state
    }

    #[test]
    fn test_save_and_load() {
        let store = make_store();
        let state = make_state("s1");

        let version = store.save(&state).unwrap();
        assert_eq!(version, 1);

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.messages, state.messages);
        assert_eq!(loaded.preferences, state.preferences);
        assert_eq!(loaded.last_action, Some(ActionLabel::SavePreferences));
    }

    #[test]
    fn test_load_missing() {
        let store = make_store();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_update_bumps_version() {
        let store = make_store();
        let mut state = make_state("s1");
        state.version = store.save(&state).unwrap();

        state.add_read_books(vec![Book::new("Dune", Some("Frank Herbert")).unwrap()]);
        state.version = store.save(&state).unwrap();
        assert_eq!(state.version, 2);

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.read_books.len(), 1);
        assert_eq!(loaded.version, 2);
    }

    #[test]
    fn test_stale_write_conflicts() {
        let store = make_store();
        let state = make_state("s1");
        store.save(&state).unwrap();

        let first = store.load("s1").unwrap().unwrap();
        let second = store.load("s1").unwrap().unwrap();

        store.save(&first).unwrap();
        let err = store.save(&second).unwrap_err();
        match err {
            StoreError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_double_create_conflicts() {
        let store = make_store();
        store.save(&make_state("s1")).unwrap();
        let err = store.save(&make_state("s1")).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_update_after_delete_is_not_found() {
        let store = make_store();
        let mut state = make_state("s1");
        state.version = store.save(&state).unwrap();
        assert!(store.delete("s1").unwrap());

        let err = store.save(&state).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete() {
        let store = make_store();
        store.save(&make_state("s1")).unwrap();
        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
        assert!(store.load("s1").unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let store = make_store();
        let base = Utc::now();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut state = make_state(id);
            state.updated_at = base + Duration::seconds(i as i64);
            store.save(&state).unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let first = &store.list().unwrap()[0];
        assert_eq!(first.message_count, 2);
        assert_eq!(first.last_action, Some(ActionLabel::SavePreferences));
    }

    #[test]
    fn test_stats() {
        let store = make_store();
        assert_eq!(store.stats().unwrap(), StoreStats::default());

        store.save(&make_state("a")).unwrap();
        store.save(&make_state("b")).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.total_recommendations, 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_purge_idle_since() {
        let store = make_store();
        let now = Utc::now();

        let mut old = make_state("old");
        old.updated_at = now - Duration::hours(48);
        store.save(&old).unwrap();
        store.save(&make_state("fresh")).unwrap();

        let purged = store.purge_idle_since(now - Duration::hours(24)).unwrap();
        assert_eq!(purged, 1);
        assert!(store.load("old").unwrap().is_none());
        assert!(store.load("fresh").unwrap().is_some());
    }

    #[test]
    fn test_evict_oldest_keeps_most_recent() {
        let store = make_store();
        let base = Utc::now();
        for i in 0..5 {
            let mut state = make_state(&format!("s{}", i));
            state.updated_at = base + Duration::seconds(i);
            store.save(&state).unwrap();
        }

        assert_eq!(store.evict_oldest(2).unwrap(), 3);
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec!["s4", "s3"]);
        assert_eq!(store.evict_oldest(10).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_record_is_fatal() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, version, created_at, updated_at, data)
                 VALUES ('bad', 1, 0, 0, 'not json')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let store = SqliteSessionStore::new(db);
        assert!(matches!(store.load("bad"), Err(StoreError::Fatal(_))));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");
        {
            let store = SqliteSessionStore::new(Arc::new(Database::new(&path).unwrap()));
            store.save(&make_state("s1")).unwrap();
        }
        let store = SqliteSessionStore::new(Arc::new(Database::new(&path).unwrap()));
        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.preferences.len(), 1);
    }
}
