use thiserror::Error;

use folio_core::FolioError;

/// Errors raised by a session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The stored revision moved on since the caller loaded it.
    #[error("Version conflict for session {session_id}: expected {expected}, found {found}")]
    Conflict {
        session_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Storage failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Fatal(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Fatal(format!("Corrupt session record: {}", err))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Fatal(err.to_string())
    }
}

impl From<StoreError> for FolioError {
    fn from(err: StoreError) -> Self {
        FolioError::Storage(err.to_string())
    }
}
