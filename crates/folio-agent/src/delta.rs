use folio_core::types::{Book, Preference, Recommendation, SessionState};

/// The changes one action node proposes for the current turn.
///
/// Only data fields appear here. Messages, `last_action`, and `updated_at`
/// are owned by the turn itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub preferences: Vec<Preference>,
    pub read_books: Vec<Book>,
    pub recommendations: Vec<Recommendation>,
    pub reply_text: String,
}

/// What actually changed when a delta was merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub preferences_added: usize,
    pub read_books_added: usize,
    pub recommendations_added: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.preferences_added + self.read_books_added + self.recommendations_added > 0
    }
}

impl StateDelta {
    /// A delta that changes nothing but carries a reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply_text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty() && self.read_books.is_empty() && self.recommendations.is_empty()
    }

    /// Merge into `state`: set union for preferences and read books,
    /// append for recommendations.
    pub fn merge_into(&self, state: &mut SessionState) -> MergeReport {
        let preferences_added = state.add_preferences(self.preferences.iter().cloned()).len();
        let read_books_added = state.add_read_books(self.read_books.iter().cloned()).len();
        state
            .recommendations
            .extend(self.recommendations.iter().cloned());
        MergeReport {
            preferences_added,
            read_books_added,
            recommendations_added: self.recommendations.len(),
        }
    }
}
