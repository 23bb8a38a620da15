use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identity helpers
// =============================================================================

/// Normalize free text into its identity form.
///
/// Trims, lowercases, and collapses internal whitespace runs to one space.
/// Two strings with the same normalized form are the same entity.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generate a fresh session identifier.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Enums
// =============================================================================

/// The fixed set of actions the router may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLabel {
    /// Recommend new books. Also the catch-all conversational action.
    Recommend,
    /// Record stated reading preferences.
    SavePreferences,
    /// Record books the user has already read.
    SaveReadBooks,
    /// Answer a question about the session's own data.
    TalkWithData,
    /// Produce a digest of everything accumulated so far.
    Summarize,
}

impl ActionLabel {
    pub const ALL: [ActionLabel; 5] = [
        ActionLabel::Recommend,
        ActionLabel::SavePreferences,
        ActionLabel::SaveReadBooks,
        ActionLabel::TalkWithData,
        ActionLabel::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionLabel::Recommend => "recommend",
            ActionLabel::SavePreferences => "save_preferences",
            ActionLabel::SaveReadBooks => "save_read_books",
            ActionLabel::TalkWithData => "talk_with_data",
            ActionLabel::Summarize => "summarize",
        }
    }

    /// Whether the action may change preferences, read books, or recommendations.
    pub fn mutates_data(&self) -> bool {
        matches!(
            self,
            ActionLabel::Recommend | ActionLabel::SavePreferences | ActionLabel::SaveReadBooks
        )
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionLabel {
    type Err = String;

    /// Parses canonical labels plus the short tags older prompts emit
    /// (`recommendation`, `preferences`, `read`, `talk`, `end`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).replace(' ', "_").as_str() {
            "recommend" | "recommendation" => Ok(ActionLabel::Recommend),
            "save_preferences" | "preferences" => Ok(ActionLabel::SavePreferences),
            "save_read_books" | "read_books" | "read" => Ok(ActionLabel::SaveReadBooks),
            "talk_with_data" | "talk" => Ok(ActionLabel::TalkWithData),
            "summarize" | "summary" | "end" => Ok(ActionLabel::Summarize),
            _ => Err(format!("Unknown action label: {}", s)),
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

// =============================================================================
// Value objects
// =============================================================================

/// A book identified by title and (optionally) author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: Option<String>,
}

/// Normalized identity of a [`Book`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookKey {
    title: String,
    author: Option<String>,
}

impl Book {
    /// Build a book from raw extracted text.
    ///
    /// Returns `None` when the title is blank. A blank author becomes `None`.
    pub fn new(title: &str, author: Option<&str>) -> Option<Self> {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            return None;
        }
        let author = author
            .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|a| !a.is_empty());
        Some(Self { title, author })
    }

    pub fn key(&self) -> BookKey {
        BookKey {
            title: normalize(&self.title),
            author: self.author.as_deref().map(normalize),
        }
    }

    pub fn same_as(&self, other: &Book) -> bool {
        self.key() == other.key()
    }

    /// Whether both could be the same book: equal titles, and equal authors
    /// unless either author is unknown.
    pub fn may_be(&self, other: &Book) -> bool {
        self.key().may_be(&other.key())
    }
}

impl BookKey {
    pub fn may_be(&self, other: &BookKey) -> bool {
        self.title == other.title
            && match (&self.author, &other.author) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "{} by {}", self.title, author),
            None => write!(f, "{}", self.title),
        }
    }
}

/// A free-text reading preference tag, stored in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preference(String);

impl Preference {
    /// Normalize a raw tag. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let tag = normalize(raw);
        if tag.is_empty() {
            None
        } else {
            Some(Self(tag))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recommendation emitted to the user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub book: Book,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Session aggregate
// =============================================================================

/// Durable per-session state. One record per session.
///
/// `messages` and `recommendations` are append-only. `preferences` and
/// `read_books` hold at most one entry per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
    #[serde(default)]
    pub read_books: Vec<Book>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub last_action: Option<ActionLabel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Persisted revision, bumped by the store on every successful save.
    /// Zero means the record has never been saved.
    #[serde(default)]
    pub version: u64,
}

impl SessionState {
    /// Create an empty session that has never been persisted.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            preferences: Vec::new(),
            read_books: Vec::new(),
            recommendations: Vec::new(),
            last_action: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn has_preference(&self, pref: &Preference) -> bool {
        self.preferences.contains(pref)
    }

    /// Whether `book` may already be read. An unknown author on either side
    /// matches any author with the same title.
    pub fn has_read(&self, book: &Book) -> bool {
        let key = book.key();
        self.read_books.iter().any(|b| b.key().may_be(&key))
    }

    /// Exact-identity membership in `read_books`.
    pub fn has_read_exactly(&self, book: &Book) -> bool {
        let key = book.key();
        self.read_books.iter().any(|b| b.key() == key)
    }

    /// Same matching rule as [`has_read`](Self::has_read).
    pub fn was_recommended(&self, book: &Book) -> bool {
        let key = book.key();
        self.recommendations.iter().any(|r| r.book.key().may_be(&key))
    }

    /// Union preferences into the session. Returns the ones that were new.
    pub fn add_preferences<I>(&mut self, prefs: I) -> Vec<Preference>
    where
        I: IntoIterator<Item = Preference>,
    {
        let mut added = Vec::new();
        for pref in prefs {
            if !self.has_preference(&pref) {
                self.preferences.push(pref.clone());
                added.push(pref);
            }
        }
        added
    }

    /// Union books into `read_books` by identity. Returns the ones that were new.
    pub fn add_read_books<I>(&mut self, books: I) -> Vec<Book>
    where
        I: IntoIterator<Item = Book>,
    {
        let mut added = Vec::new();
        for book in books {
            if !self.has_read_exactly(&book) {
                self.read_books.push(book.clone());
                added.push(book);
            }
        }
        added
    }

    /// Append a message. The timestamp is nudged forward if needed so the
    /// log stays strictly time-ordered.
    pub fn push_message(&mut self, role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) {
        let timestamp = match self.messages.last() {
            Some(last) if timestamp <= last.timestamp => {
                last.timestamp + Duration::microseconds(1)
            }
            _ => timestamp,
        };
        self.messages.push(Message {
            role,
            text: text.into(),
            timestamp,
        });
    }

    /// Advance `updated_at` to `now`, or one microsecond past the previous
    /// value when the clock has not moved, so that it strictly increases.
    pub fn touch(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
        self.updated_at = next;
        next
    }

    /// The last `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len() as u64,
            recommendation_count: self.recommendations.len() as u64,
            last_action: self.last_action,
        }
    }
}

/// Lightweight listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
    pub recommendation_count: u64,
    pub last_action: Option<ActionLabel>,
}

/// Aggregate counters across all stored sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_recommendations: u64,
}
