//! Structured session context handed to the model.

use serde_json::{json, Value};

use folio_core::types::{Book, SessionState};

fn book_json(book: &Book) -> Value {
    json!({ "title": book.title, "author": book.author })
}

/// Everything the model may consult about a session, plus the last
/// `recent` messages.
pub fn session_context(state: &SessionState, recent: usize) -> Value {
    let messages: Vec<Value> = state
        .recent_messages(recent)
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "text": m.text }))
        .collect();

    json!({
        "preferences": state.preferences.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "read_books": state.read_books.iter().map(book_json).collect::<Vec<_>>(),
        "recommendations": state
            .recommendations
            .iter()
            .map(|r| json!({
                "title": r.book.title,
                "author": r.book.author,
                "rationale": r.rationale,
            }))
            .collect::<Vec<_>>(),
        "recent_messages": messages,
    })
}

/// Only the recent message window. Used by the router.
pub fn recent_context(state: &SessionState, recent: usize) -> Value {
    let messages: Vec<Value> = state
        .recent_messages(recent)
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "text": m.text }))
        .collect();
    json!({ "recent_messages": messages, "last_action": state.last_action })
}
