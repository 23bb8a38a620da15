//! Output schemas for each call site and the typed replies they decode into.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::Validate;

/// A named JSON schema the model reply must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub json_schema: serde_json::Value,
}

pub const INTENT_CLASSIFICATION: &str = "intent_classification";
pub const PREFERENCES: &str = "preferences";
pub const READ_BOOKS: &str = "read_books";
pub const RECOMMENDED_BOOKS: &str = "recommended_books";
pub const DATA_ANSWER: &str = "data_answer";

fn book_schema(with_rationale: bool) -> serde_json::Value {
    let mut properties = json!({
        "title": { "type": "string" },
        "author": { "type": ["string", "null"] }
    });
    let mut required = vec!["title", "author"];
    if with_rationale {
        properties["rationale"] = json!({ "type": "string" });
        required.push("rationale");
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

impl OutputSchema {
    fn new(name: &str, json_schema: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            json_schema,
        }
    }

    pub fn intent_classification() -> Self {
        Self::new(
            INTENT_CLASSIFICATION,
            json!({
                "type": "object",
                "properties": {
                    "label": {
                        "type": "string",
                        "enum": ["recommend", "save_preferences", "save_read_books", "talk_with_data", "summarize"]
                    },
                    "confidence": { "type": "number" }
                },
                "required": ["label", "confidence"],
                "additionalProperties": false
            }),
        )
    }

    pub fn preferences() -> Self {
        Self::new(
            PREFERENCES,
            json!({
                "type": "object",
                "properties": {
                    "preferences": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["preferences"],
                "additionalProperties": false
            }),
        )
    }

    pub fn read_books() -> Self {
        Self::new(
            READ_BOOKS,
            json!({
                "type": "object",
                "properties": {
                    "books": { "type": "array", "items": book_schema(false) }
                },
                "required": ["books"],
                "additionalProperties": false
            }),
        )
    }

    pub fn recommended_books() -> Self {
        Self::new(
            RECOMMENDED_BOOKS,
            json!({
                "type": "object",
                "properties": {
                    "books": { "type": "array", "items": book_schema(true) }
                },
                "required": ["books"],
                "additionalProperties": false
            }),
        )
    }

    pub fn data_answer() -> Self {
        Self::new(
            DATA_ANSWER,
            json!({
                "type": "object",
                "properties": {
                    "answer": { "type": "string" }
                },
                "required": ["answer"],
                "additionalProperties": false
            }),
        )
    }
}

// =============================================================================
// Typed replies
// =============================================================================

/// Router reply. The label is kept as text so unknown labels can be
/// recognized as a degraded classification rather than malformed output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentOutput {
    pub label: String,
    pub confidence: f32,
}

impl Validate for IntentOutput {
    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0.0..=1.0", self.confidence));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreferencesOutput {
    pub preferences: Vec<String>,
}

impl Validate for PreferencesOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookOutput {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadBooksOutput {
    pub books: Vec<BookOutput>,
}

impl Validate for ReadBooksOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendedBookOutput {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendedBooksOutput {
    pub books: Vec<RecommendedBookOutput>,
}

impl Validate for RecommendedBooksOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataAnswerOutput {
    pub answer: String,
}

impl Validate for DataAnswerOutput {
    fn validate(&self) -> Result<(), String> {
        if self.answer.trim().is_empty() {
            return Err("answer is empty".to_string());
        }
        Ok(())
    }
}
