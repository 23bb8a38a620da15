//! Offline rule-based provider.
//!
//! Answers every output schema from regex rules over the prompt input and
//! the structured context, and recommends from a small built-in catalog.
//! Deterministic, so it doubles as the provider for scenario tests.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use folio_core::types::normalize;

use crate::llm::schema::{
    DATA_ANSWER, INTENT_CLASSIFICATION, PREFERENCES, READ_BOOKS, RECOMMENDED_BOOKS,
};
use crate::llm::{LlmClient, LlmError, OutputSchema, Prompt};

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

struct IntentPatterns {
    summarize: Vec<Regex>,
    talk_with_data: Vec<Regex>,
    save_read_books: Vec<Regex>,
    save_preferences: Vec<Regex>,
    recommend: Vec<Regex>,
}

static INTENT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect()
    };

    IntentPatterns {
        summarize: mk(&[
            r"(?i)\bsummar(?:y|ize|ise)\b",
            r"(?i)\brecap\b",
            r"(?i)\bwrap(?:ping)?\s+up\b",
            r"(?i)\bthat['’]?s\s+all\b",
            r"(?i)\b(?:good\s*)?bye\b",
        ]),
        // Checked before recommend so "what have you recommended" is a lookup.
        talk_with_data: mk(&[
            r"(?i)\bso\s+far\b",
            r"(?i)\bwhat\s+do\s+you\s+know\b",
            r"(?i)\bwhat\s+have\s+i\s+(?:told|said)\b",
            r"(?i)\b(?:have|did)\s+you\s+recommend(?:ed)?\b",
            r"(?i)\byou(?:['’]ve|\s+have)\s+recommended\b",
            r"(?i)\bwhat\s+(?:books\s+)?have\s+i\s+read\b",
            r"(?i)\bwhat\s+(?:do\s+i\s+like|are\s+my)\b",
            r"(?i)\bmy\s+(?:preferences|read\s+books|reading\s+list)\b",
            r"(?i)\bremind\s+me\b",
        ]),
        save_read_books: mk(&[
            r"(?i)\bi(?:['’]ve|\s+have)?(?:\s+already|\s+just|\s+recently)?\s+(?:read|finished)\b",
            r"(?i)\bi(?:['’]m|\s+am)\s+done\s+(?:with|reading)\b",
        ]),
        save_preferences: mk(&[
            r"(?i)\bi\s+(?:really\s+|also\s+|mostly\s+)?(?:like|love|enjoy|prefer|adore)\b",
            r"(?i)\bi(?:['’]m|\s+am)\s+(?:really\s+)?into\b",
            r"(?i)\bi(?:['’]m|\s+am)\s+a\s+(?:big\s+)?fan\s+of\b",
            r"(?i)\bmy\s+favou?rite\b",
        ]),
        recommend: mk(&[
            r"(?i)\brecommend",
            r"(?i)\bsuggest",
            r"(?i)\bwhat\s+should\s+i\s+read\b",
            r"(?i)\bsomething\s+(?:new\s+)?to\s+read\b",
            r"(?i)\bnext\s+book\b",
        ]),
    }
});

static PREFERENCE_CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:like|love|enjoy|prefer|adore|into|fan\s+of|favou?rite\s+(?:genres?|books?)\s+(?:is|are))\s+([^.!?]+)",
    )
    .expect("Invalid preference regex")
});

static READ_CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:read|finished|done\s+with|done\s+reading)\s+([^.!?]+)")
        .expect("Invalid read regex")
});

static LIST_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:,|;|/|&|\band\b|\bor\b|\balso\b)\s*").expect("Invalid split regex")
});

static BOOK_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:;|,|\band\b)\s*").expect("Invalid book split regex"));

static BY_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+by\s+(.+)$").expect("Invalid author regex"));

static LEADING_FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:reading|to\s+read|books\s+about|stories\s+about|novels\s+about|books\s+on|a\s+lot\s+of|lots\s+of|mostly|especially|really|good|great|the)\s+",
    )
    .expect("Invalid filler regex")
});

static TRAILING_FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:books?|novels?|stories|a\s+lot|too|as\s+well)$")
        .expect("Invalid filler regex")
});

static TRAILING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:already|recently|too|as\s+well|last\s+(?:week|month|year))$")
        .expect("Invalid filler regex")
});

// =============================================================================
// Catalog
// =============================================================================

struct CatalogEntry {
    title: &'static str,
    author: &'static str,
    tags: &'static [&'static str],
}

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry { title: "Dune", author: "Frank Herbert", tags: &["science fiction", "classic"] },
    CatalogEntry { title: "Foundation", author: "Isaac Asimov", tags: &["science fiction", "classic"] },
    CatalogEntry { title: "The Left Hand of Darkness", author: "Ursula K. Le Guin", tags: &["science fiction"] },
    CatalogEntry { title: "Hyperion", author: "Dan Simmons", tags: &["science fiction"] },
    CatalogEntry { title: "The Martian", author: "Andy Weir", tags: &["science fiction", "humor"] },
    CatalogEntry { title: "Neuromancer", author: "William Gibson", tags: &["science fiction", "cyberpunk"] },
    CatalogEntry { title: "The Hobbit", author: "J.R.R. Tolkien", tags: &["fantasy", "classic"] },
    CatalogEntry { title: "A Wizard of Earthsea", author: "Ursula K. Le Guin", tags: &["fantasy"] },
    CatalogEntry { title: "The Name of the Wind", author: "Patrick Rothfuss", tags: &["fantasy"] },
    CatalogEntry { title: "Mistborn: The Final Empire", author: "Brandon Sanderson", tags: &["fantasy"] },
    CatalogEntry { title: "It", author: "Stephen King", tags: &["horror"] },
    CatalogEntry { title: "The Shining", author: "Stephen King", tags: &["horror", "classic"] },
    CatalogEntry { title: "The Haunting of Hill House", author: "Shirley Jackson", tags: &["horror", "classic"] },
    CatalogEntry { title: "Mexican Gothic", author: "Silvia Moreno-Garcia", tags: &["horror", "historical fiction"] },
    CatalogEntry { title: "Gone Girl", author: "Gillian Flynn", tags: &["thriller", "mystery"] },
    CatalogEntry { title: "The Hound of the Baskervilles", author: "Arthur Conan Doyle", tags: &["mystery", "classic"] },
    CatalogEntry { title: "Pride and Prejudice", author: "Jane Austen", tags: &["romance", "classic"] },
    CatalogEntry { title: "Wolf Hall", author: "Hilary Mantel", tags: &["historical fiction"] },
    CatalogEntry { title: "Sapiens", author: "Yuval Noah Harari", tags: &["non-fiction", "history"] },
    CatalogEntry { title: "Educated", author: "Tara Westover", tags: &["non-fiction", "memoir"] },
];

const DEFAULT_COUNT: usize = 3;

// =============================================================================
// Provider
// =============================================================================

/// Deterministic provider that needs no network.
#[derive(Debug, Default, Clone)]
pub struct HeuristicLlm;

impl HeuristicLlm {
    pub fn new() -> Self {
        Self
    }

    fn classify(&self, input: &str) -> Value {
        let p = &*INTENT_PATTERNS;
        let ordered: [(&str, &Vec<Regex>); 5] = [
            ("summarize", &p.summarize),
            ("talk_with_data", &p.talk_with_data),
            ("save_read_books", &p.save_read_books),
            ("save_preferences", &p.save_preferences),
            ("recommend", &p.recommend),
        ];
        for (label, patterns) in ordered {
            if patterns.iter().any(|re| re.is_match(input)) {
                return json!({ "label": label, "confidence": 0.9 });
            }
        }
        json!({ "label": "recommend", "confidence": 0.2 })
    }

    fn extract_preferences(&self, input: &str) -> Value {
        let tags: Vec<String> = PREFERENCE_CAPTURE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                LIST_SPLIT
                    .split(m.as_str())
                    .map(clean_tag)
                    .map(|t| canonical_tag(&t))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        json!({ "preferences": tags })
    }

    fn extract_read_books(&self, input: &str) -> Value {
        let books: Vec<Value> = READ_CAPTURE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                BOOK_SPLIT
                    .split(m.as_str())
                    .map(clean_title)
                    .filter(|f| !f.is_empty())
                    .map(|fragment| match BY_AUTHOR.captures(&fragment) {
                        Some(caps) => json!({
                            "title": clean_title(&caps[1]),
                            "author": clean_title(&caps[2]),
                        }),
                        None => json!({ "title": fragment, "author": null }),
                    })
                    .collect()
            })
            .unwrap_or_default();
        json!({ "books": books })
    }

    fn recommend(&self, input: &str, context: &Value) -> Value {
        let count = context
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| c as usize)
            .unwrap_or(DEFAULT_COUNT);

        let mut wanted: Vec<String> = string_list(context, "preferences")
            .iter()
            .map(|p| canonical_tag(p))
            .collect();
        let lowered = normalize(input);
        for entry in CATALOG {
            for tag in entry.tags {
                if lowered.contains(tag) && !wanted.iter().any(|w| w == tag) {
                    wanted.push(tag.to_string());
                }
            }
        }

        let mut excluded = book_keys(context, "read_books");
        excluded.extend(book_keys(context, "previous_recommendations"));

        let mut scored: Vec<(usize, &CatalogEntry, Vec<&str>)> = CATALOG
            .iter()
            .filter(|e| {
                let (title, author) = (normalize(e.title), normalize(e.author));
                !excluded
                    .iter()
                    .any(|(t, a)| *t == title && a.as_ref().map_or(true, |a| *a == author))
            })
            .map(|e| {
                let matched: Vec<&str> = e
                    .tags
                    .iter()
                    .copied()
                    .filter(|tag| wanted.iter().any(|w| tag_matches(w, tag)))
                    .collect();
                (matched.len(), e, matched)
            })
            .collect();
        // Stable sort keeps catalog order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let books: Vec<Value> = scored
            .into_iter()
            .take(count)
            .map(|(_, entry, matched)| {
                let rationale = if matched.is_empty() {
                    "A widely loved pick to broaden your shelf.".to_string()
                } else {
                    format!("Because you enjoy {}.", matched.join(" and "))
                };
                json!({ "title": entry.title, "author": entry.author, "rationale": rationale })
            })
            .collect();
        json!({ "books": books })
    }

    fn answer(&self, input: &str, context: &Value) -> Value {
        let preferences = string_list(context, "preferences");
        let read = book_titles(context, "read_books");
        let recommended = book_titles(context, "recommendations");

        let prefs_line = if preferences.is_empty() {
            "You haven't told me any reading preferences yet.".to_string()
        } else {
            format!("You like {}.", preferences.join(", "))
        };
        let read_line = if read.is_empty() {
            "You haven't told me about any books you've read.".to_string()
        } else {
            format!("You've read {}.", read.join(", "))
        };
        let recs_line = if recommended.is_empty() {
            "I haven't recommended any books yet.".to_string()
        } else {
            format!("So far I've recommended {}.", recommended.join(", "))
        };

        let lowered = normalize(input);
        let answer = if lowered.contains("recommend") {
            recs_line
        } else if lowered.contains("read") {
            read_line
        } else if ["like", "prefer", "genre", "taste"]
            .iter()
            .any(|w| lowered.contains(w))
        {
            prefs_line
        } else {
            format!("{} {} {}", prefs_line, read_line, recs_line)
        };
        json!({ "answer": answer })
    }
}

#[async_trait]
impl LlmClient for HeuristicLlm {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn generate_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        let input = prompt.input.as_str();
        match schema.name.as_str() {
            INTENT_CLASSIFICATION => Ok(self.classify(input)),
            PREFERENCES => Ok(self.extract_preferences(input)),
            READ_BOOKS => Ok(self.extract_read_books(input)),
            RECOMMENDED_BOOKS => Ok(self.recommend(input, &prompt.context)),
            DATA_ANSWER => Ok(self.answer(input, &prompt.context)),
            other => Err(LlmError::MalformedOutput(format!(
                "no heuristic for schema {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn trim_punctuation(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '-' || "“”‘’".contains(c))
        .trim()
}

/// Strip quoting and filler words around a preference tag.
fn clean_tag(raw: &str) -> String {
    let mut s = trim_punctuation(raw).to_string();
    loop {
        let stripped = LEADING_FILLER.replace(&s, "").to_string();
        let stripped = TRAILING_FILLER.replace(&stripped, "").to_string();
        if stripped == s {
            break;
        }
        s = stripped;
    }
    s
}

/// Strip quoting and trailing time words around a title or author.
/// Leading words are kept since they are often part of the title.
fn clean_title(raw: &str) -> String {
    let s = TRAILING_TIME.replace(trim_punctuation(raw), "");
    trim_punctuation(&s).to_string()
}

fn canonical_tag(raw: &str) -> String {
    let tag = normalize(raw);
    match tag.as_str() {
        "sci-fi" | "scifi" | "sf" | "sci fi" => "science fiction".to_string(),
        "nonfiction" => "non-fiction".to_string(),
        "thrillers" => "thriller".to_string(),
        "mysteries" => "mystery".to_string(),
        _ => tag,
    }
}

fn tag_matches(wanted: &str, tag: &str) -> bool {
    wanted == tag || (wanted.len() >= 3 && (wanted.contains(tag) || tag.contains(wanted)))
}

fn string_list(context: &Value, key: &str) -> Vec<String> {
    context
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn book_entries(context: &Value, key: &str) -> Vec<(String, Option<String>)> {
    context
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let title = item.get("title")?.as_str()?.to_string();
                    let author = item.get("author").and_then(Value::as_str).map(str::to_string);
                    Some((title, author))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Normalized `(title, author)` pairs. A `None` author matches any author.
fn book_keys(context: &Value, key: &str) -> Vec<(String, Option<String>)> {
    book_entries(context, key)
        .into_iter()
        .map(|(t, a)| (normalize(&t), a.map(|a| normalize(&a))))
        .collect()
}

fn book_titles(context: &Value, key: &str) -> Vec<String> {
    book_entries(context, key)
        .into_iter()
        .map(|(t, a)| match a {
            Some(a) => format!("{} by {}", t, a),
            None => t,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ask(schema: OutputSchema, input: &str, context: Value) -> Value {
        let prompt = Prompt::new("", input, context);
        HeuristicLlm::new()
            .generate_structured(&prompt, &schema)
            .await
            .unwrap()
    }

    async fn label_of(input: &str) -> String {
        let out = ask(OutputSchema::intent_classification(), input, json!({})).await;
        out["label"].as_str().unwrap().to_string()
    }

    // ---- classification ----

    #[tokio::test]
    async fn test_classify_scenario_messages() {
        assert_eq!(label_of("I like science fiction and fantasy").await, "save_preferences");
        assert_eq!(label_of("I've read Dune by Frank Herbert").await, "save_read_books");
        assert_eq!(label_of("recommend me something").await, "recommend");
        assert_eq!(label_of("what have you recommended me so far?").await, "talk_with_data");
        assert_eq!(label_of("Can you summarize our chat?").await, "summarize");
    }

    #[tokio::test]
    async fn test_classify_unmatched_is_low_confidence() {
        let out = ask(OutputSchema::intent_classification(), "hmm", json!({})).await;
        assert_eq!(out["label"], "recommend");
        assert!(out["confidence"].as_f64().unwrap() < 0.3);
    }

    // ---- preferences ----

    #[tokio::test]
    async fn test_extract_two_preferences() {
        let out = ask(OutputSchema::preferences(), "I like science fiction and fantasy", json!({})).await;
        assert_eq!(out["preferences"], json!(["science fiction", "fantasy"]));
    }

    #[tokio::test]
    async fn test_extract_preferences_strips_filler_and_synonyms() {
        let out = ask(
            OutputSchema::preferences(),
            "I really enjoy sci-fi, horror novels and books about history.",
            json!({}),
        )
        .await;
        assert_eq!(out["preferences"], json!(["science fiction", "horror", "history"]));
    }

    #[tokio::test]
    async fn test_extract_preferences_none() {
        let out = ask(OutputSchema::preferences(), "hello there", json!({})).await;
        assert_eq!(out["preferences"], json!([]));
    }

    // ---- read books ----

    #[tokio::test]
    async fn test_extract_book_with_author() {
        let out = ask(OutputSchema::read_books(), "I've read Dune by Frank Herbert", json!({})).await;
        assert_eq!(out["books"], json!([{"title": "Dune", "author": "Frank Herbert"}]));
    }

    #[tokio::test]
    async fn test_extract_multiple_books() {
        let out = ask(
            OutputSchema::read_books(),
            "I have read It by Stephen King, \"Emma\" and Wolf Hall by Hilary Mantel.",
            json!({}),
        )
        .await;
        assert_eq!(
            out["books"],
            json!([
                {"title": "It", "author": "Stephen King"},
                {"title": "Emma", "author": null},
                {"title": "Wolf Hall", "author": "Hilary Mantel"}
            ])
        );
    }

    // ---- recommendations ----

    #[tokio::test]
    async fn test_recommend_prefers_matching_tags_and_skips_read() {
        let context = json!({
            "count": 2,
            "preferences": ["science fiction"],
            "read_books": [{"title": "Dune", "author": "Frank Herbert"}],
            "previous_recommendations": [{"title": "Foundation", "author": "Isaac Asimov"}]
        });
        let out = ask(OutputSchema::recommended_books(), "recommend me something", context).await;
        let titles: Vec<&str> = out["books"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["The Left Hand of Darkness", "Hyperion"]);
        assert!(out["books"][0]["rationale"]
            .as_str()
            .unwrap()
            .contains("science fiction"));
    }

    #[tokio::test]
    async fn test_recommend_skips_title_read_without_author() {
        let context = json!({
            "count": 1,
            "preferences": ["science fiction"],
            "read_books": [{"title": "dune", "author": null}]
        });
        let out = ask(OutputSchema::recommended_books(), "recommend me something", context).await;
        assert_eq!(out["books"][0]["title"], "Foundation");
    }

    #[tokio::test]
    async fn test_recommend_uses_genre_in_request() {
        let out = ask(
            OutputSchema::recommended_books(),
            "suggest a horror book",
            json!({"count": 1}),
        )
        .await;
        assert_eq!(out["books"][0]["title"], "It");
    }

    // ---- data answers ----

    #[tokio::test]
    async fn test_answer_lists_recommendations() {
        let context = json!({
            "preferences": [],
            "read_books": [],
            "recommendations": [{"title": "Hyperion", "author": "Dan Simmons", "rationale": "x"}]
        });
        let out = ask(OutputSchema::data_answer(), "what have you recommended me so far?", context).await;
        assert!(out["answer"].as_str().unwrap().contains("Hyperion by Dan Simmons"));
    }

    #[tokio::test]
    async fn test_answer_overview_when_unspecific() {
        let out = ask(OutputSchema::data_answer(), "what do you know about me", json!({})).await;
        let answer = out["answer"].as_str().unwrap();
        assert!(answer.contains("preferences"));
        assert!(answer.contains("recommended"));
    }

    #[tokio::test]
    async fn test_unknown_schema_is_malformed() {
        let schema = OutputSchema {
            name: "weather".to_string(),
            json_schema: json!({}),
        };
        let prompt = Prompt::new("", "hi", json!({}));
        let err = HeuristicLlm::new()
            .generate_structured(&prompt, &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput(_)));
    }
}
