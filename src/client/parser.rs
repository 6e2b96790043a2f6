//! Decoding of Context7 tool payloads
//!
//! Two text formats come back from the remote tools: the search listing of
//! `resolve-library-id` (records separated by dashed lines, `Key: value`
//! fields) and the documentation body of `get-library-docs` (prose with
//! fenced code blocks).

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Separator between records in a search listing
const RECORD_SEPARATOR: &str = "----------";

const TITLE_KEY: &str = "Title:";
const LIBRARY_ID_KEY: &str = "Context7-compatible library ID:";
const DESCRIPTION_KEY: &str = "Description:";
const SNIPPETS_KEY: &str = "Code Snippets:";
const TRUST_KEY: &str = "Trust Score:";

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("valid code block regex"));

/// A library entry from a `resolve-library-id` listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryCandidate {
    /// Display name (`Title:`)
    pub name: String,
    /// Context7-compatible identifier, e.g. `/facebook/react`
    pub library_id: String,
    /// Short description
    pub description: Option<String>,
    /// Number of indexed code snippets
    pub code_snippet_count: Option<u64>,
    /// Trust score, usually 0-10
    pub trust_score: Option<f64>,
}

impl LibraryCandidate {
    /// Ranking score of this candidate for `query`
    ///
    /// 100 for an exact case-insensitive name match, 50 for a substring match,
    /// plus ten times the trust score, plus `min(snippets / 100, 10)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, query: &str) -> f64 {
        let name = self.name.to_lowercase();
        let query = query.to_lowercase();

        let mut score = if name == query {
            100.0
        } else if name.contains(&query) {
            50.0
        } else {
            0.0
        };

        score += self.trust_score.unwrap_or(0.0) * 10.0;
        score += (self.code_snippet_count.unwrap_or(0) as f64 / 100.0).min(10.0);
        score
    }
}

/// Decoded result of one tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Candidates from `resolve-library-id`
    SearchResults(Vec<LibraryCandidate>),
    /// Raw documentation text from `get-library-docs`
    DocsPayload(String),
    /// Nothing usable in the payload
    Empty,
}

/// Collect every `result.content[*].text` string of a JSON-RPC payload.
///
/// Missing or mistyped keys yield an empty list.
#[must_use]
pub fn content_texts(payload: &Value) -> Vec<&str> {
    payload
        .get("result")
        .and_then(|r| r.get("content"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a `resolve-library-id` payload
#[must_use]
pub fn decode_search_results(payload: &Value) -> ToolResult {
    let candidates: Vec<LibraryCandidate> = content_texts(payload)
        .into_iter()
        .flat_map(parse_library_results)
        .collect();

    if candidates.is_empty() {
        ToolResult::Empty
    } else {
        ToolResult::SearchResults(candidates)
    }
}

/// Decode a `get-library-docs` payload; text entries are joined by newlines
#[must_use]
pub fn decode_docs(payload: &Value) -> ToolResult {
    let docs = content_texts(payload).join("\n");
    if docs.trim().is_empty() {
        ToolResult::Empty
    } else {
        ToolResult::DocsPayload(docs)
    }
}

/// Parse a search listing into candidates.
///
/// Records without a library-identifier line are dropped. A non-numeric
/// snippet count or trust score is logged and left unset.
#[must_use]
pub fn parse_library_results(text: &str) -> Vec<LibraryCandidate> {
    let mut results = Vec::new();

    for record in text.split(RECORD_SEPARATOR) {
        let mut name = None;
        let mut library_id = None;
        let mut description = None;
        let mut code_snippet_count = None;
        let mut trust_score = None;

        for raw in record.trim().lines() {
            let line = raw.trim_matches(|c| c == '-' || c == ' ').trim();

            if let Some(value) = line.strip_prefix(TITLE_KEY) {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix(LIBRARY_ID_KEY) {
                library_id = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix(DESCRIPTION_KEY) {
                description = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix(SNIPPETS_KEY) {
                match value.trim().parse() {
                    Ok(count) => code_snippet_count = Some(count),
                    Err(_) => tracing::debug!("Invalid code snippet count: {line}"),
                }
            } else if let Some(value) = line.strip_prefix(TRUST_KEY) {
                match value.trim().parse() {
                    Ok(score) => trust_score = Some(score),
                    Err(_) => tracing::debug!("Invalid trust score: {line}"),
                }
            }
        }

        let Some(library_id) = library_id else {
            continue;
        };

        results.push(LibraryCandidate {
            name: name.unwrap_or_default(),
            library_id,
            description,
            code_snippet_count,
            trust_score,
        });
    }

    results
}

/// Pick the highest scoring candidate; ties keep the earliest one
#[must_use]
pub fn best_match<'a>(candidates: &'a [LibraryCandidate], query: &str) -> Option<&'a LibraryCandidate> {
    let mut best: Option<(&LibraryCandidate, f64)> = None;
    for candidate in candidates {
        let score = candidate.score(query);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Reformat a documentation body.
///
/// Fenced code blocks are kept verbatim with their language tag. Prose lines
/// starting with `TITLE:` become bold headings and `DESCRIPTION:` lines become
/// italic ones; every other prose line, blank ones included, passes through
/// unchanged. Only the newlines bordering a code fence are trimmed.
#[must_use]
pub fn format_docs(docs: &str) -> String {
    let mut formatted: Vec<String> = Vec::new();
    let mut cursor = 0;

    for caps in CODE_BLOCK.captures_iter(docs) {
        let Some(whole) = caps.get(0) else { continue };
        push_prose(&mut formatted, &docs[cursor..whole.start()]);

        let language = caps.get(1).map_or("", |m| m.as_str());
        let code = caps.get(2).map_or("", |m| m.as_str());
        formatted.push(format!("\n```{language}\n{code}```\n"));

        cursor = whole.end();
    }
    push_prose(&mut formatted, &docs[cursor..]);

    formatted.join("\n")
}

fn push_prose(out: &mut Vec<String>, text: &str) {
    let text = text.trim_matches(['\n', '\r']);
    if text.is_empty() {
        return;
    }
    for line in text.lines() {
        if let Some(title) = line.strip_prefix("TITLE:") {
            out.push(format!("**{}**", title.trim()));
        } else if let Some(description) = line.strip_prefix("DESCRIPTION:") {
            out.push(format!("*{}*", description.trim()));
        } else {
            out.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEARCH_TEXT: &str = "\
- Title: React
- Context7-compatible library ID: /facebook/react
- Description: A JavaScript library for building user interfaces
- Code Snippets: 150
- Trust Score: 9.5
----------
- Title: react-router
- Context7-compatible library ID: /remix-run/react-router
- Description: Declarative routing for React
- Code Snippets: 50
- Trust Score: 8.0
----------
- Title: Orphan
- Description: no identifier here
- Trust Score: 7.0";

    #[test]
    fn test_parse_library_results() {
        let libs = parse_library_results(SEARCH_TEXT);
        assert_eq!(libs.len(), 2);

        assert_eq!(libs[0].name, "React");
        assert_eq!(libs[0].library_id, "/facebook/react");
        assert_eq!(libs[0].code_snippet_count, Some(150));
        assert_eq!(libs[0].trust_score, Some(9.5));

        assert_eq!(libs[1].name, "react-router");
        assert_eq!(libs[1].library_id, "/remix-run/react-router");
        assert_eq!(libs[1].description.as_deref(), Some("Declarative routing for React"));
    }

    #[test]
    fn test_parse_tolerates_bad_numbers() {
        let text = "Title: Vue\nContext7-compatible library ID: /vuejs/core\nCode Snippets: many\nTrust Score: high";
        let libs = parse_library_results(text);
        assert_eq!(libs.len(), 1);
        assert_eq!(libs[0].code_snippet_count, None);
        assert_eq!(libs[0].trust_score, None);
    }

    #[test]
    fn test_scoring_prefers_exact_match() {
        let libs = parse_library_results(SEARCH_TEXT);
        assert!((libs[0].score("react") - 196.5).abs() < 1e-9);
        assert!((libs[1].score("react") - 130.5).abs() < 1e-9);
        assert_eq!(best_match(&libs, "react").unwrap().library_id, "/facebook/react");
    }

    #[test]
    fn test_best_match_tie_keeps_first() {
        let a = LibraryCandidate {
            name: "alpha".to_string(),
            library_id: "/a/alpha".to_string(),
            description: None,
            code_snippet_count: None,
            trust_score: Some(5.0),
        };
        let b = LibraryCandidate {
            library_id: "/b/alpha".to_string(),
            ..a.clone()
        };
        let libs = vec![a, b];
        assert_eq!(best_match(&libs, "alpha").unwrap().library_id, "/a/alpha");
        assert!(best_match(&[], "alpha").is_none());
    }

    #[test]
    fn test_snippet_bonus_is_capped() {
        let lib = LibraryCandidate {
            name: "zzz".to_string(),
            library_id: "/z/z".to_string(),
            description: None,
            code_snippet_count: Some(50_000),
            trust_score: None,
        };
        assert!((lib.score("react") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_payloads() {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"content": [{"type": "text", "text": SEARCH_TEXT}]}
        });
        match decode_search_results(&payload) {
            ToolResult::SearchResults(libs) => assert_eq!(libs.len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        let docs = json!({"result": {"content": [{"text": "part one"}, {"text": "part two"}, {"image": "x"}]}});
        assert_eq!(decode_docs(&docs), ToolResult::DocsPayload("part one\npart two".to_string()));

        assert_eq!(decode_docs(&json!({"error": {"code": -1}})), ToolResult::Empty);
        assert_eq!(decode_search_results(&json!({"result": "oops"})), ToolResult::Empty);
    }

    #[test]
    fn test_format_docs_preserves_code_blocks() {
        let docs = "TITLE: Getting Started\nDESCRIPTION: Install and run.\nSome prose.\n\n```python\nimport pytest\n\ndef test_x():\n    assert True\n```\nBetween blocks\n```javascript\nconst x = 1;\n```\nTITLE: Tail";
        let out = format_docs(docs);

        assert!(out.contains("**Getting Started**"));
        assert!(out.contains("*Install and run.*"));
        assert!(!out.contains("DESCRIPTION:"));
        assert!(out.contains("Some prose."));
        assert!(out.contains("```python\nimport pytest\n\ndef test_x():\n    assert True\n```"));
        assert!(out.contains("```javascript\nconst x = 1;\n```"));
        assert!(out.contains("Between blocks"));
        assert!(out.contains("**Tail**"));
    }

    #[test]
    fn test_format_docs_plain_text() {
        assert_eq!(format_docs("line one\n\nline two"), "line one\n\nline two");
        assert_eq!(format_docs("DESCRIPTION: Short intro\n  indented"), "*Short intro*\n  indented");
    }
}
