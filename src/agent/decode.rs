//! Robust structured decode of model output.
//!
//! Models wrap JSON in many ways. The tolerated forms, applied in order:
//!
//! 1. Surrounding whitespace.
//! 2. Reasoning preambles: `<think>`, `<thinking>` and `<reasoning>` blocks
//!    are removed. A dangling closing tag with no opener discards
//!    everything before it.
//! 3. Markdown fences: the body of the first fenced block is used, with
//!    any language tag dropped.
//! 4. Prose around the payload: the first balanced `{…}` or `[…]` value
//!    is sliced out.
//! 5. Lenient JSON: `//` line comments and trailing commas before `}` or
//!    `]` are removed outside string literals.
//!
//! Anything still unparseable is an [`AgentError::MalformedOutput`].

use serde::de::DeserializeOwned;

use crate::error::AgentError;

const REASONING_TAGS: [&str; 3] = ["think", "thinking", "reasoning"];
const PREVIEW_LEN: usize = 200;

/// Decodes raw model output into `T`.
///
/// # Errors
///
/// Returns [`AgentError::MalformedOutput`] when no tolerated form parses.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, AgentError> {
    let Some(candidate) = extract_json(raw) else {
        return Err(malformed("no JSON object or array found", raw));
    };
    serde_json::from_str::<T>(&sanitize(&candidate)).map_err(|e| malformed(&e.to_string(), raw))
}

/// Removes reasoning blocks and returns the remaining text, trimmed.
#[must_use]
pub fn strip_reasoning(raw: &str) -> String {
    let mut text = raw.to_string();
    for tag in REASONING_TAGS {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        while let Some(start) = text.find(&open) {
            match text[start..].find(&close) {
                Some(rel_end) => {
                    text.replace_range(start..start + rel_end + close.len(), "");
                }
                // Unterminated block: the rest is reasoning.
                None => text.truncate(start),
            }
        }
        if let Some(pos) = text.rfind(&close) {
            text.replace_range(..pos + close.len(), "");
        }
    }
    text.trim().to_string()
}

/// Finds the JSON payload in model output, if any.
#[must_use]
pub fn extract_json(raw: &str) -> Option<String> {
    let text = strip_reasoning(raw);
    let body = fenced_body(&text).unwrap_or(&text);
    let start = body.find(['{', '['])?;
    let slice = &body[start..];
    let end = matching_close(slice).unwrap_or(slice.len());
    Some(slice[..end].to_string())
}

/// Body of the first markdown fence.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[tag_len..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// Byte offset one past the bracket that closes the value starting at
/// `text[0]`. `None` when the value never closes.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strips `//` comments and trailing commas outside string literals.
fn sanitize(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

fn malformed(diagnostic: &str, raw: &str) -> AgentError {
    let preview: String = raw.chars().take(PREVIEW_LEN).collect();
    AgentError::MalformedOutput {
        message: format!(
            "{diagnostic}. Response length: {} bytes, preview: {preview:?}",
            raw.len()
        ),
        content: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use test_case::test_case;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Queries {
        query: Vec<String>,
        #[serde(default)]
        rationale: String,
    }

    #[test_case(r#"{"query": ["a"], "rationale": "r"}"# ; "bare object")]
    #[test_case("  \n{\"query\": [\"a\"], \"rationale\": \"r\"}\n  " ; "surrounding whitespace")]
    #[test_case("```json\n{\"query\": [\"a\"], \"rationale\": \"r\"}\n```" ; "json fence")]
    #[test_case("```\n{\"query\": [\"a\"], \"rationale\": \"r\"}\n```" ; "bare fence")]
    #[test_case("```json{\"query\": [\"a\"], \"rationale\": \"r\"}```" ; "single line fence")]
    #[test_case("<think>plan it {not json}</think>\n{\"query\": [\"a\"], \"rationale\": \"r\"}" ; "think block")]
    #[test_case("<thinking>hmm</thinking>```json\n{\"query\": [\"a\"], \"rationale\": \"r\"}```" ; "thinking then fence")]
    #[test_case("some reasoning {x}\n</think>\n{\"query\": [\"a\"], \"rationale\": \"r\"}" ; "dangling close tag")]
    #[test_case("Here you go: {\"query\": [\"a\"], \"rationale\": \"r\"} Hope it helps!" ; "prose around")]
    #[test_case("{\"query\": [\"a\",], \"rationale\": \"r\",}" ; "trailing commas")]
    #[test_case("{\n  // the list\n  \"query\": [\"a\"],\n  \"rationale\": \"r\"\n}" ; "line comment")]
    fn test_tolerated_forms(raw: &str) {
        let decoded: Queries = decode(raw).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(
            decoded,
            Queries {
                query: vec!["a".to_string()],
                rationale: "r".to_string()
            }
        );
    }

    #[test]
    fn test_string_contents_untouched() {
        let raw = r#"{"query": ["see http://x.org/a, b]", "c,}"], "rationale": "{not} // a comment"}"#;
        let decoded: Queries = decode(raw).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(decoded.query, vec!["see http://x.org/a, b]", "c,}"]);
        assert_eq!(decoded.rationale, "{not} // a comment");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let raw = r#"{"query": ["say \"hi\" }"], "rationale": ""}"#;
        let decoded: Queries = decode(raw).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(decoded.query, vec![r#"say "hi" }"#]);
    }

    #[test_case("not json at all" ; "prose only")]
    #[test_case("<think>{\"query\": [\"a\"]}</think>" ; "payload only inside reasoning")]
    #[test_case("{\"query\": 12}" ; "wrong shape")]
    #[test_case("{\"query\": [\"a\"" ; "truncated")]
    fn test_malformed(raw: &str) {
        let result: Result<Queries, _> = decode(raw);
        match result {
            Err(err @ AgentError::MalformedOutput { .. }) => assert!(err.is_recoverable()),
            other => unreachable!("expected malformed output, got {other:?}"),
        }
    }

    #[test]
    fn test_strip_reasoning_unterminated() {
        assert_eq!(strip_reasoning("answer <think>still going"), "answer");
    }

    #[test]
    fn test_array_payload() {
        let decoded: Vec<u32> = decode("result: [1, 2, 3,]").unwrap_or_default();
        assert_eq!(decoded, vec![1, 2, 3]);
    }
}
