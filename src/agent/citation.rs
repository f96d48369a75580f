//! Citation bookkeeping: short tokens in, resolvable origins out.
//!
//! Evidence text cites sources through short tokens of the form
//! `cite://<dispatch>-<n>` instead of full URLs, which keeps prompts small
//! and gives the model an unambiguous handle to copy. Tokens are allocated
//! per dispatch by a [`TokenAllocator`]; the dispatch id prefix keeps them
//! unique across concurrent dispatches. After each round the controller
//! merges the dispatch sources into the request's [`SourceRegistry`],
//! which deduplicates by origin and reports aliases so later evidence
//! reuses the canonical token for an origin already seen.
//!
//! At the end, [`substitute`] swaps every known token in the answer for its
//! origin and returns exactly the sources that were cited.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Prefix shared by every citation token.
pub const TOKEN_SCHEME: &str = "cite://";

/// A cited source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    /// Token used in evidence and answer text.
    pub short_token: String,
    /// Resolvable origin (URL or equivalent). The deduplication key.
    pub origin: String,
    /// Human-readable label.
    pub label: String,
    /// Raw text the source contributed.
    pub snippet: String,
}

/// Allocates tokens for one evidence dispatch.
///
/// Allocation is idempotent per origin: asking twice for the same origin
/// returns the same token.
#[derive(Debug)]
pub struct TokenAllocator {
    dispatch_id: u64,
    by_origin: HashMap<String, usize>,
    records: Vec<SourceRecord>,
}

impl TokenAllocator {
    /// Creates an allocator for `dispatch_id`.
    #[must_use]
    pub fn new(dispatch_id: u64) -> Self {
        Self {
            dispatch_id,
            by_origin: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// Dispatch the allocator belongs to.
    #[must_use]
    pub const fn dispatch_id(&self) -> u64 {
        self.dispatch_id
    }

    /// Returns the record for `origin`, registering it on first sight.
    ///
    /// A repeated origin keeps its first label and snippet.
    pub fn allocate(&mut self, origin: &str, label: &str, snippet: &str) -> SourceRecord {
        if let Some(&index) = self.by_origin.get(origin) {
            return self.records[index].clone();
        }
        let record = SourceRecord {
            short_token: format!(
                "{TOKEN_SCHEME}{}-{}",
                self.dispatch_id,
                self.records.len() + 1
            ),
            origin: origin.to_string(),
            label: label.to_string(),
            snippet: snippet.to_string(),
        };
        self.by_origin
            .insert(origin.to_string(), self.records.len());
        self.records.push(record.clone());
        record
    }

    /// Sources allocated so far, in allocation order.
    #[must_use]
    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }
}

/// Every source gathered during one request, keyed by origin.
///
/// Only grows: merging an origin already present is a no-op.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    records: Vec<SourceRecord>,
    by_origin: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct origins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been gathered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order.
    #[must_use]
    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    /// Looks up a record by token.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&SourceRecord> {
        self.by_token.get(token).map(|&i| &self.records[i])
    }

    /// Canonical token for an origin, if seen.
    #[must_use]
    pub fn token_for(&self, origin: &str) -> Option<&str> {
        self.by_origin
            .get(origin)
            .map(|&i| self.records[i].short_token.as_str())
    }

    /// Merges `incoming` by origin.
    ///
    /// Returns the aliases created: incoming tokens whose origin was
    /// already registered, mapped to the canonical token. Evidence text
    /// carrying those tokens must be passed through [`rewrite_tokens`].
    pub fn merge(&mut self, incoming: Vec<SourceRecord>) -> HashMap<String, String> {
        let mut aliases = HashMap::new();
        for record in incoming {
            if let Some(&index) = self.by_origin.get(&record.origin) {
                let canonical = &self.records[index].short_token;
                if *canonical != record.short_token {
                    aliases.insert(record.short_token, canonical.clone());
                }
                continue;
            }
            debug_assert!(
                !self.by_token.contains_key(&record.short_token),
                "token {} reused for a second origin",
                record.short_token
            );
            let index = self.records.len();
            self.by_origin.insert(record.origin.clone(), index);
            self.by_token.insert(record.short_token.clone(), index);
            self.records.push(record);
        }
        aliases
    }
}

/// Result of resolving tokens in a final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Answer with every token replaced by its origin.
    pub display_text: String,
    /// Sources whose token appeared, in order of first appearance.
    pub cited_sources: Vec<SourceRecord>,
    /// Tokens that matched no gathered source. Removed from the text.
    pub unknown_tokens: Vec<String>,
}

/// Finds every well-formed token in `text`.
///
/// A token is the scheme followed by `<digits>-<digits>`; digits are read
/// greedily, so `cite://1-1` never matches inside `cite://1-10`.
#[must_use]
pub fn scan_tokens(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find(TOKEN_SCHEME) {
        let start = cursor + rel;
        let mut end = start + TOKEN_SCHEME.len();
        let dispatch_digits = count_digits(&bytes[end..]);
        end += dispatch_digits;
        let well_formed = dispatch_digits > 0 && bytes.get(end) == Some(&b'-') && {
            let n_digits = count_digits(&bytes[end + 1..]);
            end += 1 + n_digits;
            n_digits > 0
        };
        if well_formed {
            found.push(start..end);
        }
        cursor = end.max(start + TOKEN_SCHEME.len());
    }
    found
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Replaces tokens in `text` according to `aliases`.
#[must_use]
pub fn rewrite_tokens(text: &str, aliases: &HashMap<String, String>) -> String {
    if aliases.is_empty() {
        return text.to_string();
    }
    replace_tokens(text, |token| {
        Some(aliases.get(token).map_or(token, String::as_str).to_string())
    })
}

/// Resolves the tokens in `final_text` against `registry`.
///
/// Known tokens become their origin. Unknown tokens are removed, and a
/// markdown link left without a target collapses to its label.
#[must_use]
pub fn substitute(final_text: &str, registry: &SourceRegistry) -> Substitution {
    let mut cited_sources = Vec::new();
    let mut cited = HashSet::new();
    let mut unknown_tokens = Vec::new();

    let replaced = replace_tokens(final_text, |token| {
        if let Some(record) = registry.get(token) {
            if cited.insert(record.short_token.clone()) {
                cited_sources.push(record.clone());
            }
            Some(record.origin.clone())
        } else {
            if !unknown_tokens.iter().any(|t| t == token) {
                unknown_tokens.push(token.to_string());
            }
            None
        }
    });

    if !unknown_tokens.is_empty() {
        warn!(
            count = unknown_tokens.len(),
            tokens = ?unknown_tokens,
            "Answer cited tokens that match no gathered source; removed"
        );
    }

    Substitution {
        display_text: collapse_empty_links(&replaced),
        cited_sources,
        unknown_tokens,
    }
}

/// Rebuilds `text`, mapping each token through `map`; `None` drops it.
fn replace_tokens<F>(text: &str, mut map: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for range in scan_tokens(text) {
        out.push_str(&text[last..range.start]);
        if let Some(replacement) = map(&text[range.clone()]) {
            out.push_str(&replacement);
        }
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

static EMPTY_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[([^\]\[]*)\]\(\s*\)").ok());

fn collapse_empty_links(text: &str) -> String {
    EMPTY_LINK.as_ref().map_or_else(
        || text.to_string(),
        |re| re.replace_all(text, "$1").into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(token: &str, origin: &str) -> SourceRecord {
        SourceRecord {
            short_token: token.to_string(),
            origin: origin.to_string(),
            label: origin.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_allocate_is_idempotent_per_origin() {
        let mut alloc = TokenAllocator::new(7);
        let a = alloc.allocate("https://a.example", "A", "");
        let b = alloc.allocate("https://b.example", "B", "");
        let again = alloc.allocate("https://a.example", "A again", "");
        assert_eq!(a.short_token, "cite://7-1");
        assert_eq!(b.short_token, "cite://7-2");
        assert_eq!(again, a);
        assert_eq!(again.label, "A");
        assert_eq!(alloc.into_records().len(), 2);
    }

    #[test]
    fn test_merge_dedups_by_origin_and_reports_alias() {
        let mut registry = SourceRegistry::new();
        let aliases = registry.merge(vec![record("cite://0-1", "https://paris.example")]);
        assert!(aliases.is_empty());

        let aliases = registry.merge(vec![
            record("cite://3-1", "https://paris.example"),
            record("cite://3-2", "https://lyon.example"),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            aliases.get("cite://3-1").map(String::as_str),
            Some("cite://0-1")
        );
        assert_eq!(registry.token_for("https://paris.example"), Some("cite://0-1"));
    }

    #[test]
    fn test_scan_respects_token_boundaries() {
        let text = "see cite://1-10, cite://1-1 and cite://x-1 or cite://2- or cite://12-3.";
        let tokens: Vec<&str> = scan_tokens(text).into_iter().map(|r| &text[r]).collect();
        assert_eq!(tokens, vec!["cite://1-10", "cite://1-1", "cite://12-3"]);
    }

    #[test]
    fn test_rewrite_tokens_applies_aliases_exactly() {
        let aliases = HashMap::from([("cite://3-1".to_string(), "cite://0-1".to_string())]);
        let text = "[Paris](cite://3-1) and [Other](cite://3-10)";
        assert_eq!(
            rewrite_tokens(text, &aliases),
            "[Paris](cite://0-1) and [Other](cite://3-10)"
        );
    }

    #[test]
    fn test_substitute_filters_to_cited() {
        let mut registry = SourceRegistry::new();
        registry.merge(vec![
            record("cite://0-1", "https://a.example"),
            record("cite://0-2", "https://b.example"),
            record("cite://1-1", "https://c.example"),
        ]);
        let result = substitute(
            "Fact one [A](cite://0-1). Fact two [C](cite://1-1), again [A](cite://0-1).",
            &registry,
        );
        assert_eq!(
            result.display_text,
            "Fact one [A](https://a.example). Fact two [C](https://c.example), again [A](https://a.example)."
        );
        let origins: Vec<&str> = result
            .cited_sources
            .iter()
            .map(|s| s.origin.as_str())
            .collect();
        assert_eq!(origins, vec!["https://a.example", "https://c.example"]);
        assert!(result.unknown_tokens.is_empty());
    }

    #[test]
    fn test_substitute_removes_unknown_tokens() {
        let mut registry = SourceRegistry::new();
        registry.merge(vec![record("cite://0-1", "https://a.example")]);
        let result = substitute("Made up [X](cite://9-9) and bare cite://9-8 end", &registry);
        assert_eq!(result.display_text, "Made up X and bare  end");
        assert!(result.cited_sources.is_empty());
        assert_eq!(result.unknown_tokens, vec!["cite://9-9", "cite://9-8"]);
    }

    proptest! {
        #[test]
        fn prop_registry_grows_monotonically(
            rounds in prop::collection::vec(prop::collection::vec(0usize..6, 0..5), 1..5)
        ) {
            let mut registry = SourceRegistry::new();
            let mut distinct = HashSet::new();
            let mut previous = 0;
            for (dispatch, origins) in rounds.iter().enumerate() {
                let mut alloc = TokenAllocator::new(dispatch as u64);
                for origin in origins {
                    let origin = format!("https://site{origin}.example");
                    alloc.allocate(&origin, "", "");
                    distinct.insert(origin);
                }
                registry.merge(alloc.into_records());
                prop_assert!(registry.len() >= previous);
                prop_assert_eq!(registry.len(), distinct.len());
                previous = registry.len();
            }
        }

        #[test]
        fn prop_cited_subset_and_no_orphans(
            picks in prop::collection::vec((0u64..4, 1usize..4), 0..12),
            filler in "[a-z ]{0,12}"
        ) {
            let mut registry = SourceRegistry::new();
            for dispatch in 0..2u64 {
                let mut alloc = TokenAllocator::new(dispatch);
                for n in 0..3 {
                    alloc.allocate(&format!("https://d{dispatch}-{n}.example"), "", "");
                }
                registry.merge(alloc.into_records());
            }
            let text: String = picks
                .iter()
                .map(|(d, n)| format!("{filler}[s](cite://{d}-{n}) "))
                .collect();
            let result = substitute(&text, &registry);
            for source in &result.cited_sources {
                prop_assert!(registry.get(&source.short_token).is_some());
            }
            prop_assert!(scan_tokens(&result.display_text).is_empty());
            let known = picks.iter().filter(|(d, _)| *d < 2).count();
            prop_assert_eq!(result.cited_sources.is_empty(), known == 0);
        }
    }
}
