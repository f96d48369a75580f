//! Structured-output shapes requested from the model.
//!
//! Each type derives [`JsonSchema`] so the gateway can attach its schema to
//! the request, and is lenient on input: missing fields default, and a
//! bare string is accepted where a list is expected.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Sub-queries produced by query generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchQueryList {
    /// Search queries, one per distinct aspect of the topic.
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub query: Vec<String>,
    /// Why these queries cover the topic.
    #[serde(default)]
    pub rationale: String,
}

/// Reflection verdict over the evidence gathered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Reflection {
    /// Whether the evidence answers the topic.
    #[serde(default)]
    pub is_sufficient: bool,
    /// What is missing or needs clarification.
    #[serde(default)]
    pub knowledge_gap: String,
    /// Self-contained queries that would close the gap.
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub follow_up_queries: Vec<String>,
}

/// One planned SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SqlStatement {
    /// A single read-only `SELECT` or `WITH` statement.
    pub sql: String,
    /// What the statement retrieves.
    #[serde(default)]
    pub explanation: String,
}

/// Query plan produced by the database evidence source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SqlPlan {
    /// Statements to run, in order.
    #[serde(default)]
    pub queries: Vec<SqlStatement>,
    /// How the statements answer the question.
    #[serde(default)]
    pub summary: String,
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

/// Trims queries, drops blanks and case-insensitive duplicates, and keeps
/// at most `cap`.
#[must_use]
pub fn usable_queries<I>(queries: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(cap)
        .collect()
}
