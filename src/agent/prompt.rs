//! System prompts and message builders for every model call.
//!
//! System prompts may contain `{current_date}` and `{number_queries}`
//! placeholders, filled by [`render`] at call time. Message builders
//! format the per-call user message.

use std::fmt::Write;
use std::path::{Path, PathBuf};

/// System prompt for sub-query generation.
pub const QUERY_WRITER_SYSTEM_PROMPT: &str = r#"You write web search queries for an automated research tool.

## Instructions

- Prefer a single query. Add more only when the question has several distinct aspects that one query cannot cover.
- Each query targets one aspect of the question.
- Never produce more than {number_queries} queries.
- Do not produce near-duplicate queries.
- Favor the most current information. The current date is {current_date}.

## Output Format (JSON)

```json
{"rationale": "why these queries cover the question", "query": ["first query", "second query"]}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for summarizing web search results.
pub const WEB_SUMMARIZER_SYSTEM_PROMPT: &str = r"You condense web search results into a verifiable research note.

## Instructions

- Use only information present in the results. Do not invent facts.
- Every statement must cite the result it came from as a markdown link whose target is the result's citation token, for example [Reuters](cite://0-1).
- Copy citation tokens exactly. Never cite a token that does not appear in the results.
- Prefer recent information. The current date is {current_date}.
- Write a compact report: key facts first, then supporting detail.";

/// System prompt for reflection.
pub const REFLECTION_SYSTEM_PROMPT: &str = r#"You are a research reviewer deciding whether gathered notes answer the user's question.

## Instructions

- If the notes answer the question, set is_sufficient to true and leave follow_up_queries empty.
- Otherwise describe the missing information in knowledge_gap and write follow-up queries that would close it.
- Follow-up queries must be self-contained: include every name and context a search engine needs.
- The current date is {current_date}.

## Output Format (JSON)

```json
{"is_sufficient": false, "knowledge_gap": "what is missing", "follow_up_queries": ["self-contained query"]}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the final answer.
pub const ANSWER_SYSTEM_PROMPT: &str = r"You write the final answer to a research question from gathered notes.

## Instructions

- Answer the question directly and completely using the notes.
- Keep every citation from the notes that supports a statement you make, as a markdown link with the citation token copied exactly, for example [Reuters](cite://0-1).
- Never invent citation tokens.
- Do not describe the research process.
- The current date is {current_date}.";

/// System prompt for planning SQL against a database.
pub const SQL_PLANNER_SYSTEM_PROMPT: &str = r#"You are a database analyst. You translate a question into read-only SQLite queries against the schema provided.

## Instructions

- Only write single SELECT statements (a leading WITH clause is allowed). Never modify data.
- Use JOINs to bring in related tables and WHERE clauses to filter.
- Several queries are allowed when the question has several parts.
- Explain what each query retrieves.
- The current date is {current_date}.

## Output Format (JSON)

```json
{"queries": [{"sql": "SELECT ...", "explanation": "what it retrieves"}], "summary": "how the queries answer the question"}
```

Return ONLY the JSON object, no surrounding text."#;

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/scout-rs/prompts";

/// Filename for the query writer prompt template.
const QUERY_WRITER_FILENAME: &str = "query_writer.md";
/// Filename for the web summarizer prompt template.
const WEB_SUMMARIZER_FILENAME: &str = "web_summarizer.md";
/// Filename for the reflection prompt template.
const REFLECTION_FILENAME: &str = "reflection.md";
/// Filename for the answer prompt template.
const ANSWER_FILENAME: &str = "answer.md";
/// Filename for the SQL planner prompt template.
const SQL_PLANNER_FILENAME: &str = "sql_planner.md";

/// A set of system prompts for every model call.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Sub-query generation.
    pub query_writer: String,
    /// Web result summarization.
    pub web_summarizer: String,
    /// Reflection.
    pub reflection: String,
    /// Final answer.
    pub answer: String,
    /// SQL planning.
    pub sql_planner: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `SCOUT_PROMPT_DIR` environment variable
    /// 3. `~/.config/scout-rs/prompts/`
    ///
    /// Each file is loaded independently; a missing or blank file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("SCOUT_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|content| !content.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            query_writer: load_file(QUERY_WRITER_FILENAME, QUERY_WRITER_SYSTEM_PROMPT),
            web_summarizer: load_file(WEB_SUMMARIZER_FILENAME, WEB_SUMMARIZER_SYSTEM_PROMPT),
            reflection: load_file(REFLECTION_FILENAME, REFLECTION_SYSTEM_PROMPT),
            answer: load_file(ANSWER_FILENAME, ANSWER_SYSTEM_PROMPT),
            sql_planner: load_file(SQL_PLANNER_FILENAME, SQL_PLANNER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            query_writer: QUERY_WRITER_SYSTEM_PROMPT.to_string(),
            web_summarizer: WEB_SUMMARIZER_SYSTEM_PROMPT.to_string(),
            reflection: REFLECTION_SYSTEM_PROMPT.to_string(),
            answer: ANSWER_SYSTEM_PROMPT.to_string(),
            sql_planner: SQL_PLANNER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (QUERY_WRITER_FILENAME, QUERY_WRITER_SYSTEM_PROMPT),
            (WEB_SUMMARIZER_FILENAME, WEB_SUMMARIZER_SYSTEM_PROMPT),
            (REFLECTION_FILENAME, REFLECTION_SYSTEM_PROMPT),
            (ANSWER_FILENAME, ANSWER_SYSTEM_PROMPT),
            (SQL_PLANNER_FILENAME, SQL_PLANNER_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Today's date as shown to the model, e.g. `March 04, 2026`.
#[must_use]
pub fn current_date() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}

/// Fills `{key}` placeholders in `template`. Unknown placeholders stay.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// User message for sub-query generation.
#[must_use]
pub fn build_query_prompt(topic: &str, number_queries: usize) -> String {
    format!(
        "<topic>\n{topic}\n</topic>\n\n\
         Write at most {number_queries} search queries for this topic."
    )
}

/// One search hit as shown to the web summarizer.
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    /// Citation token for the hit.
    pub token: &'a str,
    /// Page title.
    pub title: &'a str,
    /// Publication date, if known.
    pub published: Option<&'a str>,
    /// Extracted text.
    pub text: &'a str,
}

/// User message for web result summarization.
#[must_use]
pub fn build_web_summary_prompt(query: &str, results: &[ResultContext<'_>]) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<results>\n");
    for r in results {
        let _ = write!(
            prompt,
            "<result token=\"{token}\" title=\"{title}\" published=\"{published}\">\n\
             {text}\n\
             </result>\n\n",
            token = r.token,
            title = r.title,
            published = r.published.unwrap_or("unknown"),
            text = r.text,
        );
    }
    prompt.push_str("</results>");
    prompt
}

/// User message for reflection.
#[must_use]
pub fn build_reflection_prompt(topic: &str, summaries: &str) -> String {
    format!(
        "<topic>\n{topic}\n</topic>\n\n\
         <notes>\n{summaries}\n</notes>\n\n\
         Decide whether the notes are sufficient."
    )
}

/// User message for the final answer.
#[must_use]
pub fn build_answer_prompt(topic: &str, summaries: &str) -> String {
    format!(
        "<question>\n{topic}\n</question>\n\n\
         <notes>\n{summaries}\n</notes>\n\n\
         Write the answer."
    )
}

/// User message for SQL planning.
#[must_use]
pub fn build_sql_prompt(query: &str, schema: &str) -> String {
    format!(
        "<schema>\n{schema}\n</schema>\n\n\
         <question>{query}</question>\n\n\
         Plan the queries."
    )
}
